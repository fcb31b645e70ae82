//! Capabilities the `hookline` binary exposes out of the box.

use hookline_client::{CapabilityRegistry, HandlerError, Outcome, RegistryError};
use serde_json::Value;

/// Registers `echo`, `ping`, `sum`, `cache.set` and `relay`.
pub fn register_all(registry: &mut CapabilityRegistry) -> Result<(), RegistryError> {
    registry.register_fn("echo", |_ctx, args| Ok(Outcome::value(args.to_vec())))?;

    registry.register_fn("ping", |_ctx, _args| Ok(Outcome::value("pong")))?;

    registry.register_fn("sum", |_ctx, args| sum(args).map(Outcome::Return))?;

    // Stores args[1] under the key args[0]. Nothing is sent back.
    registry.register_fn("cache.set", |ctx, args| {
        let key = args
            .first()
            .and_then(Value::as_str)
            .ok_or("cache.set expects a string key")?;
        let value = args.get(1).cloned().unwrap_or(Value::Null);
        ctx.set_cache(key, value);
        Ok(Outcome::NoResult)
    })?;

    // Invokes the capability named by args[0] with the remaining args.
    registry.register_fn("relay", |ctx, args| {
        let target = args
            .first()
            .and_then(Value::as_str)
            .ok_or("relay expects a target id")?;
        Ok(ctx.dispatch(target, &args[1..])?)
    })?;

    Ok(())
}

fn sum(args: &[Value]) -> Result<Value, HandlerError> {
    let integers = args
        .iter()
        .map(Value::as_i64)
        .try_fold(0i64, |acc, n| n.and_then(|n| acc.checked_add(n)));
    if let Some(total) = integers {
        return Ok(Value::from(total));
    }

    let mut total = 0.0;
    for arg in args {
        total += arg
            .as_f64()
            .ok_or_else(|| format!("sum expects numbers, got {}", arg))?;
    }
    // JSON has no infinity; serde_json would turn it into null.
    if !total.is_finite() {
        return Err("sum overflowed".into());
    }
    Ok(Value::from(total))
}
