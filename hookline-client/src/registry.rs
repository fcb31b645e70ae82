//! Capability registry.
//!
//! Capabilities are registered under explicit identifiers when the bridge is
//! assembled. Afterwards the registry is shared read-only behind an `Arc`, so
//! the dispatcher and capabilities calling one another need no locking.

use crate::cache::CacheStore;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;

/// Deepest chain of nested dispatches allowed from a single command.
pub const MAX_DISPATCH_DEPTH: usize = 64;

/// Error type returned by capability implementations.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// What a capability produced for a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Send this value back to the caller.
    Return(Value),
    /// Send nothing.
    NoResult,
}

impl Outcome {
    /// Shorthand for `Outcome::Return` from anything convertible to JSON.
    pub fn value(value: impl Into<Value>) -> Self {
        Outcome::Return(value.into())
    }
}

/// A handler invocable by identifier.
pub trait Capability: Send + Sync {
    fn dispatch(&self, ctx: &CapabilityContext<'_>, args: &[Value])
        -> Result<Outcome, HandlerError>;
}

/// Adapts a closure into a [`Capability`].
struct FnCapability<F>(F);

impl<F> Capability for FnCapability<F>
where
    F: Fn(&CapabilityContext<'_>, &[Value]) -> Result<Outcome, HandlerError> + Send + Sync,
{
    fn dispatch(
        &self,
        ctx: &CapabilityContext<'_>,
        args: &[Value],
    ) -> Result<Outcome, HandlerError> {
        (self.0)(ctx, args)
    }
}

/// Handle given to a capability while it runs.
pub struct CapabilityContext<'a> {
    registry: &'a CapabilityRegistry,
    id: &'a str,
    depth: usize,
}

impl CapabilityContext<'_> {
    /// Identifier the running capability was registered under.
    pub fn id(&self) -> &str {
        self.id
    }

    /// Number of dispatches enclosing this one; 0 for a command from the wire.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Invokes another capability by identifier.
    ///
    /// Fails with [`DispatchError::TooDeep`] once the chain is longer than
    /// [`MAX_DISPATCH_DEPTH`].
    pub fn dispatch(&self, target_id: &str, args: &[Value]) -> Result<Outcome, DispatchError> {
        self.registry.dispatch_at(target_id, args, self.depth + 1)
    }

    /// Upserts `key` in this capability's cache namespace.
    pub fn set_cache(&self, key: &str, value: Value) {
        self.registry.set_cache(self.id, key, value);
    }
}

/// Dispatch errors.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("capability not found: {0}")]
    NotFound(String),

    #[error("capability '{id}' failed: {source}")]
    Handler {
        id: String,
        #[source]
        source: HandlerError,
    },

    #[error("capability '{id}' panicked: {message}")]
    Panicked { id: String, message: String },

    #[error("dispatch of '{id}' exceeds the nesting limit of {limit}")]
    TooDeep { id: String, limit: usize },
}

/// Registration errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("capability '{0}' is already registered")]
    Duplicate(String),

    #[error("capability identifier must not be empty")]
    EmptyId,
}

/// Maps identifiers to capabilities.
#[derive(Default)]
pub struct CapabilityRegistry {
    capabilities: HashMap<String, Arc<dyn Capability>>,
    cache: Option<Arc<dyn CacheStore>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the store that receives `set_cache` upserts.
    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Registers a capability under `id`.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        capability: impl Capability + 'static,
    ) -> Result<(), RegistryError> {
        let id = id.into();
        if id.is_empty() {
            return Err(RegistryError::EmptyId);
        }
        if self.capabilities.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        tracing::debug!("Registered capability '{}'", id);
        self.capabilities.insert(id, Arc::new(capability));
        Ok(())
    }

    /// Registers a closure as a capability under `id`.
    pub fn register_fn<F>(&mut self, id: impl Into<String>, f: F) -> Result<(), RegistryError>
    where
        F: Fn(&CapabilityContext<'_>, &[Value]) -> Result<Outcome, HandlerError>
            + Send
            + Sync
            + 'static,
    {
        self.register(id, FnCapability(f))
    }

    /// Invokes the capability registered under `target_id`.
    ///
    /// Panics raised by the capability are caught and reported as
    /// [`DispatchError::Panicked`].
    pub fn dispatch(&self, target_id: &str, args: &[Value]) -> Result<Outcome, DispatchError> {
        self.dispatch_at(target_id, args, 0)
    }

    fn dispatch_at(
        &self,
        target_id: &str,
        args: &[Value],
        depth: usize,
    ) -> Result<Outcome, DispatchError> {
        if depth > MAX_DISPATCH_DEPTH {
            return Err(DispatchError::TooDeep {
                id: target_id.to_string(),
                limit: MAX_DISPATCH_DEPTH,
            });
        }

        let capability = self
            .capabilities
            .get(target_id)
            .ok_or_else(|| DispatchError::NotFound(target_id.to_string()))?;

        let ctx = CapabilityContext {
            registry: self,
            id: target_id,
            depth,
        };

        match catch_unwind(AssertUnwindSafe(|| capability.dispatch(&ctx, args))) {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(source)) => Err(DispatchError::Handler {
                id: target_id.to_string(),
                source,
            }),
            Err(payload) => Err(DispatchError::Panicked {
                id: target_id.to_string(),
                message: panic_message(payload.as_ref()),
            }),
        }
    }

    /// Forwards a cache upsert scoped to `owner_id`. No-op without a cache store.
    pub fn set_cache(&self, owner_id: &str, key: &str, value: Value) {
        match &self.cache {
            Some(cache) => cache.upsert(owner_id, key, value),
            None => tracing::debug!(
                "No cache store configured, dropping upsert '{}' from '{}'",
                key,
                owner_id
            ),
        }
    }

    /// Returns whether `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.capabilities.contains_key(id)
    }

    /// Returns the registered identifiers, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.capabilities.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use serde_json::json;

    struct Echo;

    impl Capability for Echo {
        fn dispatch(
            &self,
            _ctx: &CapabilityContext<'_>,
            args: &[Value],
        ) -> Result<Outcome, HandlerError> {
            Ok(Outcome::Return(Value::Array(args.to_vec())))
        }
    }

    #[test]
    fn test_register_and_dispatch() {
        let mut registry = CapabilityRegistry::new();
        registry.register("echo", Echo).unwrap();

        let outcome = registry.dispatch("echo", &[json!(1), json!("a")]).unwrap();
        assert_eq!(outcome, Outcome::Return(json!([1, "a"])));
        assert!(registry.contains("echo"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = CapabilityRegistry::new();
        registry.register("echo", Echo).unwrap();

        let err = registry.register("echo", Echo).unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate(ref id) if id == "echo"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_empty_id_rejected() {
        let mut registry = CapabilityRegistry::new();
        assert!(matches!(
            registry.register("", Echo),
            Err(RegistryError::EmptyId)
        ));
    }

    #[test]
    fn test_not_found() {
        let registry = CapabilityRegistry::new();
        let err = registry.dispatch("missing", &[]).unwrap_err();
        assert!(matches!(err, DispatchError::NotFound(ref id) if id == "missing"));
    }

    #[test]
    fn test_handler_error() {
        let mut registry = CapabilityRegistry::new();
        registry
            .register_fn("fail", |_ctx, _args| Err("bad input".into()))
            .unwrap();

        let err = registry.dispatch("fail", &[]).unwrap_err();
        assert!(err.to_string().contains("bad input"));
        assert!(matches!(err, DispatchError::Handler { ref id, .. } if id == "fail"));
    }

    #[test]
    fn test_handler_panic_is_caught() {
        let mut registry = CapabilityRegistry::new();
        registry
            .register_fn("boom", |_ctx, _args| panic!("kaboom"))
            .unwrap();

        let err = registry.dispatch("boom", &[]).unwrap_err();
        match err {
            DispatchError::Panicked { id, message } => {
                assert_eq!(id, "boom");
                assert_eq!(message, "kaboom");
            }
            other => panic!("Expected Panicked, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_dispatch() {
        let mut registry = CapabilityRegistry::new();
        registry.register("echo", Echo).unwrap();
        registry
            .register_fn("relay", |ctx, args| {
                let target = args
                    .first()
                    .and_then(Value::as_str)
                    .ok_or("missing target")?;
                Ok(ctx.dispatch(target, &args[1..])?)
            })
            .unwrap();

        let outcome = registry
            .dispatch("relay", &[json!("echo"), json!(7)])
            .unwrap();
        assert_eq!(outcome, Outcome::Return(json!([7])));

        let err = registry.dispatch("relay", &[json!("nope")]).unwrap_err();
        assert!(err.to_string().contains("capability not found: nope"));
    }

    #[test]
    fn test_nesting_limit() {
        let mut registry = CapabilityRegistry::new();
        registry
            .register_fn("descend", |ctx, _args| {
                if ctx.depth() == MAX_DISPATCH_DEPTH {
                    return Ok(Outcome::value(ctx.depth()));
                }
                Ok(ctx.dispatch("descend", &[])?)
            })
            .unwrap();
        registry
            .register_fn("forever", |ctx, args| Ok(ctx.dispatch("forever", args)?))
            .unwrap();

        // The deepest allowed call still runs.
        assert_eq!(
            registry.dispatch("descend", &[]).unwrap(),
            Outcome::value(MAX_DISPATCH_DEPTH)
        );

        // Unbounded recursion fails instead of exhausting the stack.
        let err = registry.dispatch("forever", &[]).unwrap_err();
        assert!(matches!(err, DispatchError::Handler { ref id, .. } if id == "forever"));
        let mut source: Option<&(dyn std::error::Error + 'static)> = Some(&err);
        let mut too_deep = false;
        while let Some(e) = source {
            if matches!(e.downcast_ref::<DispatchError>(), Some(DispatchError::TooDeep { .. })) {
                too_deep = true;
            }
            source = e.source();
        }
        assert!(too_deep);
    }

    #[test]
    fn test_set_cache_scoped_to_caller() {
        let cache = Arc::new(MemoryCache::new());
        let mut registry = CapabilityRegistry::new().with_cache(cache.clone());
        registry
            .register_fn("weather", |ctx, args| {
                ctx.set_cache("temp", args[0].clone());
                Ok(Outcome::NoResult)
            })
            .unwrap();

        let outcome = registry.dispatch("weather", &[json!(21)]).unwrap();
        assert_eq!(outcome, Outcome::NoResult);
        assert_eq!(cache.get("weather", "temp"), Some(json!(21)));
    }

    #[test]
    fn test_set_cache_without_store() {
        let registry = CapabilityRegistry::new();
        registry.set_cache("owner", "key", json!(1));
    }

    #[test]
    fn test_ids_sorted() {
        let mut registry = CapabilityRegistry::new();
        registry.register("b", Echo).unwrap();
        registry.register("a", Echo).unwrap();
        assert_eq!(registry.ids(), vec!["a", "b"]);
    }
}
