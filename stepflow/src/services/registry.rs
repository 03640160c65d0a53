//! String-keyed service locator with per-capability entries.

use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::ServiceError;

type Entry = Box<dyn Any + Send + Sync>;

/// Registry of named services.
///
/// One name may carry several capabilities. Each call to
/// [`provide`](Self::provide) stores the service under the name for one
/// capability type `T`, which may be a trait object:
///
/// ```rust,ignore
/// registry.provide::<dyn TransitionTrigger>("orders", engine.clone());
/// registry.provide::<StateMachineEngine>("orders", engine);
/// ```
#[derive(Default)]
pub struct ServiceRegistry {
    entries: RwLock<HashMap<String, HashMap<TypeId, Entry>>>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `service` under `name` for capability `T`.
    ///
    /// Replaces any earlier service registered for the same name and capability.
    pub fn provide<T>(&self, name: impl Into<String>, service: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.entries
            .write()
            .entry(name.into())
            .or_default()
            .insert(TypeId::of::<T>(), Box::new(service));
    }

    /// Resolves the capability `T` of the service registered under `name`.
    ///
    /// Distinguishes a missing name from a name registered without `T`.
    pub fn get<T>(&self, name: &str) -> Result<Arc<T>, ServiceError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let entries = self.entries.read();
        let capabilities = entries
            .get(name)
            .ok_or_else(|| ServiceError::not_found(name))?;
        capabilities
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.downcast_ref::<Arc<T>>())
            .cloned()
            .ok_or_else(|| ServiceError::wrong_capability(name, capability_name::<T>()))
    }

    /// Returns true if anything is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Returns the registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Removes every capability registered under `name`.
    pub fn remove(&self, name: &str) -> bool {
        self.entries.write().remove(name).is_some()
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.names())
            .finish()
    }
}

/// Short display name of a capability type, e.g. `TransitionTrigger`.
fn capability_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let bare = full.strip_prefix("dyn ").unwrap_or(full);
    let first = bare.split(" + ").next().unwrap_or(bare);
    let base = first.split('<').next().unwrap_or(first);
    base.rsplit("::").next().unwrap_or(base).to_string()
}
