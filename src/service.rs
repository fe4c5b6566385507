//! Typed dependency resolution (C2): descriptors and memoised singletons
//! guarded behind a single mutex each, rather than a macro-driven DI
//! framework.

use crate::error::{PipelineError, Result};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    Singleton,
    Transient,
}

type Factory = Box<dyn Fn() -> Arc<dyn Any + Send + Sync> + Send + Sync>;

struct Descriptor {
    lifetime: Lifetime,
    factory: Factory,
}

/// Typed registry keyed by service interface. Registration replaces any
/// prior descriptor for the same type (§4.1). Resolution is synchronous;
/// singletons are built at most once and memoised.
pub struct ServiceContainer {
    descriptors: Mutex<HashMap<TypeId, Descriptor>>,
    singletons: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl ServiceContainer {
    pub fn new() -> Self {
        Self {
            descriptors: Mutex::new(HashMap::new()),
            singletons: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a factory for `T`. Re-registering the same `T` replaces the
    /// prior descriptor and drops any memoised singleton instance.
    pub fn register<T, F>(&self, lifetime: Lifetime, factory: F)
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let type_id = TypeId::of::<T>();
        let boxed: Factory = Box::new(move || Arc::new(factory()) as Arc<dyn Any + Send + Sync>);
        self.descriptors
            .lock()
            .unwrap()
            .insert(type_id, Descriptor { lifetime, factory: boxed });
        self.singletons.lock().unwrap().remove(&type_id);
    }

    /// Resolves a service instance, invoking the registered factory (once,
    /// for singletons; every call, for transients). Fails with
    /// `ServiceUnavailable` if nothing is registered for `T`.
    pub fn get_service<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
        let type_id = TypeId::of::<T>();

        if let Some(existing) = self.singletons.lock().unwrap().get(&type_id) {
            return Self::downcast(Arc::clone(existing));
        }

        let instance = {
            let descriptors = self.descriptors.lock().unwrap();
            let descriptor = descriptors.get(&type_id).ok_or_else(|| {
                PipelineError::ServiceUnavailable(std::any::type_name::<T>().to_string())
            })?;
            let instance = (descriptor.factory)();
            if descriptor.lifetime == Lifetime::Singleton {
                Some(instance)
            } else {
                return Self::downcast(instance);
            }
        };

        if let Some(instance) = instance {
            let mut singletons = self.singletons.lock().unwrap();
            let entry = singletons.entry(type_id).or_insert(instance);
            return Self::downcast(Arc::clone(entry));
        }

        unreachable!("transient path returns before reaching here")
    }

    fn downcast<T: Any + Send + Sync>(instance: Arc<dyn Any + Send + Sync>) -> Result<Arc<T>> {
        instance
            .downcast::<T>()
            .map_err(|_| PipelineError::ServiceUnavailable(std::any::type_name::<T>().to_string()))
    }
}

impl Default for ServiceContainer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Counter(u32);

    #[test]
    fn unregistered_service_is_unavailable() {
        let container = ServiceContainer::new();
        let result = container.get_service::<Counter>();
        assert!(matches!(result, Err(PipelineError::ServiceUnavailable(_))));
    }

    #[test]
    fn singleton_is_built_once_and_memoised() {
        let container = ServiceContainer::new();
        let calls = Arc::new(Mutex::new(0u32));
        let calls_clone = Arc::clone(&calls);
        container.register::<Counter, _>(Lifetime::Singleton, move || {
            *calls_clone.lock().unwrap() += 1;
            Counter(7)
        });

        let first = container.get_service::<Counter>().unwrap();
        let second = container.get_service::<Counter>().unwrap();
        assert_eq!(*first, Counter(7));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn transient_is_built_on_every_call() {
        let container = ServiceContainer::new();
        let calls = Arc::new(Mutex::new(0u32));
        let calls_clone = Arc::clone(&calls);
        container.register::<Counter, _>(Lifetime::Transient, move || {
            let mut c = calls_clone.lock().unwrap();
            *c += 1;
            Counter(*c)
        });

        let first = container.get_service::<Counter>().unwrap();
        let second = container.get_service::<Counter>().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[test]
    fn re_registering_replaces_the_descriptor() {
        let container = ServiceContainer::new();
        container.register::<Counter, _>(Lifetime::Singleton, || Counter(1));
        assert_eq!(*container.get_service::<Counter>().unwrap(), Counter(1));

        container.register::<Counter, _>(Lifetime::Singleton, || Counter(2));
        assert_eq!(*container.get_service::<Counter>().unwrap(), Counter(2));
    }
}
