//! Keyed service storage and the per-dispatch dependency pool.
//!
//! Values are keyed by the `TypeId` of the type they are requested as. The
//! stored value is always an `Arc<T>` erased to `dyn Any`, which lets `T` be
//! a trait object: register an `Arc<dyn Clock>` and request `dyn Clock`.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A type-erased service value. The concrete type behind the `Any` is `Arc<T>`.
pub type ServiceArc = Arc<dyn Any + Send + Sync>;

/// A keyed-by-type service lookup.
///
/// Implementations give no ordering guarantees across keys.
pub trait ServiceStore: Send + Sync {
    /// Looks up the erased value registered under `key`.
    fn get_erased(&self, key: TypeId) -> Option<ServiceArc>;
}

impl dyn ServiceStore {
    /// Typed lookup; returns `None` if nothing is registered as `T`.
    pub fn get<T: ?Sized + 'static>(&self) -> Option<Arc<T>> {
        self.get_erased(TypeId::of::<T>())
            .and_then(|erased| erased.downcast_ref::<Arc<T>>().map(Arc::clone))
    }
}

/// A store that never has anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyServices;

impl ServiceStore for EmptyServices {
    fn get_erased(&self, _key: TypeId) -> Option<ServiceArc> {
        None
    }
}

/// A `HashMap`-backed [`ServiceStore`].
#[derive(Clone, Default)]
pub struct ServiceMap {
    services: HashMap<TypeId, (&'static str, ServiceArc)>,
}

impl ServiceMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `value` under the type `T`; a previous value is replaced.
    pub fn insert<T: ?Sized + Send + Sync + 'static>(&mut self, value: Arc<T>) {
        self.services
            .insert(TypeId::of::<T>(), (type_name::<T>(), Arc::new(value)));
    }

    /// Registers `value` under the type `T` (builder pattern).
    pub fn with<T: ?Sized + Send + Sync + 'static>(mut self, value: Arc<T>) -> Self {
        self.insert(value);
        self
    }

    /// Returns `true` if something is registered as `T`.
    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<T>())
    }

    /// Number of registered services.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl ServiceStore for ServiceMap {
    fn get_erased(&self, key: TypeId) -> Option<ServiceArc> {
        self.services.get(&key).map(|(_, value)| Arc::clone(value))
    }
}

impl fmt::Debug for ServiceMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.services.values().map(|(name, _)| name))
            .finish()
    }
}

#[derive(Clone)]
struct AdHoc {
    key: TypeId,
    name: &'static str,
    value: ServiceArc,
}

/// A fallback-chained dependency lookup for one dispatch.
///
/// Resolution order for a requested type `T`:
///
/// 1. `T` is the pool itself (`DependencyPool` or `dyn ServiceStore`): the pool
/// 2. the first ad-hoc object registered as `T`
/// 3. the backing [`ServiceStore`]
///
/// The pool is immutable once dispatch begins; cloning is cheap.
#[derive(Clone)]
pub struct DependencyPool {
    ad_hoc: Arc<Vec<AdHoc>>,
    store: Arc<dyn ServiceStore>,
}

impl DependencyPool {
    /// Creates a pool backed by `store` with no ad-hoc objects.
    pub fn new(store: Arc<dyn ServiceStore>) -> Self {
        Self {
            ad_hoc: Arc::new(Vec::new()),
            store,
        }
    }

    /// A pool with nothing in it.
    pub fn empty() -> Self {
        Self::new(Arc::new(EmptyServices))
    }

    /// Adds an ad-hoc object, visible as `T` (builder pattern).
    ///
    /// Ad-hoc objects are checked before the backing store, in insertion order.
    pub fn with<T: ?Sized + Send + Sync + 'static>(mut self, value: Arc<T>) -> Self {
        Arc::make_mut(&mut self.ad_hoc).push(AdHoc {
            key: TypeId::of::<T>(),
            name: type_name::<T>(),
            value: Arc::new(value),
        });
        self
    }

    /// Adds an already-erased ad-hoc object (builder pattern).
    ///
    /// `value` must hold an `Arc<T>` where `TypeId::of::<T>() == key`.
    pub fn with_erased(mut self, key: TypeId, name: &'static str, value: ServiceArc) -> Self {
        Arc::make_mut(&mut self.ad_hoc).push(AdHoc { key, name, value });
        self
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn ServiceStore> {
        &self.store
    }

    /// Resolves `T` using the three-step lookup rule.
    pub fn resolve<T: ?Sized + 'static>(&self) -> Option<Arc<T>> {
        if let Some(own) = self.as_provider::<T>() {
            return Some(own);
        }
        self.get_erased(TypeId::of::<T>())
            .and_then(|erased| erased.downcast_ref::<Arc<T>>().map(Arc::clone))
    }

    fn as_provider<T: ?Sized + 'static>(&self) -> Option<Arc<T>> {
        let key = TypeId::of::<T>();
        let erased: Box<dyn Any> = if key == TypeId::of::<DependencyPool>() {
            Box::new(Arc::new(self.clone()))
        } else if key == TypeId::of::<dyn ServiceStore>() {
            Box::new(Arc::new(self.clone()) as Arc<dyn ServiceStore>)
        } else {
            return None;
        };
        erased.downcast::<Arc<T>>().ok().map(|boxed| *boxed)
    }
}

impl ServiceStore for DependencyPool {
    fn get_erased(&self, key: TypeId) -> Option<ServiceArc> {
        self.ad_hoc
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| Arc::clone(&entry.value))
            .or_else(|| self.store.get_erased(key))
    }
}

impl Default for DependencyPool {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for DependencyPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyPool")
            .field(
                "ad_hoc",
                &self.ad_hoc.iter().map(|e| e.name).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".into()
        }
    }

    #[test]
    fn test_service_map_trait_objects() {
        let map = ServiceMap::new().with::<dyn Greeter>(Arc::new(English));
        let store: Arc<dyn ServiceStore> = Arc::new(map);
        let greeter = store.get::<dyn Greeter>().unwrap();
        assert_eq!(greeter.greet(), "hello");
        assert!(store.get::<English>().is_none());
    }

    #[test]
    fn test_ad_hoc_checked_before_store() {
        let store = ServiceMap::new().with(Arc::new(String::from("store")));
        let pool = DependencyPool::new(Arc::new(store)).with(Arc::new(String::from("ad-hoc")));
        assert_eq!(pool.resolve::<String>().unwrap().as_str(), "ad-hoc");
    }

    #[test]
    fn test_first_ad_hoc_wins() {
        let pool = DependencyPool::empty()
            .with(Arc::new(1_u32))
            .with(Arc::new(2_u32));
        assert_eq!(*pool.resolve::<u32>().unwrap(), 1);
    }

    #[test]
    fn test_falls_back_to_store() {
        let store = ServiceMap::new().with(Arc::new(7_i64));
        let pool = DependencyPool::new(Arc::new(store));
        assert_eq!(*pool.resolve::<i64>().unwrap(), 7);
        assert!(pool.resolve::<u8>().is_none());
    }

    #[test]
    fn test_pool_resolves_itself() {
        let pool = DependencyPool::empty().with(Arc::new(3_u16));
        let own = pool.resolve::<DependencyPool>().unwrap();
        assert_eq!(*own.resolve::<u16>().unwrap(), 3);

        let as_store = pool.resolve::<dyn ServiceStore>().unwrap();
        assert_eq!(*as_store.get::<u16>().unwrap(), 3);
    }
}
