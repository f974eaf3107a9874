//! Dependency construction for handler instances.
//!
//! A handler type declares how it can be built through a [`Factory`]: an
//! ordered list of constructor closures whose parameters are resolved from
//! the [`DependencyPool`]. Any closure `Fn(A, B, ..) -> H` whose arguments
//! implement [`FromPool`] is a constructor, much like axum handlers accept
//! any function whose arguments are extractors.
//!
//! # Selection
//!
//! - a single constructor is used unconditionally, and its missing
//!   dependency is reported as [`InjectError::DependencyMissing`]
//! - otherwise constructors are tried by ascending parameter count and the
//!   first whose every parameter resolves wins
//! - if none resolves, construction fails with
//!   [`InjectError::NoViableConstructor`]
//!
//! After construction, [`Component::inject`] fills injectable fields using
//! the same lookup rule, and [`Component::bind_context`] hands the instance
//! its dispatch context.
//!
//! ```rust,ignore
//! struct Greeter {
//!     clock: Dep<dyn Clock>,
//!     audit: Option<Dep<AuditLog>>,
//! }
//!
//! let factory = Factory::new()
//!     .constructor(|clock: Dep<dyn Clock>, audit: Option<Dep<AuditLog>>| Greeter { clock, audit });
//! ```

use std::any::type_name;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use herald_core::{DependencyPool, DispatchContext, InjectError, InjectResult};

/// The type name of a dependency that could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingDependency(pub &'static str);

/// Types that can be resolved from a [`DependencyPool`].
pub trait FromPool: Sized {
    fn from_pool(pool: &DependencyPool) -> Result<Self, MissingDependency>;
}

/// A required dependency, shared with the pool it came from.
///
/// `T` may be a trait object: `Dep<dyn Clock>` resolves whatever was
/// registered as `dyn Clock`.
pub struct Dep<T: ?Sized>(pub Arc<T>);

impl<T: ?Sized> Dep<T> {
    pub fn into_inner(self) -> Arc<T> {
        self.0
    }
}

impl<T: ?Sized> Clone for Dep<T> {
    fn clone(&self) -> Self {
        Dep(Arc::clone(&self.0))
    }
}

impl<T: ?Sized> Deref for Dep<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: ?Sized> fmt::Debug for Dep<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dep<{}>", type_name::<T>())
    }
}

impl<T: ?Sized + 'static> FromPool for Dep<T> {
    fn from_pool(pool: &DependencyPool) -> Result<Self, MissingDependency> {
        pool.resolve::<T>()
            .map(Dep)
            .ok_or(MissingDependency(type_name::<T>()))
    }
}

/// Optional dependencies resolve to `None` instead of failing.
impl<T: FromPool> FromPool for Option<T> {
    fn from_pool(pool: &DependencyPool) -> Result<Self, MissingDependency> {
        Ok(T::from_pool(pool).ok())
    }
}

/// The pool itself is always available.
impl FromPool for DependencyPool {
    fn from_pool(pool: &DependencyPool) -> Result<Self, MissingDependency> {
        Ok(pool.clone())
    }
}

// ============================================================================
// Constructor
// ============================================================================

/// A function that builds `H` from values resolved out of a pool.
pub trait Constructor<H, Args>: Send + Sync + 'static {
    /// Number of parameters; constructors are tried in ascending order.
    fn arity(&self) -> usize;

    fn construct(&self, pool: &DependencyPool) -> Result<H, MissingDependency>;
}

macro_rules! impl_constructor {
    (
        $($ty:ident),*
    ) => {
        #[allow(non_snake_case, unused_variables)]
        impl<F, H, $($ty,)*> Constructor<H, ($($ty,)*)> for F
        where
            F: Fn($($ty,)*) -> H + Send + Sync + 'static,
            $( $ty: FromPool, )*
        {
            fn arity(&self) -> usize {
                <[&str]>::len(&[$(stringify!($ty)),*])
            }

            fn construct(&self, pool: &DependencyPool) -> Result<H, MissingDependency> {
                $(
                    let $ty = $ty::from_pool(pool)?;
                )*
                Ok((self)($($ty,)*))
            }
        }
    };
}

impl_constructor!();
impl_constructor!(T1);
impl_constructor!(T1, T2);
impl_constructor!(T1, T2, T3);
impl_constructor!(T1, T2, T3, T4);
impl_constructor!(T1, T2, T3, T4, T5);
impl_constructor!(T1, T2, T3, T4, T5, T6);
impl_constructor!(T1, T2, T3, T4, T5, T6, T7);
impl_constructor!(T1, T2, T3, T4, T5, T6, T7, T8);

type BuildFn<H> = Arc<dyn Fn(&DependencyPool) -> Result<H, MissingDependency> + Send + Sync>;

struct ConstructorEntry<H> {
    arity: usize,
    build: BuildFn<H>,
}

impl<H> Clone for ConstructorEntry<H> {
    fn clone(&self) -> Self {
        Self {
            arity: self.arity,
            build: Arc::clone(&self.build),
        }
    }
}

// ============================================================================
// Factory
// ============================================================================

/// The ordered constructor list for a handler type.
pub struct Factory<H> {
    constructors: Vec<ConstructorEntry<H>>,
}

impl<H: 'static> Factory<H> {
    /// A factory with no constructors. Building from it fails with
    /// [`InjectError::NoConstructor`].
    pub fn new() -> Self {
        Self {
            constructors: Vec::new(),
        }
    }

    /// Adds a constructor (builder pattern).
    ///
    /// Constructors are kept sorted by ascending arity; equal arities keep
    /// their declaration order.
    pub fn constructor<C, Args>(mut self, constructor: C) -> Self
    where
        C: Constructor<H, Args>,
        Args: 'static,
    {
        let arity = constructor.arity();
        let build: BuildFn<H> = Arc::new(move |pool: &DependencyPool| constructor.construct(pool));
        self.constructors.push(ConstructorEntry { arity, build });
        self.constructors.sort_by_key(|c| c.arity);
        self
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }

    /// Builds an instance using the constructor selection rule.
    pub fn build(&self, pool: &DependencyPool) -> InjectResult<H> {
        let target = type_name::<H>();
        match self.constructors.as_slice() {
            [] => Err(InjectError::NoConstructor { target }),
            [only] => (only.build)(pool).map_err(|MissingDependency(dependency)| {
                InjectError::DependencyMissing { target, dependency }
            }),
            many => many
                .iter()
                .find_map(|c| (c.build)(pool).ok())
                .ok_or(InjectError::NoViableConstructor {
                    target,
                    attempted: many.len(),
                }),
        }
    }
}

impl<H: Component> Factory<H> {
    /// Builds an instance, injects its fields and binds the dispatch context.
    pub fn instantiate(&self, ctx: &Arc<DispatchContext>) -> InjectResult<H> {
        let mut instance = self.build(ctx.pool())?;
        instance.inject(&FieldInjector::new(ctx.pool(), type_name::<H>()))?;
        instance.bind_context(Arc::clone(ctx));
        Ok(instance)
    }
}

impl<H: 'static> Default for Factory<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Clone for Factory<H> {
    fn clone(&self) -> Self {
        Self {
            constructors: self.constructors.clone(),
        }
    }
}

impl<H> fmt::Debug for Factory<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("target", &type_name::<H>())
            .field(
                "arities",
                &self.constructors.iter().map(|c| c.arity).collect::<Vec<_>>(),
            )
            .finish()
    }
}

// ============================================================================
// Field injection
// ============================================================================

/// Resolves injectable fields after construction.
pub struct FieldInjector<'a> {
    pool: &'a DependencyPool,
    target: &'static str,
}

impl<'a> FieldInjector<'a> {
    pub fn new(pool: &'a DependencyPool, target: &'static str) -> Self {
        Self { pool, target }
    }

    /// Resolves one field value. Use `Option<Dep<T>>` for optional fields.
    pub fn resolve<F: FromPool>(&self) -> InjectResult<F> {
        F::from_pool(self.pool).map_err(|MissingDependency(dependency)| {
            InjectError::DependencyMissing {
                target: self.target,
                dependency,
            }
        })
    }

    pub fn pool(&self) -> &DependencyPool {
        self.pool
    }
}

/// Post-construction hooks shared by every handler type.
///
/// Both hooks default to doing nothing. Fields that should not be injected
/// are simply left out of [`inject`](Component::inject).
pub trait Component: Send + 'static {
    /// Fills injectable fields from the pool.
    fn inject(&mut self, fields: &FieldInjector<'_>) -> InjectResult<()> {
        let _ = fields;
        Ok(())
    }

    /// Receives the current dispatch context. Called after [`inject`](Component::inject).
    fn bind_context(&mut self, ctx: Arc<DispatchContext>) {
        let _ = ctx;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::{ConversationScope, InboundMessage, ServiceMap};

    trait Clock: Send + Sync {
        fn now(&self) -> u64;
    }

    struct FixedClock(u64);

    impl Clock for FixedClock {
        fn now(&self) -> u64 {
            self.0
        }
    }

    struct Audit;

    struct Greeter {
        clock: Option<Dep<dyn Clock>>,
        audit: Option<Dep<Audit>>,
        via: &'static str,
    }

    fn pool_with_clock() -> DependencyPool {
        let store = ServiceMap::new().with::<dyn Clock>(Arc::new(FixedClock(42)));
        DependencyPool::new(Arc::new(store))
    }

    #[test]
    fn test_optional_dependency_absent() {
        let factory = Factory::new().constructor(|audit: Option<Dep<Audit>>| Greeter {
            clock: None,
            audit,
            via: "optional",
        });
        let greeter = factory.build(&DependencyPool::empty()).unwrap();
        assert!(greeter.audit.is_none());
    }

    #[test]
    fn test_required_dependency_missing_names_type() {
        let factory = Factory::new().constructor(|_audit: Dep<Audit>| Greeter {
            clock: None,
            audit: None,
            via: "required",
        });
        let err = factory.build(&DependencyPool::empty()).err().unwrap();
        match err {
            InjectError::DependencyMissing { target, dependency } => {
                assert!(target.ends_with("Greeter"));
                assert!(dependency.ends_with("Audit"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_trait_object_dependency() {
        let factory = Factory::new().constructor(|clock: Dep<dyn Clock>| Greeter {
            clock: Some(clock),
            audit: None,
            via: "clock",
        });
        let greeter = factory.build(&pool_with_clock()).unwrap();
        assert_eq!(greeter.clock.unwrap().now(), 42);
    }

    #[test]
    fn test_fewest_parameters_tried_first() {
        let factory = Factory::new()
            .constructor(|clock: Dep<dyn Clock>, _pool: DependencyPool| Greeter {
                clock: Some(clock),
                audit: None,
                via: "two",
            })
            .constructor(|audit: Dep<Audit>| Greeter {
                clock: None,
                audit: Some(audit),
                via: "one",
            });

        // The one-parameter constructor fails, so the two-parameter one is used.
        let greeter = factory.build(&pool_with_clock()).unwrap();
        assert_eq!(greeter.via, "two");

        let pool = pool_with_clock().with(Arc::new(Audit));
        assert_eq!(factory.build(&pool).unwrap().via, "one");
    }

    #[test]
    fn test_no_viable_constructor() {
        let factory = Factory::new()
            .constructor(|_a: Dep<Audit>| 1_u8)
            .constructor(|_a: Dep<Audit>, _b: Dep<String>| 2_u8);
        assert_eq!(
            factory.build(&DependencyPool::empty()),
            Err(InjectError::NoViableConstructor {
                target: "u8",
                attempted: 2
            })
        );
    }

    #[test]
    fn test_no_constructor() {
        let factory: Factory<u8> = Factory::new();
        assert_eq!(
            factory.build(&DependencyPool::empty()),
            Err(InjectError::NoConstructor { target: "u8" })
        );
    }

    #[derive(Default)]
    struct Fielded {
        clock: Option<Dep<dyn Clock>>,
        bound: Option<Arc<DispatchContext>>,
    }

    impl Component for Fielded {
        fn inject(&mut self, fields: &FieldInjector<'_>) -> InjectResult<()> {
            self.clock = Some(fields.resolve()?);
            Ok(())
        }

        fn bind_context(&mut self, ctx: Arc<DispatchContext>) {
            self.bound = Some(ctx);
        }
    }

    #[test]
    fn test_instantiate_injects_fields_then_binds() {
        let factory = Factory::new().constructor(Fielded::default);
        let message = Arc::new(InboundMessage::new(1, ConversationScope::Guild, "hi"));
        let ctx = Arc::new(DispatchContext::new(message, None, pool_with_clock()));

        let instance = factory.instantiate(&ctx).unwrap();
        assert_eq!(instance.clock.unwrap().now(), 42);
        assert_eq!(instance.bound.unwrap().content(), "hi");

        let bare = Arc::new(DispatchContext::new(
            Arc::new(InboundMessage::new(1, ConversationScope::Guild, "hi")),
            None,
            DependencyPool::empty(),
        ));
        assert!(matches!(
            factory.instantiate(&bare),
            Err(InjectError::DependencyMissing { .. })
        ));
    }
}
