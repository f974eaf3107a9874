//! The handler registry.
//!
//! # Concurrency
//!
//! The registry may be mutated while dispatches are in flight. Handlers are
//! kept in a `RwLock<Arc<Vec<_>>>`: every dispatch takes a cheap `Arc`
//! snapshot up front and iterates that, while `add`/`remove` copy the list
//! on write. A dispatch therefore sees the registry exactly as it was when
//! the dispatch began.
//!
//! # Static registration
//!
//! Handlers can also be collected at link time into [`HANDLER_TABLE`] and
//! pulled in per module with [`ModuleScan`]:
//!
//! ```rust,ignore
//! use herald_framework::linkme::distributed_slice;
//! use herald_framework::registry::{HANDLER_TABLE, StaticHandler};
//!
//! fn ping() -> Registration {
//!     Registration::command_fn("ping", |_ctx, _args| async { HandlerResult::Ok(()) })
//! }
//!
//! #[distributed_slice(HANDLER_TABLE)]
//! #[linkme(crate = herald_framework::linkme)]
//! static PING: StaticHandler = StaticHandler { module: module_path!(), register: ping };
//!
//! registry.add_source(&ModuleScan::new("my_bot::commands"));
//! ```

use std::sync::Arc;

use herald_core::Logger;
use linkme::distributed_slice;
use parking_lot::RwLock;

use crate::definition::{HandlerDefinition, HandlerId, HandlerKind, RunMode};
use crate::error::{FrameworkError, FrameworkResult};
use crate::handler::{HandlerEntry, Registration};
use crate::precondition::{DenyBots, Precondition};

const SOURCE: &str = "Registry";

/// Anything that can enumerate handler registrations.
pub trait HandlerSource {
    fn registrations(&self) -> Vec<Registration>;
}

impl HandlerSource for Vec<fn() -> Registration> {
    fn registrations(&self) -> Vec<Registration> {
        self.iter().map(|register| register()).collect()
    }
}

// ============================================================================
// Static handler table (linkme distributed slice)
// ============================================================================

/// One statically registered handler.
pub struct StaticHandler {
    /// The module the handler was declared in, normally `module_path!()`.
    pub module: &'static str,
    pub register: fn() -> Registration,
}

/// Every handler registered at link time, across all crates.
#[distributed_slice]
pub static HANDLER_TABLE: [StaticHandler];

/// A [`HandlerSource`] over the [`HANDLER_TABLE`] entries below a module path.
#[derive(Debug, Clone, Copy)]
pub struct ModuleScan {
    module: &'static str,
}

impl ModuleScan {
    /// Selects entries declared in `module` or any of its submodules.
    pub fn new(module: &'static str) -> Self {
        Self { module }
    }

    /// Selects every entry in the table.
    pub fn all() -> Self {
        Self { module: "" }
    }

    fn covers(&self, module: &str) -> bool {
        if self.module.is_empty() {
            return true;
        }
        module
            .strip_prefix(self.module)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
    }
}

impl HandlerSource for ModuleScan {
    fn registrations(&self) -> Vec<Registration> {
        HANDLER_TABLE
            .iter()
            .filter(|entry| self.covers(entry.module))
            .map(|entry| (entry.register)())
            .collect()
    }
}

// ============================================================================
// Registry
// ============================================================================

/// An immutable view of the registry at one point in time.
pub type Snapshot = Arc<Vec<Arc<HandlerEntry>>>;

/// The ordered, mutable collection of registered handlers.
pub struct Registry {
    entries: RwLock<Snapshot>,
    default_mode: RunMode,
    deny_bots: Option<Arc<dyn Precondition>>,
    logger: Logger,
}

impl Registry {
    /// Creates an empty registry.
    ///
    /// `default_mode` replaces [`RunMode::Default`] on every registration and
    /// must itself be concrete.
    pub fn new(default_mode: RunMode, logger: Logger) -> FrameworkResult<Self> {
        if default_mode == RunMode::Default {
            return Err(FrameworkError::DefaultRunMode);
        }
        Ok(Self {
            entries: RwLock::new(Arc::new(Vec::new())),
            default_mode,
            deny_bots: None,
            logger,
        })
    }

    /// Rejects bot authors on every command added from now on (builder pattern).
    pub fn deny_bots(mut self, deny: bool) -> Self {
        self.deny_bots = deny.then(|| Arc::new(DenyBots) as Arc<dyn Precondition>);
        self
    }

    pub fn default_mode(&self) -> RunMode {
        self.default_mode
    }

    /// Adds one handler and returns its id.
    pub fn add(&self, registration: Registration) -> HandlerId {
        let kind = registration.kind();
        self.logger.verbose(
            SOURCE,
            format!("Adding {kind} {}", registration.name()),
        );

        let registration = match (&self.deny_bots, kind) {
            (Some(deny), HandlerKind::Command) => registration.precondition_arc(Arc::clone(deny)),
            _ => registration,
        };
        let entry = Arc::new(registration.into_entry(self.default_mode));
        let id = entry.definition().id();
        let name = entry.definition().name().to_owned();

        Arc::make_mut(&mut *self.entries.write()).push(entry);
        self.logger.debug(SOURCE, format!("Added {kind} {name} ({id})"));
        id
    }

    /// Adds several handlers, in order.
    pub fn add_all(&self, registrations: impl IntoIterator<Item = Registration>) -> Vec<HandlerId> {
        registrations.into_iter().map(|r| self.add(r)).collect()
    }

    /// Adds every handler a source enumerates.
    pub fn add_source(&self, source: &dyn HandlerSource) -> Vec<HandlerId> {
        self.add_all(source.registrations())
    }

    /// Removes one handler. Returns `false` if it was not registered.
    pub fn remove(&self, id: HandlerId) -> bool {
        self.logger.verbose(SOURCE, format!("Removing handler {id}"));

        let removed = {
            let mut guard = self.entries.write();
            match guard.iter().position(|e| e.definition().id() == id) {
                Some(index) => Some(Arc::make_mut(&mut *guard).remove(index)),
                None => None,
            }
        };

        match removed {
            Some(entry) => {
                self.logger.debug(
                    SOURCE,
                    format!("Removed {} {} ({id})", entry.definition().kind(), entry.definition().name()),
                );
                true
            }
            None => {
                self.logger
                    .warn(SOURCE, format!("Failed to remove handler {id}: not registered"));
                false
            }
        }
    }

    /// Removes handlers in order, stopping at the first one that fails.
    ///
    /// Returns `true` only if every handler was removed.
    pub fn remove_all(&self, ids: impl IntoIterator<Item = HandlerId>) -> bool {
        ids.into_iter().all(|id| self.remove(id))
    }

    /// The current handler list.
    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.entries.read())
    }

    /// Registered listeners, in registration order.
    pub fn listeners(&self) -> Vec<Arc<HandlerEntry>> {
        self.of_kind(HandlerKind::Listener)
    }

    /// Commands whose name or alias matches `name`, in registration order.
    pub fn commands_named(&self, name: &str) -> Vec<Arc<HandlerEntry>> {
        self.snapshot()
            .iter()
            .filter(|e| e.definition().kind() == HandlerKind::Command)
            .filter(|e| e.definition().matches_name(name))
            .cloned()
            .collect()
    }

    /// Every definition, in registration order.
    pub fn definitions(&self) -> Vec<HandlerDefinition> {
        self.snapshot()
            .iter()
            .map(|e| e.definition().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn of_kind(&self, kind: HandlerKind) -> Vec<Arc<HandlerEntry>> {
        self.snapshot()
            .iter()
            .filter(|e| e.definition().kind() == kind)
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("handlers", &self.len())
            .field("default_mode", &self.default_mode)
            .field("deny_bots", &self.deny_bots.is_some())
            .finish()
    }
}
