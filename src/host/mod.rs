//! In-process model of the host database the handler is embedded in.
//!
//! The host owns everything the interpreter side must never touch directly:
//! procedure definitions, resource regions, the active-error stack, and the
//! client notice channel. Every failing host operation records its detail in
//! [`ErrorState`] before returning, the way a non-local exit leaves the
//! error data behind for whoever catches it.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

pub mod catalog;
pub mod error_state;
pub mod marshal;
pub mod notice;
pub mod region;


pub use catalog::{Catalog, CatalogError, MemoryCatalog, ProcDefinition};
pub use error_state::{ErrorData, ErrorState, Severity, sqlstate};
pub use marshal::{Datum, DefaultMarshal, Marshal, MarshalError};
pub use notice::{Notice, NoticeLevel};
pub use region::{CallbackId, RegionError, RegionId, RegionTree, ScopeCallback, SiteId};

use crate::bridge::error::BridgeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcId(pub u32);

impl fmt::Display for ProcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub u32);

/// Security identity an interpreter instance is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Principal {
    Trusted(UserId),
    Untrusted,
}

impl Principal {
    pub fn is_trusted(self) -> bool {
        matches!(self, Principal::Trusted(_))
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::Trusted(user) => write!(f, "trusted(user {})", user.0),
            Principal::Untrusted => write!(f, "untrusted"),
        }
    }
}

/// Physical location of a stored definition row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StorageLocation {
    pub block: u32,
    pub offset: u16,
}

/// Identifies one persisted revision of a definition. Compared by equality only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VersionStamp {
    pub xmin: u64,
    pub tid: StorageLocation,
}

impl fmt::Display for VersionStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@({},{})", self.xmin, self.tid.block, self.tid.offset)
    }
}

pub trait SecurityCheck {
    fn check_validator_access(&self, caller: ProcId, target: ProcId) -> bool;
}

#[derive(Debug, Default)]
pub struct AllowAll;

impl SecurityCheck for AllowAll {
    fn check_validator_access(&self, _caller: ProcId, _target: ProcId) -> bool {
        true
    }
}

/// Cleanup actions the host runs when the process exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitHook {
    CloseInterpreters,
}

pub struct Host {
    catalog: Rc<dyn Catalog>,
    security: Box<dyn SecurityCheck>,
    marshal: Box<dyn Marshal>,
    regions: RefCell<RegionTree>,
    errors: ErrorState,
    notices: RefCell<Vec<Notice>>,
    current_user: Cell<UserId>,
    interrupt_pending: Cell<bool>,
    exit_hooks: RefCell<Vec<ExitHook>>,
}

impl Host {
    pub fn new(catalog: Rc<dyn Catalog>) -> Self {
        Self {
            catalog,
            security: Box::new(AllowAll),
            marshal: Box::new(DefaultMarshal),
            regions: RefCell::new(RegionTree::new()),
            errors: ErrorState::new(),
            notices: RefCell::new(Vec::new()),
            current_user: Cell::new(UserId(10)),
            interrupt_pending: Cell::new(false),
            exit_hooks: RefCell::new(Vec::new()),
        }
    }

    pub fn with_security(mut self, security: impl SecurityCheck + 'static) -> Self {
        self.security = Box::new(security);
        self
    }

    pub fn with_marshal(mut self, marshal: impl Marshal + 'static) -> Self {
        self.marshal = Box::new(marshal);
        self
    }

    /// Records `data` as the active error and returns the matching unwind token.
    pub fn raise(&self, data: ErrorData) -> BridgeError {
        self.raise_with(data, BridgeError::Host)
    }

    pub fn raise_with(
        &self,
        data: ErrorData,
        wrap: fn(Box<ErrorData>) -> BridgeError,
    ) -> BridgeError {
        self.errors.raise(data.clone());
        wrap(Box::new(data))
    }

    pub fn errors(&self) -> &ErrorState {
        &self.errors
    }

    pub fn regions(&self) -> Ref<'_, RegionTree> {
        self.regions.borrow()
    }

    pub fn regions_mut(&self) -> RefMut<'_, RegionTree> {
        self.regions.borrow_mut()
    }

    /// Runs a region operation, raising its failure as a host error.
    pub fn with_regions<T>(
        &self,
        op: impl FnOnce(&mut RegionTree) -> Result<T, RegionError>,
    ) -> Result<T, BridgeError> {
        let result = op(&mut self.regions.borrow_mut());
        result.map_err(|err| self.raise(ErrorData::new(sqlstate::INTERNAL_ERROR, err.to_string())))
    }

    pub fn get_definition(&self, id: ProcId) -> Result<ProcDefinition, BridgeError> {
        self.catalog.get_definition(id).map_err(|err| {
            self.raise(ErrorData::new(sqlstate::UNDEFINED_FUNCTION, err.to_string()))
        })
    }

    pub fn check_validator_access(&self, caller: ProcId, target: ProcId) -> bool {
        self.security.check_validator_access(caller, target)
    }

    pub fn marshal(&self) -> &dyn Marshal {
        self.marshal.as_ref()
    }

    pub fn notice(&self, level: NoticeLevel, message: impl Into<String>) {
        self.notices.borrow_mut().push(Notice {
            level,
            message: message.into(),
        });
    }

    pub fn take_notices(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.borrow_mut())
    }

    pub fn current_user(&self) -> UserId {
        self.current_user.get()
    }

    pub fn set_current_user(&self, user: UserId) {
        self.current_user.set(user);
    }

    /// Asks the running statement to cancel at the next interrupt check.
    pub fn request_cancel(&self) {
        self.interrupt_pending.set(true);
    }

    pub fn check_for_interrupts(&self) -> Result<(), BridgeError> {
        if self.interrupt_pending.replace(false) {
            return Err(self.raise(ErrorData::new(
                sqlstate::QUERY_CANCELED,
                "canceling statement due to user request",
            )));
        }
        Ok(())
    }

    pub fn register_exit_hook(&self, hook: ExitHook) {
        self.exit_hooks.borrow_mut().push(hook);
    }

    pub fn exit_hooks(&self) -> Vec<ExitHook> {
        self.exit_hooks.borrow().clone()
    }

    pub(crate) fn take_exit_hooks(&self) -> Vec<ExitHook> {
        std::mem::take(&mut *self.exit_hooks.borrow_mut())
    }
}
