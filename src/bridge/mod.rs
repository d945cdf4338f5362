//! Hand-off protocol between the host and the interpreter.
//!
//! Nothing here unwinds across the boundary. Interpreter code reports failure
//! as a [`Thrown`](error::Thrown), host code as a [`BridgeError`](error::BridgeError),
//! and the [`DomainTracker`](domain::DomainTracker) decides which of the two a
//! caught failure must become before it travels further.

pub mod domain;
pub mod error;
pub mod protected;
pub mod rethrow;


pub use domain::{Domain, DomainGuard, DomainTracker};
pub use error::{BridgeError, ErrorKind, Status, Thrown, Unwind};
pub use protected::{host_try, protected_call};
pub use rethrow::{rethrow_from_host, rethrow_from_interpreter};
