//! Authentication
//!
//! Cookie sessions resolved against the metadata store, and the admin guard
//! for the attachment API.

mod error;
mod middleware;
mod session;

pub use error::{AuthError, AuthResult, ErrorResponse};
pub use middleware::{require_admin, AdminUser};
pub use session::{find_viewer, resolve_viewer};
