//! Permission system types and utilities.
//!
//! A private file carries a [`PermissionSet`]; [`evaluate`] turns it and the
//! request facts into a [`Decision`].

pub mod models;
pub mod resolver;

pub use models::*;
pub use resolver::{evaluate, AccessContext};
