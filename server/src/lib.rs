//! Private Media Server
//!
//! Keeps selected uploads out of the public uploads root and serves them
//! through an endpoint that checks the requester against each file's
//! permission set.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod hooks;
pub mod media;
pub mod permissions;
