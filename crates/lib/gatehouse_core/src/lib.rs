//! # gatehouse_core
//!
//! Bearer token verification, token/user resolution and scope authorization
//! for API backends that delegate authentication to a central authority.

pub mod auth;
pub mod authority;
pub mod config;
pub mod gate;
pub mod keys;
pub mod migrate;
pub mod models;
pub mod oauth;
pub mod resolver;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
