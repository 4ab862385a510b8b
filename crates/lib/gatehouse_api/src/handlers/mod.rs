//! Request handlers.

pub mod authorize;
pub mod users;
