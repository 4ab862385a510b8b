//! Request middlewares.

pub mod token;
pub mod user;
