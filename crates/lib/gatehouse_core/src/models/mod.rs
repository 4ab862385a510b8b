//! Domain models shared by the verifier, resolvers and authorizer.

pub mod auth;
pub mod resource;

/// Whether `id` is a 24-character hex object id as issued by the authority.
pub fn is_object_id(id: &str) -> bool {
    id.len() == 24 && id.bytes().all(|b| b.is_ascii_hexdigit())
}
