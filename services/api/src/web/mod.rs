pub mod auth;
pub mod functions;
pub mod messages;
pub mod middleware;
pub mod profile;
pub mod rest;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

pub use middleware::require_auth;
pub use rest::ApiDoc;
