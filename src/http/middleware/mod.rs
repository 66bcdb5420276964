//! Request middleware.

pub mod auth;

pub use auth::bearer_auth_middleware;
