//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → middleware/auth.rs (bearer token, when configured)
//!     → request.rs (query parsing)
//!     → record lookup + fetch::Retriever
//!     → response.rs (streaming body or JSON error)
//!     → Send to client
//! ```

pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use request::{MakeRequestUuid, MediaQuery, X_REQUEST_ID};
pub use server::{AppState, HttpServer, ServerError};
