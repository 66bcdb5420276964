//! Outbound target safety.
//!
//! # Data Flow
//! ```text
//! Candidate URL
//!     → url_guard.rs (protocol, credentials, local hostnames)
//!     → resolver.rs (resolve hostname to every address)
//!     → address.rs (classify each address)
//!     → allow_list.rs (exempt trusted hosts)
//!     → ValidatedTarget (URL + pinned addresses)
//! ```
//!
//! # Design Decisions
//! - Fail closed: malformed addresses and partial private answers reject
//! - The fetcher connects only to addresses produced here
//! - The allow-list is compiled once and shared read-only

pub mod address;
pub mod allow_list;
pub mod resolver;
pub mod url_guard;

pub use allow_list::AllowListPolicy;
pub use resolver::{HostResolver, StaticResolver, SystemResolver};
pub use url_guard::{UrlGuard, ValidatedTarget};
