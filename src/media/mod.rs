//! Media typing and response framing.
//!
//! # Data Flow
//! ```text
//! Declared Content-Type + retained head bytes
//!     → sniff.rs (normalize, magic-byte fallback, SVG flag)
//!     → disposition.rs (inline/attachment, filename, final headers)
//!     → HeaderPlan
//! ```

pub mod disposition;
pub mod sniff;

pub use disposition::{Disposition, HeaderPlan};
pub use sniff::{resolve_content_type, ResolvedType, SniffDecision};
