//! Storage-side collaborators of the pattern detector.
//!
//! The detector only talks to these traits:
//! - [`CommitSource`] reads commits and file changes written by git ingestion
//! - [`SessionResolver`] maps the active user session to a project
//! - [`PatternStore`] persists discovery sessions and pattern collections
//! - [`EventLog`] receives fire-and-forget lifecycle telemetry
//!
//! [`MemoryStore`] implements all four and backs the tests and the
//! fixture-driven worker binary.

pub mod error;
pub mod fixture;
pub mod memory;
pub mod traits;

pub use error::StoreError;
pub use fixture::Fixture;
pub use memory::MemoryStore;
pub use traits::{CommitSource, EventLog, LifecycleEvent, PatternStore, SessionResolver};
