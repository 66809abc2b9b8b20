//! Monitoring session management
//!
//! Two actor-owned registries:
//! - `SessionRegistry`: one monitoring session (voice connection) per group
//! - `StreamRegistry`: at most one live evaluation stream per (group, participant)
//!
//! Stopping a session cascades to every stream of its group.

mod registry;
mod stats;
mod streams;

pub use registry::SessionRegistry;
pub use stats::SessionStats;
pub use streams::{OpenOutcome, StreamRegistry};
