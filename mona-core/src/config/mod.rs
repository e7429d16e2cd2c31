//! Runtime configuration types for the milestone pipeline.
//!
//! These are the validated values the processors run with. Loading and
//! parsing (TOML, CLI, environment) is handled by the server crate.

mod ledger;
mod subscribers;

pub use ledger::{PollScheduleConfig, WatcherConfig};
pub use subscribers::RegistryConfig;
