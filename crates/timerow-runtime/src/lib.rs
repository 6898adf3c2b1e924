//! Runtime layer: intake scanning, version control and the publish run.

pub mod intake;
pub mod orchestrator;
pub mod vcs;
pub mod watch;

pub use timerow_core as core;
pub use timerow_data as data;
