// cvd-cli: clap commands, display, and the in-process daemon root object.
// Depends on cvd-core, cvd-lock, cvd-db, cvd-analyzer, cvd-acloud.

pub mod commands;
pub mod daemon;
pub mod display;
pub mod ui;

pub use commands::run;
pub use daemon::CvdDaemon;
