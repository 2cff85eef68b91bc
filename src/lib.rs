// cvdctl: facade crate re-exporting every cvd workspace library.

pub mod logging;

pub use cvd_acloud as acloud;
pub use cvd_analyzer as analyzer;
pub use cvd_cli as cli;
pub use cvd_core as core;
pub use cvd_db as db;
pub use cvd_lock as lock;
