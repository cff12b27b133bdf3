//! Command implementations behind the CLI.
//!
//! Each command returns the process exit code it wants; `Err` is reserved for
//! fatal setup failures, which `main` reports with exit code 2.
mod init;
mod route;
mod run;
mod status;
mod validate;

pub use init::run_init;
pub use route::run_route;
pub use run::run_run;
pub use status::run_status;
pub use validate::run_validate;

/// Every recorded asset succeeded (or the command had nothing to fail).
pub const EXIT_OK: u8 = 0;
/// At least one asset failed, or a checked directory is incomplete.
pub const EXIT_FAILED: u8 = 1;
/// The command could not run at all.
pub const EXIT_FATAL: u8 = 2;
