// Sysguard - Resilient systemd unit controller
// Library root

pub mod config;
pub mod error;
pub mod systemd;

pub use config::Config;
pub use error::{Result, SysguardError};
pub use systemd::{Notifiers, Systemd};

// Test modules (only compiled during tests)
#[cfg(test)]
mod config_tests;
