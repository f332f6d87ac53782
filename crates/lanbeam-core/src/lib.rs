//! lanbeam core: error taxonomy, daemon configuration, device identity.

pub mod config;
pub mod error;

pub use config::{DaemonConfig, ScanMode};
pub use error::{Error, Result};
