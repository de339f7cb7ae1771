//! Filesystem locations and log file handling.

pub mod error;
pub mod logging;
pub mod paths;

pub use error::PlatformError;
pub use logging::{log_level_to_filter, open_log_file};
pub use paths::{DefaultPaths, PlatformPaths, APP_NAME};
