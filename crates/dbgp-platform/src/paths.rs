use std::path::PathBuf;

use crate::error::PlatformError;

/// Application directory name.
pub const APP_NAME: &str = "dbgpd";

/// Trait providing standard directory paths for the daemon.
pub trait PlatformPaths: Send + Sync {
    /// Returns the configuration directory (`~/.config/dbgpd`).
    fn config_dir(&self) -> PathBuf;
    /// Returns the data directory (`~/.local/share/dbgpd`).
    fn data_dir(&self) -> PathBuf;
    /// Returns the log directory (`<data_dir>/logs`).
    fn log_dir(&self) -> PathBuf;
    /// Returns the user's home directory.
    fn home_dir(&self) -> PathBuf;

    /// Returns the default log file (`<log_dir>/dbgpd.log`).
    fn log_file(&self) -> PathBuf {
        self.log_dir().join(format!("{APP_NAME}.log"))
    }
}

/// Default implementation of [`PlatformPaths`] rooted at the home
/// directory.
pub struct DefaultPaths {
    home: PathBuf,
}

impl DefaultPaths {
    /// Creates a new `DefaultPaths` instance, resolving the home directory.
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Path` if the home directory cannot be
    /// determined.
    pub fn new() -> Result<Self, PlatformError> {
        let home = dirs::home_dir()
            .or_else(|| std::env::var("HOME").ok().map(PathBuf::from))
            .ok_or_else(|| PlatformError::Path("could not determine home directory".into()))?;
        Ok(Self { home })
    }

    /// Paths rooted at an explicit home directory.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }
}

impl PlatformPaths for DefaultPaths {
    fn config_dir(&self) -> PathBuf {
        self.home.join(".config").join(APP_NAME)
    }

    fn data_dir(&self) -> PathBuf {
        self.home.join(".local").join("share").join(APP_NAME)
    }

    fn log_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }

    fn home_dir(&self) -> PathBuf {
        self.home.clone()
    }
}
