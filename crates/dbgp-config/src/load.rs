use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::ConfigError;
use crate::merge::merge_configs;
use crate::validate::validate;

/// Directory holding a project-local config file.
pub const PROJECT_DIR_NAME: &str = ".dbgpd";

/// Content written into a newly-created default config file.
const DEFAULT_CONFIG_CONTENT: &str = r#"# dbgpd configuration
# Uncomment and edit settings below to override defaults.

# debug = false

# [server]
# port = 9000
# bind_address = "127.0.0.1"
# max_sessions = 8

# [session]
# idekey = "xdebug"
# language = "PHP"
# file_uris = false

# [log]
# level = "info"

# [[breakpoint]]
# file = "/var/www/index.php"
# line = 1
"#;

/// Load and merge configuration.
///
/// 1. Reads the global config from `config_dir/config.toml`, creating it
///    with commented-out defaults when missing.
/// 2. Looks for `.dbgpd/config.toml` in `project_dir` and its ancestors.
/// 3. Merges `Config::default() <- global <- project` and validates.
///
/// # Errors
///
/// Returns [`ConfigError`] on I/O failure, parse failure, or
/// validation failure.
pub fn load_config(config_dir: &Path, project_dir: Option<&Path>) -> Result<Config, ConfigError> {
    let global_path = config_dir.join("config.toml");

    if !global_path.exists() {
        std::fs::create_dir_all(config_dir)?;
        std::fs::write(&global_path, DEFAULT_CONFIG_CONTENT)
            .map_err(|e| ConfigError::CreateDefault(e.to_string()))?;
        tracing::info!("created default config at {}", global_path.display());
    }

    let mut config = Config::default();

    let global = std::fs::read_to_string(&global_path)?;
    if has_non_comment_content(&global) {
        config = merge_configs(&config, &global)?;
    }

    if let Some(project_path) = project_dir.and_then(find_project_config) {
        tracing::debug!("merging project config {}", project_path.display());
        let project = std::fs::read_to_string(&project_path)?;
        config = merge_configs(&config, &project)?;
    }

    check(&config)?;
    Ok(config)
}

/// Load one explicitly named config file over the defaults.
///
/// # Errors
///
/// [`ConfigError::NotFound`] when `path` does not exist, otherwise as
/// [`load_config`].
pub fn load_file(path: &Path) -> Result<Config, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    let config = merge_configs(&Config::default(), &content)?;
    check(&config)?;
    Ok(config)
}

/// Parse a TOML string directly into a validated [`Config`].
///
/// # Errors
///
/// Returns [`ConfigError`] on parse or validation failure.
pub fn load_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    check(&config)?;
    Ok(config)
}

/// Walk from `start` upward looking for `.dbgpd/config.toml`.
fn find_project_config(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(PROJECT_DIR_NAME).join("config.toml"))
        .find(|candidate| candidate.is_file())
}

fn has_non_comment_content(content: &str) -> bool {
    content.lines().any(|l| {
        let trimmed = l.trim();
        !trimmed.is_empty() && !trimmed.starts_with('#')
    })
}

/// Surface the first validation error.
fn check(config: &Config) -> Result<(), ConfigError> {
    validate(config).map_err(|errors| {
        errors
            .into_iter()
            .next()
            .unwrap_or_else(|| ConfigError::Validation {
                field: "unknown".to_string(),
                message: "validation failed".to_string(),
            })
    })
}
