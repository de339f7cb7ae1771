use crate::config::Config;
use crate::error::ConfigError;

/// Overlay a TOML fragment on top of `base`.
///
/// Keys present in the overlay win; tables merge key by key, arrays
/// (such as `[[breakpoint]]`) are replaced whole.
pub fn merge_configs(base: &Config, overlay_toml: &str) -> Result<Config, ConfigError> {
    let mut merged = toml::Value::try_from(base).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let overlay: toml::Value =
        toml::from_str(overlay_toml).map_err(|e| ConfigError::Parse(e.to_string()))?;

    merge_values(&mut merged, overlay);

    merged
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Parse(e.to_string()))
}

fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, val) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) => merge_values(existing, val),
                    None => {
                        base_table.insert(key, val);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
