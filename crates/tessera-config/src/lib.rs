//! User and project settings for Tessera

pub mod error;
pub mod settings;

pub use error::*;
pub use settings::{
    ENV_LOCK_TIMEOUT, ENV_PARALLELISM, ENV_REFRESH, RetrySettings, SETTINGS_FILE, Settings,
    global_settings_path, load_settings, load_settings_from, project_settings_path,
};

use std::path::PathBuf;

/// Overrides the user configuration directory
pub const CONFIG_DIR_ENV: &str = "TESSERA_CONFIG_DIR";

/// Tessera's user configuration directory
///
/// `TESSERA_CONFIG_DIR` if set, otherwise `~/.config/tessera` (or the
/// platform equivalent). The directory is not created.
pub fn get_config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Ok(PathBuf::from(dir));
    }
    Ok(dirs::config_dir()
        .ok_or(SettingsError::ConfigDirNotFound)?
        .join("tessera"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_get_config_dir_env_override() {
        temp_env::with_var(CONFIG_DIR_ENV, Some("/opt/tessera-conf"), || {
            assert_eq!(get_config_dir().unwrap(), PathBuf::from("/opt/tessera-conf"));
            assert_eq!(
                global_settings_path().unwrap(),
                PathBuf::from("/opt/tessera-conf/settings.yaml")
            );
        });
    }

    #[test]
    #[serial]
    fn test_get_config_dir_default() {
        temp_env::with_var_unset(CONFIG_DIR_ENV, || {
            if let Ok(dir) = get_config_dir() {
                assert!(dir.ends_with("tessera"));
            }
        });
    }
}
