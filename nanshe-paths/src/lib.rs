//! Where nanshe keeps its files.
//!
//! XDG locations are used on every platform: configuration under
//! `$XDG_CONFIG_HOME/nanshe`, the course database under
//! `$XDG_DATA_HOME/nanshe`.
//!
//! ```
//! let user_config = nanshe_paths::config_dir().join("config.toml");
//! assert!(user_config.ends_with("nanshe/config.toml"));
//! ```

use std::path::PathBuf;

const APP_DIR: &str = "nanshe";

/// Resolve `$<var>/nanshe`, falling back to `~/<home_relative>/nanshe`.
fn xdg_dir(var: &str, home_relative: &str) -> PathBuf {
    match std::env::var_os(var).filter(|v| !v.is_empty()) {
        Some(base) => PathBuf::from(base).join(APP_DIR),
        None => dirs::home_dir()
            .unwrap_or_default()
            .join(home_relative)
            .join(APP_DIR),
    }
}

/// `$XDG_CONFIG_HOME/nanshe`, or `~/.config/nanshe`.
pub fn config_dir() -> PathBuf {
    xdg_dir("XDG_CONFIG_HOME", ".config")
}

/// `$XDG_DATA_HOME/nanshe`, or `~/.local/share/nanshe`.
pub fn data_dir() -> PathBuf {
    xdg_dir("XDG_DATA_HOME", ".local/share")
}

/// RocksDB directory of the engine store.
pub fn default_db_path() -> PathBuf {
    data_dir().join("engine")
}

#[cfg(test)]
mod tests {
    use super::*;

    // one test, so the env mutations cannot race
    #[test]
    fn test_xdg_variables() {
        unsafe {
            std::env::set_var("XDG_CONFIG_HOME", "/tmp/nanshe-cfg");
            std::env::set_var("XDG_DATA_HOME", "/tmp/nanshe-data");
        }
        let config = config_dir();
        let db = default_db_path();
        unsafe {
            std::env::set_var("XDG_DATA_HOME", "");
        }
        let empty_var = data_dir();
        unsafe {
            std::env::remove_var("XDG_CONFIG_HOME");
            std::env::remove_var("XDG_DATA_HOME");
        }

        assert_eq!(config, PathBuf::from("/tmp/nanshe-cfg/nanshe"));
        assert_eq!(db, PathBuf::from("/tmp/nanshe-data/nanshe/engine"));
        assert!(empty_var.ends_with(".local/share/nanshe"));
    }
}
