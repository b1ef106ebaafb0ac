pub mod error;
pub mod settings;

pub use error::*;
pub use settings::{ProviderSettings, RunSettings};

use std::path::PathBuf;

/// Environment variable naming the deployment file directly
pub const FILE_ENV: &str = "INFRAFLOW_FILE";

const ROOT_FILE: &str = "infra.kdl";

/// `~/.config/infraflow`, created if missing
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("infraflow");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// Locate the deployment file for the current directory.
///
/// Search order:
/// 1. `INFRAFLOW_FILE`
/// 2. `./infra.kdl`
/// 3. `./.infraflow/infra.kdl`
///
/// `infra.local.kdl` is never returned; it is an overlay the loader applies
/// on top of whichever file is found.
pub fn find_deployment_file() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(FILE_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!(path = %path.display(), "{} points at a missing file", FILE_ENV);
    }

    let current_dir = std::env::current_dir()?;
    let path = current_dir.join(ROOT_FILE);
    if path.exists() {
        return Ok(path);
    }

    let nested = current_dir.join(".infraflow").join(ROOT_FILE);
    if nested.exists() {
        return Ok(nested);
    }

    Err(ConfigError::DeploymentFileNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    /// Run `f` with the current directory set to `dir`
    fn in_dir<T>(dir: &std::path::Path, f: impl FnOnce() -> T) -> T {
        let original = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir).unwrap();
        let result = f();
        std::env::set_current_dir(original).unwrap();
        result
    }

    #[test]
    fn test_get_config_dir() {
        let config_dir = get_config_dir().unwrap();
        assert!(config_dir.ends_with("infraflow"));
        assert!(config_dir.exists());
    }

    #[test]
    #[serial]
    fn test_find_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("infra.kdl"), "// test").unwrap();

        let found = temp_env::with_var_unset(FILE_ENV, || in_dir(temp_dir.path(), find_deployment_file));
        assert!(found.unwrap().ends_with("infra.kdl"));
    }

    #[test]
    #[serial]
    fn test_local_overlay_alone_is_not_a_deployment() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("infra.local.kdl"), "// local").unwrap();

        let found = temp_env::with_var_unset(FILE_ENV, || in_dir(temp_dir.path(), find_deployment_file));
        assert!(matches!(found, Err(ConfigError::DeploymentFileNotFound)));
    }

    #[test]
    #[serial]
    fn test_root_file_wins_over_nested() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("infra.kdl"), "// root").unwrap();
        fs::create_dir(temp_dir.path().join(".infraflow")).unwrap();
        fs::write(temp_dir.path().join(".infraflow/infra.kdl"), "// nested").unwrap();

        let found = temp_env::with_var_unset(FILE_ENV, || in_dir(temp_dir.path(), find_deployment_file));
        assert!(!found.unwrap().to_string_lossy().contains(".infraflow"));
    }

    #[test]
    #[serial]
    fn test_find_in_infraflow_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let nested = temp_dir.path().join(".infraflow");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("infra.kdl"), "// nested").unwrap();

        let found = temp_env::with_var_unset(FILE_ENV, || in_dir(temp_dir.path(), find_deployment_file));
        assert!(found.unwrap().ends_with(".infraflow/infra.kdl"));
    }

    #[test]
    #[serial]
    fn test_env_var_takes_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        let custom = temp_dir.path().join("custom.kdl");
        fs::write(&custom, "// custom").unwrap();
        fs::write(temp_dir.path().join("infra.kdl"), "// default").unwrap();

        let found = temp_env::with_var(FILE_ENV, Some(custom.as_os_str()), || {
            in_dir(temp_dir.path(), find_deployment_file)
        });
        assert_eq!(found.unwrap(), custom);
    }

    #[test]
    #[serial]
    fn test_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = temp_env::with_var_unset(FILE_ENV, || in_dir(temp_dir.path(), find_deployment_file));
        assert!(matches!(result, Err(ConfigError::DeploymentFileNotFound)));
    }
}
