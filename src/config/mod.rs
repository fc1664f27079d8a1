use std::path::{Path, PathBuf};

/// Environment override for the configuration directory, used by tests and
/// sandboxed environments where the platform directories are unavailable.
pub const CONFIG_DIR_ENV: &str = "MMONEY_CLI_CONFIG_DIR";

const SESSION_FILE_NAME: &str = "session.json";

/// Namespace for resolving the configuration directory and its files.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    base_dir: PathBuf,
}

impl ConfigPaths {
    /// Create configuration paths using the user's platform conventions.
    pub fn with_project_dirs() -> Result<Self, ConfigError> {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
            return Ok(Self::from_base_dir(PathBuf::from(dir)));
        }
        let project_dirs = directories::ProjectDirs::from("com", "monarchmoney", "mmoney")
            .ok_or(ConfigError::UnsupportedPlatform)?;
        Ok(Self {
            base_dir: project_dirs.config_dir().to_path_buf(),
        })
    }

    /// Construct from a custom base directory (primarily for testing).
    pub fn from_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Location of the persisted session artifact.
    pub fn session_file(&self) -> PathBuf {
        self.base_dir.join(SESSION_FILE_NAME)
    }

    /// Ensure the configuration root exists on disk.
    pub fn ensure_exists(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.base_dir).map_err(|source| ConfigError::Io {
            path: self.base_dir.clone(),
            source,
        })
    }

    /// Retrieve the base directory path.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to determine configuration directory for this platform")]
    UnsupportedPlatform,
    #[error("I/O error interacting with {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn config_paths_resolve_expected_files() {
        let tmp = tempfile::tempdir().expect("temporary dir");
        let paths = ConfigPaths::from_base_dir(tmp.path());

        assert_eq!(paths.session_file(), tmp.path().join("session.json"));
        assert_eq!(paths.base_dir(), tmp.path());
    }

    #[test]
    fn ensure_exists_creates_directory_tree() {
        let tmp = tempfile::tempdir().expect("temporary dir");
        let base = tmp.path().join("nested").join("mmoney");
        let paths = ConfigPaths::from_base_dir(&base);

        paths.ensure_exists().expect("create dirs");
        assert!(fs::metadata(&base).expect("metadata").is_dir());
    }
}
