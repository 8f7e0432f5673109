use std::path::{Path, PathBuf};

use crate::error::{KiwibesError, Result};

/// Name of the on-disk jobs catalog, relative to the home folder.
pub const CATALOG_FILE: &str = "kiwibes.json";
/// Name of the authentication tokens file, relative to the home folder.
pub const AUTH_FILE: &str = "kiwibes.auth";
/// Name of the TLS certificate file, relative to the home folder.
pub const CERT_FILE: &str = "kiwibes.cert";
/// Name of the TLS private key file, relative to the home folder.
pub const KEY_FILE: &str = "kiwibes.key";
/// Name of the rolling log file, relative to the home folder.
pub const LOG_FILE: &str = "kiwibes.log";

/// Working parameters of the server, as set on the command line.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Home folder holding the catalog, token file, TLS material and log.
    pub home: PathBuf,
    /// Log verbosity: 0 errors only, 1 warnings, 2 informational.
    pub log_level: u8,
    /// Maximum size of the log, in MB.
    pub log_max_size: u64,
    /// HTTPS listening port.
    pub https_port: u16,
    /// Data store budget, in MB.
    pub data_store_size: u64,
}

impl ServerConfig {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            log_level: 0,
            log_max_size: 1,
            https_port: 4242,
            data_store_size: 10,
        }
    }

    /// Check the option ranges and the home folder.
    pub fn validate(&self) -> Result<()> {
        if self.log_level > 2 {
            return Err(KiwibesError::CmdlineInvLogLevel);
        }
        if self.log_max_size > 100 {
            return Err(KiwibesError::CmdlineInvLogMaxSize);
        }
        if self.data_store_size > 100 {
            return Err(KiwibesError::CmdlineInvDataStoreMaxSize);
        }
        if !self.home.is_dir() {
            return Err(KiwibesError::CmdlineInvHome);
        }
        Ok(())
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.home.join(CATALOG_FILE)
    }

    pub fn auth_path(&self) -> PathBuf {
        self.home.join(AUTH_FILE)
    }

    pub fn cert_path(&self) -> PathBuf {
        self.home.join(CERT_FILE)
    }

    pub fn key_path(&self) -> PathBuf {
        self.home.join(KEY_FILE)
    }

    pub fn log_dir(&self) -> &Path {
        &self.home
    }

    /// Data store budget in bytes.
    pub fn data_store_bytes(&self) -> usize {
        self.data_store_size as usize * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::new("/tmp");
        assert_eq!(config.log_level, 0);
        assert_eq!(config.log_max_size, 1);
        assert_eq!(config.https_port, 4242);
        assert_eq!(config.data_store_size, 10);
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = ServerConfig::new("/tmp");
        assert!(config.validate().is_ok());

        config.log_level = 3;
        assert_eq!(config.validate(), Err(KiwibesError::CmdlineInvLogLevel));
        config.log_level = 2;

        config.log_max_size = 101;
        assert_eq!(config.validate(), Err(KiwibesError::CmdlineInvLogMaxSize));
        config.log_max_size = 100;

        config.data_store_size = 101;
        assert_eq!(
            config.validate(),
            Err(KiwibesError::CmdlineInvDataStoreMaxSize)
        );
    }

    #[test]
    fn test_validate_missing_home() {
        let config = ServerConfig::new("/nowhere/does/not/exist");
        assert_eq!(config.validate(), Err(KiwibesError::CmdlineInvHome));
    }

    #[test]
    fn test_artifact_paths() {
        let config = ServerConfig::new("/var/lib/kiwibes");
        assert_eq!(
            config.catalog_path(),
            PathBuf::from("/var/lib/kiwibes/kiwibes.json")
        );
        assert_eq!(
            config.auth_path(),
            PathBuf::from("/var/lib/kiwibes/kiwibes.auth")
        );
        assert_eq!(
            config.cert_path(),
            PathBuf::from("/var/lib/kiwibes/kiwibes.cert")
        );
        assert_eq!(
            config.key_path(),
            PathBuf::from("/var/lib/kiwibes/kiwibes.key")
        );
    }
}
