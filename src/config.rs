//! Configuration loading via `ortho-config`.

use std::ffi::OsString;
use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::block::PollSettings;
use crate::block::gce::{DEFAULT_API_BASE, DEFAULT_METADATA_BASE, GceSettings};
use crate::driver::StorageMode;
use crate::fs::{DEFAULT_MKFS_BIN, DEFAULT_MOUNT_BIN, DEFAULT_UMOUNT_BIN, FsPrograms};

/// Storage driver used when none is configured.
pub const DEFAULT_MODE: &str = "fs";
/// Directory under which mount directories are created.
pub const DEFAULT_BASE_MOUNT_DIR: &str = "/mnt";
/// Plugin socket name, resolved under `/run/docker/plugins`.
pub const DEFAULT_SOCKET: &str = "cloudvol";

/// Daemon configuration merged from defaults, `cloudvol.toml`, `CLOUDVOL_*`
/// environment variables and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "CLOUDVOL",
    discovery(
        app_name = "cloudvol",
        env_var = "CLOUDVOL_CONFIG_PATH",
        config_file_name = "cloudvol.toml",
        dotfile_name = ".cloudvol.toml",
        project_file_name = "cloudvol.toml"
    )
)]
pub struct CloudvolConfig {
    /// Storage driver: `fs` for local directories, `gce` for persistent disks.
    #[ortho_config(default = DEFAULT_MODE.to_owned())]
    pub mode: String,
    /// Absolute directory that holds per-volume mount directories.
    #[ortho_config(default = DEFAULT_BASE_MOUNT_DIR.to_owned())]
    pub base_mount_dir: String,
    /// Unix socket name, or an absolute socket path.
    #[ortho_config(default = DEFAULT_SOCKET.to_owned())]
    pub socket: String,
    /// TCP port. When set the plugin listens on TCP instead of the socket.
    pub port: Option<u16>,
    /// Delay between attach/detach operation polls, in milliseconds.
    #[ortho_config(default = 100)]
    pub poll_interval_ms: u64,
    /// Deadline for attach/detach operations, in milliseconds.
    #[ortho_config(default = 5000)]
    pub wait_timeout_ms: u64,
    /// `mount` executable.
    #[ortho_config(default = DEFAULT_MOUNT_BIN.to_owned())]
    pub mount_bin: String,
    /// `umount` executable.
    #[ortho_config(default = DEFAULT_UMOUNT_BIN.to_owned())]
    pub umount_bin: String,
    /// Filesystem formatter.
    #[ortho_config(default = DEFAULT_MKFS_BIN.to_owned())]
    pub mkfs_bin: String,
    /// Compute Engine project; discovered from the metadata server if unset.
    pub gce_project: Option<String>,
    /// Compute Engine zone; discovered from the metadata server if unset.
    pub gce_zone: Option<String>,
    /// Compute Engine instance name; discovered from the metadata server if
    /// unset.
    pub gce_instance: Option<String>,
    /// Static OAuth access token. Defaults to the instance service account.
    pub gce_access_token: Option<String>,
    /// Compute Engine API root.
    #[ortho_config(default = DEFAULT_API_BASE.to_owned())]
    pub gce_api_base: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn hint(&self) -> String {
        format!("set {} or {} in cloudvol.toml", self.env_var, self.toml_key)
    }
}

const MODE: FieldMetadata = FieldMetadata::new("storage mode", "CLOUDVOL_MODE", "mode");
const BASE_MOUNT_DIR: FieldMetadata = FieldMetadata::new(
    "base mount directory",
    "CLOUDVOL_BASE_MOUNT_DIR",
    "base_mount_dir",
);
const SOCKET: FieldMetadata = FieldMetadata::new("plugin socket", "CLOUDVOL_SOCKET", "socket");
const POLL_INTERVAL: FieldMetadata = FieldMetadata::new(
    "operation poll interval",
    "CLOUDVOL_POLL_INTERVAL_MS",
    "poll_interval_ms",
);
const WAIT_TIMEOUT: FieldMetadata = FieldMetadata::new(
    "operation timeout",
    "CLOUDVOL_WAIT_TIMEOUT_MS",
    "wait_timeout_ms",
);
const MOUNT_BIN: FieldMetadata =
    FieldMetadata::new("mount executable", "CLOUDVOL_MOUNT_BIN", "mount_bin");
const UMOUNT_BIN: FieldMetadata =
    FieldMetadata::new("umount executable", "CLOUDVOL_UMOUNT_BIN", "umount_bin");
const MKFS_BIN: FieldMetadata =
    FieldMetadata::new("filesystem formatter", "CLOUDVOL_MKFS_BIN", "mkfs_bin");
const GCE_API_BASE: FieldMetadata = FieldMetadata::new(
    "Compute Engine API root",
    "CLOUDVOL_GCE_API_BASE",
    "gce_api_base",
);

impl CloudvolConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: {}",
                metadata.description,
                metadata.hint()
            )));
        }
        Ok(())
    }

    fn invalid(metadata: &FieldMetadata, problem: &str) -> ConfigError {
        ConfigError::Invalid(format!(
            "{} {problem}: {}",
            metadata.description,
            metadata.hint()
        ))
    }

    /// Loads configuration using the `ortho-config` derive. Values merge
    /// defaults, configuration files, environment variables, and CLI flags in
    /// that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Self::load().map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("cloudvol")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and TOML key that provide the offending value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required value is empty
    /// and [`ConfigError::Invalid`] when a value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.storage_mode()?;

        Self::require_field(&self.base_mount_dir, &BASE_MOUNT_DIR)?;
        if !self.base_mount_dir.starts_with('/') {
            return Err(Self::invalid(&BASE_MOUNT_DIR, "must be an absolute path"));
        }

        if self.port.is_none() {
            Self::require_field(&self.socket, &SOCKET)?;
        }

        if self.poll_interval_ms == 0 {
            return Err(Self::invalid(&POLL_INTERVAL, "must be greater than zero"));
        }
        if self.wait_timeout_ms < self.poll_interval_ms {
            return Err(Self::invalid(
                &WAIT_TIMEOUT,
                "must not be shorter than the poll interval",
            ));
        }

        Self::require_field(&self.mount_bin, &MOUNT_BIN)?;
        Self::require_field(&self.umount_bin, &UMOUNT_BIN)?;
        Self::require_field(&self.mkfs_bin, &MKFS_BIN)?;
        Self::require_field(&self.gce_api_base, &GCE_API_BASE)?;
        Ok(())
    }

    /// Parses [`CloudvolConfig::mode`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for unknown modes.
    pub fn storage_mode(&self) -> Result<StorageMode, ConfigError> {
        Self::require_field(&self.mode, &MODE)?;
        self.mode
            .parse()
            .map_err(|err: crate::driver::UnknownStorageMode| {
                Self::invalid(&MODE, &err.to_string())
            })
    }

    /// Base directory as a path.
    #[must_use]
    pub fn base_mount_dir(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(&self.base_mount_dir)
    }

    /// Poll cadence for attach and detach operations.
    #[must_use]
    pub const fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(self.poll_interval_ms),
            timeout: Duration::from_millis(self.wait_timeout_ms),
        }
    }

    /// Programs used by the filesystem port.
    #[must_use]
    pub fn fs_programs(&self) -> FsPrograms {
        FsPrograms {
            mount_bin: self.mount_bin.clone(),
            umount_bin: self.umount_bin.clone(),
            mkfs_bin: self.mkfs_bin.clone(),
        }
    }

    /// Settings for the Compute Engine backend.
    #[must_use]
    pub fn gce_settings(&self) -> GceSettings {
        GceSettings {
            api_base: self.gce_api_base.clone(),
            metadata_base: DEFAULT_METADATA_BASE.to_owned(),
            project: self.gce_project.clone(),
            zone: self.gce_zone.clone(),
            instance: self.gce_instance.clone(),
            access_token: self.gce_access_token.clone(),
        }
    }
}

impl Default for CloudvolConfig {
    fn default() -> Self {
        Self {
            mode: DEFAULT_MODE.to_owned(),
            base_mount_dir: DEFAULT_BASE_MOUNT_DIR.to_owned(),
            socket: DEFAULT_SOCKET.to_owned(),
            port: None,
            poll_interval_ms: 100,
            wait_timeout_ms: 5000,
            mount_bin: DEFAULT_MOUNT_BIN.to_owned(),
            umount_bin: DEFAULT_UMOUNT_BIN.to_owned(),
            mkfs_bin: DEFAULT_MKFS_BIN.to_owned(),
            gce_project: None,
            gce_zone: None,
            gce_instance: None,
            gce_access_token: None,
            gce_api_base: DEFAULT_API_BASE.to_owned(),
        }
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configuration value is present but unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn config() -> CloudvolConfig {
        CloudvolConfig::default()
    }

    #[rstest]
    fn defaults_are_valid(config: CloudvolConfig) {
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.storage_mode(), Ok(StorageMode::Fs));
        assert_eq!(config.poll_settings(), PollSettings::default());
    }

    #[rstest]
    fn relative_base_dir_is_rejected(mut config: CloudvolConfig) {
        config.base_mount_dir = String::from("mnt");
        let Err(ConfigError::Invalid(message)) = config.validate() else {
            panic!("relative base dir should be invalid");
        };
        assert!(message.contains("CLOUDVOL_BASE_MOUNT_DIR"), "{message}");
        assert!(message.contains("base_mount_dir"), "{message}");
    }

    #[rstest]
    fn unknown_mode_names_the_mode(mut config: CloudvolConfig) {
        config.mode = String::from("ebs");
        let Err(ConfigError::Invalid(message)) = config.validate() else {
            panic!("unknown mode should be invalid");
        };
        assert!(message.contains("ebs"), "{message}");
        assert!(message.contains("CLOUDVOL_MODE"), "{message}");
    }

    #[rstest]
    #[case(0, 5000)]
    #[case(200, 100)]
    fn poll_bounds_are_enforced(
        mut config: CloudvolConfig,
        #[case] interval: u64,
        #[case] timeout: u64,
    ) {
        config.poll_interval_ms = interval;
        config.wait_timeout_ms = timeout;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[rstest]
    fn empty_program_is_missing(mut config: CloudvolConfig) {
        config.umount_bin = String::from("  ");
        let Err(ConfigError::MissingField(message)) = config.validate() else {
            panic!("blank umount_bin should be rejected");
        };
        assert!(message.contains("CLOUDVOL_UMOUNT_BIN"), "{message}");
    }

    #[rstest]
    fn empty_socket_is_allowed_with_port(mut config: CloudvolConfig) {
        config.socket = String::new();
        config.port = Some(8080);
        assert_eq!(config.validate(), Ok(()));
    }

    #[rstest]
    fn gce_settings_carry_overrides(mut config: CloudvolConfig) {
        config.gce_project = Some(String::from("p"));
        config.gce_access_token = Some(String::from("t"));
        let settings = config.gce_settings();
        assert_eq!(settings.project.as_deref(), Some("p"));
        assert_eq!(settings.access_token.as_deref(), Some("t"));
        assert_eq!(settings.api_base, DEFAULT_API_BASE);
    }
}
