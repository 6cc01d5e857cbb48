//! Local filesystem port: mount directories and block-device mounts.
//!
//! Directory handling goes through `cap-std` so that every access starts from
//! an explicitly opened parent directory. Mounting, unmounting and formatting
//! shell out to the platform tools through a [`CommandRunner`], which keeps
//! the port scriptable in tests.

use std::ffi::OsString;
use std::io;
use std::os::unix::fs::PermissionsExt;

use camino::Utf8Path;
use cap_std::fs::Permissions;
use cap_std::{ambient_authority, fs_utf8::Dir};

mod error;
mod runner;

pub use error::FsError;
pub use runner::{CommandOutput, CommandRunner, ProcessCommandRunner, render_command};

/// Default `mount` executable.
pub const DEFAULT_MOUNT_BIN: &str = "mount";
/// Default `umount` executable.
pub const DEFAULT_UMOUNT_BIN: &str = "umount";
/// Default filesystem formatter.
pub const DEFAULT_MKFS_BIN: &str = "mkfs.ext4";
/// Options passed to `mount -o` for block devices.
pub const MOUNT_OPTIONS: &str = "defaults,discard";

/// Blocking filesystem operations required by the volume manager and the
/// block-backed storage driver.
pub trait FileSystem: Send + Sync {
    /// Reports whether `path` exists and is a directory.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::Io`] for failures other than the path not existing.
    fn dir_exists(&self, path: &Utf8Path) -> Result<bool, FsError>;

    /// Creates a directory with the given Unix permission bits, creating
    /// missing parents when `recursive` is set.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::Io`] when the directory cannot be created.
    fn create_dir(&self, path: &Utf8Path, recursive: bool, mode: u32) -> Result<(), FsError>;

    /// Removes a directory, and its contents when `recursive` is set.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::Io`] when removal fails.
    fn remove_dir(&self, path: &Utf8Path, recursive: bool) -> Result<(), FsError>;

    /// Mounts `device` at `target`.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::Command`] or [`FsError::Spawn`] when the mount tool
    /// fails, including its captured output.
    fn mount(&self, device: &Utf8Path, target: &Utf8Path) -> Result<(), FsError>;

    /// Unmounts whatever is mounted at `target`.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::Command`] or [`FsError::Spawn`] when the unmount
    /// tool fails.
    fn unmount(&self, target: &Utf8Path) -> Result<(), FsError>;

    /// Creates an ext4 filesystem on `device`.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::Command`] or [`FsError::Spawn`] when the formatter
    /// fails.
    fn format(&self, device: &Utf8Path) -> Result<(), FsError>;
}

/// Program names used for mount, unmount and format.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FsPrograms {
    /// `mount` executable.
    pub mount_bin: String,
    /// `umount` executable.
    pub umount_bin: String,
    /// Formatter executable.
    pub mkfs_bin: String,
}

impl Default for FsPrograms {
    fn default() -> Self {
        Self {
            mount_bin: DEFAULT_MOUNT_BIN.to_owned(),
            umount_bin: DEFAULT_UMOUNT_BIN.to_owned(),
            mkfs_bin: DEFAULT_MKFS_BIN.to_owned(),
        }
    }
}

/// Host filesystem implementation.
#[derive(Clone, Debug, Default)]
pub struct OsFileSystem<R: CommandRunner = ProcessCommandRunner> {
    runner: R,
    programs: FsPrograms,
}

impl OsFileSystem<ProcessCommandRunner> {
    /// Convenience constructor that wires the real process runner.
    #[must_use]
    pub const fn with_process_runner(programs: FsPrograms) -> Self {
        Self::new(ProcessCommandRunner, programs)
    }
}

impl<R: CommandRunner> OsFileSystem<R> {
    /// Creates a filesystem port using the provided runner.
    #[must_use]
    pub const fn new(runner: R, programs: FsPrograms) -> Self {
        Self { runner, programs }
    }

    fn run_checked(&self, program: &str, args: &[OsString]) -> Result<(), FsError> {
        let output = self.runner.run(program, args)?;
        if output.is_success() {
            return Ok(());
        }

        Err(FsError::Command {
            command: render_command(program, args),
            status: output.code,
            status_text: output.status_text(),
            output: output.combined(),
        })
    }
}

impl<R: CommandRunner> FileSystem for OsFileSystem<R> {
    fn dir_exists(&self, path: &Utf8Path) -> Result<bool, FsError> {
        let Some((parent, name)) = split_parent(path) else {
            return match Dir::open_ambient_dir(path, ambient_authority()) {
                Ok(_) => Ok(true),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
                Err(err) => Err(FsError::io(path, &err)),
            };
        };

        let dir = match Dir::open_ambient_dir(parent, ambient_authority()) {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(FsError::io(parent, &err)),
        };

        match dir.metadata(name) {
            Ok(metadata) => Ok(metadata.is_dir()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(FsError::io(path, &err)),
        }
    }

    fn create_dir(&self, path: &Utf8Path, recursive: bool, mode: u32) -> Result<(), FsError> {
        let (parent, name) = split_parent(path).ok_or_else(|| FsError::Io {
            path: path.to_path_buf(),
            message: String::from("cannot create a directory without a final component"),
        })?;

        if recursive {
            Dir::create_ambient_dir_all(path, ambient_authority())
                .map_err(|err| FsError::io(path, &err))?;
        }

        let dir = Dir::open_ambient_dir(parent, ambient_authority())
            .map_err(|err| FsError::io(parent, &err))?;
        if !recursive {
            dir.create_dir(name).map_err(|err| FsError::io(path, &err))?;
        }

        let permissions = Permissions::from_std(std::fs::Permissions::from_mode(mode));
        dir.set_permissions(name, permissions)
            .map_err(|err| FsError::io(path, &err))
    }

    fn remove_dir(&self, path: &Utf8Path, recursive: bool) -> Result<(), FsError> {
        let (parent, name) = split_parent(path).ok_or_else(|| FsError::Io {
            path: path.to_path_buf(),
            message: String::from("refusing to remove a filesystem root"),
        })?;
        let dir = Dir::open_ambient_dir(parent, ambient_authority())
            .map_err(|err| FsError::io(parent, &err))?;

        let result = if recursive {
            dir.remove_dir_all(name)
        } else {
            dir.remove_dir(name)
        };
        result.map_err(|err| FsError::io(path, &err))
    }

    fn mount(&self, device: &Utf8Path, target: &Utf8Path) -> Result<(), FsError> {
        let args = [
            OsString::from("-o"),
            OsString::from(MOUNT_OPTIONS),
            OsString::from(device.as_str()),
            OsString::from(target.as_str()),
        ];
        self.run_checked(&self.programs.mount_bin, &args)
    }

    fn unmount(&self, target: &Utf8Path) -> Result<(), FsError> {
        let args = [OsString::from(target.as_str())];
        self.run_checked(&self.programs.umount_bin, &args)
    }

    fn format(&self, device: &Utf8Path) -> Result<(), FsError> {
        let args = [OsString::from(device.as_str())];
        self.run_checked(&self.programs.mkfs_bin, &args)
    }
}

fn split_parent(path: &Utf8Path) -> Option<(&Utf8Path, &str)> {
    let name = path.file_name()?;
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    Some((parent, name))
}
