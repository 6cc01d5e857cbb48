//! Command-line interface definitions for the `cloudvol` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `cloudvol` binary. Flags override values from
/// `cloudvol.toml` and `CLOUDVOL_*` environment variables.
#[derive(Debug, Default, Parser)]
#[command(
    name = "cloudvol",
    version,
    about = "Docker volume plugin backed by local directories or Compute Engine persistent disks"
)]
pub(crate) struct Cli {
    /// Storage mode: `fs` for local directories, `gce` for persistent disks.
    #[arg(long, value_name = "MODE")]
    pub(crate) mode: Option<String>,
    /// TCP port to listen on instead of the plugin socket.
    #[arg(long, value_name = "PORT")]
    pub(crate) port: Option<u16>,
    /// Plugin socket name under /run/docker/plugins, or an absolute path.
    /// Ignored when --port is given.
    #[arg(long = "sock", value_name = "SOCKET")]
    pub(crate) sock: Option<String>,
    /// Directory that holds per-volume mount directories.
    #[arg(long = "base-dir", value_name = "DIR")]
    pub(crate) base_dir: Option<String>,
}
