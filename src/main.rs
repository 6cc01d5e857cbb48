//! Binary entry point for the cloudvol volume plugin.

use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cloudvol::{
    BackendError, CloudvolConfig, ConfigError, ConfiguredDriver, ListenAddress, MountLayout,
    OsFileSystem, ServeError, VolumeManager, VolumePlugin, router, serve,
};

mod cli;

use cli::Cli;

const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("storage driver error: {0}")]
    Driver(#[from] BackendError),
    #[error(transparent)]
    Serve(#[from] ServeError),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match run(cli).await {
        Ok(()) => 0,
        Err(err) => {
            error!(error = %err, "stopping due to last error");
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn apply_overrides(config: &mut CloudvolConfig, cli: Cli) {
    if let Some(mode) = cli.mode {
        config.mode = mode;
    }
    if let Some(port) = cli.port {
        config.port = Some(port);
    }
    if let Some(sock) = cli.sock {
        config.socket = sock;
    }
    if let Some(base_dir) = cli.base_dir {
        config.base_mount_dir = base_dir;
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    info!(pid = process::id(), "started cloudvol volume driver");

    let mut config = CloudvolConfig::load_without_cli_args()?;
    apply_overrides(&mut config, cli);
    config.validate()?;
    let mode = config.storage_mode()?;

    let fs = OsFileSystem::with_process_runner(config.fs_programs());
    let driver = ConfiguredDriver::build(
        mode,
        config.gce_settings(),
        config.poll_settings(),
        fs.clone(),
    )
    .await?;
    let layout = MountLayout::new(config.base_mount_dir());
    info!(%mode, base_mount_dir = %layout.base(), "storage driver ready");

    let plugin = Arc::new(VolumePlugin::new(VolumeManager::new(driver, fs, layout)));
    let address = ListenAddress::resolve(config.port, &config.socket);
    serve(router(plugin), &address, shutdown_signal()).await?;

    info!("stopped cloudvol volume driver");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = ctrl_c => info!("received ctrl-c"),
        () = terminate => info!("received SIGTERM"),
    }
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
