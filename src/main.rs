use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use kiwibes::auth::Authenticator;
use kiwibes::catalog::Catalog;
use kiwibes::config::ServerConfig;
use kiwibes::datastore::DataStore;
use kiwibes::error::KiwibesError;
use kiwibes::manager::Manager;
use kiwibes::rest::{self, AppContext};
use kiwibes::scheduler::Scheduler;

#[derive(Parser, Debug)]
#[command(name = "kiwibes")]
#[command(about = "Single-host job automation server with a REST control plane")]
struct Args {
    /// Home folder holding the catalog, tokens, TLS material and log
    home: PathBuf,

    /// Log level: 0 errors only, 1 warnings, 2 informational
    #[arg(short = 'l', value_name = "UINT", default_value_t = 0)]
    log_level: u8,

    /// Maximum size of the log in MB, at most 100
    #[arg(short = 's', value_name = "UINT", default_value_t = 1)]
    log_max_size: u64,

    /// HTTPS listening port
    #[arg(short = 'p', value_name = "UINT", default_value_t = 4242)]
    port: u16,

    /// Data store budget in MB, at most 100
    #[arg(short = 'd', value_name = "UINT", default_value_t = 10)]
    data_store_size: u64,
}

fn exit_with(error: KiwibesError) -> ExitCode {
    ExitCode::from(error.code() as u8)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // clap prints its own report; the exit status is the contract.
            let _ = e.print();
            return exit_with(KiwibesError::CmdlineParse);
        }
    };

    let config = ServerConfig {
        home: args.home,
        log_level: args.log_level,
        log_max_size: args.log_max_size,
        https_port: args.port,
        data_store_size: args.data_store_size,
    };
    if let Err(e) = config.validate() {
        eprintln!("[ERROR] {e}");
        return exit_with(e);
    }

    // Log to a rolling file in the home folder; RUST_LOG overrides -l.
    let file_appender =
        tracing_appender::rolling::daily(config.log_dir(), kiwibes::config::LOG_FILE);
    let (writer, _guard) = tracing_appender::non_blocking(file_appender);
    let default_filter = match config.log_level {
        0 => "kiwibes=error",
        1 => "kiwibes=warn",
        _ => "kiwibes=info",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();

    run(config).await
}

async fn run(config: ServerConfig) -> ExitCode {
    tracing::info!(
        home = %config.home.display(),
        port = config.https_port,
        "starting the kiwibes server"
    );

    let catalog = Arc::new(Catalog::new(config.catalog_path()));
    if let Err(e) = catalog.load().await {
        tracing::error!(error = %e, "failed to load the jobs catalog, exiting");
        return exit_with(e);
    }

    let manager = Arc::new(Manager::new(catalog.clone()));
    let scheduler = Arc::new(Scheduler::new(catalog.clone(), manager.clone()));
    scheduler.start().await;

    // Arm every job with a usable cron schedule before the frontend binds.
    for name in catalog.list_schedulable().await {
        if let Err(e) = scheduler.schedule(&name).await {
            tracing::warn!(job = %name, error = %e, "could not schedule job at startup");
        }
    }

    let datastore = Arc::new(DataStore::new(config.data_store_bytes()));
    let auth = Arc::new(Authenticator::new(config.auth_path()));

    let tls = match kiwibes::tls::load_server_config(&config.cert_path(), &config.key_path()).await
    {
        Ok(tls) => tls,
        Err(e) => {
            tracing::error!(error = %e, "failed to load the TLS material, exiting");
            eprintln!("[ERROR] {e}");
            return ExitCode::FAILURE;
        }
    };

    let ctx = AppContext {
        catalog: catalog.clone(),
        manager: manager.clone(),
        scheduler: scheduler.clone(),
        datastore,
        auth: auth.clone(),
    };
    let app = rest::router(ctx);

    let shutdown = CancellationToken::new();
    let handle = axum_server::Handle::new();
    {
        let shutdown = shutdown.clone();
        let handle = handle.clone();
        tokio::spawn(async move {
            wait_for_termination().await;
            shutdown.cancel();
            handle.graceful_shutdown(Some(Duration::from_secs(5)));
        });
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.https_port));
    tracing::info!(addr = %addr, "the kiwibes server is initialized");
    let served = axum_server::bind_rustls(addr, tls)
        .handle(handle)
        .serve(app.into_make_service())
        .await;

    // The frontend is down; drain the background tasks and kill any
    // children still running. They are not resumed on the next start-up.
    scheduler.stop().await;
    manager.shutdown().await;
    auth.shutdown().await;

    if let Err(e) = served {
        tracing::error!(error = %e, "HTTPS server failed");
        return ExitCode::FAILURE;
    }
    if shutdown.is_cancelled() {
        tracing::info!("the kiwibes server has stopped");
        return exit_with(KiwibesError::MainInterrupted);
    }
    ExitCode::SUCCESS
}

/// Resolve once SIGTERM or ctrl-c arrives.
///
/// The caller then drains the frontend, stops the scheduler, kills the
/// remaining children and exits with `MAIN_INTERRUPTED`; killed jobs are
/// not resumed on the next start-up. Should the SIGTERM handler fail to
/// install, ctrl-c alone still stops the server.
async fn wait_for_termination() {
    let sigterm = signal(SignalKind::terminate());

    match sigterm {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("caught SIGTERM"),
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "SIGINT handler failed");
                    } else {
                        tracing::info!("caught SIGINT");
                    }
                }
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "could not install the SIGTERM handler");
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "SIGINT handler failed");
            } else {
                tracing::info!("caught SIGINT");
            }
        }
    }
}
