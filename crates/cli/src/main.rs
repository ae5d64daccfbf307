//! fs-registrator: mirrors FreeSWITCH sofia registrations into a K/V store

mod args;
mod logging;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use registrator_core::{create_backend, EslConnection, Registrator, RegistratorConfig, VERSION};
use tracing::{error, info, Level};

use crate::args::{parse_error_exit_code, Args};
use crate::logging::{parse_log_level, setup_logging, LoggingConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(parse_error_exit_code(&e));
        }
    };

    let config = match args.to_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            let _ = Args::command().print_help();
            return ExitCode::from(1);
        }
    };

    if let Err(e) = init_logging(&args) {
        eprintln!("Error: {:#}", e);
        return ExitCode::from(1);
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fatal: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn init_logging(args: &Args) -> Result<()> {
    let level = parse_log_level(&args.log_level)?;
    let mut logging = LoggingConfig::new(level);
    if args.log_json {
        logging = logging.with_json();
    }
    if level >= Level::DEBUG {
        logging = logging.with_file_info();
    }
    setup_logging(logging)
}

async fn run(config: RegistratorConfig) -> Result<()> {
    info!("Starting fs-registrator v{}", VERSION);
    info!("Config: {:?}", config);

    let kv = create_backend(&config.kv).context("creating K/V backend")?;

    let switch = &config.switch;
    let events = EslConnection::connect(&switch.host, switch.port, &switch.password, config.request_timeout)
        .await
        .context("connecting watcher to FreeSWITCH")?;
    let inventory = EslConnection::connect(&switch.host, switch.port, &switch.password, config.request_timeout)
        .await
        .context("connecting syncer to FreeSWITCH")?;

    let registrator = Registrator::from_config(&config, kv);
    let shutdown = registrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            shutdown.cancel();
        }
    });

    let (watcher, syncer) = registrator.run(events, inventory).await.into_result()?;
    info!(
        "Stopped after {} events and {} sync passes",
        watcher.events, syncer.passes
    );
    Ok(())
}
