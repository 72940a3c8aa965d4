use alarmcall_core::config::AppConfig;
use alarmcall_core::engine::Runner;
use alarmcall_server::server;
use alarmcall_server::shutdown::Shutdown;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::sync::Arc;

/// Polls fleet tracking for KPI alarms and calls the affected drivers.
#[derive(Parser, Debug)]
#[command(name = "alarmcall", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP trigger endpoint.
    Serve(ServeArgs),
    /// Run the alarm check every POLL_INTERVAL_SECONDS until interrupted.
    Poll,
    /// Run the alarm check once and print the summary as JSON.
    Once,
}

#[derive(clap::Args, Debug)]
struct ServeArgs {
    #[arg(long, env = "ALARMCALL_BIND", default_value = "0.0.0.0:8000")]
    bind: SocketAddr,

    /// Also run the poll loop in this process.
    #[arg(long)]
    poll: bool,
}

use tracing_subscriber::{fmt, EnvFilter};

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    // Config errors surface before logging is up; anyhow prints them.
    let cfg = AppConfig::from_env()?;

    init_logging(&cfg.log_level);

    tracing::info!(
        event = "process_start",
        command = ?cli.cmd,
        config = ?cfg
    );

    let runner = Arc::new(Runner::from_config(&cfg)?);

    match cli.cmd {
        Command::Serve(args) => {
            let shutdown = Shutdown::on_ctrl_c();
            let poller = args.poll.then(|| {
                let runner = runner.clone();
                let stop = shutdown.clone();
                tokio::spawn(async move { runner.poll_forever(stop.wait()).await })
            });

            server::serve(runner, args.bind, shutdown.wait()).await?;

            if let Some(handle) = poller {
                handle.await?;
            }
        }
        Command::Poll => {
            runner.poll_forever(Shutdown::on_ctrl_c().wait()).await;
        }
        Command::Once => match runner.run_once().await {
            Ok(summary) => {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            Err(e) => {
                tracing::error!(event = "run_failed", stage = e.stage(), error = %e);
                eprintln!("{e}");
                std::process::exit(1);
            }
        },
    }

    tracing::info!(event = "process_exit");
    Ok(())
}
