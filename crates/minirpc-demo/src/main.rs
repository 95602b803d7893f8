//! minirpc CLI entry point.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use minirpc_core::{TracingConfig, init_tracing};
use minirpc_demo::DemoResult;
use minirpc_demo::cli::{Cli, Command};
use minirpc_demo::commands::{self, CallOptions, ServeOptions};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> DemoResult<()> {
    match cli.command {
        Command::Serve {
            addr,
            max_connections,
            idle_timeout_secs,
            log_format,
        } => {
            let mut config = TracingConfig::server().with_format(log_format.into());
            if cli.debug {
                config = config.with_level(tracing::Level::DEBUG);
            }
            init_tracing(config)?;

            commands::serve(ServeOptions {
                addr,
                max_connections,
                idle_timeout: idle_timeout_secs.map(Duration::from_secs),
            })
            .await
        }
        Command::Call {
            addr,
            id,
            timeout_ms,
            delay_ms,
            oneway,
            serializer,
            gzip,
        } => {
            init_tracing(TracingConfig::cli(cli.debug))?;

            commands::call(CallOptions {
                addr,
                id,
                timeout: timeout_ms.map(Duration::from_millis),
                delay: Duration::from_millis(delay_ms),
                oneway,
                serializer: serializer.into(),
                gzip,
            })
            .await
        }
    }
}
