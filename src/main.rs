use std::process::ExitCode;

use clap::Parser;
use spectre::cli::{Cli, Command};
use spectre::{App, AppError};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let Command::Server(args) = cli.command;

    init_tracing(&args.log_level);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("failed to start the async runtime: {e}");
            return exit_code(2);
        }
    };

    runtime.block_on(async move {
        match App::bootstrap(&args).await {
            Ok(app) => match app.run().await {
                Ok(()) => exit_code(0),
                Err(e) => {
                    tracing::error!(error = %e, "server exited with an error");
                    exit_code_for(&e)
                }
            },
            Err(e) => {
                tracing::error!(error = %e, "failed to start the server");
                exit_code_for(&e)
            }
        }
    })
}

fn exit_code_for(e: &AppError) -> ExitCode {
    match e {
        AppError::Config(_) => exit_code(1),
        AppError::Fatal(_) => exit_code(2),
    }
}

fn exit_code(code: u8) -> ExitCode {
    ExitCode::from(code)
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
