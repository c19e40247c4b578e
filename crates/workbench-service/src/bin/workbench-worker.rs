//! Serve the workbench protocol over stdio.
//!
//! Logs go to stderr, filtered by `WORKBENCH_LOG` (default `info`).

use std::io::{self, BufWriter};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use workbench_core::{LanguageService, ServiceConfig};
use workbench_grammar::language_registry;
use workbench_service::{MessageCodec, serve};

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_env("WORKBENCH_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let registry = match language_registry() {
        Ok(registry) => registry,
        Err(err) => {
            tracing::error!(error = %err, "built-in languages did not compile");
            return ExitCode::FAILURE;
        }
    };
    let service = LanguageService::new(registry, ServiceConfig::default());

    let stdin = io::stdin().lock();
    let mut stdout = BufWriter::new(io::stdout());
    tracing::info!("workbench worker ready");
    match serve(service, &MessageCodec::default(), stdin, &mut stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "worker stopped");
            ExitCode::FAILURE
        }
    }
}
