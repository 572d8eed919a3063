use std::process::ExitCode;

use clap::Parser;
use parity_verify::{VerifyArgs, verify};
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match verify(&VerifyArgs::parse()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "verification failed");
            ExitCode::FAILURE
        }
    }
}
