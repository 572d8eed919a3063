use std::path::PathBuf;

use clap::Parser;

/// Compare runner results files and write a consistency report.
#[derive(Debug, Clone, Parser)]
#[command(name = "parity-verify", version)]
pub struct VerifyArgs {
    /// Directory holding `<language>_<mode>.json` results files.
    #[arg(long, default_value = "reports")]
    pub results_dir: PathBuf,

    #[arg(long, default_value = "reports/consistency_report.json")]
    pub output_json: PathBuf,

    #[arg(long, default_value = "reports/consistency_report.md")]
    pub output_md: PathBuf,
}
