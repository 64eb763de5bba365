mod audit;

use revlens_core::ExtractionResult;

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub async fn run(cli: &Cli) -> Result<ExtractionResult, CliError> {
    match &cli.command {
        Command::Audit(args) => audit::run(args).await,
    }
}
