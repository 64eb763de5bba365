use clap::{Args, Parser, Subcommand, ValueEnum};

use revlens_core::RateTier;

#[derive(Debug, Parser)]
#[command(name = "revlens", version, about = "Email/SMS marketing revenue audit extraction")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Exit nonzero when the result carries validation flags.
    #[arg(long, global = true)]
    pub strict: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one extraction and print the result envelope.
    Audit(AuditArgs),
}

#[derive(Debug, Args)]
pub struct AuditArgs {
    /// Upstream API key.
    #[arg(long, env = "REVLENS_API_KEY")]
    pub api_key: String,

    /// Upstream API root; defaults to the engine's built-in root.
    #[arg(long, env = "REVLENS_BASE_URL")]
    pub base_url: Option<String>,

    /// Audit the trailing N days instead of an explicit range.
    #[arg(long, conflicts_with_all = ["from", "to"])]
    pub last_days: Option<i64>,

    /// Window start, RFC3339 UTC (e.g. 2025-01-01T00:00:00Z).
    #[arg(long, requires = "to")]
    pub from: Option<String>,

    /// Window end, RFC3339 UTC.
    #[arg(long, requires = "from")]
    pub to: Option<String>,

    /// Account rate-limit tier.
    #[arg(long, value_enum, default_value_t = TierArg::Medium)]
    pub tier: TierArg,

    /// Account timezone label attached to aggregate queries.
    #[arg(long, default_value = "UTC")]
    pub timezone: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TierArg {
    Small,
    Medium,
    Large,
}

impl From<TierArg> for RateTier {
    fn from(value: TierArg) -> Self {
        match value {
            TierArg::Small => Self::Small,
            TierArg::Medium => Self::Medium,
            TierArg::Large => Self::Large,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn tier_maps_onto_engine_tiers() {
        assert_eq!(RateTier::from(TierArg::Small), RateTier::Small);
        assert_eq!(RateTier::from(TierArg::Large), RateTier::Large);
    }
}
