use revlens_core::{
    AttributionWindow, EngineConfig, ExtractionResult, Extractor, RelativePeriod, UtcTimestamp,
};

use crate::cli::AuditArgs;
use crate::error::CliError;

pub async fn run(args: &AuditArgs) -> Result<ExtractionResult, CliError> {
    let window = resolve_window(args)?;

    let mut config = EngineConfig::new(args.api_key.clone())
        .with_rate_tier(args.tier.into())
        .with_timezone(args.timezone.clone());
    if let Some(base_url) = &args.base_url {
        config = config.with_base_url(base_url.clone());
    }

    let extractor = Extractor::new(&config);
    Ok(extractor.extract(&window).await?)
}

fn resolve_window(args: &AuditArgs) -> Result<AttributionWindow, CliError> {
    let now = UtcTimestamp::now();

    if let (Some(from), Some(to)) = (&args.from, &args.to) {
        let start = UtcTimestamp::parse(from)?;
        let end = UtcTimestamp::parse(to)?;
        return Ok(AttributionWindow::new(start, end, args.timezone.clone())?);
    }

    let days = args.last_days.unwrap_or(RelativePeriod::Last90Days.days());
    let period = RelativePeriod::covering(days);
    Ok(AttributionWindow::relative(
        period,
        now,
        args.timezone.clone(),
    )?)
}
