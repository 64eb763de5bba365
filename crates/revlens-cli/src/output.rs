use revlens_core::ExtractionResult;

use crate::cli::OutputFormat;
use crate::error::CliError;

pub fn render(result: &ExtractionResult, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let rendered = if pretty {
                serde_json::to_string_pretty(result)?
            } else {
                serde_json::to_string(result)?
            };
            println!("{rendered}");
        }
        OutputFormat::Text => print!("{}", text_summary(result)),
    }

    Ok(())
}

fn text_summary(result: &ExtractionResult) -> String {
    let snapshot = &result.snapshot;
    let mut out = String::new();

    out.push_str(&format!(
        "Audit window  {} .. {} ({})\n",
        result.window.start, result.window.end, result.window.timezone
    ));
    out.push_str(&format!("Total revenue       {:>14.2}\n", snapshot.total_revenue));
    out.push_str(&format!(
        "Attributed revenue  {:>14.2}  ({:.1}% KAV)\n",
        snapshot.attributed_revenue, snapshot.kav_percentage
    ));
    out.push_str(&format!("  flows             {:>14.2}\n", snapshot.flow_revenue));
    out.push_str(&format!("  campaigns         {:>14.2}\n", snapshot.campaign_revenue));
    out.push_str(&format!(
        "  email / sms       {:>14.2} / {:.2}\n",
        snapshot.channel_breakdown.email, snapshot.channel_breakdown.sms
    ));
    out.push_str(&format!(
        "Campaigns {}  Flows {}  Lists {}  Forms {}\n",
        result.campaigns.len(),
        result.flows.len(),
        result.lists.len(),
        result.forms.len()
    ));

    if result.validation_flags.is_empty() {
        out.push_str("All values measured; no validation flags.\n");
    } else {
        out.push_str("Validation flags:\n");
        for flag in &result.validation_flags {
            out.push_str(&format!("  - {flag:?}\n"));
        }
    }

    out
}
