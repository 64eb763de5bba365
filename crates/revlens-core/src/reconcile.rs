use serde::{Deserialize, Serialize};

use crate::domain::Channel;

/// Relative tolerance for the degenerate flow-equals-total comparison and
/// for channel-split drift checks.
const EQUALITY_TOLERANCE: f64 = 1e-6;

/// Machine-readable markers describing every corrective action applied while
/// assembling a snapshot. A consumer that sees an empty list may treat every
/// number as measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationFlag {
    /// The total-revenue query failed; KAV is meaningless for this run.
    TotalUnavailable,
    /// Flow revenue was discarded (degenerate or unavailable) and replaced by
    /// the fallback share of total revenue.
    FlowEstimated,
    /// Campaign revenue was unavailable and replaced by the fallback share.
    CampaignEstimated,
    /// Attributed revenue exceeded total and both parts were rescaled down to
    /// the configured ceiling fraction.
    RescaledOverCeiling,
    /// The raw per-channel split disagreed with attributed revenue and was
    /// rescaled proportionally.
    ChannelSplitRescaled,
    /// The requested window ended in the future and was clamped to now.
    WindowClamped,
    CampaignsUnavailable,
    FlowsUnavailable,
    ListsUnavailable,
    FormsUnavailable,
}

/// Heuristic policy constants used when a revenue source is missing or
/// degenerate. These are estimates, not measurements; every use is flagged.
/// The right values per account or industry are an open question, so they are
/// configuration rather than derived truth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Share of total revenue assumed flow-attributed when the flow query is
    /// missing or degenerate.
    pub flow_fallback_share: f64,
    /// Share of total revenue assumed campaign-attributed when the campaign
    /// query is missing.
    pub campaign_fallback_share: f64,
    /// Ceiling fraction of total revenue that attributed revenue is rescaled
    /// to when the raw sum exceeds total.
    pub attribution_ceiling: f64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            flow_fallback_share: 0.20,
            campaign_fallback_share: 0.10,
            attribution_ceiling: 0.95,
        }
    }
}

/// Revenue attributed to each channel. Always sums to attributed revenue in
/// an emitted snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChannelBreakdown {
    pub email: f64,
    pub sms: f64,
}

impl ChannelBreakdown {
    pub fn total(&self) -> f64 {
        self.email + self.sms
    }

    pub fn channel(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Email => self.email,
            Channel::Sms => self.sms,
        }
    }
}

/// Independently sourced revenue signals, as fetched. `None` means the query
/// failed or was rejected; values are raw and may contradict each other.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileInputs {
    pub total_revenue: Option<f64>,
    /// Per-flow attributed revenue, keyed by flow id.
    pub flow_revenue: Option<Vec<(String, f64)>>,
    /// Summed campaign conversion value under the relative-timeframe dialect.
    pub campaign_revenue: Option<f64>,
    /// Raw campaign revenue split by channel, when campaign data was measured.
    pub campaign_by_channel: Option<ChannelBreakdown>,
}

/// Internally consistent revenue rollup. Invariants hold on every emitted
/// value: `0 <= attributed <= total` (when total is known),
/// `flow + campaign == attributed`, `0 <= kav <= 100`, and the channel
/// breakdown sums to attributed revenue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueSnapshot {
    pub total_revenue: f64,
    pub attributed_revenue: f64,
    pub flow_revenue: f64,
    pub campaign_revenue: f64,
    pub kav_percentage: f64,
    pub channel_breakdown: ChannelBreakdown,
    pub validation_flags: Vec<ValidationFlag>,
}

impl RevenueSnapshot {
    pub fn is_fully_measured(&self) -> bool {
        self.validation_flags.is_empty()
    }
}

/// Combines the three independently sourced revenue signals into one
/// validated snapshot.
///
/// Never fails for data-quality reasons: contradictions are corrected via the
/// configured heuristics and each correction is recorded in
/// `validation_flags`.
pub fn reconcile(inputs: &ReconcileInputs, config: &ReconcilerConfig) -> RevenueSnapshot {
    let mut flags = Vec::new();

    let total = match inputs.total_revenue {
        Some(value) if value.is_finite() && value >= 0.0 => value,
        _ => {
            flags.push(ValidationFlag::TotalUnavailable);
            0.0
        }
    };

    let raw_flow_sum = inputs.flow_revenue.as_ref().map(|groups| {
        groups
            .iter()
            .map(|(_, value)| if value.is_finite() { value.max(0.0) } else { 0.0 })
            .sum::<f64>()
    });

    // A flow sum equal to total revenue means the grouping dimension silently
    // fell back to all revenue upstream. Discard the measurement.
    let degenerate_flow = matches!(
        raw_flow_sum,
        Some(sum) if total > 0.0 && (sum - total).abs() <= total * EQUALITY_TOLERANCE
    );

    let (mut flow, flow_measured) = match raw_flow_sum {
        Some(sum) if !degenerate_flow => (sum, true),
        _ => {
            flags.push(ValidationFlag::FlowEstimated);
            (config.flow_fallback_share * total, false)
        }
    };

    let (mut campaign, campaign_measured) = match inputs.campaign_revenue {
        Some(value) if value.is_finite() && value >= 0.0 => (value, true),
        _ => {
            flags.push(ValidationFlag::CampaignEstimated);
            (config.campaign_fallback_share * total, false)
        }
    };

    let mut attributed = flow + campaign;
    if attributed > total {
        let ceiling = config.attribution_ceiling.clamp(0.0, 1.0) * total;
        let scale = if attributed > 0.0 { ceiling / attributed } else { 0.0 };
        flow *= scale;
        campaign *= scale;
        attributed = flow + campaign;
        flags.push(ValidationFlag::RescaledOverCeiling);
    }

    let kav = if total > 0.0 {
        (attributed / total * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };

    let channel_breakdown = reconcile_channels(
        inputs,
        flow,
        campaign,
        attributed,
        flow_measured && campaign_measured,
        &mut flags,
    );

    RevenueSnapshot {
        total_revenue: total,
        attributed_revenue: attributed,
        flow_revenue: flow,
        campaign_revenue: campaign,
        kav_percentage: kav,
        channel_breakdown,
        validation_flags: flags,
    }
}

/// Forces the channel split to sum exactly to attributed revenue.
///
/// Flow revenue counts toward email: flows are triggered sequences and the
/// upstream grouping dimension does not expose a per-flow channel. Campaign
/// revenue uses the measured channel split when one exists.
fn reconcile_channels(
    inputs: &ReconcileInputs,
    flow: f64,
    campaign: f64,
    attributed: f64,
    fully_measured: bool,
    flags: &mut Vec<ValidationFlag>,
) -> ChannelBreakdown {
    let raw = match (&inputs.campaign_by_channel, fully_measured) {
        (Some(split), true) => ChannelBreakdown {
            email: flow + split.email.max(0.0),
            sms: split.sms.max(0.0),
        },
        _ => ChannelBreakdown {
            email: flow + campaign,
            sms: 0.0,
        },
    };

    let raw_total = raw.total();
    if raw_total <= 0.0 {
        return ChannelBreakdown::default();
    }

    let drift = (raw_total - attributed).abs();
    if drift > attributed.abs().max(1.0) * EQUALITY_TOLERANCE {
        flags.push(ValidationFlag::ChannelSplitRescaled);
    }

    let email = raw.email / raw_total * attributed;
    ChannelBreakdown {
        email,
        // Derived by subtraction so the split sums exactly.
        sms: attributed - email,
    }
}
