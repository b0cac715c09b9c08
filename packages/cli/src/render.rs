//! Plain-text rendering shared by the subcommands and the interactive
//! session.

use housing_stress_scenario_models::{AreaRecord, PredictionOutcome, ScenarioAdjustment};

/// Formats a resolution outcome for the terminal.
#[must_use]
pub fn format_outcome(outcome: &PredictionOutcome) -> String {
    match outcome {
        PredictionOutcome::Success {
            predicted_housing_stress_index,
            path,
            feature_count,
        } => format!(
            "Predicted Housing Stress Index: {predicted_housing_stress_index:.2}% \
             ({path} model, {feature_count} features)"
        ),
        PredictionOutcome::Error { kind, message } => format!("Error ({kind}): {message}"),
    }
}

/// Summarises the non-zero deltas of an adjustment.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn format_adjustment(adjustment: &ScenarioAdjustment) -> String {
    let deltas = [
        ("income", adjustment.income_adj, "$/wk"),
        ("rent", adjustment.rent_adj, "$/wk"),
        ("mortgage", adjustment.mortgage_adj, "$/wk"),
        ("unemployment", adjustment.unemployment_adj, "pts"),
        ("mining workforce", adjustment.mining_pct_adj, "%"),
    ];

    let parts: Vec<String> = deltas
        .iter()
        .filter(|(_, delta, _)| *delta != 0.0)
        .map(|(label, delta, unit)| format!("{label} {delta:+} {unit}"))
        .collect();

    if parts.is_empty() {
        "baseline (no adjustments)".to_string()
    } else {
        parts.join(", ")
    }
}

/// One table row for an area listing.
#[must_use]
pub fn format_area_row(area: &AreaRecord) -> String {
    let stress = area
        .housing_stress_index
        .map_or_else(|| "-".to_string(), |v| format!("{v:.2}"));
    let centroid = area.centroid.map_or_else(
        || "-".to_string(),
        |c| format!("{:.4}, {:.4}", c.latitude, c.longitude),
    );
    format!(
        "{:<12} {:<32} {:>8} {:>22}",
        area.area_id,
        truncate(&area.name, 32),
        stress,
        centroid
    )
}

/// Header matching [`format_area_row`].
#[must_use]
pub fn area_header() -> String {
    format!("{:<12} {:<32} {:>8} {:>22}", "ID", "NAME", "STRESS", "CENTROID")
}

/// Shortens `text` to at most `width` characters, marking the cut.
#[must_use]
pub fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let kept: String = text.chars().take(width.saturating_sub(3)).collect();
    format!("{kept}...")
}
