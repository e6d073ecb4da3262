use std::collections::HashMap;
use std::fmt::Write;

use crate::models::{AlertTier, HistoryRecord, ScoringResult, ZoneSummary};
use crate::risk;

pub fn summarize_by_zone(history: &[HistoryRecord]) -> Vec<ZoneSummary> {
    let mut map: HashMap<String, (usize, f64, f64)> = HashMap::new();

    for record in history {
        let entry = map.entry(record.zone_name.clone()).or_insert((0, 0.0, 0.0));
        entry.0 += 1;
        entry.1 += record.probability;
        entry.2 = entry.2.max(record.probability);
    }

    let mut summaries: Vec<ZoneSummary> = map
        .into_iter()
        .map(|(zone_name, (count, total, max_probability))| ZoneSummary {
            zone_name,
            count,
            avg_probability: if count == 0 { 0.0 } else { total / count as f64 },
            max_probability,
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.max_probability
            .total_cmp(&a.max_probability)
            .then_with(|| a.zone_name.cmp(&b.zone_name))
    });
    summaries
}

pub fn conclusion(tier: AlertTier) -> &'static str {
    match tier {
        AlertTier::Critical => "RED ALERT: emergency plan recommended.",
        AlertTier::Vigilance => "VIGILANCE: increased monitoring.",
        AlertTier::Normal => "NORMAL: no action required.",
    }
}

pub fn build_report(result: &ScoringResult, history: &[HistoryRecord]) -> String {
    let mut output = String::new();
    let features = &result.features;
    let profile = risk::factor_profile(features);

    let _ = writeln!(output, "# Flood Risk Assessment: {}", result.zone_name);
    let _ = writeln!(
        output,
        "Generated {}",
        result.timestamp.format("%d/%m/%Y %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Assessment");
    let _ = writeln!(output, "- Risk index: {:.1}%", result.probability * 100.0);
    let _ = writeln!(output, "- Alert level: {}", result.alert_tier);
    let _ = writeln!(output, "- Rainfall: {} mm/h", features.rainfall_mm);
    let _ = writeln!(output, "- Water level: {} m", features.river_level_m);
    let _ = writeln!(output, "- Soil saturation: {}%", features.soil_moisture_pct);
    let _ = writeln!(
        output,
        "- Estimated exposed population: {} people",
        result.exposed_population
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "**Conclusion:** {}", conclusion(result.alert_tier));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Contributing Factors");
    let _ = writeln!(output, "- Rainfall: {:.1}", profile.rainfall);
    let _ = writeln!(output, "- Water level: {:.1}", profile.river_level);
    let _ = writeln!(output, "- Soil saturation: {:.1}", profile.soil_saturation);
    let _ = writeln!(output, "- Drainage deficit: {:.1}", profile.drainage_deficit);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Assessments");

    if history.is_empty() {
        let _ = writeln!(output, "No assessments recorded yet.");
    } else {
        for record in history.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} {}: {:.1}% ({} mm/h)",
                record.timestamp.format("%Y-%m-%d %H:%M"),
                record.zone_name,
                record.probability * 100.0,
                record.rainfall_mm
            );
        }
    }

    let summaries = summarize_by_zone(history);
    if !summaries.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Zones In History");
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} assessments (avg {:.1}%, peak {:.1}%)",
                summary.zone_name,
                summary.count,
                summary.avg_probability * 100.0,
                summary.max_probability * 100.0
            );
        }
    }

    output
}
