use crate::orchestrator::{PluginOutcome, RunReport, Verdict};

/// Render a run report as a plain-text summary table.
pub fn render(report: &RunReport) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "\n  Target: {} ({} plugin(s), {} poll cycle(s))\n\n",
        report.target,
        report.plugins.len(),
        report.poll_cycles
    ));

    output.push_str(&format!(
        "  {:<20} {:<10} {:<10} {:<10} MESSAGE\n",
        "PLUGIN", "QUEUE", "COLOR", "RESULT"
    ));
    output.push_str(&format!("  {}\n", "-".repeat(70)));

    for plugin in &report.plugins {
        output.push_str(&format!("  {}\n", plugin_row(plugin)));
        if let Some(scan) = &plugin.scan {
            output.push_str(&format!("  {:<20} {}\n", "", scan.result_url));
        }
    }

    let tag = match report.verdict {
        Verdict::Success => "PASS",
        Verdict::Unstable => "UNSTABLE",
        Verdict::Failure => "FAIL",
        Verdict::Aborted => "ABORTED",
    };
    output.push_str(&format!(
        "\n  Result: {} ({}, {})\n\n",
        tag, report.verdict, report.end
    ));

    output
}

fn plugin_row(plugin: &PluginOutcome) -> String {
    let queue = plugin
        .queue
        .map(|q| q.to_string())
        .unwrap_or_else(|| "-".into());
    let (color, message) = match &plugin.scan {
        Some(scan) => (scan.status_color.to_string(), scan.message.as_str()),
        None => ("-".into(), plugin.error.as_deref().unwrap_or("")),
    };
    let verdict = plugin
        .verdict
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".into());

    format!(
        "{:<20} {:<10} {:<10} {:<10} {}",
        plugin.name, queue, color, verdict, message
    )
}
