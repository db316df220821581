// src/intel/export.rs
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::intel::types::IntelReport;

/// Copy of `report` restricted to sources whose id contains `filter`
/// (case-insensitive). Totals and failures follow the restriction.
pub fn filter_report(report: &IntelReport, filter: Option<&str>) -> IntelReport {
    let needle = match filter.map(str::trim).filter(|f| !f.is_empty()) {
        Some(f) => f.to_ascii_lowercase(),
        None => return report.clone(),
    };
    let keep = |id: &str| id.contains(needle.as_str());

    let mut out = report.clone();
    out.items.retain(|id, _| keep(id.as_str()));
    out.failed.retain(|f| keep(f.source.as_str()));
    out.sources_attempted.retain(|id| keep(id.as_str()));
    out.total_items = out.items.values().map(Vec::len).sum();
    out
}

/// Write the (optionally filtered) report as pretty JSON via temp file + rename.
/// Returns the number of items written.
pub fn export_report(report: &IntelReport, path: &Path, filter: Option<&str>) -> Result<usize> {
    let filtered = filter_report(report, filter);
    let json = serde_json::to_string_pretty(&filtered).context("serializing report")?;

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating export directory {}", dir.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("moving {} into place at {}", tmp.display(), path.display()))?;

    tracing::info!(
        target: "intel",
        path = %path.display(),
        items = filtered.total_items,
        filter = filter.unwrap_or(""),
        "report exported"
    );
    Ok(filtered.total_items)
}
