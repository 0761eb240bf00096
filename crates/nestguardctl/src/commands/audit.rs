use anyhow::Context as _;
use chrono::{DateTime, Utc};
use std::path::Path;

use nestguard_audit::{read_entries, AuditLog, DEFAULT_MAX_ENTRIES};
use nestguard_core::{AuditEventType, AuditFilter, RiskLevel, TimeRange};

use crate::output::{print_structured, table, truncate, OutputFormat};

/// Load a JSON-lines audit file into an in-memory log
async fn load_log(file: &Path) -> anyhow::Result<AuditLog> {
    let entries = read_entries(file)
        .await
        .with_context(|| format!("reading audit file {}", file.display()))?;
    tracing::debug!(entries = entries.len(), file = %file.display(), "loaded audit entries");
    let capacity = entries.len().max(DEFAULT_MAX_ENTRIES);
    Ok(AuditLog::from_entries(capacity, entries))
}

pub async fn report(
    file: &Path,
    user: Option<&str>,
    since: Option<DateTime<Utc>>,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let log = load_log(file).await?;
    let range = since.map(TimeRange::since).unwrap_or_else(TimeRange::all);
    let report = log.generate_report(&range, user);

    if print_structured(&report, output)? {
        return Ok(());
    }

    println!("Safety report ({})", user.unwrap_or("all users"));
    let mut t = table(&["METRIC", "VALUE"]);
    let rows: [(&str, String); 12] = [
        ("events", report.total_events.to_string()),
        ("validations", report.validations.to_string()),
        ("allowed", report.allowed.to_string()),
        ("blocked", report.blocked.to_string()),
        ("sanitized", report.sanitized.to_string()),
        ("block rate", format!("{:.1}%", report.block_rate * 100.0)),
        ("exceptions applied", report.exceptions_applied.to_string()),
        ("review requests", report.review_requests.to_string()),
        ("parental decisions", report.parental_decisions.to_string()),
        ("reviews expired", report.reviews_expired.to_string()),
        ("errors", report.errors.to_string()),
        ("users", report.unique_users.to_string()),
    ];
    for (name, value) in rows {
        t.add_row(vec![name.to_string(), value]);
    }
    println!("{}", t);

    if !report.top_blocked_reasons.is_empty() {
        let mut reasons = table(&["BLOCKED REASON", "COUNT"]);
        for (reason, count) in &report.top_blocked_reasons {
            reasons.add_row(vec![truncate(reason, 60), count.to_string()]);
        }
        println!("{}", reasons);
    }
    Ok(())
}

pub async fn list(
    file: &Path,
    user: Option<String>,
    events: Vec<AuditEventType>,
    min_risk: Option<RiskLevel>,
    limit: Option<usize>,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let log = load_log(file).await?;
    let filter = AuditFilter {
        user_id: user,
        event_types: events,
        min_risk,
        limit,
        ..Default::default()
    };
    let entries = log.query(&filter, &TimeRange::all());

    if print_structured(&entries, output)? {
        return Ok(());
    }

    let mut t = table(&["SEQ", "TIME", "USER", "EVENT", "RISK", "CONTENT", "REASONS"]);
    for entry in &entries {
        t.add_row(vec![
            entry.sequence.to_string(),
            entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            truncate(&entry.user_id, 16),
            entry.event_type.to_string(),
            entry.risk_level.to_string(),
            truncate(&entry.original_content, 40),
            truncate(&entry.blocked_reasons.join("; "), 40),
        ]);
    }
    println!("{}", t);
    println!("{} entr(ies)", entries.len());
    Ok(())
}
