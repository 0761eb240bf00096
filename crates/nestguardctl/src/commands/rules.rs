use anyhow::Context as _;
use std::path::Path;

use nestguard_core::{AgeGroup, RuleAction, RuleCategory, RuleDraft, Severity};
use nestguard_filter::{
    ConfigurationDocument, ExportFormat, RuleFilter, RuleStore, TestSample,
};

use super::{load_spec, load_store};
use crate::output::{print_structured, table, truncate, OutputFormat};

pub async fn list(
    config: Option<&Path>,
    category: Option<RuleCategory>,
    age: Option<AgeGroup>,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let spec = load_spec(config)?;
    let store = load_store(&spec).await?;

    let filter = RuleFilter {
        category,
        age_group: age,
        ..Default::default()
    };
    let rules = store.get_rules(&filter);

    if print_structured(&rules, output)? {
        return Ok(());
    }

    let mut t = table(&["ID", "NAME", "CATEGORY", "ACTION", "SEVERITY", "AGES", "VER", "ENABLED"]);
    for rule in &rules {
        let ages: Vec<String> = rule.age_groups.iter().map(|a| a.to_string()).collect();
        t.add_row(vec![
            truncate(&rule.id, 24),
            truncate(&rule.name, 28),
            rule.category.to_string(),
            rule.action.to_string(),
            rule.severity.to_string(),
            ages.join(","),
            rule.version.to_string(),
            rule.enabled.to_string(),
        ]);
    }
    println!("{}", t);
    println!("{} rule(s), rule set version {}", rules.len(), store.version());
    Ok(())
}

pub async fn export(config: Option<&Path>, format: ExportFormat, out: Option<&Path>) -> anyhow::Result<()> {
    let spec = load_spec(config)?;
    let store = load_store(&spec).await?;
    let rendered = store.export(format)?;

    match out {
        Some(path) => {
            tokio::fs::write(path, rendered)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!("exported rule set version {} to {}", store.version(), path.display());
        }
        None => print!("{}", rendered),
    }
    Ok(())
}

pub async fn validate(file: &Path) -> anyhow::Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;

    let doc = ConfigurationDocument::parse(&text)?;
    doc.verify()?;
    let checksum = doc.checksum.clone();
    let (rule_count, policy_count, topic_count) = (doc.rules.len(), doc.policies.len(), doc.topics.len());

    // Loading compiles every pattern and resolves every topic reference
    let store = RuleStore::from_document(doc)?;

    println!(
        "valid: {} rule(s), {} polic(ies), {} topic(s)",
        rule_count, policy_count, topic_count
    );
    match checksum {
        Some(sum) => println!("checksum: {} (verified)", sum),
        None => println!("checksum: none"),
    }

    let conflicts = store.conflicts();
    for conflict in &conflicts {
        println!("warning: {}", conflict);
    }
    Ok(())
}

pub fn test(
    pattern: &str,
    action: RuleAction,
    severity: Severity,
    matching: &[String],
    non_matching: &[String],
    output: OutputFormat,
) -> anyhow::Result<()> {
    let draft = RuleDraft::new("cli-test", pattern, action, severity);
    let samples: Vec<TestSample> = matching
        .iter()
        .map(|s| TestSample::matching(s.as_str()))
        .chain(non_matching.iter().map(|s| TestSample::non_matching(s.as_str())))
        .collect();

    let report = RuleStore::new().test_rule(&draft, &samples)?;

    if print_structured(&report, output)? {
        return Ok(());
    }

    let mut t = table(&["SAMPLE", "EXPECTED", "MATCHED", "OK"]);
    for result in &report.results {
        t.add_row(vec![
            truncate(&result.content, 48),
            result.expected_match.to_string(),
            result.matched.to_string(),
            if result.is_correct() { "yes" } else { "NO" }.to_string(),
        ]);
    }
    println!("{}", t);
    println!(
        "accuracy {:.2}  precision {:.2}  recall {:.2}",
        report.accuracy, report.precision, report.recall
    );
    Ok(())
}
