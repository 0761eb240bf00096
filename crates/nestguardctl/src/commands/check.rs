use comfy_table::Cell;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use nestguard_core::{AgeGroup, Direction, ValidationVerdict};
use nestguard_runtime::{InMemoryUserDirectory, SafetyGateway};

use super::{load_spec, load_store};
use crate::output::{print_structured, table, OutputFormat};

/// Identity the CLI validates as
const CLI_USER: &str = "nestguardctl";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckResult {
    age_group: AgeGroup,
    direction: Direction,
    verdict: ValidationVerdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refusal_message: Option<String>,
    parental_review_required: bool,
}

pub async fn execute(
    config: Option<&Path>,
    text: &str,
    age: AgeGroup,
    direction: Direction,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let spec = load_spec(config)?;
    let store = load_store(&spec).await?;

    let gateway = SafetyGateway::builder(spec)
        .rule_store(Arc::new(store))
        .user_directory(Arc::new(InMemoryUserDirectory::new().with_user(CLI_USER, age)))
        .build();

    let decision = match direction {
        Direction::Input => gateway.validate_input(text, CLI_USER),
        Direction::Output => gateway.validate_output(text, CLI_USER),
    };

    let result = CheckResult {
        age_group: age,
        direction,
        parental_review_required: decision.review_request_id.is_some(),
        verdict: decision.verdict,
        text: decision.text,
        refusal_message: decision.refusal_message,
    };

    if print_structured(&result, output)? {
        return Ok(());
    }

    let status = if result.verdict.allowed { "ALLOWED" } else { "BLOCKED" };
    println!(
        "{} ({} {}, risk {}, confidence {:.2})",
        status, age, direction, result.verdict.risk_level, result.verdict.confidence
    );

    if !result.verdict.violations.is_empty() {
        let mut t = table(&["TYPE", "SEVERITY", "DESCRIPTION", "RULE"]);
        for v in &result.verdict.violations {
            t.add_row(vec![
                Cell::new(v.kind),
                Cell::new(v.severity),
                Cell::new(&v.description),
                Cell::new(v.rule_id.as_deref().unwrap_or("-")),
            ]);
        }
        println!("{}", t);
    }
    if !result.verdict.flags.is_empty() {
        println!("flags: {}", result.verdict.flags.join(", "));
    }

    match (&result.text, &result.refusal_message) {
        (Some(text), _) if direction == Direction::Output => println!("speak: {}", text),
        (_, Some(refusal)) => println!("reply: {}", refusal),
        _ => {}
    }
    if result.parental_review_required {
        println!("parental review would be requested");
    }
    Ok(())
}
