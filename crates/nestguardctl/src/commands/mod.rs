pub mod audit;
pub mod check;
pub mod rules;

use anyhow::Context as _;
use std::path::Path;

use nestguard_core::{GuardConfig, GuardSpec};
use nestguard_filter::{ConfigurationDocument, RuleStore};

/// Engine settings from `--config`, or defaults
pub fn load_spec(config: Option<&Path>) -> anyhow::Result<GuardSpec> {
    match config {
        Some(path) => {
            let config = GuardConfig::from_yaml_file(path)
                .with_context(|| format!("loading config {}", path.display()))?;
            tracing::info!(name = config.name(), "loaded config");
            Ok(config.spec)
        }
        None => Ok(GuardSpec::default()),
    }
}

/// Rule store from the config's rules file, or the built-in catalog
pub async fn load_store(spec: &GuardSpec) -> anyhow::Result<RuleStore> {
    match spec.rules_file {
        Some(ref path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading rules file {}", path))?;
            let doc = ConfigurationDocument::parse(&text)?;
            Ok(RuleStore::from_document(doc)?)
        }
        None => Ok(RuleStore::with_defaults()),
    }
}
