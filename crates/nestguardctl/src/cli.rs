use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use nestguard_core::{
    AgeGroup, AuditEventType, Direction, RiskLevel, RuleAction, RuleCategory, Severity,
};
use nestguard_filter::ExportFormat;

use crate::commands;
use crate::output::OutputFormat;

/// NestGuard CLI - check text, manage safety rules, read audit logs
#[derive(Parser, Debug)]
#[command(name = "nestguardctl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// GuardConfig file (overrides NESTGUARD_CONFIG env var)
    ///
    /// Without a config the built-in rule catalog and defaults are used.
    #[arg(long, short = 'c', global = true, env = "NESTGUARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a piece of text the way the gateway would
    Check {
        /// Text to validate
        text: String,

        /// Age group to validate for (child, teen, adult)
        #[arg(short, long, default_value = "child")]
        age: AgeGroup,

        /// input (said by the child) or output (said by the device)
        #[arg(short, long, default_value = "input")]
        direction: Direction,

        /// Output format (text, json, yaml)
        #[arg(short, long, value_enum, default_value = "text")]
        output: OutputFormat,
    },

    /// Inspect, export and test safety rules
    Rules {
        #[command(subcommand)]
        command: RulesCommand,
    },

    /// Read a persisted (JSON-lines) audit log
    Audit {
        #[command(subcommand)]
        command: AuditCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum RulesCommand {
    /// List rules
    List {
        /// Only rules of this category (profanity, topic, harmful_instruction, custom)
        #[arg(long)]
        category: Option<RuleCategory>,

        /// Only rules applying to this age group
        #[arg(long)]
        age: Option<AgeGroup>,

        #[arg(short, long, value_enum, default_value = "text")]
        output: OutputFormat,
    },

    /// Export rules, policies and topics as a configuration document
    Export {
        /// Document format (yaml, json)
        #[arg(short, long, default_value = "yaml")]
        format: ExportFormat,

        /// Write to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Validate a configuration document without applying it anywhere
    Validate {
        /// Document to validate (YAML or JSON)
        file: PathBuf,
    },

    /// Dry-run a pattern against labelled samples
    Test {
        /// Regular expression to test
        #[arg(long)]
        pattern: String,

        #[arg(long, default_value = "block")]
        action: RuleAction,

        #[arg(long, default_value = "medium")]
        severity: Severity,

        /// Sample that should match (repeatable)
        #[arg(long = "match")]
        matching: Vec<String>,

        /// Sample that should not match (repeatable)
        #[arg(long = "no-match")]
        non_matching: Vec<String>,

        #[arg(short, long, value_enum, default_value = "text")]
        output: OutputFormat,
    },
}

#[derive(Subcommand, Debug)]
pub enum AuditCommand {
    /// Aggregate report over an audit file
    Report {
        /// JSON-lines audit file
        file: PathBuf,

        /// Only this user
        #[arg(long)]
        user: Option<String>,

        /// Only entries at or after this RFC 3339 timestamp
        #[arg(long)]
        since: Option<DateTime<Utc>>,

        #[arg(short, long, value_enum, default_value = "text")]
        output: OutputFormat,
    },

    /// List entries from an audit file
    List {
        /// JSON-lines audit file
        file: PathBuf,

        #[arg(long)]
        user: Option<String>,

        /// Only these event types (repeatable)
        #[arg(long = "event")]
        events: Vec<AuditEventType>,

        /// Only entries at or above this risk level
        #[arg(long)]
        min_risk: Option<RiskLevel>,

        /// Keep only the most recent N entries
        #[arg(long)]
        limit: Option<usize>,

        #[arg(short, long, value_enum, default_value = "text")]
        output: OutputFormat,
    },
}

impl Cli {
    pub async fn execute(self) -> anyhow::Result<()> {
        let config = self.config.as_deref();

        match self.command {
            Commands::Check {
                text,
                age,
                direction,
                output,
            } => commands::check::execute(config, &text, age, direction, output).await,
            Commands::Rules { command } => match command {
                RulesCommand::List {
                    category,
                    age,
                    output,
                } => commands::rules::list(config, category, age, output).await,
                RulesCommand::Export { format, out } => {
                    commands::rules::export(config, format, out.as_deref()).await
                }
                RulesCommand::Validate { file } => commands::rules::validate(&file).await,
                RulesCommand::Test {
                    pattern,
                    action,
                    severity,
                    matching,
                    non_matching,
                    output,
                } => {
                    commands::rules::test(&pattern, action, severity, &matching, &non_matching, output)
                }
            },
            Commands::Audit { command } => match command {
                AuditCommand::Report {
                    file,
                    user,
                    since,
                    output,
                } => commands::audit::report(&file, user.as_deref(), since, output).await,
                AuditCommand::List {
                    file,
                    user,
                    events,
                    min_risk,
                    limit,
                    output,
                } => commands::audit::list(&file, user, events, min_risk, limit, output).await,
            },
        }
    }
}
