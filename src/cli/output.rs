//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! plans, validation results and fingerprints in text or JSON.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::ValidationResult;
use crate::planner::{InstancePlan, PlacementPlan};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Instance plan row for table display.
#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Instance")]
    instance: String,
    #[tabled(rename = "AZ")]
    az: String,
    #[tabled(rename = "Index")]
    index: String,
    #[tabled(rename = "Reservations")]
    reservations: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Returns the selected output format.
    #[must_use]
    pub const fn format(&self) -> OutputFormat {
        self.format
    }

    /// Formats group plans for display.
    #[must_use]
    pub fn format_plans(&self, plans: &[PlacementPlan]) -> String {
        match self.format {
            OutputFormat::Json => {
                let json: Vec<GroupJson> = plans.iter().map(GroupJson::from).collect();
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => plans.iter().map(Self::format_plan_text).collect(),
        }
    }

    /// Formats one group plan as text.
    fn format_plan_text(plan: &PlacementPlan) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "\nInstance group: {}", plan.instance_group.bold());

        if plan.plans.is_empty() {
            output.push_str("   No instances desired or existing.\n");
            return output;
        }

        let rows: Vec<PlanRow> = plan
            .plans
            .iter()
            .enumerate()
            .map(|(i, p)| PlanRow {
                position: i + 1,
                action: Self::format_action(p),
                instance: p
                    .existing()
                    .map_or_else(|| String::from("(new)"), |e| e.id.clone()),
                az: p.az().unwrap_or("-").to_string(),
                index: p.index().map_or_else(|| String::from("-"), |i| i.to_string()),
                reservations: Self::format_reservations(p),
            })
            .collect();

        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        let _ = writeln!(
            output,
            "Plan: {} to create, {} to keep, {} to delete",
            plan.new_count().to_string().green(),
            plan.existing_count().to_string().yellow(),
            plan.obsolete_count().to_string().red()
        );
        output
    }

    /// Formats validation results for display.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "valid": result.is_valid(),
                    "errors": result.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "warnings": result.warnings,
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = String::new();
                if result.is_valid() {
                    let _ = writeln!(output, "{} Planning input is valid", "✓".green());
                } else {
                    for error in &result.errors {
                        let _ = writeln!(output, "{} {error}", "✗".red());
                    }
                }
                if show_warnings && !result.warnings.is_empty() {
                    output.push_str("\nWarnings:\n");
                    for warning in &result.warnings {
                        let _ = writeln!(output, "  {} {warning}", "⚠".yellow());
                    }
                }
                output
            }
        }
    }

    /// Formats input and plan fingerprints for display.
    #[must_use]
    pub fn format_digest(
        &self,
        input_hash: &str,
        plan_hash: &str,
        groups: &[(String, String)],
    ) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = DigestJson {
                    input: input_hash.to_string(),
                    plan: plan_hash.to_string(),
                    groups: groups
                        .iter()
                        .map(|(name, hash)| GroupDigestJson {
                            instance_group: name.clone(),
                            plan: hash.clone(),
                        })
                        .collect(),
                };
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = String::new();
                let _ = writeln!(output, "input  {input_hash}");
                let _ = writeln!(output, "plan   {plan_hash}");
                for (name, hash) in groups {
                    let _ = writeln!(output, "  {}  {name}", Self::truncate(hash, 11).dimmed());
                }
                output
            }
        }
    }

    /// Formats an error for display.
    #[must_use]
    pub fn format_error(&self, message: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "status": "error", "message": message });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => format!("{} {message}", "✗".red()),
        }
    }

    /// Formats an action with color.
    fn format_action(plan: &InstancePlan) -> String {
        match plan {
            InstancePlan::New { .. } => "+create".green().to_string(),
            InstancePlan::Existing { .. } => "=keep".yellow().to_string(),
            InstancePlan::Obsolete { .. } => "-delete".red().to_string(),
        }
    }

    fn format_reservations(plan: &InstancePlan) -> String {
        plan.reservations()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Truncates a string to a maximum length.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.len() <= max_len {
            s.to_string()
        } else {
            format!("{}...", &s[..max_len - 3])
        }
    }
}

// JSON serialization helpers

#[derive(serde::Serialize)]
struct GroupJson {
    instance_group: String,
    creates: usize,
    keeps: usize,
    deletes: usize,
    instances: Vec<InstanceJson>,
}

#[derive(serde::Serialize)]
struct InstanceJson {
    action: &'static str,
    instance: Option<String>,
    az: Option<String>,
    index: Option<u32>,
    reservations: Vec<String>,
}

#[derive(serde::Serialize)]
struct DigestJson {
    input: String,
    plan: String,
    groups: Vec<GroupDigestJson>,
}

#[derive(serde::Serialize)]
struct GroupDigestJson {
    instance_group: String,
    plan: String,
}

impl From<&PlacementPlan> for GroupJson {
    fn from(plan: &PlacementPlan) -> Self {
        Self {
            instance_group: plan.instance_group.clone(),
            creates: plan.new_count(),
            keeps: plan.existing_count(),
            deletes: plan.obsolete_count(),
            instances: plan.plans.iter().map(InstanceJson::from).collect(),
        }
    }
}

impl From<&InstancePlan> for InstanceJson {
    fn from(plan: &InstancePlan) -> Self {
        Self {
            action: plan.action(),
            instance: plan.existing().map(|e| e.id.clone()),
            az: plan.az().map(ToString::to_string),
            index: plan.index(),
            reservations: plan.reservations().iter().map(ToString::to_string).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{ExistingInstance, JobNetwork};

    fn plan() -> PlacementPlan {
        let existing = vec![
            ExistingInstance::new("web-0", "web", 0)
                .with_ip("default", "10.0.0.5".parse().unwrap()),
            ExistingInstance::new("web-1", "web", 1),
        ];
        PlacementPlan::build("web", 1, &existing, &[JobNetwork::dynamic("default")], None).unwrap()
    }

    #[test]
    fn test_format_plan_json() {
        let output = OutputFormatter::new(OutputFormat::Json).format_plans(&[plan()]);
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value[0]["instance_group"], "web");
        assert_eq!(value[0]["keeps"], 1);
        assert_eq!(value[0]["deletes"], 1);
        assert_eq!(value[0]["instances"][0]["action"], "keep");
        assert_eq!(value[0]["instances"][0]["reservations"][0], "default~10.0.0.5");
        assert_eq!(value[0]["instances"][1]["instance"], "web-1");
    }

    #[test]
    fn test_format_plan_text() {
        colored::control::set_override(false);
        let output = OutputFormatter::new(OutputFormat::Text).format_plans(&[plan()]);

        assert!(output.contains("Instance group: web"));
        assert!(output.contains("web-0"));
        assert!(output.contains("Plan: 0 to create, 1 to keep, 1 to delete"));
    }

    #[test]
    fn test_format_validation_json() {
        let result = ValidationResult {
            errors: vec![],
            warnings: vec![String::from("No instance groups defined")],
        };
        let output = OutputFormatter::new(OutputFormat::Json).format_validation(&result, true);
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value["valid"], true);
        assert_eq!(value["warnings"][0], "No instance groups defined");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(OutputFormatter::truncate("abc", 5), "abc");
        assert_eq!(OutputFormatter::truncate("abcdef1234567890", 11), "abcdef12...");
    }
}
