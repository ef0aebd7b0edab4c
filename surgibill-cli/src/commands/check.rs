//! Check command - audit the stored rule set

use std::sync::Arc;

use anyhow::{bail, Result};
use colored::Colorize;
use comfy_table::{Cell, Color};
use serde_json::Value;

use surgibill_core::services::LoggingService;

use super::get_context;
use crate::output;

/// Format a detail JSON value for display
fn format_detail(value: &Value) -> String {
    match value {
        Value::Object(map) => map
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| match v {
                Value::String(s) => format!("{}: {}", k, s),
                _ => format!("{}: {}", k, v),
            })
            .collect::<Vec<_>>()
            .join(", "),
        Value::String(s) => s.clone(),
        _ => value.to_string(),
    }
}

pub fn run(verbose: bool, json: bool, logger: &Option<Arc<LoggingService>>) -> Result<()> {
    let ctx = get_context(logger)?;
    let report = ctx.integrity_service.run_checks()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", "Rule Set Integrity Check".bold());
        println!();

        let mut names: Vec<&String> = report.checks.keys().collect();
        names.sort();

        let mut table = output::create_table();
        table.set_header(vec!["Check", "Status", "Message"]);
        for name in names {
            let check = &report.checks[name];
            let status_cell = match check.status.as_str() {
                "pass" => Cell::new("PASS").fg(Color::Green),
                "warning" => Cell::new("WARN").fg(Color::Yellow),
                "error" => Cell::new("ERROR").fg(Color::Red),
                _ => Cell::new(&check.status),
            };
            table.add_row(vec![Cell::new(name), status_cell, Cell::new(&check.message)]);

            if verbose {
                for detail in check.details.iter().flatten() {
                    table.add_row(vec![
                        Cell::new(""),
                        Cell::new(""),
                        Cell::new(format!("  - {}", format_detail(detail))),
                    ]);
                }
            }
        }
        println!("{}", table);
        println!();

        println!(
            "Summary: {} passed, {} warnings, {} errors",
            report.summary.passed.to_string().green(),
            report.summary.warnings.to_string().yellow(),
            report.summary.errors.to_string().red(),
        );
    }

    if !report.is_healthy() {
        bail!("{} integrity check(s) failed", report.summary.errors);
    }
    Ok(())
}
