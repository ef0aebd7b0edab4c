//! Resolve command - find the rule that applies to a billing query

use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use clap::Args;
use colored::Colorize;
use comfy_table::{Cell, Color};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

use surgibill_core::services::LoggingService;
use surgibill_core::{ResolutionQuery, ResolvedRule, RuleKind};

use super::{block_on, business_unit, get_context};
use crate::output;

#[derive(Args)]
pub struct ResolveArgs {
    /// Rule kind (credit_note, doctor_assignment)
    #[arg(long, default_value = "credit_note")]
    kind: RuleKind,
    #[arg(long)]
    business_unit: Option<String>,
    #[arg(long)]
    hospital: Option<Uuid>,
    /// Doctor (assignment queries only)
    #[arg(long)]
    doctor: Option<Uuid>,
    #[arg(long)]
    payment_type: Option<Uuid>,
    #[arg(long)]
    category: Option<Uuid>,
    #[arg(long)]
    procedure: Option<Uuid>,
    /// Evaluation date (YYYY-MM-DD, default today)
    #[arg(long)]
    date: Option<NaiveDate>,
    /// Base amount to compute the fee for
    #[arg(long)]
    amount: Option<Decimal>,
    /// Show every candidate considered
    #[arg(long)]
    explain: bool,
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

impl ResolveArgs {
    fn query(&self, business_unit: String) -> ResolutionQuery {
        let mut query = ResolutionQuery::new(self.kind, business_unit);
        query.hospital = self.hospital;
        query.doctor = self.doctor;
        query.dimensions.payment_type = self.payment_type;
        query.dimensions.surgical_category = self.category;
        query.dimensions.procedure = self.procedure;
        query
    }
}

pub fn run(args: ResolveArgs, logger: &Option<Arc<LoggingService>>) -> Result<()> {
    let ctx = get_context(logger)?;
    let query = args.query(business_unit(&ctx, args.business_unit.clone())?);
    let service = &ctx.resolution_service;

    if args.explain {
        let trace = block_on(service.explain(&query, args.date))??;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&trace)?);
            return Ok(());
        }

        println!(
            "{}",
            format!("Candidates for {} on {}", query.kind, trace.evaluation_date).bold()
        );
        if trace.candidates.is_empty() {
            println!("No rule matches these dimensions.");
        } else {
            let winner = trace.resolved.as_ref().map(|r| r.rule.id);
            let mut table = output::create_table();
            table.set_header(vec!["", "ID", "Pattern", "Value", "Priority", "Valid", "On date"]);
            for candidate in &trace.candidates {
                let marker = if Some(candidate.rule_id) == winner {
                    Cell::new("*").fg(Color::Green)
                } else {
                    Cell::new("")
                };
                let on_date = if candidate.valid_on_date {
                    Cell::new("yes").fg(Color::Green)
                } else {
                    Cell::new("no").fg(Color::DarkGrey)
                };
                table.add_row(vec![
                    marker,
                    Cell::new(candidate.rule_id),
                    Cell::new(&candidate.pattern),
                    Cell::new(&candidate.value),
                    Cell::new(candidate.priority),
                    Cell::new(format!(
                        "{} to {}",
                        candidate.validity.from(),
                        candidate.validity.to()
                    )),
                    on_date,
                ]);
            }
            println!("{}", table);
        }
        println!();
        print_outcome(trace.resolved.as_ref(), args.amount);
        return Ok(());
    }

    let resolved = block_on(service.resolve(&query, args.date))??;
    if args.json {
        let fee = match (&resolved, args.amount) {
            (Some(r), Some(amount)) => Some(r.rule.value.apply(amount)),
            _ => None,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "resolved": resolved, "fee": fee }))?
        );
        return Ok(());
    }
    print_outcome(resolved.as_ref(), args.amount);
    Ok(())
}

fn print_outcome(resolved: Option<&ResolvedRule>, amount: Option<Decimal>) {
    let Some(resolved) = resolved else {
        output::warning("No applicable rule");
        return;
    };

    output::print_rule(&resolved.rule);
    if resolved.is_ambiguous() {
        output::warning(&format!(
            "Warning: {} other rule(s) share priority {}; picked the most recently updated",
            resolved.tied_with.len(),
            resolved.rule.priority()
        ));
        for id in &resolved.tied_with {
            output::warning(&format!("  tied with {}", id));
        }
    }
    if let Some(amount) = amount {
        output::success(&format!("Fee on {}: {}", amount, resolved.rule.value.apply(amount)));
    }
}
