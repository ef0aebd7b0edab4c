//! Rule commands - create, update, inspect and retire rules

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Subcommand};
use colored::Colorize;
use dialoguer::Confirm;
use rust_decimal::Decimal;
use uuid::Uuid;

use surgibill_core::services::LoggingService;
use surgibill_core::{ChargeType, RuleDraft, RuleFilter, RuleKind};

use super::{block_on, business_unit, get_context};
use crate::output;

#[derive(Subcommand)]
pub enum RuleCommands {
    /// Create a rule
    Add {
        /// Rule kind (credit_note, doctor_assignment)
        #[arg(long)]
        kind: RuleKind,
        #[command(flatten)]
        fields: RuleFields,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update a rule; unspecified fields keep their current value
    Update {
        /// Rule ID
        id: Uuid,
        #[command(flatten)]
        fields: RuleFields,
        /// Clear the payment type so the rule matches any
        #[arg(long, conflicts_with = "payment_type")]
        any_payment_type: bool,
        /// Clear the surgical category so the rule matches any
        #[arg(long, conflicts_with = "category")]
        any_category: bool,
        /// Clear the procedure so the rule matches any
        #[arg(long, conflicts_with = "procedure")]
        any_procedure: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create or update a rule from a JSON document
    Apply {
        /// JSON file (reads stdin when omitted)
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a single rule
    Show {
        /// Rule ID
        id: Uuid,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List rules
    List {
        #[arg(long)]
        business_unit: Option<String>,
        #[arg(long)]
        hospital: Option<Uuid>,
        #[arg(long)]
        kind: Option<RuleKind>,
        /// Include inactive rules
        #[arg(long)]
        all: bool,
        #[arg(long, default_value = "1")]
        page: u32,
        #[arg(long, default_value = "20")]
        page_size: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Deactivate a rule
    Deactivate {
        /// Rule ID
        id: Uuid,
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Reactivate a rule (checked for conflicts again)
    Activate {
        /// Rule ID
        id: Uuid,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Rule fields shared by add and update
#[derive(Args)]
pub struct RuleFields {
    #[arg(long)]
    business_unit: Option<String>,
    #[arg(long)]
    hospital: Option<Uuid>,
    /// Doctor (assignment rules only)
    #[arg(long)]
    doctor: Option<Uuid>,
    #[arg(long)]
    payment_type: Option<Uuid>,
    #[arg(long)]
    category: Option<Uuid>,
    #[arg(long)]
    procedure: Option<Uuid>,
    /// Credit-note percentage (0-100)
    #[arg(long)]
    percentage: Option<Decimal>,
    /// Assignment charge type (percentage, fixed)
    #[arg(long)]
    charge_type: Option<ChargeType>,
    #[arg(long)]
    charge_value: Option<Decimal>,
    /// First valid day (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,
    /// First day no longer valid (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,
}

impl RuleFields {
    /// Overlay the given flags onto `draft`
    fn apply_to(self, draft: &mut RuleDraft) {
        if self.business_unit.is_some() {
            draft.business_unit = self.business_unit;
        }
        draft.hospital = self.hospital.or(draft.hospital);
        draft.doctor = self.doctor.or(draft.doctor);
        draft.payment_type = self.payment_type.or(draft.payment_type);
        draft.surgical_category = self.category.or(draft.surgical_category);
        draft.procedure = self.procedure.or(draft.procedure);
        draft.percentage = self.percentage.or(draft.percentage);
        draft.charge_type = self.charge_type.or(draft.charge_type);
        draft.charge_value = self.charge_value.or(draft.charge_value);
        draft.validity_from = self.from.or(draft.validity_from);
        draft.validity_to = self.to.or(draft.validity_to);
    }
}

pub fn run(command: RuleCommands, logger: &Option<Arc<LoggingService>>) -> Result<()> {
    let ctx = get_context(logger)?;
    let actor = ctx.config.actor.clone();
    let service = &ctx.rule_service;

    match command {
        RuleCommands::Add { kind, fields, json } => {
            let mut draft = RuleDraft {
                kind: Some(kind),
                ..Default::default()
            };
            let flag_bu = fields.business_unit.clone();
            fields.apply_to(&mut draft);
            draft.business_unit = Some(business_unit(&ctx, flag_bu)?);

            let rule = block_on(service.upsert(draft, actor.as_deref()))??;
            if json {
                return output::print_ok_json(&rule);
            }
            output::success(&format!("Created rule {}", rule.id));
            output::print_rule(&rule);
        }
        RuleCommands::Update {
            id,
            fields,
            any_payment_type,
            any_category,
            any_procedure,
            json,
        } => {
            let existing = block_on(service.get(id))??;
            let mut draft = RuleDraft::from_rule(&existing);
            fields.apply_to(&mut draft);
            if any_payment_type {
                draft.payment_type = None;
            }
            if any_category {
                draft.surgical_category = None;
            }
            if any_procedure {
                draft.procedure = None;
            }

            let rule = block_on(service.upsert(draft, actor.as_deref()))??;
            if json {
                return output::print_ok_json(&rule);
            }
            output::success(&format!("Updated rule {}", rule.id));
            if rule.priority() != existing.priority() {
                output::info(&format!(
                    "Priority {} -> {}",
                    existing.priority(),
                    rule.priority()
                ));
            }
            output::print_rule(&rule);
        }
        RuleCommands::Apply { file, json } => {
            let content = if let Some(path) = file {
                std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?
            } else if atty::isnt(atty::Stream::Stdin) {
                let mut buf = String::new();
                std::io::stdin().read_to_string(&mut buf)?;
                buf
            } else {
                bail!("Provide a rule document with --file or on stdin");
            };

            let mut draft: RuleDraft =
                serde_json::from_str(&content).context("Invalid rule document")?;
            if draft.business_unit.is_none() {
                draft.business_unit = ctx.config.business_unit.clone();
            }
            let is_update = draft.id.is_some();

            let rule = block_on(service.upsert(draft, actor.as_deref()))??;
            if json {
                return output::print_ok_json(&rule);
            }
            let verb = if is_update { "Updated" } else { "Created" };
            output::success(&format!("{} rule {}", verb, rule.id));
            output::print_rule(&rule);
        }
        RuleCommands::Show { id, json } => {
            let rule = block_on(service.get(id))??;
            if json {
                println!("{}", serde_json::to_string_pretty(&rule)?);
                return Ok(());
            }
            output::print_rule(&rule);
        }
        RuleCommands::List {
            business_unit,
            hospital,
            kind,
            all,
            page,
            page_size,
            json,
        } => {
            let filter = RuleFilter {
                business_unit: business_unit.or_else(|| ctx.config.business_unit.clone()),
                hospital,
                kind,
                include_inactive: all,
                page,
                page_size,
            };
            let listing = block_on(service.list(&filter))??;
            if json {
                println!("{}", serde_json::to_string_pretty(&listing)?);
                return Ok(());
            }
            if listing.items.is_empty() {
                println!("No rules found.");
                return Ok(());
            }

            let mut table = output::create_table();
            table.set_header(vec!["ID", "Kind", "Hospital", "Pattern", "Value", "Priority", "Valid", "Active"]);
            for rule in &listing.items {
                table.add_row(vec![
                    rule.id.to_string(),
                    rule.kind().to_string(),
                    rule.hospital.to_string(),
                    rule.dimensions.describe(),
                    rule.value.describe(),
                    rule.priority().to_string(),
                    format!("{} to {}", rule.validity.from(), rule.validity.to()),
                    if rule.is_active { "yes" } else { "no" }.to_string(),
                ]);
            }
            println!("{}", table);
            println!(
                "{}",
                format!(
                    "Page {} of {} ({} rules)",
                    listing.page,
                    listing.total_pages().max(1),
                    listing.total
                )
                .dimmed()
            );
        }
        RuleCommands::Deactivate { id, force, json } => {
            if !force && !json {
                let rule = block_on(service.get(id))??;
                output::print_rule(&rule);
                if !Confirm::new()
                    .with_prompt("Deactivate this rule?")
                    .default(false)
                    .interact()?
                {
                    println!("Cancelled.");
                    return Ok(());
                }
            }

            let rule = block_on(service.deactivate(id, actor.as_deref()))??;
            if json {
                return output::print_ok_json(&rule);
            }
            output::success(&format!("Deactivated rule {}", rule.id));
        }
        RuleCommands::Activate { id, json } => {
            let rule = block_on(service.reactivate(id, actor.as_deref()))??;
            if json {
                return output::print_ok_json(&rule);
            }
            output::success(&format!("Reactivated rule {}", rule.id));
        }
    }

    Ok(())
}
