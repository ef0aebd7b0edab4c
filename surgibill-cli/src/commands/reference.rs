//! Ref commands - register and list reference data

use std::sync::Arc;

use anyhow::Result;
use clap::Subcommand;
use comfy_table::{Cell, Color};

use surgibill_core::services::LoggingService;
use surgibill_core::ReferenceKind;

use super::{block_on, business_unit, get_context};
use crate::output;

#[derive(Subcommand)]
pub enum RefCommands {
    /// Register a hospital, doctor, procedure, payment type or surgical category
    Add {
        /// Reference kind (hospital, doctor, procedure, payment_type, surgical_category)
        kind: ReferenceKind,
        /// Short code, unique per kind within the business unit
        #[arg(long)]
        code: String,
        /// Display name
        #[arg(long)]
        name: String,
        #[arg(long)]
        business_unit: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List registered references
    List {
        /// Only this kind
        kind: Option<ReferenceKind>,
        #[arg(long)]
        business_unit: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: RefCommands, logger: &Option<Arc<LoggingService>>) -> Result<()> {
    let ctx = get_context(logger)?;
    let service = &ctx.reference_service;

    match command {
        RefCommands::Add {
            kind,
            code,
            name,
            business_unit: bu,
            json,
        } => {
            let bu = business_unit(&ctx, bu)?;
            let reference = block_on(service.register(kind, &bu, &code, &name))??;
            if json {
                return output::print_ok_json(&reference);
            }
            output::success(&format!(
                "Registered {} {} ({}) as {}",
                reference.kind, reference.code, reference.name, reference.id
            ));
        }
        RefCommands::List {
            kind,
            business_unit: bu,
            json,
        } => {
            let bu = bu.or_else(|| ctx.config.business_unit.clone());
            let references = block_on(service.list(kind, bu.as_deref()))??;
            if json {
                println!("{}", serde_json::to_string_pretty(&references)?);
                return Ok(());
            }
            if references.is_empty() {
                println!("No references found.");
                return Ok(());
            }

            let mut table = output::create_table();
            table.set_header(vec!["Kind", "Code", "Name", "Business unit", "ID", "Active"]);
            for r in &references {
                let active = if r.is_active {
                    Cell::new("yes")
                } else {
                    Cell::new("no").fg(Color::DarkGrey)
                };
                table.add_row(vec![
                    Cell::new(r.kind),
                    Cell::new(&r.code),
                    Cell::new(&r.name),
                    Cell::new(&r.business_unit),
                    Cell::new(r.id),
                    active,
                ]);
            }
            println!("{}", table);
        }
    }

    Ok(())
}
