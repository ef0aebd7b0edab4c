//! CLI command implementations

pub mod check;
pub mod logs;
pub mod reference;
pub mod resolve;
pub mod rule;
pub mod status;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use surgibill_core::services::{EntryPoint, LogEvent, LoggingService};
use surgibill_core::SurgibillContext;

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<Arc<LoggingService>> {
    let data_dir = get_data_dir().ok()?;
    std::fs::create_dir_all(&data_dir).ok()?;
    LoggingService::new(&data_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION"))
        .ok()
        .map(Arc::new)
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: &Option<Arc<LoggingService>>, event: LogEvent) {
    if let Some(l) = logger {
        let _ = l.log(event);
    }
}

/// Get the data directory from environment or default
pub fn get_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("SURGIBILL_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".surgibill"))
        .ok_or_else(|| anyhow!("Could not find home directory; set SURGIBILL_DIR"))
}

/// Open the context, wiring services to the logger when there is one
pub fn get_context(logger: &Option<Arc<LoggingService>>) -> Result<SurgibillContext> {
    let data_dir = get_data_dir()?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

    let ctx = match logger {
        Some(logger) => SurgibillContext::with_logger(&data_dir, Arc::clone(logger)),
        None => SurgibillContext::new(&data_dir),
    };
    ctx.context("Failed to initialize surgibill context")
}

/// Drive an async service call to completion
pub fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    Ok(runtime.block_on(future))
}

/// The business unit from the flag, else from settings
pub fn business_unit(ctx: &SurgibillContext, flag: Option<String>) -> Result<String> {
    flag.or_else(|| ctx.config.business_unit.clone())
        .ok_or_else(|| {
            anyhow!("No business unit given; pass --business-unit or set SURGIBILL_BUSINESS_UNIT")
        })
}
