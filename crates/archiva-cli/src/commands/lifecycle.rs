use archiva_core::LifecycleReport;
use serde::Serialize;

use crate::commands::common::CliContext;
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct LifecycleReportItem {
    pub linked: usize,
    pub updated: usize,
    pub changed: usize,
    pub pushed: bool,
}

pub const fn lifecycle_report_item(report: &LifecycleReport) -> LifecycleReportItem {
    LifecycleReportItem {
        linked: report.linked,
        updated: report.updated,
        changed: report.changed(),
        pushed: report.pushed,
    }
}

pub fn format_lifecycle_report(report: &LifecycleReport) -> String {
    let mut line = format!(
        "Linked {} records, updated {} lifecycles",
        report.linked, report.updated
    );
    if !report.pushed {
        line.push_str(" (push failed, will retry)");
    }
    line
}

pub async fn run_reconcile(context: &CliContext) -> Result<(), CliError> {
    let engine = context.open_engine().await?;
    let linked = engine.reconcile_unlinked().await;
    println!("Linked {linked} records");
    Ok(())
}

pub async fn run_lifecycle(as_json: bool, context: &CliContext) -> Result<(), CliError> {
    let engine = context.open_engine().await?;
    let report = engine.sync_lifecycles().await;

    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&lifecycle_report_item(&report))?
        );
    } else {
        println!("{}", format_lifecycle_report(&report));
    }
    Ok(())
}
