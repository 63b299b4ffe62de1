use archiva_core::HistoryRecord;

use crate::commands::common::{
    format_record_lines, record_to_list_item, resolve_record, CliContext, RecordListItem,
};
use crate::error::CliError;

/// Most recently updated first, capped at `limit`.
pub fn select_records(
    mut records: Vec<HistoryRecord>,
    limit: usize,
) -> Vec<HistoryRecord> {
    records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    records.truncate(limit);
    records
}

pub async fn run_list(
    limit: usize,
    unlinked: bool,
    as_json: bool,
    context: &CliContext,
) -> Result<(), CliError> {
    let store = context.open_store().await?;
    let records = if unlinked {
        store.list_unlinked().await?
    } else {
        store.list_records().await?
    };
    let records = select_records(records, limit);

    if as_json {
        let json_items = records
            .iter()
            .map(record_to_list_item)
            .collect::<Vec<RecordListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if records.is_empty() {
        println!("No records.");
    } else {
        for line in format_record_lines(&records) {
            println!("{line}");
        }
    }

    Ok(())
}

pub async fn run_show(id: &str, context: &CliContext) -> Result<(), CliError> {
    let store = context.open_store().await?;
    let record = resolve_record(id, &store).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
