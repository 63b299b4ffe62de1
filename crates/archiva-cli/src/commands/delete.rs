use crate::commands::common::{resolve_record, CliContext};
use crate::error::CliError;

pub async fn run_delete(id: &str, context: &CliContext) -> Result<(), CliError> {
    let engine = context.open_engine().await?;
    let record = resolve_record(id, engine.store()).await?;

    if !engine.delete_record(&record.id).await {
        return Err(CliError::DeleteFailed(record.id.to_string()));
    }
    println!("Deleted record {}", record.id);
    Ok(())
}
