use archiva_core::{RealtimeEnvelope, UpdateNotice};
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::commands::common::{format_timestamp, CliContext};
use crate::error::CliError;

const EVENT_BUFFER: usize = 64;

/// Parse one stdin line. Blank and malformed lines are skipped.
pub fn parse_event_line(line: &str) -> Option<RealtimeEnvelope> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match RealtimeEnvelope::parse(line) {
        Ok(envelope) => Some(envelope),
        Err(error) => {
            tracing::warn!("Skipping malformed event line: {error}");
            None
        }
    }
}

pub fn describe_notice(notice: &UpdateNotice) -> String {
    match notice {
        UpdateNotice::RecordsChanged { changed } => format!("records changed: {changed}"),
        UpdateNotice::RecordRemoved { id } => format!("record removed: {id}"),
        UpdateNotice::LifecyclesChanged { changed } => format!("lifecycles changed: {changed}"),
        UpdateNotice::ProgressChanged { id } => format!("progress changed: {id}"),
    }
}

pub async fn run_listen(context: &CliContext) -> Result<(), CliError> {
    let engine = context.open_engine().await?;
    let subscription = engine.on_update(|notice| {
        println!(
            "{}  {}",
            format_timestamp(Utc::now().timestamp_millis()),
            describe_notice(notice)
        );
    });

    let (sender, receiver) = mpsc::channel::<RealtimeEnvelope>(EVENT_BUFFER);
    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let Some(envelope) = parse_event_line(&line) else {
                        continue;
                    };
                    if sender.send(envelope).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(error) => {
                    tracing::warn!("Failed to read events from stdin: {error}");
                    break;
                }
            }
        }
    });

    let events = futures::stream::unfold(receiver, |mut receiver| async move {
        receiver.recv().await.map(|envelope| (envelope, receiver))
    });
    let received = engine.realtime().run(events).await;
    subscription.unsubscribe();

    if let Err(error) = reader.await {
        tracing::warn!("Event reader stopped unexpectedly: {error}");
    }
    println!("Processed {received} events");
    Ok(())
}
