//! Processing of one queue message.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::event::{EventEnvelope, EventRecord};
use crate::mail::{EmailFetcher, ForwardBuilder, Mailer, Summarizer, PLACEHOLDER_SUMMARY};
use crate::relay::RelayDirectory;
use crate::{RelayError, Result};

/// Turns notification envelopes into forwarded messages.
///
/// Records are handled in order. The first failing record aborts the
/// message and its error is returned; records already forwarded stay
/// forwarded.
pub struct IngestionProcessor {
    directory: Arc<RelayDirectory>,
    fetcher: EmailFetcher,
    builder: ForwardBuilder,
    summarizer: Arc<dyn Summarizer>,
    mailer: Arc<dyn Mailer>,
    default_bucket: String,
}

impl IngestionProcessor {
    pub fn new(
        directory: Arc<RelayDirectory>,
        fetcher: EmailFetcher,
        builder: ForwardBuilder,
        summarizer: Arc<dyn Summarizer>,
        mailer: Arc<dyn Mailer>,
        default_bucket: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            fetcher,
            builder,
            summarizer,
            mailer,
            default_bucket: default_bucket.into(),
        }
    }

    /// Process a queue message body. Returns the number of messages forwarded.
    ///
    /// # Errors
    ///
    /// - `MalformedEventPayload` if the body is not an envelope
    /// - the first record failure otherwise
    pub async fn process_message(&self, body: &str) -> Result<usize> {
        let envelope = EventEnvelope::from_json(body).inspect_err(|e| {
            error!("Failed to decode event envelope: {}", e);
        })?;

        if envelope.records.is_empty() {
            info!("Event envelope has no records");
            return Ok(0);
        }

        let total = envelope.records.len();
        for (index, record) in envelope.records.iter().enumerate() {
            if let Err(e) = self.process_record(record).await {
                error!(
                    record = index + 1,
                    total,
                    kind = e.kind(),
                    "Failed to process record: {}",
                    e
                );
                return Err(e);
            }
        }

        info!("Processed {} record(s)", total);
        Ok(total)
    }

    /// Forward the message behind one record. Returns the outbound message id.
    pub async fn process_record(&self, record: &EventRecord) -> Result<String> {
        let location = record.object_location(&self.default_bucket)?;
        let relay_address = record.destination()?;
        debug!(
            "Record for {} stored at {}/{}",
            relay_address, location.bucket, location.key
        );

        let primary_email = self.directory.resolve_primary_email(relay_address).await?;

        let parsed = self
            .fetcher
            .fetch_and_parse(&location.bucket, &location.key)
            .await?
            .with_original_recipient(relay_address);

        let source_text = parsed
            .text_body
            .as_deref()
            .or(parsed.html_body.as_deref())
            .unwrap_or("");
        let summary = match self.summarizer.summarize(source_text).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!("Summarizer failed, using placeholder: {}", e);
                PLACEHOLDER_SUMMARY.to_string()
            }
        };

        let outbound = self.builder.build(&parsed, &summary, &primary_email);
        let message_id = self.mailer.send(&outbound).await.map_err(|e| match e {
            RelayError::EmailDispatchFailed(_) => e,
            other => RelayError::EmailDispatchFailed(other.to_string()),
        })?;

        info!(
            relay = %relay_address,
            inbound_id = record.message_id().unwrap_or("-"),
            message_id = %message_id,
            "Forwarded email to primary address"
        );
        Ok(message_id)
    }
}
