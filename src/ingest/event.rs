//! Inbound notification envelope.

use serde::Deserialize;

use crate::{RelayError, Result};

/// Decoded queue message body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventEnvelope {
    /// Notification records. Absent is the same as empty.
    #[serde(rename = "Records", default)]
    pub records: Vec<EventRecord>,
}

impl EventEnvelope {
    /// Decode an envelope from a queue message body.
    pub fn from_json(body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(|e| RelayError::MalformedEventPayload(e.to_string()))
    }
}

/// One inbound-message notification.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    #[serde(default)]
    pub event_time: Option<String>,
    #[serde(default)]
    pub s3: Option<StorageRecord>,
    #[serde(default)]
    pub ses: Option<MailRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageRecord {
    #[serde(default)]
    pub bucket: Option<BucketRef>,
    #[serde(default)]
    pub object: Option<ObjectRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BucketRef {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObjectRef {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MailRecord {
    #[serde(default)]
    pub mail: Option<MailMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailMetadata {
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub destination: Option<Vec<String>>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Where a record's raw message is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl EventRecord {
    /// Bucket and decoded object key of the stored message.
    ///
    /// Falls back to `default_bucket` when the record names none.
    pub fn object_location(&self, default_bucket: &str) -> Result<ObjectLocation> {
        let storage = self.s3.as_ref();

        let key = storage
            .and_then(|s| s.object.as_ref())
            .and_then(|o| o.key.as_deref())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                RelayError::MalformedEventPayload("record has no object key".to_string())
            })?;

        let bucket = storage
            .and_then(|s| s.bucket.as_ref())
            .and_then(|b| b.name.as_deref())
            .filter(|b| !b.is_empty())
            .unwrap_or(default_bucket);

        Ok(ObjectLocation {
            bucket: bucket.to_string(),
            key: decode_object_key(key)?,
        })
    }

    /// The relay address the message was delivered to.
    pub fn destination(&self) -> Result<&str> {
        self.ses
            .as_ref()
            .and_then(|ses| ses.mail.as_ref())
            .and_then(|mail| mail.destination.as_ref())
            .and_then(|dest| dest.first())
            .map(|d| d.trim())
            .filter(|d| !d.is_empty())
            .ok_or(RelayError::MissingDestinationAddress)
    }

    /// Message id assigned by the receiving mail service.
    pub fn message_id(&self) -> Option<&str> {
        self.ses
            .as_ref()
            .and_then(|ses| ses.mail.as_ref())
            .and_then(|mail| mail.message_id.as_deref())
    }
}

/// Decode a form-encoded object key (`+` is a space).
pub fn decode_object_key(key: &str) -> Result<String> {
    urlencoding::decode(&key.replace('+', " "))
        .map(|decoded| decoded.into_owned())
        .map_err(|e| RelayError::MalformedEventPayload(format!("undecodable object key {key}: {e}")))
}
