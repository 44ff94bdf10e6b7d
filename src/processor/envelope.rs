use base64::{
    alphabet,
    engine::{general_purpose, DecodePaddingMode, GeneralPurpose},
    Engine,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{errors::ProcessingError, shared::parse_utc};

/// Standard alphabet, padding optional: push deliveries are padded, some
/// bridges strip it.
const DATA_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    general_purpose::PAD.with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Transport wrapper around one measurement payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub id: String,
    pub publish_time: DateTime<Utc>,
    pub data: Vec<u8>,
}

impl Envelope {
    /// For transports that already hand over raw bytes and metadata.
    pub fn from_parts(id: impl Into<String>, publish_time: DateTime<Utc>, data: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            publish_time,
            data,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireEvent {
    Push { message: WireMessage },
    Bare(WireMessage),
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    data: Option<WireData>,
    // Push deliveries carry both spellings of the id and publish time.
    #[serde(rename = "messageId")]
    message_id_camel: Option<String>,
    message_id: Option<String>,
    id: Option<String>,
    #[serde(rename = "publishTime")]
    publish_time_camel: Option<String>,
    publish_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireData {
    Encoded(String),
    Bytes(Vec<u8>),
}

/// Reads a transport event into an [`Envelope`].
///
/// Accepts the push form `{"message": {...}, "subscription": ...}` as well as
/// the bare message object. Base64 `data` is decoded here; a byte array is
/// taken as-is.
pub fn decode(event: &[u8]) -> Result<Envelope, ProcessingError> {
    let wire: WireEvent = serde_json::from_slice(event)
        .map_err(|e| ProcessingError::MalformedEnvelope(format!("unreadable event: {}", e)))?;

    let message = match wire {
        WireEvent::Push { message } => message,
        WireEvent::Bare(message) => message,
    };

    let id = message
        .message_id_camel
        .or(message.message_id)
        .or(message.id)
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ProcessingError::MalformedEnvelope("missing message id".to_string()))?;

    let publish_time = message
        .publish_time_camel
        .or(message.publish_time)
        .ok_or_else(|| ProcessingError::MalformedEnvelope(format!("message {} has no publish time", id)))
        .and_then(|raw| {
            parse_utc(&raw).map_err(|e| {
                ProcessingError::MalformedEnvelope(format!("message {} publish time '{}': {}", id, raw, e))
            })
        })?;

    let data = match message.data {
        Some(WireData::Encoded(encoded)) => DATA_ENGINE.decode(encoded.trim()).map_err(|e| {
            ProcessingError::MalformedEnvelope(format!("message {} data is not base64: {}", id, e))
        })?,
        Some(WireData::Bytes(bytes)) => bytes,
        None => {
            return Err(ProcessingError::MalformedEnvelope(format!(
                "message {} has no data section",
                id
            )))
        }
    };

    Ok(Envelope {
        id,
        publish_time,
        data,
    })
}
