use crate::{errors::ProcessingError, models::Measurement};

/// Parses the inner payload into a [`Measurement`].
///
/// Missing currents default to zero and missing timestamps stay `None`.
/// Unknown keys are ignored, a known key holding the wrong type is rejected.
pub fn parse(payload: &[u8]) -> Result<Measurement, ProcessingError> {
    serde_json::from_slice::<Measurement>(payload)
        .map_err(|e| ProcessingError::MalformedPayload(e.to_string()))
}
