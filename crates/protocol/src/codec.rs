//! Parse/serialize the three wire frame types.
//!
//! Parsing validates against the discriminated `type` schema: fails with
//! `PROTOCOL_ERROR` if the discriminator is missing/unknown, if a required
//! field is absent, or if a request id is not a well-formed UUID.

use thiserror::Error;

use crate::{error_codes, ErrorShape, Frame};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("request id is not a well-formed UUID: {0}")]
    InvalidRequestId(String),
}

impl From<&ProtocolError> for ErrorShape {
    fn from(err: &ProtocolError) -> Self {
        ErrorShape::new(error_codes::PROTOCOL_ERROR, err.to_string())
    }
}

impl From<ProtocolError> for ErrorShape {
    fn from(err: ProtocolError) -> Self {
        ErrorShape::from(&err)
    }
}

/// Parse a UTF-8 JSON string into a `Frame`.
///
/// Serde's `#[serde(tag = "type")]` already rejects a missing/unknown
/// discriminator and any missing required field as a `serde_json::Error`;
/// this function adds the one check serde cannot express — that a request
/// id is a well-formed UUID.
pub fn parse_frame(raw: &str) -> Result<Frame, ProtocolError> {
    let frame: Frame = serde_json::from_str(raw)?;
    if let Frame::Request(req) = &frame
        && uuid::Uuid::parse_str(&req.id).is_err()
    {
        return Err(ProtocolError::InvalidRequestId(req.id.clone()));
    }
    Ok(frame)
}

/// Serialize a `Frame` back to its wire JSON representation.
///
/// Deterministic for a given frame value: re-parsing the output with
/// [`parse_frame`] yields an equal frame, so a frame survives round-trip
/// under the same codec.
pub fn serialize_frame(frame: &Frame) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(frame)?)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RequestFrame, ResponseFrame};

    #[test]
    fn round_trip_request() {
        let id = uuid::Uuid::new_v4().to_string();
        let frame = Frame::Request(RequestFrame {
            id: id.clone(),
            target: "sessions".into(),
            method: "history".into(),
            params: Some(serde_json::json!({"key": "cli:chat"})),
        });
        let raw = serialize_frame(&frame).unwrap();
        let parsed = parse_frame(&raw).unwrap();
        match parsed {
            Frame::Request(req) => assert_eq!(req.id, id),
            _ => panic!("expected request frame"),
        }
    }

    #[test]
    fn missing_discriminant_is_protocol_error() {
        let raw = r#"{"id":"x","target":"sessions","method":"history"}"#;
        assert!(parse_frame(raw).is_err());
    }

    #[test]
    fn unknown_discriminant_is_protocol_error() {
        let raw = r#"{"type":"ping"}"#;
        assert!(parse_frame(raw).is_err());
    }

    #[test]
    fn missing_required_field_is_protocol_error() {
        let raw = r#"{"type":"request","id":"not-checked-yet"}"#;
        assert!(parse_frame(raw).is_err());
    }

    #[test]
    fn non_uuid_request_id_is_rejected() {
        let raw = r#"{"type":"request","id":"not-a-uuid","target":"sessions","method":"history"}"#;
        let err = parse_frame(raw).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidRequestId(_)));
    }

    #[test]
    fn response_frame_does_not_require_uuid_id() {
        let raw = serialize_frame(&Frame::Response(ResponseFrame::ok(
            "not-a-uuid",
            serde_json::json!({}),
        )))
        .unwrap();
        assert!(parse_frame(&raw).is_ok());
    }
}
