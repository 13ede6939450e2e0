//! Newline-delimited JSON wire codec
//!
//! Every request and response on a specialist connection is one JSON object
//! followed by a single `\n`. Framing is handled by `tokio_util`'s
//! [`LinesCodec`] with a hard per-frame size cap; this module owns what goes
//! inside the frame.
//!
//! The wire shape is deliberately permissive on the response side: some
//! specialists answer chat under `content`, some under `response`. That
//! permissiveness stays confined here — the decoder hands out a tagged
//! [`WireReply`] and nothing duck-typed leaks past this boundary.

#![allow(clippy::missing_errors_doc)]

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio_util::codec::LinesCodec;

/// Request frames the fabric sends to specialists
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireRequest<'a> {
    /// A prompt for the specialist to answer
    Chat {
        /// The prompt body
        content: &'a str,
    },
    /// Health probe; any parseable reply counts as alive
    Ping,
    /// Identity and capability probe
    Info,
    /// Optional capability introspection
    Schema,
}

/// A decoded response frame
#[derive(Debug, Clone, PartialEq)]
pub enum WireReply {
    /// A chat answer, body already extracted
    Chat {
        /// The reply body, from `response` or `content`
        body: String,
    },
    /// An identity reply with the fields the fabric cares about
    Info(InfoReply),
    /// A parseable object with no recognized payload; healthy for pings
    Other(Value),
}

/// Fields of an `info` response the fabric consumes; everything else is
/// passed through verbatim in `raw`.
#[derive(Debug, Clone, PartialEq)]
pub struct InfoReply {
    /// Model the specialist reports running, if any
    pub model_name: Option<String>,
    /// Capability strings the specialist advertises
    pub capabilities: Vec<String>,
    /// The complete response object
    pub raw: Value,
}

/// Codec-level failures, mapped to `ProtocolError` by the channel
#[derive(Debug, Error)]
pub enum CodecError {
    /// The frame was not a JSON object
    #[error("frame is not a JSON object: {0}")]
    NotAnObject(String),

    /// The frame could not be parsed at all
    #[error("unparseable frame: {source}")]
    Parse {
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },
}

/// Builds the line framer with the fabric's per-frame size cap.
///
/// Oversize inbound frames surface as `LinesCodecError::MaxLineLengthExceeded`,
/// which the channel reports as a protocol violation.
#[must_use]
pub fn framer(max_frame_bytes: usize) -> LinesCodec {
    LinesCodec::new_with_max_length(max_frame_bytes)
}

/// Encodes a request as the JSON text of one frame (no trailing newline; the
/// framer appends it).
pub fn encode(request: &WireRequest<'_>) -> Result<String, CodecError> {
    serde_json::to_string(request).map_err(|source| CodecError::Parse { source })
}

/// Decodes one response frame.
///
/// Chat bodies are read from `response`, falling back to `content`
/// (`response` wins when both are present). `model_name` or `capabilities`
/// mark an info reply. Any other object decodes as [`WireReply::Other`].
pub fn decode(line: &str) -> Result<WireReply, CodecError> {
    let value: Value =
        serde_json::from_str(line.trim()).map_err(|source| CodecError::Parse { source })?;
    let object = value
        .as_object()
        .ok_or_else(|| CodecError::NotAnObject(summarize(line)))?;

    if let Some(body) = object.get("response").or_else(|| object.get("content")) {
        let body = match body {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Ok(WireReply::Chat { body });
    }

    if object.contains_key("model_name") || object.contains_key("capabilities") {
        let model_name = object
            .get("model_name")
            .and_then(Value::as_str)
            .map(str::to_string);
        let capabilities = object
            .get("capabilities")
            .and_then(Value::as_array)
            .map(|caps| {
                caps.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        return Ok(WireReply::Info(InfoReply {
            model_name,
            capabilities,
            raw: value,
        }));
    }

    Ok(WireReply::Other(value))
}

fn summarize(line: &str) -> String {
    const LIMIT: usize = 80;
    if line.len() <= LIMIT {
        line.to_string()
    } else {
        let cut = line
            .char_indices()
            .take_while(|(i, _)| *i < LIMIT)
            .last()
            .map_or(0, |(i, c)| i + c.len_utf8());
        format!("{}…", &line[..cut])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn chat_request_shape() {
        let frame = encode(&WireRequest::Chat { content: "hello" }).unwrap();
        assert_eq!(frame, r#"{"type":"chat","content":"hello"}"#);
    }

    #[test]
    fn probe_request_shapes() {
        assert_eq!(encode(&WireRequest::Ping).unwrap(), r#"{"type":"ping"}"#);
        assert_eq!(encode(&WireRequest::Info).unwrap(), r#"{"type":"info"}"#);
        assert_eq!(encode(&WireRequest::Schema).unwrap(), r#"{"type":"schema"}"#);
    }

    #[test]
    fn response_field_wins_over_content() {
        let reply = decode(r#"{"response":"a","content":"b"}"#).unwrap();
        assert_eq!(reply, WireReply::Chat { body: "a".into() });
    }

    #[test]
    fn content_field_accepted_alone() {
        let reply = decode(r#"{"content":"hi"}"#).unwrap();
        assert_eq!(reply, WireReply::Chat { body: "hi".into() });
    }

    #[test]
    fn info_reply_passes_fields_through() {
        let reply =
            decode(r#"{"model_name":"llama3.3:70b","capabilities":["chat","streaming"]}"#).unwrap();
        match reply {
            WireReply::Info(info) => {
                assert_eq!(info.model_name.as_deref(), Some("llama3.3:70b"));
                assert_eq!(info.capabilities, vec!["chat", "streaming"]);
            }
            other => panic!("expected info reply, got {other:?}"),
        }
    }

    #[test]
    fn bare_object_is_other_not_an_error() {
        assert!(matches!(decode(r#"{"pong":true}"#), Ok(WireReply::Other(_))));
    }

    #[test]
    fn non_object_frames_are_rejected() {
        assert!(matches!(decode("[1,2,3]"), Err(CodecError::NotAnObject(_))));
        assert!(matches!(decode("not json"), Err(CodecError::Parse { .. })));
    }

    proptest! {
        /// Encode/decode round-trip: decoding the encoding of chat(b)
        /// yields the body b back.
        #[test]
        fn chat_round_trip(body in "\\PC*") {
            let frame = encode(&WireRequest::Chat { content: &body }).unwrap();
            prop_assert_eq!(decode(&frame).unwrap(), WireReply::Chat { body });
        }
    }
}
