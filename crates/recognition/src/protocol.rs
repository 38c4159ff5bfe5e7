//! Wire format for control and result messages.
//!
//! Inbound text frames are JSON control messages with optional fields; any
//! combination of fields may appear in one message. Outbound frames are
//! transcript results plus the heartbeat `pong`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which recognition passes run for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecognitionMode {
    #[serde(rename = "offline")]
    Offline,
    #[serde(rename = "online")]
    Online,
    #[default]
    #[serde(rename = "2pass")]
    TwoPass,
}

impl RecognitionMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "offline" => Some(Self::Offline),
            "online" => Some(Self::Online),
            "2pass" => Some(Self::TwoPass),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Online => "online",
            Self::TwoPass => "2pass",
        }
    }

    pub fn runs_online(self) -> bool {
        matches!(self, Self::Online | Self::TwoPass)
    }

    pub fn runs_offline(self) -> bool {
        matches!(self, Self::Offline | Self::TwoPass)
    }
}

/// `chunk_size` arrives either comma-joined (`"5,10,5"`) or as an array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ChunkSizeField {
    Joined(String),
    Triple(Vec<usize>),
}

impl ChunkSizeField {
    /// Returns the triple, or `None` when the value does not resolve to
    /// exactly three non-negative integers.
    pub fn resolve(&self) -> Option<[usize; 3]> {
        let values: Vec<usize> = match self {
            Self::Joined(joined) => joined
                .split(',')
                .map(|part| part.trim().parse().ok())
                .collect::<Option<Vec<_>>>()?,
            Self::Triple(values) => values.clone(),
        };
        <[usize; 3]>::try_from(values).ok()
    }
}

/// `hotwords` arrives as one string or a list of terms.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum HotwordsField {
    One(String),
    Many(Vec<String>),
}

impl HotwordsField {
    pub fn join(&self) -> String {
        match self {
            Self::One(word) => word.clone(),
            Self::Many(words) => words.join(" "),
        }
    }
}

/// An inbound control message. Unknown keys land in `unknown` and are
/// ignored explicitly by the caller.
#[derive(Debug, Deserialize)]
pub struct ControlFrame {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub is_speaking: Option<bool>,
    pub chunk_interval: Option<usize>,
    pub wav_name: Option<String>,
    pub chunk_size: Option<ChunkSizeField>,
    pub hotwords: Option<HotwordsField>,
    pub mode: Option<String>,
    #[serde(flatten)]
    pub unknown: BTreeMap<String, serde_json::Value>,
}

impl ControlFrame {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Heartbeat messages short-circuit all other processing.
    pub fn is_ping(&self) -> bool {
        self.kind.as_deref() == Some("ping")
    }
}

/// One recognition result. `mode` is the rewritten label
/// (`"2pass-online"` / `"2pass-offline"` under two-pass), not the session
/// mode itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptMessage {
    pub mode: String,
    pub text: String,
    pub wav_name: String,
    pub is_final: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Pong,
    Transcript(TranscriptMessage),
}

impl ServerMessage {
    pub fn to_json(&self) -> String {
        match self {
            Self::Pong => r#"{"type":"pong"}"#.to_string(),
            Self::Transcript(message) => serde_json::to_string(message).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_frame_parses() {
        let frame = ControlFrame::parse(r#"{"type":"ping"}"#).unwrap();
        assert!(frame.is_ping());
        assert!(frame.unknown.is_empty());
    }

    #[test]
    fn full_config_frame_parses() {
        let frame = ControlFrame::parse(
            r#"{"mode":"2pass","chunk_interval":5,"chunk_size":[5,10,5],
                "wav_name":"meeting.wav","is_speaking":true,"hotwords":"sonant"}"#,
        )
        .unwrap();
        assert_eq!(frame.mode.as_deref(), Some("2pass"));
        assert_eq!(frame.chunk_interval, Some(5));
        assert_eq!(frame.is_speaking, Some(true));
        assert_eq!(frame.wav_name.as_deref(), Some("meeting.wav"));
        assert_eq!(frame.chunk_size.unwrap().resolve(), Some([5, 10, 5]));
        assert_eq!(frame.hotwords.unwrap().join(), "sonant");
    }

    #[test]
    fn chunk_size_accepts_joined_string() {
        let field = ChunkSizeField::Joined("5, 10, 5".to_string());
        assert_eq!(field.resolve(), Some([5, 10, 5]));
    }

    #[test]
    fn chunk_size_rejects_wrong_arity_and_garbage() {
        assert_eq!(ChunkSizeField::Joined("5,10".to_string()).resolve(), None);
        assert_eq!(ChunkSizeField::Joined("a,b,c".to_string()).resolve(), None);
        assert_eq!(ChunkSizeField::Triple(vec![5, 10, 5, 1]).resolve(), None);
    }

    #[test]
    fn hotword_list_joins_with_spaces() {
        let field = HotwordsField::Many(vec!["alpha".to_string(), "beta".to_string()]);
        assert_eq!(field.join(), "alpha beta");
    }

    #[test]
    fn unknown_keys_are_collected_not_fatal() {
        let frame = ControlFrame::parse(r#"{"mode":"online","volume":11}"#).unwrap();
        assert_eq!(frame.mode.as_deref(), Some("online"));
        assert!(frame.unknown.contains_key("volume"));
    }

    #[test]
    fn mode_parse_rejects_unknown_values() {
        assert_eq!(RecognitionMode::parse("2pass"), Some(RecognitionMode::TwoPass));
        assert_eq!(RecognitionMode::parse("batch"), None);
    }

    #[test]
    fn transcript_serializes_expected_shape() {
        let message = ServerMessage::Transcript(TranscriptMessage {
            mode: "2pass-offline".to_string(),
            text: "hello".to_string(),
            wav_name: "microphone".to_string(),
            is_final: true,
        });
        let value: serde_json::Value = serde_json::from_str(&message.to_json()).unwrap();
        assert_eq!(value["mode"], "2pass-offline");
        assert_eq!(value["text"], "hello");
        assert_eq!(value["wav_name"], "microphone");
        assert_eq!(value["is_final"], true);
    }

    #[test]
    fn pong_has_fixed_shape() {
        let value: serde_json::Value =
            serde_json::from_str(&ServerMessage::Pong.to_json()).unwrap();
        assert_eq!(value["type"], "pong");
    }
}
