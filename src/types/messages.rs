//! Messages pushed by the server over the live WebSocket.
//!
//! Every text frame is a JSON object whose `type` field selects one variant of
//! [`LiveV2WebSocketMessage`].

use crate::types::init::LanguageCode;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageError {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub word: String,
    pub start: f64,
    pub end: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub start: f64,
    pub end: f64,
    pub confidence: f64,
    pub channel: u32,
    /// Set when diarization is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<u32>,
    #[serde(default)]
    pub words: Vec<Word>,
    pub text: String,
    pub language: LanguageCode,
}

// ---- acknowledgments ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioChunkAckData {
    /// `[start, end)` byte offsets relative to the whole session.
    pub byte_range: [u64; 2],
    /// Seconds relative to the whole session.
    pub time_range: [f64; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioChunkAckMessage {
    pub session_id: String,
    pub created_at: String,
    pub acknowledged: bool,
    #[serde(default)]
    pub error: Option<MessageError>,
    #[serde(default)]
    pub data: Option<AudioChunkAckData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopRecordingAckData {
    pub recording_duration: f64,
    pub recording_left_to_process: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopRecordingAckMessage {
    pub session_id: String,
    pub created_at: String,
    pub acknowledged: bool,
    #[serde(default)]
    pub error: Option<MessageError>,
    #[serde(default)]
    pub data: Option<StopRecordingAckData>,
}

// ---- lifecycle ----

/// Payload-free lifecycle message (`start_session`, `start_recording`, `end_session`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleMessage {
    pub session_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndRecordingData {
    pub recording_duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndRecordingMessage {
    pub session_id: String,
    pub created_at: String,
    pub data: EndRecordingData,
}

// ---- transcription ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptData {
    /// Utterance id; partial and final transcripts of one utterance share it.
    pub id: String,
    pub is_final: bool,
    pub utterance: Utterance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub session_id: String,
    pub created_at: String,
    pub data: TranscriptData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechData {
    pub time: f64,
    pub channel: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechMessage {
    pub session_id: String,
    pub created_at: String,
    pub data: SpeechData,
}

// ---- realtime addons ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationData {
    pub utterance_id: String,
    pub utterance: Utterance,
    pub original_language: LanguageCode,
    pub target_language: LanguageCode,
    pub translated_utterance: Utterance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedEntity {
    pub entity_type: String,
    pub text: String,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedEntityRecognitionData {
    pub utterance_id: String,
    pub utterance: Utterance,
    pub results: Vec<NamedEntity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub sentiment: String,
    pub emotion: String,
    pub text: String,
    pub start: f64,
    pub end: f64,
    pub channel: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentAnalysisData {
    pub utterance_id: String,
    pub utterance: Utterance,
    pub results: Vec<Sentiment>,
}

/// Result of an addon that may fail on its own: `error` is set and `data` is
/// `None` when it did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddonMessage<T> {
    pub session_id: String,
    pub created_at: String,
    pub error: Option<MessageError>,
    pub data: Option<T>,
}

// ---- post-processing ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtitle {
    pub format: String,
    pub subtitles: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    pub full_transcript: String,
    #[serde(default)]
    pub languages: Vec<LanguageCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentences: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitles: Option<Vec<Subtitle>>,
    #[serde(default)]
    pub utterances: Vec<Utterance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionMetadata {
    pub audio_duration: f64,
    pub number_of_distinct_channels: u32,
    pub billing_time: f64,
    pub transcription_time: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddonError {
    pub status_code: u16,
    pub exception: String,
    pub message: String,
}

/// Outcome of one audio intelligence model on the whole recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddonResult<T> {
    pub success: bool,
    pub is_empty: bool,
    pub exec_time: f64,
    pub error: Option<AddonError>,
    pub results: Option<T>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationResult {
    #[serde(default)]
    pub error: Option<AddonError>,
    pub full_transcript: String,
    #[serde(default)]
    pub languages: Vec<LanguageCode>,
    #[serde(default)]
    pub utterances: Vec<Utterance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedEntityRecognitionResult {
    pub success: bool,
    pub is_empty: bool,
    pub exec_time: f64,
    #[serde(default)]
    pub error: Option<AddonError>,
    pub entity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub metadata: TranscriptionMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcription: Option<Transcription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<AddonResult<Vec<TranslationResult>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summarization: Option<AddonResult<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub named_entity_recognition: Option<NamedEntityRecognitionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment_analysis: Option<AddonResult<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapterization: Option<AddonResult<Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostTranscriptMessage {
    pub session_id: String,
    pub created_at: String,
    pub data: Transcription,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostFinalTranscriptMessage {
    pub session_id: String,
    pub created_at: String,
    pub data: TranscriptionResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarizationData {
    pub results: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterSentence {
    pub sentence: String,
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub words: Vec<Word>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abstractive_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extractive_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub headline: String,
    pub gist: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub sentences: Vec<ChapterSentence>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterizationData {
    pub results: Vec<Chapter>,
}

/// Discriminant of [`LiveV2WebSocketMessage`], i.e. the wire `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    AudioChunk,
    StopRecording,
    StartSession,
    StartRecording,
    EndRecording,
    EndSession,
    SpeechStart,
    SpeechEnd,
    Transcript,
    Translation,
    NamedEntityRecognition,
    SentimentAnalysis,
    PostTranscript,
    PostFinalTranscript,
    PostSummarization,
    PostChapterization,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::AudioChunk => "audio_chunk",
            MessageKind::StopRecording => "stop_recording",
            MessageKind::StartSession => "start_session",
            MessageKind::StartRecording => "start_recording",
            MessageKind::EndRecording => "end_recording",
            MessageKind::EndSession => "end_session",
            MessageKind::SpeechStart => "speech_start",
            MessageKind::SpeechEnd => "speech_end",
            MessageKind::Transcript => "transcript",
            MessageKind::Translation => "translation",
            MessageKind::NamedEntityRecognition => "named_entity_recognition",
            MessageKind::SentimentAnalysis => "sentiment_analysis",
            MessageKind::PostTranscript => "post_transcript",
            MessageKind::PostFinalTranscript => "post_final_transcript",
            MessageKind::PostSummarization => "post_summarization",
            MessageKind::PostChapterization => "post_chapterization",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any message the server may push on the live socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveV2WebSocketMessage {
    AudioChunk(AudioChunkAckMessage),
    StopRecording(StopRecordingAckMessage),
    StartSession(LifecycleMessage),
    StartRecording(LifecycleMessage),
    EndRecording(EndRecordingMessage),
    EndSession(LifecycleMessage),
    SpeechStart(SpeechMessage),
    SpeechEnd(SpeechMessage),
    Transcript(TranscriptMessage),
    Translation(AddonMessage<TranslationData>),
    NamedEntityRecognition(AddonMessage<NamedEntityRecognitionData>),
    SentimentAnalysis(AddonMessage<SentimentAnalysisData>),
    PostTranscript(PostTranscriptMessage),
    PostFinalTranscript(PostFinalTranscriptMessage),
    PostSummarization(AddonMessage<SummarizationData>),
    PostChapterization(AddonMessage<ChapterizationData>),
}

impl LiveV2WebSocketMessage {
    /// Parse one text frame.
    ///
    /// Invalid JSON, a missing or non-string `type`, an unknown `type` or a payload
    /// that does not match it are all [`Error::Protocol`].
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::protocol(format!("not valid JSON: {}", e), text))?;
        match value.get("type") {
            Some(Value::String(_)) => {}
            Some(_) => return Err(Error::protocol("\"type\" is not a string", text)),
            None => return Err(Error::protocol("missing \"type\" field", text)),
        }
        serde_json::from_value(value).map_err(|e| Error::protocol(e.to_string(), text))
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            LiveV2WebSocketMessage::AudioChunk(_) => MessageKind::AudioChunk,
            LiveV2WebSocketMessage::StopRecording(_) => MessageKind::StopRecording,
            LiveV2WebSocketMessage::StartSession(_) => MessageKind::StartSession,
            LiveV2WebSocketMessage::StartRecording(_) => MessageKind::StartRecording,
            LiveV2WebSocketMessage::EndRecording(_) => MessageKind::EndRecording,
            LiveV2WebSocketMessage::EndSession(_) => MessageKind::EndSession,
            LiveV2WebSocketMessage::SpeechStart(_) => MessageKind::SpeechStart,
            LiveV2WebSocketMessage::SpeechEnd(_) => MessageKind::SpeechEnd,
            LiveV2WebSocketMessage::Transcript(_) => MessageKind::Transcript,
            LiveV2WebSocketMessage::Translation(_) => MessageKind::Translation,
            LiveV2WebSocketMessage::NamedEntityRecognition(_) => MessageKind::NamedEntityRecognition,
            LiveV2WebSocketMessage::SentimentAnalysis(_) => MessageKind::SentimentAnalysis,
            LiveV2WebSocketMessage::PostTranscript(_) => MessageKind::PostTranscript,
            LiveV2WebSocketMessage::PostFinalTranscript(_) => MessageKind::PostFinalTranscript,
            LiveV2WebSocketMessage::PostSummarization(_) => MessageKind::PostSummarization,
            LiveV2WebSocketMessage::PostChapterization(_) => MessageKind::PostChapterization,
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            LiveV2WebSocketMessage::AudioChunk(m) => &m.session_id,
            LiveV2WebSocketMessage::StopRecording(m) => &m.session_id,
            LiveV2WebSocketMessage::StartSession(m)
            | LiveV2WebSocketMessage::StartRecording(m)
            | LiveV2WebSocketMessage::EndSession(m) => &m.session_id,
            LiveV2WebSocketMessage::EndRecording(m) => &m.session_id,
            LiveV2WebSocketMessage::SpeechStart(m) | LiveV2WebSocketMessage::SpeechEnd(m) => {
                &m.session_id
            }
            LiveV2WebSocketMessage::Transcript(m) => &m.session_id,
            LiveV2WebSocketMessage::Translation(m) => &m.session_id,
            LiveV2WebSocketMessage::NamedEntityRecognition(m) => &m.session_id,
            LiveV2WebSocketMessage::SentimentAnalysis(m) => &m.session_id,
            LiveV2WebSocketMessage::PostTranscript(m) => &m.session_id,
            LiveV2WebSocketMessage::PostFinalTranscript(m) => &m.session_id,
            LiveV2WebSocketMessage::PostSummarization(m) => &m.session_id,
            LiveV2WebSocketMessage::PostChapterization(m) => &m.session_id,
        }
    }

    /// `audio_chunk` and `stop_recording` acknowledgments.
    pub fn is_acknowledgment(&self) -> bool {
        matches!(
            self,
            LiveV2WebSocketMessage::AudioChunk(_) | LiveV2WebSocketMessage::StopRecording(_)
        )
    }

    /// End offset of the acknowledged audio, if this is a successful chunk ack.
    pub fn acknowledged_byte_end(&self) -> Option<u64> {
        match self {
            LiveV2WebSocketMessage::AudioChunk(ack) if ack.acknowledged => {
                ack.data.as_ref().map(|d| d.byte_range[1])
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRANSCRIPT: &str = r#"{
        "session_id": "45463597-20b7-4af7-b3b3-f5fb778203ab",
        "created_at": "2024-10-11T13:58:36.112Z",
        "type": "transcript",
        "data": {
            "id": "00_00000000",
            "is_final": true,
            "utterance": {
                "start": 0.2, "end": 1.4, "confidence": 0.97, "channel": 0,
                "words": [{"word": "Hello", "start": 0.2, "end": 0.6, "confidence": 0.99}],
                "text": "Hello world",
                "language": "en"
            }
        }
    }"#;

    #[test]
    fn test_parse_transcript() {
        let message = LiveV2WebSocketMessage::from_json(TRANSCRIPT).unwrap();
        assert_eq!(message.kind(), MessageKind::Transcript);
        assert_eq!(message.session_id(), "45463597-20b7-4af7-b3b3-f5fb778203ab");
        let LiveV2WebSocketMessage::Transcript(t) = message else {
            panic!("expected a transcript");
        };
        assert!(t.data.is_final);
        assert_eq!(t.data.utterance.text, "Hello world");
        assert_eq!(t.data.utterance.speaker, None);
    }

    #[test]
    fn test_parse_audio_chunk_ack() {
        let message = LiveV2WebSocketMessage::from_json(
            r#"{"session_id":"s","created_at":"t","type":"audio_chunk","acknowledged":true,
                "error":null,"data":{"byte_range":[0,3200],"time_range":[0.0,0.1]}}"#,
        )
        .unwrap();
        assert!(message.is_acknowledgment());
        assert_eq!(message.acknowledged_byte_end(), Some(3200));
    }

    #[test]
    fn test_failed_ack_has_no_byte_end() {
        let message = LiveV2WebSocketMessage::from_json(
            r#"{"session_id":"s","created_at":"t","type":"audio_chunk","acknowledged":false,
                "error":{"message":"bad chunk"},"data":null}"#,
        )
        .unwrap();
        assert_eq!(message.acknowledged_byte_end(), None);
    }

    #[test]
    fn test_parse_lifecycle_and_addon_messages() {
        let end = LiveV2WebSocketMessage::from_json(
            r#"{"session_id":"s","created_at":"t","type":"end_session"}"#,
        )
        .unwrap();
        assert_eq!(end.kind(), MessageKind::EndSession);

        let summary = LiveV2WebSocketMessage::from_json(
            r#"{"session_id":"s","created_at":"t","type":"post_summarization","error":null,
                "data":{"results":"A short call."}}"#,
        )
        .unwrap();
        let LiveV2WebSocketMessage::PostSummarization(s) = summary else {
            panic!("expected a summary");
        };
        assert_eq!(s.data.unwrap().results, "A short call.");
    }

    #[test]
    fn test_parse_post_final_transcript() {
        let message = LiveV2WebSocketMessage::from_json(
            r#"{"session_id":"s","created_at":"t","type":"post_final_transcript","data":{
                "metadata":{"audio_duration":3.5,"number_of_distinct_channels":1,
                            "billing_time":3.5,"transcription_time":1.2},
                "transcription":{"full_transcript":"Hello world","languages":["en"],"utterances":[]},
                "summarization":{"success":true,"is_empty":false,"exec_time":0.4,"error":null,
                                 "results":"Greeting."}
            }}"#,
        )
        .unwrap();
        let LiveV2WebSocketMessage::PostFinalTranscript(m) = message else {
            panic!("expected a final transcript");
        };
        assert_eq!(m.data.transcription.unwrap().full_transcript, "Hello world");
        assert_eq!(m.data.summarization.unwrap().results.as_deref(), Some("Greeting."));
    }

    #[test]
    fn test_protocol_errors() {
        for raw in [
            "not json",
            r#"{"session_id":"s"}"#,
            r#"{"type":42}"#,
            r#"{"type":"unheard_of","session_id":"s","created_at":"t"}"#,
            r#"{"type":"transcript","session_id":"s","created_at":"t"}"#,
        ] {
            let err = LiveV2WebSocketMessage::from_json(raw).unwrap_err();
            match err {
                Error::Protocol { raw: kept, .. } => assert_eq!(kept, raw),
                other => panic!("expected a protocol error for {raw}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_serializes_with_type_tag() {
        let message = LiveV2WebSocketMessage::StartSession(LifecycleMessage {
            session_id: "s".into(),
            created_at: "t".into(),
        });
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], "start_session");
        assert_eq!(MessageKind::PostChapterization.to_string(), "post_chapterization");
    }
}
