//! Session creation payloads for `POST /v2/live`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// ISO 639 language code, e.g. `"en"` or `"fr"`.
pub type LanguageCode = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    #[serde(rename = "wav/pcm")]
    WavPcm,
    #[serde(rename = "wav/alaw")]
    WavAlaw,
    #[serde(rename = "wav/ulaw")]
    WavUlaw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Model {
    #[serde(rename = "solaria-1")]
    Solaria1,
    #[serde(rename = "solaria-2")]
    Solaria2,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanguageConfig {
    /// One language pins the transcription language; none or several enable detection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub languages: Option<Vec<LanguageCode>>,
    /// Detect the language on every utterance instead of only the first one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_switching: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreProcessingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_enhancer: Option<bool>,
    /// Closer to 1 means stricter speech detection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_threshold: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomVocabularyEntry {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intensity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pronunciations: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<LanguageCode>,
}

/// A vocabulary item, either a bare word or a detailed entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CustomVocabularyItem {
    Word(String),
    Entry(CustomVocabularyEntry),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomVocabularyConfig {
    pub vocabulary: Vec<CustomVocabularyItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_intensity: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomSpellingConfig {
    pub spelling_dictionary: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationModel {
    Base,
    Enhanced,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranslationConfig {
    pub target_languages: Vec<LanguageCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<TranslationModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_original_utterances: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lipsync: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_adaptation: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub informal: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RealtimeProcessingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_vocabulary: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_vocabulary_config: Option<CustomVocabularyConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_spelling: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_spelling_config: Option<CustomSpellingConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation_config: Option<TranslationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub named_entity_recognition: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment_analysis: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryType {
    General,
    BulletPoints,
    Concise,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummarizationConfig {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub summary_type: Option<SummaryType>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostProcessingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summarization: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summarization_config: Option<SummarizationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapterization: Option<bool>,
}

/// Which messages the server pushes over the socket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagesConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receive_partial_transcripts: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receive_final_transcripts: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receive_speech_events: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receive_pre_processing_events: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receive_realtime_processing_events: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receive_post_processing_events: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receive_acknowledgments: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receive_errors: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receive_lifecycle_events: Option<bool>,
}

/// Which messages the server posts to the callback URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receive_partial_transcripts: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receive_final_transcripts: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receive_speech_events: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receive_pre_processing_events: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receive_realtime_processing_events: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receive_post_processing_events: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receive_acknowledgments: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receive_errors: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receive_lifecycle_events: Option<bool>,
}

/// Body of `POST /v2/live`.
///
/// Every field is optional; unset fields are left out of the payload so the
/// server applies its own defaults.
///
/// ```rust
/// use gladia_live::types::init::{Encoding, LanguageConfig, LiveV2InitRequest};
///
/// let request = LiveV2InitRequest {
///     encoding: Some(Encoding::WavPcm),
///     sample_rate: Some(16_000),
///     bit_depth: Some(16),
///     channels: Some(1),
///     language_config: Some(LanguageConfig {
///         languages: Some(vec!["en".into()]),
///         ..Default::default()
///     }),
///     ..Default::default()
/// };
/// let json = serde_json::to_value(&request).unwrap();
/// assert_eq!(json["encoding"], "wav/pcm");
/// assert!(json.get("model").is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveV2InitRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<Encoding>,
    /// 8, 16, 24 or 32.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bit_depth: Option<u8>,
    /// 8000, 16000, 32000, 44100 or 48000.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_metadata: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<Model>,
    /// Seconds of silence that close an utterance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpointing: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_duration_without_endpointing: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_config: Option<LanguageConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_processing: Option<PreProcessingConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realtime_processing: Option<RealtimeProcessingConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_processing: Option<PostProcessingConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages_config: Option<MessagesConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_config: Option<CallbackConfig>,
}

impl LiveV2InitRequest {
    /// Whether the caller asked to see acknowledgment messages.
    pub fn wants_acknowledgments(&self) -> bool {
        self.messages_config
            .as_ref()
            .and_then(|m| m.receive_acknowledgments)
            .unwrap_or(false)
    }

    pub fn wants_lifecycle_events(&self) -> bool {
        self.messages_config
            .as_ref()
            .and_then(|m| m.receive_lifecycle_events)
            .unwrap_or(false)
    }

    /// Copy of the request with acknowledgments forced on.
    ///
    /// The live session trims its replay buffer on acknowledgments, so they must be
    /// delivered whatever the caller chose to observe.
    pub fn with_acknowledgments_forced(&self) -> Self {
        let mut request = self.clone();
        request
            .messages_config
            .get_or_insert_with(MessagesConfig::default)
            .receive_acknowledgments = Some(true);
        request
    }
}

/// Response of `POST /v2/live`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveV2InitResponse {
    pub id: String,
    pub created_at: String,
    /// Pre-authenticated WebSocket URL for the audio stream.
    pub url: String,
}
