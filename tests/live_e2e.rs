//! End-to-end session against the real Gladia API.
//!
//! Run with: GLADIA_API_KEY=... GLADIA_E2E_AUDIO=short_split_infinity_16k.wav \
//!   cargo test --test live_e2e -- --ignored --nocapture

mod common;

use common::init_tracing;
use gladia_live::live::events;
use gladia_live::types::init::{Encoding, LanguageConfig, LiveV2InitRequest};
use gladia_live::{GladiaClientBuilder, LiveStatus};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::assert_ok;

const CHUNK_MS: u64 = 50;

struct WavFile {
    spec: hound::WavSpec,
    data: Vec<u8>,
}

/// Decode a PCM WAV file back into the little-endian bytes the API expects.
fn read_wav(path: &str) -> WavFile {
    let mut reader = hound::WavReader::open(path)
        .unwrap_or_else(|e| panic!("open WAV {path}: {e}"));
    let spec = reader.spec();
    assert_eq!(spec.sample_format, hound::SampleFormat::Int, "PCM WAV expected");

    let mut data = Vec::new();
    for sample in reader.samples::<i32>() {
        let sample = sample.unwrap_or_else(|e| panic!("read WAV {path}: {e}"));
        match spec.bits_per_sample {
            8 => data.push((sample + 128) as u8),
            16 => data.extend_from_slice(&(sample as i16).to_le_bytes()),
            24 => data.extend_from_slice(&sample.to_le_bytes()[..3]),
            32 => data.extend_from_slice(&sample.to_le_bytes()),
            other => panic!("unsupported bit depth {other}"),
        }
    }
    WavFile { spec, data }
}

#[tokio::test]
#[ignore = "requires GLADIA_API_KEY and GLADIA_E2E_AUDIO"]
async fn test_split_infinity_transcription() {
    init_tracing();
    let Ok(path) = std::env::var("GLADIA_E2E_AUDIO") else {
        eprintln!("GLADIA_E2E_AUDIO not set, skipping");
        return;
    };
    let wav = read_wav(&path);

    let builder = assert_ok!(GladiaClientBuilder::from_env());
    let client = assert_ok!(builder.build());
    let live = assert_ok!(client.live_v2());
    let session = live.start_session(LiveV2InitRequest {
        encoding: Some(Encoding::WavPcm),
        sample_rate: Some(wav.spec.sample_rate),
        channels: Some(wav.spec.channels),
        bit_depth: Some(wav.spec.bits_per_sample as u8),
        language_config: Some(LanguageConfig {
            languages: Some(vec!["en".to_string()]),
            ..Default::default()
        }),
        ..Default::default()
    });
    assert_eq!(session.status(), LiveStatus::Starting);

    let transcripts = Arc::new(Mutex::new(Vec::new()));
    let sink = transcripts.clone();
    session.on::<events::Transcript>(move |msg| {
        sink.lock()
            .unwrap()
            .push((msg.data.is_final, msg.data.utterance.text.clone()));
    });
    session.on::<events::Error>(|err| eprintln!("live session error: {err}"));

    let bytes_per_second = wav.spec.sample_rate as usize
        * wav.spec.channels as usize
        * (wav.spec.bits_per_sample as usize / 8);
    let chunk_size = (bytes_per_second * CHUNK_MS as usize / 1000).max(1);
    for chunk in wav.data.chunks(chunk_size) {
        session.send_audio(chunk);
        tokio::time::sleep(Duration::from_millis(CHUNK_MS)).await;
    }
    session.stop_recording();

    tokio::time::timeout(Duration::from_secs(120), session.ended())
        .await
        .expect("session ended in time");
    assert_eq!(session.status(), LiveStatus::Ended);

    let transcripts = transcripts.lock().unwrap();
    assert!(!transcripts.is_empty());
    assert!(transcripts.iter().all(|(is_final, _)| *is_final));
    let text = transcripts
        .iter()
        .map(|(_, text)| text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let words: String = text
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    assert_eq!(words.split_whitespace().collect::<Vec<_>>(), ["split", "infinity"]);
}
