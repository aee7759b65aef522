//! Benchmarks for the live session hot path
//!
//! This benchmark measures:
//! - WebSocket message parsing
//! - Audio buffering and acknowledgment trimming
//! - Retry decisions

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use gladia_live::live::AudioBuffer;
use gladia_live::resilience::{RetryPolicy, WebSocketRetryPolicy};
use gladia_live::LiveV2WebSocketMessage;

/// Messages in the order a short session produces them.
const MESSAGES: &[&str] = &[
    r#"{"type":"start_session","session_id":"sess","created_at":"2024-01-01T00:00:00Z"}"#,
    r#"{"type":"start_recording","session_id":"sess","created_at":"2024-01-01T00:00:00Z"}"#,
    r#"{"type":"audio_chunk","session_id":"sess","created_at":"2024-01-01T00:00:00Z","acknowledged":true,"data":{"byte_range":[0,3200],"time_range":[0.0,0.1]}}"#,
    r#"{"type":"speech_start","session_id":"sess","created_at":"2024-01-01T00:00:00Z","data":{"time":0.1,"channel":0}}"#,
    r#"{"type":"transcript","session_id":"sess","created_at":"2024-01-01T00:00:00Z","data":{"id":"00_00000000","is_final":true,"utterance":{"start":0.1,"end":1.2,"confidence":0.93,"channel":0,"words":[{"word":"split","start":0.1,"end":0.5,"confidence":0.95},{"word":" infinity","start":0.5,"end":1.2,"confidence":0.91}],"text":"split infinity","language":"en"}}}"#,
    r#"{"type":"speech_end","session_id":"sess","created_at":"2024-01-01T00:00:00Z","data":{"time":1.2,"channel":0}}"#,
    r#"{"type":"stop_recording","session_id":"sess","created_at":"2024-01-01T00:00:00Z","acknowledged":true,"data":{"recording_duration":1.3,"recording_left_to_process":0.0}}"#,
    r#"{"type":"end_recording","session_id":"sess","created_at":"2024-01-01T00:00:00Z","data":{"recording_duration":1.3}}"#,
    r#"{"type":"end_session","session_id":"sess","created_at":"2024-01-01T00:00:00Z"}"#,
];

fn bench_message_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("message_parsing");

    let transcript = MESSAGES[4];
    group.throughput(Throughput::Bytes(transcript.len() as u64));
    group.bench_function("parse_transcript", |b| {
        b.iter(|| LiveV2WebSocketMessage::from_json(black_box(transcript)).unwrap())
    });

    let total: usize = MESSAGES.iter().map(|m| m.len()).sum();
    group.throughput(Throughput::Bytes(total as u64));
    group.bench_function("parse_session", |b| {
        b.iter(|| {
            for message in black_box(MESSAGES) {
                let parsed = LiveV2WebSocketMessage::from_json(message).unwrap();
                black_box(parsed.kind());
            }
        })
    });

    group.finish();
}

fn bench_audio_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("audio_buffer");
    let chunk = vec![0u8; 3200];

    group.throughput(Throughput::Bytes(100 * chunk.len() as u64));
    group.bench_function("push_and_acknowledge", |b| {
        b.iter(|| {
            let mut buffer = AudioBuffer::new();
            let mut pushed = 0u64;
            for _ in 0..100 {
                buffer.push(black_box(&chunk));
                pushed += chunk.len() as u64;
                buffer.acknowledge(pushed - chunk.len() as u64 / 2);
            }
            black_box(buffer.pending())
        })
    });

    group.finish();
}

fn bench_retry_decisions(c: &mut Criterion) {
    let mut group = c.benchmark_group("retry");
    let http = RetryPolicy::http_default();
    let ws = WebSocketRetryPolicy::ws_default().per_connection;

    group.bench_function("http_decide", |b| {
        b.iter(|| {
            for status in [200u16, 408, 429, 500, 503, 404] {
                let retryable = http.matches(black_box(status));
                black_box(http.decide(black_box(2), retryable));
            }
        })
    });

    group.bench_function("ws_close_codes", |b| {
        b.iter(|| {
            for code in [1000u16, 1006, 3008, 4000, 4400, 4500] {
                black_box(ws.matches(black_box(code)));
            }
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_message_parsing,
    bench_audio_buffer,
    bench_retry_decisions
);
criterion_main!(benches);
