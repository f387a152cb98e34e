use std::io::Cursor;

use serde_json::json;
use webview_bridge::transport::{decode_frame, encode_frame, ChannelTransport, Transport, MAX_FROM_CONTENT};

#[test]
fn encode_then_decode_roundtrip() {
    let text = json!({ "protocol": "app://echo", "unicode": "héllo 🌍" }).to_string();
    let frame = encode_frame(&text).expect("encode");
    // First 4 bytes = length
    let len = u32::from_ne_bytes(frame[0..4].try_into().unwrap()) as usize;
    assert_eq!(len, frame.len() - 4);

    let mut cur = Cursor::new(frame);
    let decoded = decode_frame(&mut cur, MAX_FROM_CONTENT).expect("decode");
    assert_eq!(decoded, text);
}

#[test]
fn encode_frame_enforces_1mb_limit() {
    let big = "x".repeat(1_200_000);
    let err = encode_frame(&big).expect_err("should exceed 1MB host->content limit");
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
}

#[test]
fn decode_frame_respects_max_size_cap() {
    // Claims 1024 bytes with none following; the cap must trip before the body read.
    let mut frame = Vec::new();
    frame.extend_from_slice(&(1024u32).to_ne_bytes());
    let mut cur = Cursor::new(frame);
    let err = decode_frame(&mut cur, 8).expect_err("should reject over cap");
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}

#[test]
fn decode_frame_invalid_utf8() {
    let mut frame = Vec::new();
    let body = vec![0xff, 0xfe, 0xfd];
    frame.extend_from_slice(&(body.len() as u32).to_ne_bytes());
    frame.extend_from_slice(&body);
    let mut cur = Cursor::new(frame);
    let err = decode_frame(&mut cur, 1024).expect_err("invalid utf-8 should error");
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}

#[test]
fn decode_frame_reports_eof_on_empty_input() {
    let mut cur = Cursor::new(Vec::new());
    let err = decode_frame(&mut cur, 1024).expect_err("empty input is EOF");
    assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
}

#[test]
fn channel_transport_detaches_when_receiver_drops() {
    let (transport, rx) = ChannelTransport::new();
    assert!(transport.is_attached());
    transport.send_text("one".to_string()).unwrap();
    drop(rx);
    assert!(!transport.is_attached());
    let err = transport.send_text("two".to_string()).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
}
