//! Tests for per-destination state

use std::path::PathBuf;
use std::time::Duration;

use rill_protocol::{FallbackHandle, Message, SinkLifecycle, StreamId};
use tokio::sync::mpsc;

use crate::common::FileSinkMetrics;
use crate::file::state::DestinationState;
use crate::file::testutil::MockWriter;

fn msg(payload: &str) -> Message {
    Message::new(StreamId::new(1), payload.to_string())
}

fn state_with_writer(
    capacity: usize,
    threshold: usize,
    writer: MockWriter,
) -> (DestinationState, std::sync::Arc<parking_lot::Mutex<Vec<u8>>>) {
    let data = writer.data();
    let state = DestinationState::new(PathBuf::from("/tmp/dest.log"), capacity, threshold);
    state.install_writer(Box::new(writer));
    (state, data)
}

fn harness() -> (FallbackHandle, mpsc::Receiver<Message>, FileSinkMetrics) {
    let (fallback, rx) = FallbackHandle::channel(64);
    (fallback, rx, FileSinkMetrics::new())
}

#[test]
fn test_flush_writes_in_append_order() {
    let (state, data) = state_with_writer(16, 16, MockWriter::new("/tmp/dest.log"));
    let (fallback, mut rx, metrics) = harness();
    let lifecycle = SinkLifecycle::new();

    state.append_or_flush(msg("one|"), &lifecycle, &fallback, &metrics);
    state.append_or_flush(msg("two|"), &lifecycle, &fallback, &metrics);
    state.append_or_flush(msg("three|"), &lifecycle, &fallback, &metrics);
    state.flush(&fallback, &metrics).unwrap();

    assert_eq!(&*data.lock(), b"one|two|three|");
    assert!(rx.try_recv().is_err(), "nothing should reach fallback");

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.messages_buffered, 3);
    assert_eq!(snapshot.messages_written, 3);
    assert_eq!(snapshot.bytes_written, 14);
    assert_eq!(snapshot.flushes, 1);
}

#[test]
fn test_flush_threshold_triggers_inline() {
    let (state, data) = state_with_writer(16, 2, MockWriter::new("/tmp/dest.log"));
    let (fallback, _rx, metrics) = harness();
    let lifecycle = SinkLifecycle::new();

    state.append_or_flush(msg("a"), &lifecycle, &fallback, &metrics);
    assert!(data.lock().is_empty(), "below threshold, nothing written");

    state.append_or_flush(msg("b"), &lifecycle, &fallback, &metrics);
    assert_eq!(&*data.lock(), b"ab");
}

#[test]
fn test_flush_empty_batch_is_noop() {
    let (state, _data) = state_with_writer(4, 4, MockWriter::new("/tmp/dest.log"));
    let (fallback, _rx, metrics) = harness();

    state.flush(&fallback, &metrics).unwrap();
    assert_eq!(metrics.snapshot().flushes, 0);
}

#[test]
fn test_flush_without_writer_spools_everything() {
    let state = DestinationState::new(PathBuf::from("/tmp/dest.log"), 8, 8);
    let (fallback, mut rx, metrics) = harness();
    let lifecycle = SinkLifecycle::new();

    state.append_or_flush(msg("a"), &lifecycle, &fallback, &metrics);
    state.append_or_flush(msg("b"), &lifecycle, &fallback, &metrics);

    let err = state.flush(&fallback, &metrics);
    assert!(err.is_err());

    assert_eq!(rx.try_recv().unwrap().payload(), b"a");
    assert_eq!(rx.try_recv().unwrap().payload(), b"b");
    assert_eq!(metrics.snapshot().messages_fallback, 2);
}

#[test]
fn test_write_failure_spools_failed_and_following() {
    // First write succeeds, everything after fails
    let writer = MockWriter::new("/tmp/dest.log").failing_after(1);
    let (state, data) = state_with_writer(8, 8, writer);
    let (fallback, mut rx, metrics) = harness();
    let lifecycle = SinkLifecycle::new();

    state.append_or_flush(msg("kept"), &lifecycle, &fallback, &metrics);
    state.append_or_flush(msg("lost1"), &lifecycle, &fallback, &metrics);
    state.append_or_flush(msg("lost2"), &lifecycle, &fallback, &metrics);

    let err = state.flush(&fallback, &metrics);
    assert!(err.is_err());

    // The successfully written message never reaches fallback
    assert_eq!(&*data.lock(), b"kept");
    assert_eq!(rx.try_recv().unwrap().payload(), b"lost1");
    assert_eq!(rx.try_recv().unwrap().payload(), b"lost2");
    assert!(rx.try_recv().is_err());

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.messages_written, 1);
    assert_eq!(snapshot.messages_fallback, 2);
    assert_eq!(snapshot.write_errors, 1);
}

#[test]
fn test_flush_if_expired_respects_thresholds() {
    let (state, data) = state_with_writer(16, 8, MockWriter::new("/tmp/dest.log"));
    let (fallback, _rx, metrics) = harness();
    let lifecycle = SinkLifecycle::new();

    state.append_or_flush(msg("x"), &lifecycle, &fallback, &metrics);

    // Neither time (long timeout) nor size (below threshold) has expired
    state
        .flush_if_expired(Duration::from_secs(3600), &fallback, &metrics)
        .unwrap();
    assert!(data.lock().is_empty());

    // Zero timeout: the pending message is past the time threshold
    state
        .flush_if_expired(Duration::ZERO, &fallback, &metrics)
        .unwrap();
    assert_eq!(&*data.lock(), b"x");
}

#[tokio::test]
async fn test_close_flushes_and_clears_writer() {
    let (state, data) = state_with_writer(8, 8, MockWriter::new("/tmp/dest.log"));
    let (fallback, mut rx, metrics) = harness();
    let lifecycle = SinkLifecycle::new();

    state.append_or_flush(msg("tail"), &lifecycle, &fallback, &metrics);
    state.close(&fallback, &metrics).await.unwrap();

    assert_eq!(&*data.lock(), b"tail");

    // The writer is gone: a later flush with pending data must spool
    state.append_or_flush(msg("late"), &lifecycle, &fallback, &metrics);
    assert!(state.flush(&fallback, &metrics).is_err());
    assert_eq!(rx.try_recv().unwrap().payload(), b"late");
}

#[test]
fn test_detach_writer_empties_slot() {
    let (state, _data) = state_with_writer(8, 8, MockWriter::new("/tmp/dest.log"));

    assert!(state.detach_writer().is_some());
    assert!(state.detach_writer().is_none());
}
