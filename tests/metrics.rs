#![cfg(feature = "metrics")]
//! Tests for `bleframe` metrics helpers.
//!
//! These tests verify that counters and gauges update as expected using
//! `metrics_util::debugging::DebuggingRecorder`.

use std::sync::Arc;

use bleframe::{
    config::TransferConfig,
    frame::{Category, encode_header},
    index::TransferIndex,
    link::{ChannelId, PeerId},
    metrics::{
        Direction,
        ERRORS_TOTAL,
        FRAMES_TOTAL,
        Outcome,
        TRANSFERS_ACTIVE,
        TRANSFERS_TOTAL,
    },
    transfer::{NoopListener, TransferRegistry},
};
use bytes::Bytes;
use metrics_util::{
    CompositeKey,
    debugging::{DebugValue, DebuggingRecorder, Snapshotter},
};
use rstest::rstest;

fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

/// Take one snapshot; reading it again would see counters already drained.
fn recorded(snapshotter: &Snapshotter) -> Vec<(CompositeKey, DebugValue)> {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(key, _, _, value)| (key, value))
        .collect()
}

fn counter(recorded: &[(CompositeKey, DebugValue)], name: &str, labels: &[(&str, &str)]) -> u64 {
    recorded
        .iter()
        .find_map(|(key, value)| {
            let key = key.key();
            let hit = key.name() == name
                && labels
                    .iter()
                    .all(|(k, v)| key.labels().any(|l| l.key() == *k && l.value() == *v));
            match value {
                DebugValue::Counter(count) if hit => Some(*count),
                _ => None,
            }
        })
        .unwrap_or(0)
}

#[rstest]
#[case(Direction::Inbound, "inbound")]
#[case(Direction::Outbound, "outbound")]
fn frame_metric_carries_direction(#[case] direction: Direction, #[case] label: &str) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        bleframe::metrics::inc_frames(direction);
        bleframe::metrics::inc_frames(direction);
    });
    let recorded = recorded(&snapshotter);
    assert_eq!(counter(&recorded, FRAMES_TOTAL, &[("direction", label)]), 2);
}

#[test]
fn transfer_metric_carries_outcome() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        bleframe::metrics::inc_transfers(Direction::Outbound, Outcome::TimedOut);
    });
    let recorded = recorded(&snapshotter);
    assert_eq!(
        counter(
            &recorded,
            TRANSFERS_TOTAL,
            &[("direction", "outbound"), ("outcome", "timed_out")]
        ),
        1
    );
}

#[test]
fn error_metric_increments() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, bleframe::metrics::inc_errors);
    let recorded = recorded(&snapshotter);
    assert_eq!(counter(&recorded, ERRORS_TOTAL, &[]), 1);
}

#[test]
fn active_transfer_gauge_tracks_balance() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        bleframe::metrics::inc_active_transfers();
        bleframe::metrics::inc_active_transfers();
        bleframe::metrics::dec_active_transfers();
    });
    let gauge = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .find_map(|(key, _, _, value)| match value {
            DebugValue::Gauge(level) if key.key().name() == TRANSFERS_ACTIVE => Some(level),
            _ => None,
        })
        .expect("gauge recorded");
    assert!((gauge.into_inner() - 1.0).abs() < f64::EPSILON);
}

#[test]
fn single_frame_transfer_is_counted_as_received() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    let registry = TransferRegistry::new(TransferConfig::default(), Arc::new(NoopListener));
    let header = encode_header(
        TransferIndex::new(-127),
        Category::PeerWrite.tag(),
        2,
        1,
        b"ok",
    );

    let payload = metrics::with_local_recorder(&recorder, || {
        registry.ingest(
            &PeerId::from("peer"),
            &ChannelId::from_u128(1, 2),
            Category::PeerWrite,
            &header,
        )
    });

    assert_eq!(payload, Some(Bytes::from_static(b"ok")));
    let recorded = recorded(&snapshotter);
    assert_eq!(counter(&recorded, FRAMES_TOTAL, &[("direction", "inbound")]), 1);
    assert_eq!(
        counter(
            &recorded,
            TRANSFERS_TOTAL,
            &[("direction", "inbound"), ("outcome", "received")]
        ),
        1
    );
}
