//! Tests for the inbound reassembly state machine.

use std::time::Duration;

use bytes::Bytes;
use rstest::{fixture, rstest};
use tokio::time::Instant;

use crate::{
    frame::{Category, FormatError, encode_continuation, encode_header},
    index::TransferIndex,
    transfer::{ReassemblyState, Reassembler, Segmenter, TransferError},
};

const INDEX: TransferIndex = TransferIndex::new(4);
const TIMEOUT: Duration = Duration::from_secs(2);

#[fixture]
fn reassembler() -> Reassembler {
    Reassembler::new(Category::ControllerWrite.tag(), 1024, TIMEOUT, Instant::now())
}

fn header(total_length: u32, frame_count: u32, chunk: &[u8]) -> Bytes {
    encode_header(INDEX, Category::ControllerWrite.tag(), total_length, frame_count, chunk)
}

#[rstest]
fn segmented_payload_is_restored(mut reassembler: Reassembler) {
    let payload: Vec<u8> = (0..=200).collect();
    let frames = Segmenter::new(20, 1024)
        .expect("budget is valid")
        .segment(INDEX, Category::ControllerWrite.tag(), &payload)
        .expect("payload segments");
    let now = Instant::now();

    let (last, leading) = frames.split_last().expect("at least one frame");
    for frame in leading {
        assert_eq!(reassembler.accept(frame, now), Ok(None));
        assert_eq!(reassembler.state(), ReassemblyState::Receiving);
    }
    let restored = reassembler
        .accept(last, now)
        .expect("last frame accepted")
        .expect("transfer complete");
    assert_eq!(&restored[..], &payload[..]);
    assert_eq!(reassembler.state(), ReassemblyState::Completed);
}

#[rstest]
fn single_frame_transfer_completes_on_header(mut reassembler: Reassembler) {
    let done = reassembler
        .accept(&header(3, 1, b"abc"), Instant::now())
        .expect("header accepted");
    assert_eq!(done.as_deref(), Some(&b"abc"[..]));
}

#[rstest]
fn empty_transfer_completes_with_empty_payload(mut reassembler: Reassembler) {
    let done = reassembler
        .accept(&header(0, 1, &[]), Instant::now())
        .expect("header accepted");
    assert_eq!(done, Some(Bytes::new()));
}

#[rstest]
#[case(vec![2], 1)]
#[case(vec![1, 1], 2)]
#[case(vec![0], 1)]
fn out_of_order_continuations_fail(
    mut reassembler: Reassembler,
    #[case] sequences: Vec<u32>,
    #[case] expected: u32,
) {
    let now = Instant::now();
    reassembler
        .accept(&header(30, 4, b"aaaaaaaaa"), now)
        .expect("header accepted");
    let mut result = Ok(None);
    for sequence in sequences {
        result = reassembler.accept(&encode_continuation(INDEX, sequence, b"bbbbbbb"), now);
        if result.is_err() {
            break;
        }
    }
    let found = match result {
        Err(TransferError::Sequence { expected: e, found }) => {
            assert_eq!(e, expected);
            found
        }
        other => panic!("expected sequence error, got {other:?}"),
    };
    assert_ne!(found, expected);
    assert_eq!(reassembler.state(), ReassemblyState::Failed);
}

#[rstest]
fn wrong_tag_fails_the_header(mut reassembler: Reassembler) {
    let raw = encode_header(INDEX, Category::PeerWrite.tag(), 1, 1, b"x");
    assert_eq!(
        reassembler.accept(&raw, Instant::now()),
        Err(TransferError::Format(FormatError::TagMismatch {
            expected: Category::ControllerWrite.tag(),
            found: Category::PeerWrite.tag(),
        }))
    );
    assert_eq!(reassembler.state(), ReassemblyState::Failed);
}

#[rstest]
fn zero_frame_count_fails(mut reassembler: Reassembler) {
    assert_eq!(
        reassembler.accept(&header(0, 0, &[]), Instant::now()),
        Err(TransferError::Format(FormatError::ZeroFrameCount))
    );
}

#[rstest]
fn declared_length_above_maximum_fails(mut reassembler: Reassembler) {
    assert_eq!(
        reassembler.accept(&header(1025, 60, b"x"), Instant::now()),
        Err(TransferError::PayloadTooLarge {
            len: 1025,
            max: 1024,
        })
    );
}

#[rstest]
fn short_final_length_is_a_mismatch(mut reassembler: Reassembler) {
    let now = Instant::now();
    reassembler
        .accept(&header(10, 2, b"abc"), now)
        .expect("header accepted");
    assert_eq!(
        reassembler.accept(&encode_continuation(INDEX, 1, b"de"), now),
        Err(TransferError::LengthMismatch {
            declared: 10,
            received: 5,
        })
    );
    assert_eq!(reassembler.state(), ReassemblyState::Failed);
}

#[rstest]
fn overrun_fails_before_the_last_frame(mut reassembler: Reassembler) {
    let now = Instant::now();
    reassembler
        .accept(&header(4, 3, b"abc"), now)
        .expect("header accepted");
    assert_eq!(
        reassembler.accept(&encode_continuation(INDEX, 1, b"de"), now),
        Err(TransferError::LengthMismatch {
            declared: 4,
            received: 5,
        })
    );
}

#[rstest]
fn frames_after_a_terminal_state_are_refused(mut reassembler: Reassembler) {
    let now = Instant::now();
    reassembler
        .accept(&header(1, 1, b"z"), now)
        .expect("header accepted");
    assert_eq!(
        reassembler.accept(&encode_continuation(INDEX, 1, b"y"), now),
        Err(TransferError::Closed)
    );
}

#[rstest]
fn continuation_as_first_frame_is_a_format_error(mut reassembler: Reassembler) {
    let result = reassembler.accept(&encode_continuation(INDEX, 1, b"y"), Instant::now());
    assert!(matches!(
        result,
        Err(TransferError::Format(FormatError::TooShort { .. }))
    ));
}

#[tokio::test(start_paused = true)]
async fn accepted_frames_push_the_deadline_back() {
    let start = Instant::now();
    let mut reassembler = Reassembler::new(Category::ControllerWrite.tag(), 1024, TIMEOUT, start);
    reassembler
        .accept(&header(20, 3, b"aaaaaaaaa"), start)
        .expect("header accepted");
    assert_eq!(reassembler.deadline(), start + TIMEOUT);

    tokio::time::advance(Duration::from_millis(1500)).await;
    let later = Instant::now();
    reassembler
        .accept(&encode_continuation(INDEX, 1, b"bbbbbbb"), later)
        .expect("continuation accepted");
    assert_eq!(reassembler.deadline(), later + TIMEOUT);

    let partial = reassembler.expire();
    assert_eq!(&partial[..], b"aaaaaaaaabbbbbbb");
    assert_eq!(reassembler.state(), ReassemblyState::TimedOut);
}

#[test]
fn header_does_not_preallocate_the_declared_length() {
    let max = 10 * 1024 * 1024;
    let mut reassembler =
        Reassembler::new(Category::ControllerWrite.tag(), max, TIMEOUT, Instant::now());
    let declared = u32::try_from(max).expect("fits in u32");

    let accepted = reassembler.accept(&header(declared, 1_000_000, b"x"), Instant::now());

    assert_eq!(accepted, Ok(None));
    assert_eq!(reassembler.buffered_len(), 1);
    assert!(reassembler.buffer_capacity() < 4096);
}
