//! Frame buffer reader behavior: memory-budgeted bulk retrieval, ordering,
//! cancellation between blocks, and format rejection.

use camdaq_core::capabilities::AcquisitionMode;
use camdaq_core::error::CamError;
use camdaq_core::frame::PixelFormat;
use camdaq_core::sdk::{CameraSdk, HardwareStatus};
use camdaq_ctrl::acquisition::{CancelFlag, FrameBufferReader};
use camdaq_mock::MockSdk;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

const WIDTH: u32 = 64;
const HEIGHT: u32 = 64;
const FRAME_BYTES_MONO16: usize = (WIDTH * HEIGHT) as usize * 2;

/// Run a short kinetic series to completion so the ring buffer holds
/// `frames` entries.
async fn acquire(frames: u32) -> Arc<MockSdk> {
    let sdk = Arc::new(MockSdk::builder().build());
    sdk.set_acquisition_mode(AcquisitionMode::Kinetic)
        .await
        .unwrap();
    sdk.set_exposure_time(0.005).await.unwrap();
    sdk.set_kinetic_cycle(frames, 0.005).await.unwrap();
    sdk.start_acquisition().await.unwrap();
    for _ in 0..200 {
        if sdk.status().await.unwrap() == HardwareStatus::Idle {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(sdk.available_frame_range().await.unwrap(), Some((1, frames as u64)));
    sdk
}

fn stamp(index: u64) -> chrono::DateTime<chrono::Utc> {
    Utc::now() + ChronoDuration::milliseconds(index as i64)
}

async fn pull_with_budget(frames: u32, budget: usize) -> Vec<u64> {
    let sdk = acquire(frames).await;
    let reader = FrameBufferReader::new(sdk, WIDTH, HEIGHT);
    let cancel = CancelFlag::default();
    let pulled = reader
        .pull_all(PixelFormat::Mono16, budget, &cancel, stamp)
        .await
        .unwrap();
    assert!(pulled.iter().all(|f| f.as_mono16().is_some()));
    pulled.iter().map(|f| f.index).collect()
}

#[tokio::test]
async fn bulk_pull_returns_all_frames_in_order_with_multi_frame_blocks() {
    let indices = pull_with_budget(5, 3 * FRAME_BYTES_MONO16).await;
    assert_eq!(indices, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn bulk_pull_with_oversized_budget_clamps_to_total() {
    let indices = pull_with_budget(4, 100 * FRAME_BYTES_MONO16).await;
    assert_eq!(indices, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn bulk_pull_with_sub_frame_budget_degrades_to_single_frame_blocks() {
    let indices = pull_with_budget(3, 100).await;
    assert_eq!(indices, vec![1, 2, 3]);
}

#[tokio::test]
async fn bulk_pull_honors_requested_encoding() {
    let sdk = acquire(2).await;
    let reader = FrameBufferReader::new(sdk, WIDTH, HEIGHT);
    let cancel = CancelFlag::default();
    let pulled = reader
        .pull_all(PixelFormat::Mono32, usize::MAX, &cancel, stamp)
        .await
        .unwrap();
    assert_eq!(pulled.len(), 2);
    assert!(pulled.iter().all(|f| f.as_mono32().is_some()));
}

#[tokio::test]
async fn cancellation_surfaces_instead_of_partial_result() {
    let sdk = acquire(3).await;
    let reader = FrameBufferReader::new(sdk, WIDTH, HEIGHT);
    let cancel = CancelFlag::default();
    cancel.cancel();
    let err = reader
        .pull_all(PixelFormat::Mono16, FRAME_BYTES_MONO16, &cancel, stamp)
        .await
        .unwrap_err();
    assert!(matches!(err, CamError::Cancelled));
}

#[tokio::test]
async fn non_hardware_format_is_rejected() {
    let sdk = Arc::new(MockSdk::builder().build());
    let reader = FrameBufferReader::new(sdk, WIDTH, HEIGHT);
    let cancel = CancelFlag::default();
    let err = reader
        .pull_all(PixelFormat::Float32, usize::MAX, &cancel, stamp)
        .await
        .unwrap_err();
    assert!(matches!(err, CamError::UnsupportedFormat(_)));

    let sdk = Arc::new(MockSdk::builder().build());
    let reader = FrameBufferReader::new(sdk, WIDTH, HEIGHT);
    let err = reader
        .pull_one(1, PixelFormat::Float32, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, CamError::UnsupportedFormat(_)));
}

#[tokio::test]
async fn empty_ring_buffer_yields_empty_result() {
    let sdk = Arc::new(MockSdk::builder().build());
    let reader = FrameBufferReader::new(sdk, WIDTH, HEIGHT);
    let cancel = CancelFlag::default();
    let pulled = reader
        .pull_all(PixelFormat::Mono16, usize::MAX, &cancel, stamp)
        .await
        .unwrap();
    assert!(pulled.is_empty());
}

#[tokio::test]
async fn pull_one_reports_no_data_for_future_index() {
    let sdk = acquire(2).await;
    let reader = FrameBufferReader::new(sdk, WIDTH, HEIGHT);
    let frame = reader
        .pull_one(7, PixelFormat::Mono16, Utc::now())
        .await
        .unwrap();
    assert!(frame.is_none());

    let frame = reader
        .pull_one(1, PixelFormat::Mono16, Utc::now())
        .await
        .unwrap();
    assert_eq!(frame.map(|f| f.index), Some(1));
}
