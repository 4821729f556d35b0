//! Device capture contract. The core treats an acquired stream as an
//! opaque handle that it hands to the peer transport; real capture
//! backends (browser, OS) live outside this crate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::error::SessionError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("permission denied")]
    PermissionDenied,
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),
}

impl From<CaptureError> for SessionError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::PermissionDenied => SessionError::PermissionDenied,
            CaptureError::DeviceUnavailable(dev) => SessionError::DeviceUnavailable(dev),
        }
    }
}

/// Opaque handle to a live local or remote media stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStream {
    id: Uuid,
    label: String,
}

impl MediaStream {
    pub(crate) fn new(label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    AudioInput,
    AudioOutput,
    VideoInput,
}

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub id: String,
    pub label: String,
    pub kind: DeviceKind,
}

/// Which devices to capture from; `None` means the platform default.
#[derive(Debug, Clone, Default)]
pub struct MediaConstraints {
    pub audio_device: Option<String>,
    pub video_device: Option<String>,
}

#[async_trait]
pub trait DeviceCapture: Send + Sync {
    async fn enumerate(&self) -> Result<Vec<DeviceInfo>, CaptureError>;
    async fn acquire(&self, constraints: &MediaConstraints) -> Result<MediaStream, CaptureError>;
    fn release(&self, stream: MediaStream);
}

/// Capture backend producing synthetic stream handles. Used by the probe
/// binary and by tests; it counts live streams so teardown can be checked.
#[derive(Default)]
pub struct HeadlessCapture {
    live: Arc<AtomicUsize>,
}

impl HeadlessCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Streams acquired and not yet released.
    pub fn live_streams(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceCapture for HeadlessCapture {
    async fn enumerate(&self) -> Result<Vec<DeviceInfo>, CaptureError> {
        Ok(vec![
            DeviceInfo {
                id: "headless-mic".into(),
                label: "Headless microphone".into(),
                kind: DeviceKind::AudioInput,
            },
            DeviceInfo {
                id: "headless-cam".into(),
                label: "Headless camera".into(),
                kind: DeviceKind::VideoInput,
            },
        ])
    }

    async fn acquire(&self, constraints: &MediaConstraints) -> Result<MediaStream, CaptureError> {
        let audio = constraints.audio_device.as_deref().unwrap_or("headless-mic");
        let video = constraints.video_device.as_deref().unwrap_or("headless-cam");
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(MediaStream::new(format!("{audio}+{video}")))
    }

    fn release(&self, stream: MediaStream) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        drop(stream);
    }
}
