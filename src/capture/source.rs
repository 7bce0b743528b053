//! Frame producers: a live camera feed or a one-shot uploaded image.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use super::frame::Frame;
use crate::error::TranslateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Camera,
    Upload,
}

#[async_trait]
pub trait ImageSource: Send {
    fn kind(&self) -> SourceKind;

    /// Acquire the feed (camera) or load the selected file (upload).
    /// Acquiring an already-acquired source is a no-op.
    async fn start(&mut self) -> Result<(), TranslateError>;

    /// Most recent frame with usable dimensions, if any.
    fn frame(&mut self) -> Option<Frame>;

    /// Release everything acquired by `start`. Safe to call repeatedly.
    fn stop(&mut self);

    fn is_live(&self) -> bool;
}

/// A running video feed handed out by a [`CameraDevice`].
pub trait VideoStream: Send {
    fn latest_frame(&mut self) -> Option<Frame>;
    fn stop(&mut self);
}

/// Platform camera capability. Asking for the camera is where permission
/// prompts and denials happen.
#[async_trait]
pub trait CameraDevice: Send + Sync {
    async fn request_camera(&self) -> Result<Box<dyn VideoStream>, TranslateError>;
}

pub struct CameraSource {
    device: Arc<dyn CameraDevice>,
    stream: Option<Box<dyn VideoStream>>,
}

impl CameraSource {
    pub fn new(device: Arc<dyn CameraDevice>) -> Self {
        Self {
            device,
            stream: None,
        }
    }
}

#[async_trait]
impl ImageSource for CameraSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Camera
    }

    async fn start(&mut self) -> Result<(), TranslateError> {
        if self.stream.is_some() {
            log::debug!("Camera already acquired");
            return Ok(());
        }
        let stream = self.device.request_camera().await?;
        self.stream = Some(stream);
        log::info!("Camera acquired");
        Ok(())
    }

    fn frame(&mut self) -> Option<Frame> {
        self.stream
            .as_mut()?
            .latest_frame()
            .filter(Frame::has_dimensions)
    }

    fn stop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            log::info!("Camera released");
        }
    }

    fn is_live(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Clone)]
enum Upload {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// Single image chosen by the user. Never mirrored, never touches a camera.
pub struct FileSource {
    upload: Upload,
    frame: Option<Frame>,
}

impl FileSource {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            upload: Upload::Path(path.into()),
            frame: None,
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            upload: Upload::Bytes(bytes),
            frame: None,
        }
    }
}

fn decode(upload: &Upload) -> Result<Frame, TranslateError> {
    let image = match upload {
        Upload::Path(path) => image::open(path)
            .map_err(|e| TranslateError::Encode(format!("{}: {}", path.display(), e)))?,
        Upload::Bytes(bytes) => image::load_from_memory(bytes)
            .map_err(|e| TranslateError::Encode(format!("uploaded image: {}", e)))?,
    };
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    Ok(Frame::new(rgb.into_raw(), width, height))
}

#[async_trait]
impl ImageSource for FileSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Upload
    }

    async fn start(&mut self) -> Result<(), TranslateError> {
        if self.frame.is_none() {
            // Decoding runs on the blocking pool, not the session's event loop.
            let upload = self.upload.clone();
            let frame = tokio::task::spawn_blocking(move || decode(&upload))
                .await
                .map_err(|e| TranslateError::Encode(format!("decode task failed: {}", e)))??;
            self.frame = Some(frame);
        }
        Ok(())
    }

    fn frame(&mut self) -> Option<Frame> {
        self.frame.clone().filter(Frame::has_dimensions)
    }

    fn stop(&mut self) {
        self.frame = None;
    }

    fn is_live(&self) -> bool {
        self.frame.is_some()
    }
}
