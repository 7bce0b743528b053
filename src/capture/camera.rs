//! Camera capture through an `ffmpeg` child process emitting raw RGB24 frames.

use std::io::Read;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;

use super::frame::Frame;
use super::source::{CameraDevice, VideoStream};
use crate::error::TranslateError;

const FIRST_FRAME_TIMEOUT: Duration = Duration::from_millis(3_000);
const FIRST_FRAME_POLL: Duration = Duration::from_millis(50);

pub struct FfmpegCamera {
    device: String,
    width: u32,
    height: u32,
    fps: u32,
}

impl FfmpegCamera {
    pub fn new(device: &str, width: u32, height: u32) -> Self {
        Self {
            device: normalize_device(device),
            width,
            height,
            fps: 15,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-hide_banner").arg("-loglevel").arg("error");

        #[cfg(target_os = "linux")]
        cmd.arg("-f").arg("video4linux2");
        #[cfg(target_os = "macos")]
        cmd.arg("-f").arg("avfoundation");
        #[cfg(target_os = "windows")]
        cmd.arg("-f").arg("dshow");

        cmd.arg("-framerate")
            .arg(self.fps.to_string())
            .arg("-i")
            .arg(&self.device)
            .arg("-vf")
            .arg(format!("scale={}:{}", self.width, self.height))
            .arg("-pix_fmt")
            .arg("rgb24")
            .arg("-f")
            .arg("rawvideo")
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        cmd
    }
}

/// Accept `0`, `/dev/video0`, or a platform-specific device name.
fn normalize_device(device: &str) -> String {
    #[cfg(target_os = "linux")]
    if let Ok(index) = device.parse::<u32>() {
        return format!("/dev/video{index}");
    }
    #[cfg(target_os = "windows")]
    if !device.starts_with("video=") {
        return format!("video={device}");
    }
    device.to_string()
}

#[async_trait]
impl CameraDevice for FfmpegCamera {
    async fn request_camera(&self) -> Result<Box<dyn VideoStream>, TranslateError> {
        #[cfg(target_os = "linux")]
        if !std::path::Path::new(&self.device).exists() {
            return Err(TranslateError::Permission(format!(
                "camera device {} not found",
                self.device
            )));
        }

        let child = self.command().spawn().map_err(|e| {
            TranslateError::Permission(format!("failed to start ffmpeg for {}: {}", self.device, e))
        })?;
        let mut stream = FfmpegStream::attach(child, (self.width, self.height))?;

        // A denied or busy device shows up as ffmpeg exiting before any frame.
        let mut waited = Duration::ZERO;
        while waited < FIRST_FRAME_TIMEOUT {
            if stream.has_frame() {
                return Ok(Box::new(stream));
            }
            if let Some(status) = stream.exit_status() {
                stream.stop();
                return Err(TranslateError::Permission(format!(
                    "camera {} unavailable (ffmpeg exited with {})",
                    self.device, status
                )));
            }
            tokio::time::sleep(FIRST_FRAME_POLL).await;
            waited += FIRST_FRAME_POLL;
        }

        log::warn!("No frame from {} yet; continuing to wait on the feed", self.device);
        Ok(Box::new(stream))
    }
}

fn spawn_reader(
    mut stdout: ChildStdout,
    size: (u32, u32),
    latest: Arc<Mutex<Option<Frame>>>,
    running: Arc<AtomicBool>,
) {
    let frame_bytes = size.0 as usize * size.1 as usize * Frame::CHANNELS;
    thread::spawn(move || {
        let mut buffer = vec![0u8; frame_bytes];
        while running.load(Ordering::SeqCst) {
            if let Err(e) = stdout.read_exact(&mut buffer) {
                if running.load(Ordering::SeqCst) {
                    log::error!("Camera feed ended: {}", e);
                }
                // A dead feed must not keep serving its last frame.
                if let Ok(mut slot) = latest.lock() {
                    *slot = None;
                }
                break;
            }
            if let Ok(mut slot) = latest.lock() {
                *slot = Some(Frame::new(buffer.clone(), size.0, size.1));
            }
        }
    });
}

struct FfmpegStream {
    child: Option<Child>,
    latest: Arc<Mutex<Option<Frame>>>,
    running: Arc<AtomicBool>,
}

impl FfmpegStream {
    /// Take over a child whose stdout carries raw rgb24 frames of `size`.
    fn attach(mut child: Child, size: (u32, u32)) -> Result<Self, TranslateError> {
        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(TranslateError::Permission("failed to capture ffmpeg stdout".into()));
        };

        let latest = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(true));
        spawn_reader(stdout, size, latest.clone(), running.clone());

        Ok(Self {
            child: Some(child),
            latest,
            running,
        })
    }

    fn has_frame(&self) -> bool {
        self.latest.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    fn exit_status(&mut self) -> Option<std::process::ExitStatus> {
        self.child.as_mut()?.try_wait().ok().flatten()
    }
}

impl VideoStream for FfmpegStream {
    fn latest_frame(&mut self) -> Option<Frame> {
        if let Some(status) = self.exit_status() {
            log::error!("Camera feed lost (ffmpeg exited with {})", status);
            self.stop();
            return None;
        }
        self.latest.lock().ok()?.clone()
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Ok(mut slot) = self.latest.lock() {
            *slot = None;
        }
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        self.stop();
    }
}
