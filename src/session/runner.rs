//! Event loop for one translation session.
//!
//! Timer ticks, user commands and request completions are all funnelled
//! through a single `select!`, so session state is only ever touched from one
//! place. Analyze calls run on their own task and report back over a channel,
//! tagged with the generation they were issued under.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, Interval, MissedTickBehavior};

use super::state::{Completion, Session, SessionMode, SessionStateMachine};
use super::status::Status;
use crate::api::{InferenceBackend, InferenceRequest, InferenceResult};
use crate::assistant::{ClipboardWriter, Speaker};
use crate::capture::{
    CameraDevice, CameraSource, CaptureScheduler, FileSource, FrameEncoder, ImageSource,
    SchedulerState, SourceKind, TickOutcome,
};
use crate::config::{AppConfig, CaptureConfig, Language};
use crate::error::TranslateError;

const COMMAND_BUFFER: usize = 16;

pub enum SessionCommand {
    StartCamera,
    AnalyzeUpload(FileSource),
    Stop,
    Retry,
    SetInterval(u64),
    Speak,
    CopyLabel(oneshot::Sender<Result<(), String>>),
    Shutdown,
}

struct Completed {
    generation: u64,
    result: Result<InferenceResult, TranslateError>,
}

enum Event {
    Command(Option<SessionCommand>),
    Completed(Completed),
    Tick(Instant),
}

/// Cloneable front end used by the CLI and tests to drive a running session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    snapshot: watch::Receiver<Session>,
}

impl SessionHandle {
    pub async fn send(&self, command: SessionCommand) -> Result<(), String> {
        self.commands
            .send(command)
            .await
            .map_err(|_| "Session has shut down".to_string())
    }

    pub fn snapshot(&self) -> Session {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.snapshot.clone()
    }

    pub async fn copy_label(&self) -> Result<(), String> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::CopyLabel(reply)).await?;
        rx.await.map_err(|_| "Session dropped the copy request".to_string())?
    }
}

pub struct SessionRunner {
    machine: SessionStateMachine,
    scheduler: CaptureScheduler,
    capture: CaptureConfig,
    language: Language,
    request_timeout: Option<Duration>,
    camera: CameraSource,
    upload: Option<FileSource>,
    backend: Arc<dyn InferenceBackend>,
    speaker: Box<dyn Speaker>,
    clipboard: Box<dyn ClipboardWriter>,
    ticker: Option<Interval>,
    origin: Instant,
    in_flight: Option<JoinHandle<()>>,
    commands: mpsc::Receiver<SessionCommand>,
    completions_tx: mpsc::UnboundedSender<Completed>,
    completions_rx: mpsc::UnboundedReceiver<Completed>,
    snapshot_tx: watch::Sender<Session>,
}

impl SessionRunner {
    pub fn new(
        config: &AppConfig,
        camera: Arc<dyn CameraDevice>,
        backend: Arc<dyn InferenceBackend>,
        speaker: Box<dyn Speaker>,
        clipboard: Box<dyn ClipboardWriter>,
    ) -> (Self, SessionHandle) {
        let (commands_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let machine = SessionStateMachine::new();
        let (snapshot_tx, snapshot) = watch::channel(machine.session().clone());

        let runner = Self {
            scheduler: CaptureScheduler::new(config.capture.interval_ms),
            machine,
            capture: config.capture,
            language: config.language,
            request_timeout: config.request_timeout,
            camera: CameraSource::new(camera),
            upload: None,
            backend,
            speaker,
            clipboard,
            ticker: None,
            origin: Instant::now(),
            in_flight: None,
            commands,
            completions_tx,
            completions_rx,
            snapshot_tx,
        };
        let handle = SessionHandle {
            commands: commands_tx,
            snapshot,
        };
        (runner, handle)
    }

    pub fn session(&self) -> &Session {
        self.machine.session()
    }

    /// Process events until `Shutdown` or every handle is dropped, then tear down.
    pub async fn run(mut self) {
        loop {
            let event = tokio::select! {
                command = self.commands.recv() => Event::Command(command),
                Some(done) = self.completions_rx.recv() => Event::Completed(done),
                at = next_tick(&mut self.ticker) => Event::Tick(at),
            };

            match event {
                Event::Command(None) | Event::Command(Some(SessionCommand::Shutdown)) => break,
                Event::Command(Some(command)) => self.handle_command(command).await,
                Event::Completed(done) => self.on_completed(done),
                Event::Tick(at) => self.on_tick(at),
            }
        }
        self.teardown();
        log::info!("Translation session closed");
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::StartCamera => self.start_camera().await,
            SessionCommand::AnalyzeUpload(source) => self.analyze_upload(source).await,
            SessionCommand::Stop => self.teardown(),
            SessionCommand::Retry => self.retry(),
            SessionCommand::SetInterval(interval_ms) => self.set_interval(interval_ms),
            SessionCommand::Speak => {
                let label = &self.machine.session().detected_label;
                if !label.is_empty() {
                    self.speaker.speak(label, self.language);
                }
            }
            SessionCommand::CopyLabel(reply) => {
                let label = self.machine.session().detected_label.clone();
                let outcome = if label.is_empty() {
                    Ok(())
                } else {
                    self.clipboard.copy_text(&label)
                };
                if let Err(e) = &outcome {
                    log::error!("Failed to copy: {}", e);
                }
                let _ = reply.send(outcome);
            }
            SessionCommand::Shutdown => self.teardown(),
        }
    }

    async fn start_camera(&mut self) {
        if self.machine.status() == Status::Errored && !self.camera.is_live() {
            // Starting again is how a denied camera is retried.
            let _ = self.machine.retry(false);
        }
        let generation = match self.machine.request_access() {
            Ok(generation) => generation,
            Err(e) => {
                log::warn!("Ignoring camera start: {}", e);
                self.publish();
                return;
            }
        };
        self.upload = None;
        self.publish();

        match self.camera.start().await {
            Ok(()) => {
                if let Ok(Completion::Applied) = self.machine.access_granted(generation) {
                    self.start_schedule();
                } else {
                    self.camera.stop();
                }
            }
            Err(e) => {
                log::error!("Camera access denied: {}", e);
                self.camera.stop();
                let _ = self.machine.access_denied(generation, &e);
            }
        }
        self.publish();
    }

    async fn analyze_upload(&mut self, mut source: FileSource) {
        if self.camera.is_live() {
            log::warn!("Stop the camera before analyzing an upload");
            return;
        }
        if self.machine.status() == Status::Errored {
            let _ = self.machine.retry(false);
        }
        let generation = match self.machine.begin_upload() {
            Ok(generation) => generation,
            Err(e) => {
                log::warn!("Ignoring upload: {}", e);
                return;
            }
        };
        self.publish();

        if let Err(e) = source.start().await {
            log::error!("Upload could not be read: {}", e);
            let _ = self.machine.fail(generation, &e);
            self.publish();
            return;
        }

        let encoder = FrameEncoder::for_source(&self.capture, source.kind());
        let encoded = match source.frame() {
            Some(frame) => encoder.encode(&frame),
            None => Ok(None),
        };
        self.upload = Some(source);

        match encoded {
            Ok(Some(payload)) if self.scheduler.begin_request() => {
                self.dispatch(generation, payload);
            }
            Ok(Some(_)) => {
                log::warn!("A request is already in flight; upload skipped");
                let _ = self.machine.abandon_translation(generation);
            }
            Ok(None) => {
                log::warn!("Uploaded image has no pixels; nothing to analyze");
                let _ = self.machine.abandon_translation(generation);
            }
            Err(e) => {
                log::error!("Upload could not be encoded: {}", e);
                let _ = self.machine.fail(generation, &e);
            }
        }
        self.publish();
    }

    fn retry(&mut self) {
        match self.machine.retry(self.camera.is_live()) {
            Ok(Status::Watching) => {
                if self.scheduler.state() == SchedulerState::Idle {
                    self.start_schedule();
                }
            }
            Ok(_) => {
                self.stop_schedule();
                self.camera.stop();
            }
            Err(e) => log::warn!("Ignoring retry: {}", e),
        }
        self.publish();
    }

    fn set_interval(&mut self, interval_ms: u64) {
        if interval_ms == 0 {
            log::warn!("Ignoring zero capture interval");
            return;
        }
        self.capture.interval_ms = interval_ms;
        self.scheduler.set_interval(interval_ms);
        if self.scheduler.state() == SchedulerState::Scheduled {
            log::info!("Restarting capture schedule at {} ms", interval_ms);
            self.start_schedule();
        }
    }

    fn start_schedule(&mut self) {
        self.scheduler.start();
        self.origin = Instant::now();
        let mut ticker = interval(Duration::from_millis(self.scheduler.interval_ms()));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.ticker = Some(ticker);
        log::info!("Capture started every {} ms", self.scheduler.interval_ms());
    }

    fn stop_schedule(&mut self) {
        self.ticker = None;
        self.scheduler.stop();
        if let Some(task) = self.in_flight.take() {
            task.abort();
        }
    }

    /// Stop everything. Safe in any state, including when nothing was started.
    fn teardown(&mut self) {
        self.stop_schedule();
        self.camera.stop();
        if let Some(mut upload) = self.upload.take() {
            upload.stop();
        }
        self.machine.stop();
        self.publish();
    }

    fn on_tick(&mut self, at: Instant) {
        if !matches!(
            self.machine.status(),
            Status::Watching | Status::Translating
        ) {
            return;
        }
        let now_ms = at.saturating_duration_since(self.origin).as_millis() as u64;
        match self.scheduler.on_tick(now_ms) {
            TickOutcome::Fire => self.capture_frame(),
            outcome => log::debug!("Tick at {} ms dropped: {:?}", now_ms, outcome),
        }
    }

    fn capture_frame(&mut self) {
        let Some(frame) = self.camera.frame() else {
            log::debug!("No frame available yet; skipping capture");
            return;
        };

        let encoder = FrameEncoder::for_source(&self.capture, SourceKind::Camera);
        let payload = match encoder.encode(&frame) {
            Ok(Some(payload)) => payload,
            Ok(None) => return,
            Err(e) => {
                self.skip_or_surface(e);
                return;
            }
        };

        if !self.scheduler.begin_request() {
            return;
        }
        match self.machine.begin_translation() {
            Ok(generation) => {
                self.dispatch(generation, payload);
                self.publish();
            }
            Err(e) => {
                self.scheduler.finish_request();
                log::warn!("Capture not started: {}", e);
            }
        }
    }

    /// Transient capture failures skip the cycle; anything else errors the session.
    fn skip_or_surface(&mut self, error: TranslateError) {
        if error.is_transient() {
            log::debug!("Capture skipped: {}", error);
            return;
        }
        log::error!("Capture failed: {}", error);
        if let Ok(generation) = self.machine.begin_translation() {
            let _ = self.machine.fail(generation, &error);
            self.publish();
        }
    }

    fn request_ceiling(&self) -> Duration {
        self.request_timeout.unwrap_or_else(|| self.capture.interval())
    }

    fn dispatch(&mut self, generation: u64, payload: Vec<u8>) {
        let request = InferenceRequest::new(payload);
        let backend = self.backend.clone();
        let completions = self.completions_tx.clone();
        let ceiling = self.request_ceiling();

        log::debug!(
            "Sending {} byte frame (generation {})",
            request.payload.len(),
            generation
        );
        self.in_flight = Some(tokio::spawn(async move {
            let created_at = request.created_at;
            let result = match tokio::time::timeout(ceiling, backend.infer(request.payload)).await {
                Ok(result) => result,
                Err(_) => Err(TranslateError::Network(format!(
                    "no response within {} ms",
                    ceiling.as_millis()
                ))),
            };
            log::debug!("Analyze call finished in {:?}", created_at.elapsed());
            let _ = completions.send(Completed { generation, result });
        }));
    }

    fn on_completed(&mut self, done: Completed) {
        if done.generation != self.machine.generation() {
            log::debug!(
                "Discarding result from abandoned generation {}",
                done.generation
            );
            return;
        }
        self.scheduler.finish_request();
        self.in_flight = None;

        let applied = match &done.result {
            Ok(result) => {
                if result.label.is_empty() {
                    log::debug!("No sign detected");
                } else {
                    log::info!("Detected '{}' ({:.2})", result.label, result.confidence);
                }
                self.machine.complete(done.generation, result)
            }
            Err(e) => {
                log::error!("Translation failed: {}", e);
                self.machine.fail(done.generation, e)
            }
        };
        if let Err(e) = applied {
            log::warn!("Result not applied: {}", e);
        }
        if self.machine.mode() == SessionMode::Upload {
            self.upload = None;
        }
        self.publish();
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.machine.session().clone());
    }
}

async fn next_tick(ticker: &mut Option<Interval>) -> Instant {
    match ticker {
        Some(ticker) => ticker.tick().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::time::sleep;

    use super::*;
    use crate::assistant::testing::Recorder;
    use crate::capture::source::testing::FakeCamera;
    use crate::error::ErrorKind;

    struct FakeBackend {
        delay: Duration,
        calls: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
        responses: Mutex<VecDeque<Result<InferenceResult, TranslateError>>>,
    }

    impl FakeBackend {
        fn new(delay_ms: u64) -> Self {
            Self {
                delay: Duration::from_millis(delay_ms),
                calls: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                responses: Mutex::new(VecDeque::new()),
            }
        }

        fn queue(self, response: Result<InferenceResult, TranslateError>) -> Self {
            self.responses.lock().unwrap().push_back(response);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl InferenceBackend for FakeBackend {
        async fn infer(&self, payload: Vec<u8>) -> Result<InferenceResult, TranslateError> {
            assert!(!payload.is_empty());
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(letter("A", 0.9)))
        }
    }

    fn letter(label: &str, confidence: f32) -> InferenceResult {
        InferenceResult {
            label: label.into(),
            confidence,
        }
    }

    struct Harness {
        camera: Arc<FakeCamera>,
        backend: Arc<FakeBackend>,
        recorder: Recorder,
        handle: SessionHandle,
    }

    fn build(config: AppConfig, backend: FakeBackend) -> (SessionRunner, Harness) {
        let camera = Arc::new(FakeCamera::default());
        let backend = Arc::new(backend);
        let recorder = Recorder::default();
        let (runner, handle) = SessionRunner::new(
            &config,
            camera.clone(),
            backend.clone(),
            Box::new(recorder.clone()),
            Box::new(recorder.clone()),
        );
        (
            runner,
            Harness {
                camera,
                backend,
                recorder,
                handle,
            },
        )
    }

    fn spawn(config: AppConfig, backend: FakeBackend) -> Harness {
        let (runner, harness) = build(config, backend);
        tokio::spawn(runner.run());
        harness
    }

    fn slow_config() -> AppConfig {
        AppConfig {
            request_timeout: Some(Duration::from_secs(30)),
            ..AppConfig::default()
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([1, 2, 3]));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    /// Wait for a snapshot matching `done`. Uploads decode on the blocking
    /// pool, so their progress is not tied to the paused clock.
    async fn settle(handle: &SessionHandle, done: impl Fn(&Session) -> bool) -> Session {
        let mut updates = handle.subscribe();
        loop {
            let session = updates.borrow_and_update().clone();
            if done(&session) {
                return session;
            }
            updates.changed().await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn one_request_per_interval_in_steady_state() {
        let h = spawn(AppConfig::default(), FakeBackend::new(100));
        h.handle.send(SessionCommand::StartCamera).await.unwrap();

        sleep(Duration::from_millis(10_100)).await;

        // Fires at 0, 2000, 4000, 6000, 8000, 10000.
        assert_eq!(h.backend.calls(), 6);
        assert_eq!(h.backend.max_active.load(Ordering::SeqCst), 1);

        sleep(Duration::from_millis(50)).await;
        let session = h.handle.snapshot();
        assert_eq!(session.status, Status::Watching);
        assert_eq!(session.detected_label, "A");
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_during_a_slow_request_are_dropped() {
        let h = spawn(slow_config(), FakeBackend::new(3_000));
        h.handle.send(SessionCommand::StartCamera).await.unwrap();

        sleep(Duration::from_millis(8_100)).await;

        // 0 fires, 2000 dropped, 4000 fires, 6000 dropped, 8000 fires.
        assert_eq!(h.backend.calls(), 3);
        assert_eq!(h.backend.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(h.handle.snapshot().status, Status::Translating);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_label_returns_to_watching() {
        let backend = FakeBackend::new(100).queue(Ok(InferenceResult::empty()));
        let h = spawn(AppConfig::default(), backend);
        h.handle.send(SessionCommand::StartCamera).await.unwrap();

        sleep(Duration::from_millis(500)).await;

        let session = h.handle.snapshot();
        assert_eq!(session.status, Status::Watching);
        assert_eq!(session.detected_label, "");
        assert_eq!(session.confidence, 0.0);
        assert!(session.last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_keeps_last_label_until_retry() {
        let backend = FakeBackend::new(100)
            .queue(Ok(letter("B", 0.8)))
            .queue(Err(TranslateError::RemoteRejected {
                status: 502,
                body: "bad gateway".into(),
            }));
        let h = spawn(AppConfig::default(), backend);
        h.handle.send(SessionCommand::StartCamera).await.unwrap();

        sleep(Duration::from_millis(2_500)).await;
        let session = h.handle.snapshot();
        assert_eq!(session.status, Status::Errored);
        assert_eq!(session.detected_label, "B");
        assert_eq!(session.confidence, 0.8);
        assert_eq!(
            session.last_error.map(|e| e.kind),
            Some(ErrorKind::RemoteRejected)
        );

        // Nothing is captured while errored.
        sleep(Duration::from_millis(4_000)).await;
        assert_eq!(h.backend.calls(), 2);

        h.handle.send(SessionCommand::Retry).await.unwrap();
        sleep(Duration::from_millis(10)).await;
        let session = h.handle.snapshot();
        assert_eq!(session.status, Status::Watching);
        assert!(session.last_error.is_none());
        assert_eq!(h.backend.calls(), 2);

        sleep(Duration::from_millis(2_000)).await;
        assert_eq!(h.backend.calls(), 3);
        assert_eq!(h.handle.snapshot().detected_label, "A");
    }

    #[tokio::test(start_paused = true)]
    async fn hung_request_times_out_as_network_error() {
        let h = spawn(AppConfig::default(), FakeBackend::new(60_000));
        h.handle.send(SessionCommand::StartCamera).await.unwrap();

        sleep(Duration::from_millis(2_500)).await;

        let session = h.handle.snapshot();
        assert_eq!(session.status, Status::Errored);
        assert_eq!(session.last_error.map(|e| e.kind), Some(ErrorKind::Network));

        h.handle.send(SessionCommand::Retry).await.unwrap();
        sleep(Duration::from_millis(2_000)).await;
        // The guard was released, so capture resumed.
        assert_eq!(h.backend.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn late_result_after_stop_is_ignored() {
        let (mut runner, h) = build(slow_config(), FakeBackend::new(1_000));
        runner.handle_command(SessionCommand::StartCamera).await;
        let origin = runner.origin;
        runner.on_tick(origin);
        assert_eq!(runner.session().status, Status::Translating);
        let abandoned = runner.session().generation;

        runner.handle_command(SessionCommand::Stop).await;
        let after_stop = runner.session().clone();
        assert_eq!(after_stop.status, Status::Idle);

        runner.on_completed(Completed {
            generation: abandoned,
            result: Ok(letter("Z", 1.0)),
        });
        assert_eq!(runner.session(), &after_stop);
        assert_eq!(h.camera.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn denied_camera_errors_without_capturing() {
        let (runner, h) = build(AppConfig::default(), FakeBackend::new(100));
        h.camera.deny.store(true, Ordering::SeqCst);
        tokio::spawn(runner.run());

        h.handle.send(SessionCommand::StartCamera).await.unwrap();
        sleep(Duration::from_millis(5_000)).await;

        let session = h.handle.snapshot();
        assert_eq!(session.status, Status::Errored);
        assert_eq!(session.last_error.map(|e| e.kind), Some(ErrorKind::Permission));
        assert_eq!(h.backend.calls(), 0);

        // Starting again retries the permission request.
        h.camera.deny.store(false, Ordering::SeqCst);
        h.handle.send(SessionCommand::StartCamera).await.unwrap();
        sleep(Duration::from_millis(500)).await;
        assert_eq!(h.handle.snapshot().status, Status::Watching);
    }

    #[tokio::test(start_paused = true)]
    async fn start_while_errored_with_live_camera_keeps_the_error() {
        let backend = FakeBackend::new(100).queue(Err(TranslateError::Network("reset".into())));
        let h = spawn(AppConfig::default(), backend);
        h.handle.send(SessionCommand::StartCamera).await.unwrap();
        sleep(Duration::from_millis(500)).await;
        assert_eq!(h.handle.snapshot().status, Status::Errored);

        h.handle.send(SessionCommand::StartCamera).await.unwrap();
        sleep(Duration::from_millis(4_000)).await;

        // Only an explicit retry resumes capture on a live camera.
        let session = h.handle.snapshot();
        assert_eq!(session.status, Status::Errored);
        assert_eq!(session.last_error.map(|e| e.kind), Some(ErrorKind::Network));
        assert_eq!(h.backend.calls(), 1);
        assert_eq!(h.camera.acquired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn only_transient_capture_failures_are_skipped() {
        let (mut runner, _h) = build(AppConfig::default(), FakeBackend::new(100));
        runner.handle_command(SessionCommand::StartCamera).await;

        runner.skip_or_surface(TranslateError::Encode("short buffer".into()));
        assert_eq!(runner.session().status, Status::Watching);
        assert!(runner.session().last_error.is_none());

        runner.skip_or_surface(TranslateError::Network("feed lost".into()));
        assert_eq!(runner.session().status, Status::Errored);
        assert_eq!(
            runner.session().last_error.as_ref().map(|e| e.kind),
            Some(ErrorKind::Network)
        );
        // No request was claimed, so retry resumes watching right away.
        runner.handle_command(SessionCommand::Retry).await;
        assert_eq!(runner.session().status, Status::Watching);
        assert!(!runner.scheduler.in_flight());
    }

    #[tokio::test(start_paused = true)]
    async fn upload_never_touches_the_camera() {
        let backend = FakeBackend::new(100).queue(Ok(letter("D", 0.7)));
        let h = spawn(AppConfig::default(), backend);

        h.handle
            .send(SessionCommand::AnalyzeUpload(FileSource::from_bytes(png(8, 8))))
            .await
            .unwrap();

        let session = settle(&h.handle, |s| {
            s.mode == SessionMode::Upload && s.status == Status::Idle
        })
        .await;
        assert_eq!(session.mode, SessionMode::Upload);
        assert_eq!(session.status, Status::Idle);
        assert_eq!(session.detected_label, "D");
        assert_eq!(h.backend.calls(), 1);

        h.handle.send(SessionCommand::Stop).await.unwrap();
        sleep(Duration::from_millis(10)).await;
        assert_eq!(h.camera.acquired.load(Ordering::SeqCst), 0);
        assert_eq!(h.camera.released.load(Ordering::SeqCst), 0);
        assert_eq!(h.handle.snapshot().status, Status::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn broken_upload_is_surfaced() {
        let h = spawn(AppConfig::default(), FakeBackend::new(100));
        h.handle
            .send(SessionCommand::AnalyzeUpload(FileSource::from_bytes(b"nope".to_vec())))
            .await
            .unwrap();

        let session = settle(&h.handle, |s| s.status == Status::Errored).await;
        assert_eq!(session.status, Status::Errored);
        assert_eq!(session.last_error.map(|e| e.kind), Some(ErrorKind::Encode));
        assert_eq!(h.backend.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn blank_feed_skips_cycles_silently() {
        let (runner, h) = build(AppConfig::default(), FakeBackend::new(100));
        h.camera.blank.store(true, Ordering::SeqCst);
        tokio::spawn(runner.run());

        h.handle.send(SessionCommand::StartCamera).await.unwrap();
        sleep(Duration::from_millis(6_100)).await;

        assert_eq!(h.backend.calls(), 0);
        let session = h.handle.snapshot();
        assert_eq!(session.status, Status::Watching);
        assert!(session.last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn interval_change_restarts_the_schedule() {
        let h = spawn(AppConfig::default(), FakeBackend::new(100));
        h.handle.send(SessionCommand::StartCamera).await.unwrap();
        sleep(Duration::from_millis(200)).await;
        assert_eq!(h.backend.calls(), 1);

        h.handle.send(SessionCommand::SetInterval(5_000)).await.unwrap();
        // The restart fires immediately, then every 5 s.
        sleep(Duration::from_millis(4_000)).await;
        assert_eq!(h.backend.calls(), 2);
        sleep(Duration::from_millis(1_100)).await;
        assert_eq!(h.backend.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn speak_and_copy_use_the_current_label() {
        let h = spawn(AppConfig::default(), FakeBackend::new(100));

        // Nothing detected yet: both are no-ops.
        h.handle.send(SessionCommand::Speak).await.unwrap();
        h.handle.copy_label().await.unwrap();
        assert!(h.recorder.spoken.lock().unwrap().is_empty());
        assert!(h.recorder.copied.lock().unwrap().is_empty());

        h.handle.send(SessionCommand::StartCamera).await.unwrap();
        sleep(Duration::from_millis(500)).await;

        h.handle.send(SessionCommand::Speak).await.unwrap();
        h.handle.copy_label().await.unwrap();
        assert_eq!(
            h.recorder.spoken.lock().unwrap().as_slice(),
            &[("A".to_string(), Language::En)]
        );
        assert_eq!(h.recorder.copied.lock().unwrap().as_slice(), &["A".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_without_start_is_harmless() {
        let h = spawn(AppConfig::default(), FakeBackend::new(100));
        h.handle.send(SessionCommand::Stop).await.unwrap();
        h.handle.send(SessionCommand::Stop).await.unwrap();
        sleep(Duration::from_millis(10)).await;
        assert_eq!(h.handle.snapshot().status, Status::Idle);
        assert_eq!(h.camera.released.load(Ordering::SeqCst), 0);
    }
}
