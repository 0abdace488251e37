//! Camera scan loop controller.
//!
//! State machine over `Idle → Requesting → Scanning → Stopped`:
//!
//! - `start` moves `Idle`/`Stopped` to `Requesting` and asks the camera
//!   provider for a stream. A grant moves to `Scanning`; a denial goes back
//!   to `Idle` with `CameraUnavailable`.
//! - While `Scanning`, the caller requests one frame ticket at a time and
//!   processes it on the next refresh tick. A decoded frame stops the session
//!   and releases the camera; a miss keeps scanning.
//! - `stop` releases the camera immediately. Tickets issued before the stop
//!   are discarded when they are processed.
//!
//! At most one session exists at a time: `start` while `Requesting` or
//! `Scanning` is rejected without touching the camera.

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::decode::DecodeAdapter;
use crate::error::{QrError, Result};
use crate::types::{DecodeResult, PixelBuffer};

/// Which camera to prefer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FacingMode {
    /// Rear camera.
    #[default]
    Environment,
    /// Front camera.
    User,
}

/// A live camera stream, exclusively owned by one scan session.
pub trait MediaStream: Send {
    /// Native resolution of the frames this stream produces.
    fn resolution(&self) -> (u32, u32);

    /// True once at least one frame is buffered and can be sampled.
    fn is_ready(&self) -> bool;

    /// Take the most recent frame.
    fn sample(&mut self) -> Result<PixelBuffer>;

    /// Release the device. Must be idempotent.
    fn release(&mut self);
}

/// Grants exclusive camera access.
#[async_trait]
pub trait CameraProvider: Send + Sync {
    async fn request(&self, facing: FacingMode) -> Result<Box<dyn MediaStream>>;
}

/// Lifecycle state of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanState {
    #[default]
    Idle,
    Requesting,
    Scanning,
    Stopped,
}

impl ScanState {
    pub fn label(&self) -> &'static str {
        match self {
            ScanState::Idle => "Idle",
            ScanState::Requesting => "Requesting camera",
            ScanState::Scanning => "Scanning",
            ScanState::Stopped => "Stopped",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, ScanState::Requesting | ScanState::Scanning)
    }
}

/// Token for one pending camera request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestToken {
    generation: u64,
}

/// Token for one scheduled frame sample, tied to a session generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTicket {
    generation: u64,
    frame: u64,
}

/// Result of processing one frame ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameStep {
    /// A symbol was decoded; the session is over and the camera released.
    Decoded(String),
    /// Nothing decoded (or no frame ready yet); request another ticket.
    Continue,
    /// The ticket belongs to a stopped or replaced session; nothing was done.
    Discarded,
    /// Sampling or decoding failed; the session was stopped.
    Failed(QrError),
}

/// How a `run` loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Decoded(String),
    Stopped,
    Failed(QrError),
}

struct ScanSession {
    stream: Box<dyn MediaStream>,
    generation: u64,
    frames: u64,
    outstanding: Option<FrameTicket>,
}

impl ScanSession {
    fn release(mut self) {
        self.stream.release();
    }
}

pub struct ScanController {
    decoder: DecodeAdapter,
    facing: FacingMode,
    state: ScanState,
    session: Option<ScanSession>,
    generation: u64,
}

impl ScanController {
    pub fn new(decoder: DecodeAdapter) -> Self {
        Self {
            decoder,
            facing: FacingMode::default(),
            state: ScanState::Idle,
            session: None,
            generation: 0,
        }
    }

    pub fn with_facing(mut self, facing: FacingMode) -> Self {
        self.facing = facing;
        self
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn facing(&self) -> FacingMode {
        self.facing
    }

    /// Frames processed in the current session.
    pub fn frames_processed(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.frames)
    }

    /// Resolution of the active stream, if any.
    pub fn resolution(&self) -> Option<(u32, u32)> {
        self.session.as_ref().map(|s| s.stream.resolution())
    }

    /// Enter `Requesting`. The caller must answer with [`Self::finish_start`].
    pub fn begin_start(&mut self) -> Result<RequestToken> {
        if self.state.is_active() {
            tracing::warn!("Scan start rejected: session already {}", self.state.label());
            return Err(QrError::SessionActive);
        }
        self.generation += 1;
        self.state = ScanState::Requesting;
        tracing::info!("Requesting camera access (session {})", self.generation);
        Ok(RequestToken {
            generation: self.generation,
        })
    }

    /// Complete a camera request started with [`Self::begin_start`].
    ///
    /// A grant for a request that was stopped in the meantime is released
    /// straight away and not bound.
    pub fn finish_start(
        &mut self,
        token: RequestToken,
        granted: Result<Box<dyn MediaStream>>,
    ) -> Result<()> {
        let current = self.state == ScanState::Requesting && token.generation == self.generation;

        match granted {
            Ok(mut stream) if !current => {
                tracing::info!("Discarding late camera grant for session {}", token.generation);
                stream.release();
                Ok(())
            }
            Ok(stream) => {
                let (w, h) = stream.resolution();
                tracing::info!("Camera granted at {}x{}, scanning", w, h);
                self.session = Some(ScanSession {
                    stream,
                    generation: token.generation,
                    frames: 0,
                    outstanding: None,
                });
                self.state = ScanState::Scanning;
                Ok(())
            }
            Err(_) if !current => Ok(()),
            Err(err) => {
                let err = match err {
                    QrError::CameraUnavailable(_) => err,
                    other => QrError::camera(other),
                };
                tracing::warn!("Camera request failed: {}", err);
                self.state = ScanState::Idle;
                Err(err)
            }
        }
    }

    /// Request camera access and bind the stream in one step.
    pub async fn start(&mut self, provider: &dyn CameraProvider) -> Result<()> {
        let token = self.begin_start()?;
        let granted = provider.request(self.facing).await;
        self.finish_start(token, granted)
    }

    /// Issue a ticket for the next frame sample.
    ///
    /// Returns `None` when not scanning or when a ticket is already outstanding,
    /// so frame samples never overlap.
    pub fn request_frame(&mut self) -> Option<FrameTicket> {
        if self.state != ScanState::Scanning {
            return None;
        }
        let session = self.session.as_mut()?;
        if session.outstanding.is_some() {
            return None;
        }
        let ticket = FrameTicket {
            generation: session.generation,
            frame: session.frames + 1,
        };
        session.outstanding = Some(ticket);
        Some(ticket)
    }

    /// Sample and decode the frame a ticket was issued for.
    pub fn process_frame(&mut self, ticket: FrameTicket) -> FrameStep {
        let Some(session) = self.session.as_mut() else {
            return FrameStep::Discarded;
        };
        if self.state != ScanState::Scanning || session.outstanding != Some(ticket) {
            return FrameStep::Discarded;
        }
        session.outstanding = None;

        if !session.stream.is_ready() {
            return FrameStep::Continue;
        }
        session.frames += 1;

        let decoded = session
            .stream
            .sample()
            .and_then(|frame| self.decoder.decode(&frame));

        match decoded {
            Ok(DecodeResult::Found(text)) => {
                tracing::info!("QR decoded after {} frame(s)", ticket.frame);
                self.end_session();
                FrameStep::Decoded(text)
            }
            Ok(DecodeResult::NotFound) => FrameStep::Continue,
            Err(err) => {
                tracing::warn!("Scan frame failed: {}", err);
                self.end_session();
                FrameStep::Failed(err)
            }
        }
    }

    /// Stop scanning and release the camera. Idempotent; a no-op when idle.
    pub fn stop(&mut self) {
        match self.state {
            ScanState::Idle | ScanState::Stopped => {}
            ScanState::Requesting => {
                tracing::info!("Scan stopped while requesting camera");
                self.state = ScanState::Stopped;
            }
            ScanState::Scanning => {
                tracing::info!("Scan stopped");
                self.end_session();
            }
        }
    }

    fn end_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.release();
        }
        self.state = ScanState::Stopped;
    }

    /// Drive the loop until a symbol is decoded, the stream fails, or `cancel` fires.
    ///
    /// One frame is sampled per `refresh` tick; missed ticks are skipped rather
    /// than bunched up.
    pub async fn run(&mut self, refresh: Duration, cancel: &CancellationToken) -> ScanOutcome {
        let mut interval = tokio::time::interval(refresh);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            let Some(ticket) = self.request_frame() else {
                return ScanOutcome::Stopped;
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.stop();
                    return ScanOutcome::Stopped;
                }
                _ = interval.tick() => {}
            }
            match self.process_frame(ticket) {
                FrameStep::Decoded(text) => return ScanOutcome::Decoded(text),
                FrameStep::Failed(err) => return ScanOutcome::Failed(err),
                FrameStep::Continue => {}
                FrameStep::Discarded => return ScanOutcome::Stopped,
            }
        }
    }
}

impl Drop for ScanController {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Capability, QrDecoder};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Decoder that answers from a script, one entry per call.
    struct ScriptedDecoder {
        answers: Mutex<VecDeque<Option<String>>>,
        calls: AtomicUsize,
    }

    impl QrDecoder for ScriptedDecoder {
        fn decode(&self, _buffer: &PixelBuffer) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answers.lock().unwrap().pop_front().flatten()
        }
    }

    #[derive(Default)]
    struct DeviceCounters {
        open: AtomicUsize,
        requests: AtomicUsize,
        samples: AtomicUsize,
    }

    struct FakeStream {
        counters: Arc<DeviceCounters>,
        released: bool,
        ready: bool,
    }

    impl MediaStream for FakeStream {
        fn resolution(&self) -> (u32, u32) {
            (4, 4)
        }

        fn is_ready(&self) -> bool {
            self.ready
        }

        fn sample(&mut self) -> Result<PixelBuffer> {
            self.counters.samples.fetch_add(1, Ordering::SeqCst);
            PixelBuffer::new(4, 4, vec![255; 64])
        }

        fn release(&mut self) {
            if !self.released {
                self.released = true;
                self.counters.open.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    struct FakeCamera {
        counters: Arc<DeviceCounters>,
        deny: bool,
        ready: bool,
    }

    impl FakeCamera {
        fn new() -> Self {
            Self {
                counters: Arc::new(DeviceCounters::default()),
                deny: false,
                ready: true,
            }
        }

        fn open_handles(&self) -> usize {
            self.counters.open.load(Ordering::SeqCst)
        }

        fn grant(&self) -> Box<dyn MediaStream> {
            self.counters.open.fetch_add(1, Ordering::SeqCst);
            Box::new(FakeStream {
                counters: self.counters.clone(),
                released: false,
                ready: self.ready,
            })
        }
    }

    #[async_trait]
    impl CameraProvider for FakeCamera {
        async fn request(&self, _facing: FacingMode) -> Result<Box<dyn MediaStream>> {
            self.counters.requests.fetch_add(1, Ordering::SeqCst);
            if self.deny {
                return Err(QrError::CameraUnavailable("permission denied".to_string()));
            }
            Ok(self.grant())
        }
    }

    fn controller(answers: Vec<Option<&str>>) -> (ScanController, Arc<ScriptedDecoder>) {
        let decoder = Arc::new(ScriptedDecoder {
            answers: Mutex::new(answers.into_iter().map(|a| a.map(str::to_string)).collect()),
            calls: AtomicUsize::new(0),
        });
        let handle: Arc<dyn QrDecoder> = decoder.clone();
        let adapter = DecodeAdapter::new(Capability::Available(handle));
        (ScanController::new(adapter), decoder)
    }

    #[tokio::test]
    async fn test_start_scan_decode_releases_camera() {
        let camera = FakeCamera::new();
        let (mut scan, _) = controller(vec![None, None, Some("HELLO")]);

        scan.start(&camera).await.unwrap();
        assert_eq!(scan.state(), ScanState::Scanning);
        assert_eq!(camera.open_handles(), 1);

        let mut steps = Vec::new();
        while let Some(ticket) = scan.request_frame() {
            steps.push(scan.process_frame(ticket));
        }

        assert_eq!(
            steps,
            vec![
                FrameStep::Continue,
                FrameStep::Continue,
                FrameStep::Decoded("HELLO".to_string())
            ]
        );
        assert_eq!(scan.state(), ScanState::Stopped);
        assert_eq!(camera.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_second_start_is_rejected_without_new_handle() {
        let camera = FakeCamera::new();
        let (mut scan, _) = controller(vec![]);

        scan.start(&camera).await.unwrap();
        assert_eq!(scan.start(&camera).await, Err(QrError::SessionActive));
        assert_eq!(camera.open_handles(), 1);
        assert_eq!(camera.counters.requests.load(Ordering::SeqCst), 1);
        assert_eq!(scan.state(), ScanState::Scanning);

        // Also rejected while the first request is still pending.
        let (mut pending, _) = controller(vec![]);
        let _token = pending.begin_start().unwrap();
        assert_eq!(pending.begin_start(), Err(QrError::SessionActive));
    }

    #[test]
    fn test_stop_never_started_is_noop() {
        let (mut scan, _) = controller(vec![]);
        scan.stop();
        assert_eq!(scan.state(), ScanState::Idle);
        scan.stop();
        assert_eq!(scan.state(), ScanState::Idle);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let camera = FakeCamera::new();
        let (mut scan, _) = controller(vec![]);
        scan.start(&camera).await.unwrap();

        scan.stop();
        assert_eq!(scan.state(), ScanState::Stopped);
        assert_eq!(camera.open_handles(), 0);

        scan.stop();
        assert_eq!(scan.state(), ScanState::Stopped);
        assert_eq!(camera.open_handles(), 0);
    }

    #[test]
    fn test_camera_denied_returns_to_idle() {
        let camera = FakeCamera {
            deny: true,
            ..FakeCamera::new()
        };
        let (mut scan, _) = controller(vec![]);

        assert_eq!(scan.state(), ScanState::Idle);
        let token = scan.begin_start().unwrap();
        assert_eq!(scan.state(), ScanState::Requesting);

        let denied = Err(QrError::CameraUnavailable("permission denied".to_string()));
        let result = scan.finish_start(token, denied);
        assert!(matches!(result, Err(QrError::CameraUnavailable(_))));
        assert_eq!(scan.state(), ScanState::Idle);
        assert_eq!(scan.resolution(), None);
        assert_eq!(camera.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_provider_errors_are_reported_as_camera_unavailable() {
        struct Broken;

        #[async_trait]
        impl CameraProvider for Broken {
            async fn request(&self, _facing: FacingMode) -> Result<Box<dyn MediaStream>> {
                Err(QrError::ImageLoadFailure("no frames".to_string()))
            }
        }

        let (mut scan, _) = controller(vec![]);
        let result = scan.start(&Broken).await;
        assert!(matches!(result, Err(QrError::CameraUnavailable(_))));
        assert_eq!(scan.state(), ScanState::Idle);
    }

    #[tokio::test]
    async fn test_stale_ticket_after_stop_is_discarded() {
        let camera = FakeCamera::new();
        let (mut scan, decoder) = controller(vec![Some("late")]);
        scan.start(&camera).await.unwrap();

        let ticket = scan.request_frame().unwrap();
        scan.stop();
        assert_eq!(camera.open_handles(), 0);

        assert_eq!(scan.process_frame(ticket), FrameStep::Discarded);
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(camera.counters.samples.load(Ordering::SeqCst), 0);
        assert_eq!(scan.state(), ScanState::Stopped);
    }

    #[tokio::test]
    async fn test_ticket_from_previous_session_is_discarded() {
        let camera = FakeCamera::new();
        let (mut scan, decoder) = controller(vec![]);
        scan.start(&camera).await.unwrap();
        let old = scan.request_frame().unwrap();
        scan.stop();

        scan.start(&camera).await.unwrap();
        assert_eq!(scan.process_frame(old), FrameStep::Discarded);
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(camera.open_handles(), 1);
    }

    #[tokio::test]
    async fn test_frames_never_overlap() {
        let camera = FakeCamera::new();
        let (mut scan, _) = controller(vec![]);
        scan.start(&camera).await.unwrap();

        let ticket = scan.request_frame().unwrap();
        assert_eq!(scan.request_frame(), None);
        assert_eq!(scan.process_frame(ticket), FrameStep::Continue);
        assert!(scan.request_frame().is_some());
    }

    #[tokio::test]
    async fn test_unready_stream_is_not_sampled() {
        let camera = FakeCamera {
            ready: false,
            ..FakeCamera::new()
        };
        let (mut scan, decoder) = controller(vec![Some("x")]);
        scan.start(&camera).await.unwrap();

        let ticket = scan.request_frame().unwrap();
        assert_eq!(scan.process_frame(ticket), FrameStep::Continue);
        assert_eq!(camera.counters.samples.load(Ordering::SeqCst), 0);
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(scan.frames_processed(), 0);
    }

    #[test]
    fn test_late_grant_after_stop_is_released() {
        let camera = FakeCamera::new();
        let (mut scan, _) = controller(vec![]);

        let token = scan.begin_start().unwrap();
        scan.stop();
        assert_eq!(scan.state(), ScanState::Stopped);

        assert!(scan.finish_start(token, Ok(camera.grant())).is_ok());
        assert_eq!(scan.state(), ScanState::Stopped);
        assert_eq!(camera.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_decoder_not_loaded_fails_session() {
        let camera = FakeCamera::new();
        let mut scan = ScanController::new(DecodeAdapter::new(Capability::Unavailable));
        scan.start(&camera).await.unwrap();

        let ticket = scan.request_frame().unwrap();
        assert!(matches!(
            scan.process_frame(ticket),
            FrameStep::Failed(QrError::LibraryNotLoaded(_))
        ));
        assert_eq!(camera.open_handles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_decoded() {
        let camera = FakeCamera::new();
        let (mut scan, decoder) = controller(vec![None, None, None, Some("done")]);
        scan.start(&camera).await.unwrap();

        let cancel = CancellationToken::new();
        let outcome = scan.run(Duration::from_millis(16), &cancel).await;
        assert_eq!(outcome, ScanOutcome::Decoded("done".to_string()));
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 4);
        assert_eq!(camera.open_handles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_cancelled_releases_camera() {
        let camera = FakeCamera::new();
        let (mut scan, _) = controller(vec![]);
        scan.start(&camera).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = scan.run(Duration::from_millis(16), &cancel).await;
        assert_eq!(outcome, ScanOutcome::Stopped);
        assert_eq!(scan.state(), ScanState::Stopped);
        assert_eq!(camera.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_drop_releases_camera() {
        let camera = FakeCamera::new();
        {
            let (mut scan, _) = controller(vec![]);
            scan.start(&camera).await.unwrap();
            assert_eq!(camera.open_handles(), 1);
        }
        assert_eq!(camera.open_handles(), 0);
    }
}
