//! Debounced generation: coalesce rapid text edits into one encode call.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::encode::{EncodeAdapter, EncodedImage};
use crate::error::{QrError, Result};
use crate::types::GenerationRequest;

/// Default quiet period before a generation fires.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// One logical debounce slot.
///
/// Every call to [`DebounceSlot::schedule`] cancels the task still waiting in
/// this slot and issues a new, strictly increasing sequence number. A task that
/// already fired is not interrupted; its result is filtered by sequence instead.
#[derive(Debug)]
pub struct DebounceSlot {
    delay: Duration,
    pending: Option<CancellationToken>,
    latest: u64,
}

impl DebounceSlot {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
            latest: 0,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Latest sequence issued by this slot.
    pub fn latest(&self) -> u64 {
        self.latest
    }

    pub fn is_current(&self, seq: u64) -> bool {
        seq == self.latest
    }

    /// Run `task` after the quiet period unless rescheduled or cleared first.
    pub fn schedule<F>(&mut self, task: F) -> u64
    where
        F: FnOnce(u64) + Send + 'static,
    {
        let seq = self.bump();
        let token = CancellationToken::new();
        self.pending = Some(token.clone());
        let delay = self.delay;

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::trace!("Debounced task {} cancelled", seq);
                }
                _ = tokio::time::sleep(delay) => task(seq),
            }
        });
        seq
    }

    /// Cancel the pending task and invalidate every earlier sequence.
    pub fn clear(&mut self) -> u64 {
        self.bump()
    }

    fn bump(&mut self) -> u64 {
        if let Some(token) = self.pending.take() {
            token.cancel();
        }
        self.latest += 1;
        self.latest
    }
}

impl Drop for DebounceSlot {
    fn drop(&mut self) {
        if let Some(token) = self.pending.take() {
            token.cancel();
        }
    }
}

/// Encode result tagged with the sequence that produced it.
#[derive(Debug)]
pub struct GenerationOutcome {
    pub seq: u64,
    pub result: Result<EncodedImage>,
}

/// What the generate view currently shows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GenerationView {
    #[default]
    Empty,
    /// Waiting for the quiet period or the encoder.
    Pending,
    Ready(EncodedImage),
    Failed(QrError),
}

impl GenerationView {
    pub fn image(&self) -> Option<&EncodedImage> {
        match self {
            GenerationView::Ready(image) => Some(image),
            _ => None,
        }
    }
}

/// Debounced front end of the encode adapter.
///
/// Outcomes are delivered on the channel given at construction; the owner
/// passes each one back through [`GenerationTrigger::accept`], which keeps only
/// the latest sequence.
pub struct GenerationTrigger {
    slot: DebounceSlot,
    encoder: EncodeAdapter,
    tx: mpsc::UnboundedSender<GenerationOutcome>,
    view: GenerationView,
}

impl GenerationTrigger {
    pub fn new(
        delay: Duration,
        encoder: EncodeAdapter,
        tx: mpsc::UnboundedSender<GenerationOutcome>,
    ) -> Self {
        Self {
            slot: DebounceSlot::new(delay),
            encoder,
            tx,
            view: GenerationView::Empty,
        }
    }

    pub fn view(&self) -> &GenerationView {
        &self.view
    }

    pub fn latest_seq(&self) -> u64 {
        self.slot.latest()
    }

    /// React to an edit of the input text or options.
    ///
    /// Empty text clears the view immediately and schedules nothing.
    pub fn on_input(&mut self, request: GenerationRequest) -> u64 {
        if request.text().is_empty() {
            self.view = GenerationView::Empty;
            return self.slot.clear();
        }

        self.view = GenerationView::Pending;
        let encoder = self.encoder.clone();
        let tx = self.tx.clone();
        self.slot.schedule(move |seq| {
            let result = encoder.encode(&request);
            if tx.send(GenerationOutcome { seq, result }).is_err() {
                tracing::debug!("Generation {} finished after receiver closed", seq);
            }
        })
    }

    /// Apply an outcome if it belongs to the latest request. Returns whether it was applied.
    pub fn accept(&mut self, outcome: GenerationOutcome) -> bool {
        if !self.slot.is_current(outcome.seq) {
            tracing::debug!(
                "Dropping stale generation {} (latest {})",
                outcome.seq,
                self.slot.latest()
            );
            return false;
        }
        self.view = match outcome.result {
            Ok(image) => GenerationView::Ready(image),
            Err(err) => {
                tracing::warn!("Generation failed: {}", err);
                GenerationView::Failed(err)
            }
        };
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Capability, QrEncoder, QrcodeEncoder, SymbolMatrix};
    use crate::types::ErrorCorrection;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Records every text it is asked to encode.
    #[derive(Default)]
    struct RecordingEncoder {
        seen: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl QrEncoder for RecordingEncoder {
        fn encode(&self, request: &GenerationRequest) -> std::result::Result<SymbolMatrix, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request.text().to_string());
            QrcodeEncoder.encode(request)
        }
    }

    fn request(text: &str) -> GenerationRequest {
        GenerationRequest::new(text, ErrorCorrection::M, 128).unwrap()
    }

    fn trigger() -> (
        GenerationTrigger,
        mpsc::UnboundedReceiver<GenerationOutcome>,
        Arc<RecordingEncoder>,
    ) {
        let recorder = Arc::new(RecordingEncoder::default());
        let handle: Arc<dyn QrEncoder> = recorder.clone();
        let (tx, rx) = mpsc::unbounded_channel();
        let trigger = GenerationTrigger::new(
            DEFAULT_DEBOUNCE,
            EncodeAdapter::new(Capability::Available(handle)),
            tx,
        );
        (trigger, rx, recorder)
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_edits_only_encode_final_text() {
        let (mut trigger, mut rx, recorder) = trigger();

        for text in ["h", "he", "hel", "hell"] {
            trigger.on_input(request(text));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        let last = trigger.on_input(request("hello"));
        assert_eq!(trigger.view(), &GenerationView::Pending);

        let outcome = rx.recv().await.unwrap();
        assert_eq!(outcome.seq, last);
        assert!(trigger.accept(outcome));
        assert_eq!(
            trigger.view().image().map(|i| i.request.text().to_string()),
            Some("hello".to_string())
        );

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*recorder.seen.lock().unwrap(), vec!["hello".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_fires_before_quiet_period() {
        let (mut trigger, mut rx, recorder) = trigger();
        trigger.on_input(request("abc"));

        tokio::time::sleep(Duration::from_millis(499)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(rx.recv().await.is_some());
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_input_clears_without_scheduling() {
        let (mut trigger, mut rx, recorder) = trigger();

        let first = trigger.on_input(request("abc"));
        let outcome = rx.recv().await.unwrap();
        assert_eq!(outcome.seq, first);
        assert!(trigger.accept(outcome));
        assert!(trigger.view().image().is_some());

        trigger.on_input(request("abcd"));
        trigger.on_input(request(""));
        assert_eq!(trigger.view(), &GenerationView::Empty);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_result_never_overwrites_newer_one() {
        let (mut trigger, _rx, _) = trigger();
        let adapter = {
            let handle: Arc<dyn QrEncoder> = Arc::new(QrcodeEncoder);
            EncodeAdapter::new(Capability::Available(handle))
        };

        let seq_a = trigger.on_input(request("A"));
        let seq_b = trigger.on_input(request("B"));
        assert!(seq_b > seq_a);

        // B resolves first, A straggles in afterwards.
        let b = GenerationOutcome {
            seq: seq_b,
            result: adapter.encode(&request("B")),
        };
        let a = GenerationOutcome {
            seq: seq_a,
            result: adapter.encode(&request("A")),
        };
        assert!(trigger.accept(b));
        assert!(!trigger.accept(a));

        let shown = trigger.view().image().unwrap();
        assert_eq!(shown.request.text(), "B");
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_result_after_clear_is_dropped() {
        let (mut trigger, mut rx, _) = trigger();
        trigger.on_input(request("abc"));
        let outcome = rx.recv().await.unwrap();

        trigger.on_input(request(""));
        assert!(!trigger.accept(outcome));
        assert_eq!(trigger.view(), &GenerationView::Empty);
    }

    #[tokio::test(start_paused = true)]
    async fn test_encode_failure_is_shown() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut trigger =
            GenerationTrigger::new(DEFAULT_DEBOUNCE, EncodeAdapter::new(Capability::Unavailable), tx);

        trigger.on_input(request("abc"));
        let outcome = rx.recv().await.unwrap();
        assert!(trigger.accept(outcome));
        assert!(matches!(
            trigger.view(),
            GenerationView::Failed(QrError::LibraryNotLoaded(_))
        ));
    }

    #[test]
    fn test_slot_sequences_are_monotonic() {
        let mut slot = DebounceSlot::new(Duration::from_millis(10));
        let a = slot.clear();
        let b = slot.clear();
        assert!(b > a);
        assert!(slot.is_current(b));
        assert!(!slot.is_current(a));
    }
}
