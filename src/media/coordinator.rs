//! Media stream coordinator
//!
//! One coordinator per call, with three independent lanes (audio, video,
//! screen share). Each lane moves through:
//!
//! ```text
//! Stopped ──append──▶ Running ──end──▶ Draining ──drained──▶ Stopped
//! ```
//!
//! A lane owns a bounded channel and one blocking consumer that feeds its
//! processor. Producers never touch files; the consumer never touches the
//! network side.

use super::buffer::{AudioFrame, AudioMediaBuffer, VideoFrame, VideoMediaBuffer};
use super::processor::{
    AudioProcessor, BufferProcessor, RetiredSource, SocketLookup, VideoProcessor,
};
use super::roster::Roster;
use super::MediaKind;
use crate::config::MediaConfig;
use crate::error::MediaError;
use crate::recording::{CallLayout, RecordingRegistry};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Lifecycle state of one lane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneState {
    Stopped,
    Running,
    Draining,
}

impl LaneState {
    pub fn is_running(&self) -> bool {
        matches!(self, LaneState::Running)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, LaneState::Stopped)
    }
}

/// What travels down a lane
enum LaneMessage<B> {
    Buffer(B),
    Retire(RetiredSource),
}

/// Outcome of one consumer step
#[derive(Debug)]
enum LoopStep {
    Continue,
    Restart(MediaError),
    Fatal(MediaError),
}

/// Map a processing result onto the supervision policy
fn supervise(result: Result<(), MediaError>, consecutive: &mut u32, max_errors: u32) -> LoopStep {
    match result {
        Ok(()) => {
            *consecutive = 0;
            LoopStep::Continue
        }
        Err(e) => {
            *consecutive += 1;
            if *consecutive > max_errors {
                LoopStep::Fatal(e)
            } else {
                LoopStep::Restart(e)
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RestartPolicy {
    max_errors: u32,
    max_restarts: u32,
}

type ProcessorFactory<P> = Arc<dyn Fn() -> P + Send + Sync>;

/// Blocking consumer loop of one lane
///
/// A fatal step finalizes the current processor and continues on the same
/// channel with a fresh one. Once the restarts are used up the loop exits.
fn run_consumer<P: BufferProcessor>(
    make_processor: ProcessorFactory<P>,
    mut rx: mpsc::Receiver<LaneMessage<P::Buffer>>,
    pending: Arc<watch::Sender<usize>>,
    cancel: CancellationToken,
    policy: RestartPolicy,
) -> PathBuf {
    let mut processor = make_processor();
    let kind = processor.kind();
    let mut consecutive = 0u32;
    let mut restarts = 0u32;
    let mut processed = 0u64;

    loop {
        if cancel.is_cancelled() {
            tracing::debug!("{} consumer cancelled", kind);
            break;
        }
        let Some(message) = rx.blocking_recv() else {
            break;
        };

        let step = match message {
            LaneMessage::Buffer(buffer) => {
                supervise(processor.process(buffer), &mut consecutive, policy.max_errors)
            }
            LaneMessage::Retire(source) => {
                if let Err(e) = processor.retire(&source) {
                    tracing::warn!("Closing retired {} source {} failed: {}", kind, source.msi, e);
                }
                LoopStep::Continue
            }
        };
        pending.send_modify(|n| *n = n.saturating_sub(1));
        processed += 1;

        match step {
            LoopStep::Continue => {}
            LoopStep::Restart(e) => {
                tracing::warn!("{} buffer lost: {}", kind, e);
            }
            LoopStep::Fatal(e) if restarts >= policy.max_restarts => {
                tracing::error!(
                    "{} consumer giving up after {} restarts: {}",
                    kind,
                    restarts,
                    e
                );
                break;
            }
            LoopStep::Fatal(e) => {
                restarts += 1;
                tracing::warn!(
                    "{} consumer restarting ({}/{}) after {} consecutive errors: {}",
                    kind,
                    restarts,
                    policy.max_restarts,
                    consecutive,
                    e
                );
                consecutive = 0;
                let previous = std::mem::replace(&mut processor, make_processor());
                previous.finalise();
            }
        }
    }

    // Anything still queued is abandoned; release waiters on the drain signal
    rx.close();
    while rx.try_recv().is_ok() {}
    pending.send_replace(0);

    tracing::debug!("{} consumer stopped after {} messages", kind, processed);
    processor.finalise()
}

struct LaneInner<B> {
    state: LaneState,
    sender: Option<mpsc::Sender<LaneMessage<B>>>,
    cancel: Option<CancellationToken>,
    consumer: Option<JoinHandle<PathBuf>>,
    /// Consumer used up its restarts; the kind is dropped for the call
    failed: bool,
    /// The call ended; no new buffers are accepted
    closed: bool,
}

/// One media lane: a lazily started consumer behind an async mutex
struct Lane<P: BufferProcessor> {
    kind: MediaKind,
    capacity: usize,
    policy: RestartPolicy,
    make_processor: ProcessorFactory<P>,
    pending: Arc<watch::Sender<usize>>,
    inner: Mutex<LaneInner<P::Buffer>>,
}

impl<P: BufferProcessor> Lane<P> {
    fn new(kind: MediaKind, config: &MediaConfig, make_processor: ProcessorFactory<P>) -> Self {
        let (pending, _) = watch::channel(0usize);
        Self {
            kind,
            capacity: config.queue_capacity.max(1),
            policy: RestartPolicy {
                max_errors: config.max_consecutive_errors,
                max_restarts: config.max_lane_restarts,
            },
            make_processor,
            pending: Arc::new(pending),
            inner: Mutex::new(LaneInner {
                state: LaneState::Stopped,
                sender: None,
                cancel: None,
                consumer: None,
                failed: false,
                closed: false,
            }),
        }
    }

    fn start(&self, inner: &mut LaneInner<P::Buffer>) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let cancel = CancellationToken::new();
        let make_processor = self.make_processor.clone();
        let pending = self.pending.clone();
        let token = cancel.clone();
        let policy = self.policy;

        self.pending.send_replace(0);
        inner.consumer = Some(tokio::task::spawn_blocking(move || {
            run_consumer(make_processor, rx, pending, token, policy)
        }));
        inner.sender = Some(tx);
        inner.cancel = Some(cancel);
        inner.state = LaneState::Running;
        tracing::info!("{} lane started", self.kind);
    }

    /// Collect a consumer that exited on its own after its last restart
    async fn reap(&self, inner: &mut LaneInner<P::Buffer>) {
        let exited = inner.state.is_running()
            && inner.sender.as_ref().map_or(true, |s| s.is_closed());
        if !exited {
            return;
        }

        inner.sender = None;
        inner.cancel = None;
        if let Some(handle) = inner.consumer.take() {
            if let Err(e) = handle.await {
                tracing::error!("{} consumer task failed: {}", self.kind, e);
            }
        }
        inner.state = LaneState::Stopped;
        inner.failed = true;
        tracing::error!("{} lane failed, dropping its buffers for the rest of the call", self.kind);
    }

    async fn append(&self, buffer: P::Buffer) -> Result<(), MediaError> {
        let sender = {
            let mut inner = self.inner.lock().await;
            self.reap(&mut inner).await;
            if inner.closed {
                return Err(MediaError::CallEnded(self.kind.label()));
            }
            if inner.failed {
                return Err(MediaError::LaneClosed(self.kind.label()));
            }
            match inner.state {
                LaneState::Draining => {
                    tracing::debug!("{} lane draining, dropping buffer", self.kind);
                    return Err(MediaError::Draining(self.kind.label()));
                }
                LaneState::Stopped => self.start(&mut inner),
                LaneState::Running => {}
            }
            let Some(sender) = inner.sender.clone() else {
                return Err(MediaError::LaneClosed(self.kind.label()));
            };
            // counted before release so a concurrent end waits for it
            self.pending.send_modify(|n| *n += 1);
            sender
        };

        if sender.send(LaneMessage::Buffer(buffer)).await.is_err() {
            self.pending.send_modify(|n| *n = n.saturating_sub(1));
            return Err(MediaError::LaneClosed(self.kind.label()));
        }
        Ok(())
    }

    /// Queue a retirement behind the buffers already accepted
    async fn retire(&self, source: RetiredSource) {
        let sender = {
            let mut inner = self.inner.lock().await;
            self.reap(&mut inner).await;
            if !inner.state.is_running() {
                return;
            }
            let Some(sender) = inner.sender.clone() else {
                return;
            };
            self.pending.send_modify(|n| *n += 1);
            sender
        };

        if sender.send(LaneMessage::Retire(source)).await.is_err() {
            self.pending.send_modify(|n| *n = n.saturating_sub(1));
        }
    }

    async fn close(&self) {
        self.inner.lock().await.closed = true;
    }

    async fn end(&self) -> Option<PathBuf> {
        {
            let mut inner = self.inner.lock().await;
            self.reap(&mut inner).await;
            if !inner.state.is_running() {
                return None;
            }
            inner.state = LaneState::Draining;
        }
        tracing::debug!("{} lane draining ({} pending)", self.kind, self.pending());

        // The lock is not held here so appends observe Draining and drop
        let mut drained = self.pending.subscribe();
        if drained.wait_for(|n| *n == 0).await.is_err() {
            tracing::warn!("{} lane drain signal closed early", self.kind);
        }

        let (cancel, consumer) = {
            let mut inner = self.inner.lock().await;
            inner.sender = None;
            (inner.cancel.take(), inner.consumer.take())
        };
        if let Some(cancel) = cancel {
            cancel.cancel();
        }

        let dir = match consumer {
            Some(handle) => match handle.await {
                Ok(dir) => Some(dir),
                Err(e) => {
                    tracing::error!("{} consumer task failed: {}", self.kind, e);
                    None
                }
            },
            None => None,
        };

        self.inner.lock().await.state = LaneState::Stopped;
        tracing::info!("{} lane stopped", self.kind);
        dir
    }

    async fn state(&self) -> LaneState {
        let mut inner = self.inner.lock().await;
        self.reap(&mut inner).await;
        inner.state
    }

    fn pending(&self) -> usize {
        *self.pending.borrow()
    }
}

/// Three-lane ingestion pipeline of one call
pub struct MediaStreamCoordinator {
    audio: Lane<AudioProcessor>,
    video: Lane<VideoProcessor>,
    vbss: Lane<VideoProcessor>,
    ingress: AtomicUsize,
    closed: AtomicBool,
}

impl MediaStreamCoordinator {
    /// Coordinator writing into a call's media folders
    pub fn new(
        layout: &CallLayout,
        media: &MediaConfig,
        registry: Arc<RecordingRegistry>,
        sockets: Arc<dyn SocketLookup>,
    ) -> Self {
        let audio_dir = layout.audio_dir.clone();
        let video_dir = layout.video_dir.clone();
        let vbss_dir = layout.vbss_dir.clone();
        let write_silence = media.write_silence;

        let audio = {
            let registry = registry.clone();
            Lane::new(
                MediaKind::Audio,
                media,
                Arc::new(move || {
                    AudioProcessor::new(audio_dir.clone(), registry.clone(), write_silence)
                }),
            )
        };
        let video = {
            let registry = registry.clone();
            let sockets = sockets.clone();
            Lane::new(
                MediaKind::Video,
                media,
                Arc::new(move || {
                    VideoProcessor::new(
                        MediaKind::Video,
                        video_dir.clone(),
                        registry.clone(),
                        sockets.clone(),
                    )
                }),
            )
        };
        let vbss = Lane::new(
            MediaKind::Vbss,
            media,
            Arc::new(move || {
                VideoProcessor::new(
                    MediaKind::Vbss,
                    vbss_dir.clone(),
                    registry.clone(),
                    sockets.clone(),
                )
            }),
        );

        Self {
            audio,
            video,
            vbss,
            ingress: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub async fn append_audio(&self, buffer: AudioMediaBuffer) -> Result<(), MediaError> {
        self.audio.append(buffer).await
    }

    pub async fn append_video(&self, buffer: VideoMediaBuffer) -> Result<(), MediaError> {
        self.video.append(buffer).await
    }

    pub async fn append_vbss(&self, buffer: VideoMediaBuffer) -> Result<(), MediaError> {
        self.vbss.append(buffer).await
    }

    /// Finalize the file of a source whose socket was released
    ///
    /// Runs on the lane after every buffer accepted before it. A no-op when
    /// the lane is not running.
    pub async fn retire(&self, source: RetiredSource) {
        match source.kind {
            MediaKind::Video => self.video.retire(source).await,
            MediaKind::Vbss => self.vbss.retire(source).await,
            MediaKind::Audio => {}
        }
    }

    /// Drain and stop the audio lane; returns the output directory if it ran
    pub async fn audio_end(&self) -> Option<PathBuf> {
        self.audio.end().await
    }

    pub async fn video_end(&self) -> Option<PathBuf> {
        self.video.end().await
    }

    pub async fn vbss_end(&self) -> Option<PathBuf> {
        self.vbss.end().await
    }

    /// End all three lanes concurrently
    pub async fn stop_all(&self) -> Vec<PathBuf> {
        let (audio, video, vbss) = tokio::join!(self.audio_end(), self.video_end(), self.vbss_end());
        [audio, video, vbss].into_iter().flatten().collect()
    }

    /// Refuse every later append; lanes keep running until ended
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        tokio::join!(self.audio.close(), self.video.close(), self.vbss.close());
        tracing::debug!("Media coordinator closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn state(&self, kind: MediaKind) -> LaneState {
        match kind {
            MediaKind::Audio => self.audio.state().await,
            MediaKind::Video => self.video.state().await,
            MediaKind::Vbss => self.vbss.state().await,
        }
    }

    /// Messages accepted but not yet processed on a lane
    pub fn pending(&self, kind: MediaKind) -> usize {
        match kind {
            MediaKind::Audio => self.audio.pending(),
            MediaKind::Video => self.video.pending(),
            MediaKind::Vbss => self.vbss.pending(),
        }
    }

    /// Number of live ingress handles
    pub fn attached_ingress(&self) -> usize {
        self.ingress.load(Ordering::SeqCst)
    }

    /// Register a platform media source; frames flow until the handle drops
    pub fn attach(self: &Arc<Self>, roster: Roster) -> IngressHandle {
        let attached = self.ingress.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!("Ingress attached ({} live)", attached);
        IngressHandle {
            coordinator: Arc::downgrade(self),
            roster,
        }
    }
}

/// Entry point for platform media callbacks
///
/// Copies each frame synchronously (the platform frees its memory when the
/// callback returns) and queues the owned buffer on the matching lane.
pub struct IngressHandle {
    coordinator: Weak<MediaStreamCoordinator>,
    roster: Roster,
}

impl IngressHandle {
    fn coordinator(&self, kind: MediaKind) -> Result<Arc<MediaStreamCoordinator>, MediaError> {
        let coordinator = self
            .coordinator
            .upgrade()
            .ok_or(MediaError::LaneClosed("call"))?;
        if coordinator.is_closed() {
            return Err(MediaError::CallEnded(kind.label()));
        }
        Ok(coordinator)
    }

    pub async fn on_audio(&self, frame: &AudioFrame<'_>) -> Result<(), MediaError> {
        let coordinator = self.coordinator(MediaKind::Audio)?;
        let buffer = self.roster.with(|p| AudioMediaBuffer::from_frame(frame, p));
        coordinator.append_audio(buffer).await
    }

    pub async fn on_video(&self, frame: &VideoFrame<'_>) -> Result<(), MediaError> {
        let coordinator = self.coordinator(MediaKind::Video)?;
        let buffer = self.roster.with(|p| VideoMediaBuffer::from_frame(frame, p));
        coordinator.append_video(buffer).await
    }

    pub async fn on_vbss(&self, frame: &VideoFrame<'_>) -> Result<(), MediaError> {
        let coordinator = self.coordinator(MediaKind::Vbss)?;
        let buffer = self.roster.with(|p| VideoMediaBuffer::from_frame(frame, p));
        coordinator.append_vbss(buffer).await
    }
}

impl Drop for IngressHandle {
    fn drop(&mut self) {
        if let Some(coordinator) = self.coordinator.upgrade() {
            let left = coordinator.ingress.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
            tracing::debug!("Ingress detached ({} live)", left);
        }
    }
}
