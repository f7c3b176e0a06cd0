//! Session lifecycle: camera acquisition, the frame loop task, teardown.
//!
//! The frame loop runs as one tokio task that exclusively owns the
//! compositor, the capture stream and the inference slot. The [`Session`]
//! talks to it over a command channel with oneshot replies and stops it
//! through a shutdown watch; on exit the task hands its state back so
//! buffers and the tracker are reused by the next start.

use crate::buffers::Viewport;
use crate::compositor::{Compositor, FrameReport};
use crate::config::{EngineConfig, Pacing};
use crate::inference::{InferenceSlot, SubmitOutcome};
use image::{imageops, ImageFormat, RgbaImage};
use rouge_core::{LandmarkTracker, Shade, StabilizerState};
use rouge_hw::{CaptureDevice, CaptureStream};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// File name offered for saved snapshots.
pub const SNAPSHOT_FILENAME: &str = "lipstick-try-on.png";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Camera access is required. Please allow camera permissions and refresh.")]
    CameraUnavailable,
    #[error("Resources are still loading, please try again in a moment.")]
    ResourceNotReady,
    #[error("The face tracker was lost; load it again to continue.")]
    TrackerLost,
    #[error("The camera is not running.")]
    NotRunning,
    #[error("Could not capture a snapshot.")]
    Snapshot(#[source] SnapshotError),
}

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("PNG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("failed to write snapshot: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Running,
    /// Torn down because the view was hidden; needs an explicit `start()`.
    Paused,
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionStatus {
    pub state: SessionState,
    pub frames_presented: u64,
    /// Device-pixel size of the buffers, if any exist yet.
    pub buffer_size: Option<(u32, u32)>,
    pub viewport: Option<Viewport>,
    pub tracking: StabilizerState,
    pub inference_in_flight: bool,
    pub inferences_submitted: u64,
    pub inferences_rejected: u64,
}

/// An encoded still of the presented frame at display (CSS) resolution.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
}

impl Snapshot {
    /// Downscale `front` from device pixels to CSS pixels and PNG-encode it.
    pub fn encode(front: &RgbaImage, viewport: Viewport) -> Result<Self, SnapshotError> {
        let (w, h) = front.dimensions();
        let dpr = viewport.device_pixel_ratio;
        let width = ((w as f32 / dpr).floor() as u32).max(1);
        let height = ((h as f32 / dpr).floor() as u32).max(1);

        let scaled;
        let image = if (width, height) == (w, h) {
            front
        } else {
            scaled = imageops::resize(front, width, height, imageops::FilterType::Triangle);
            &scaled
        };

        let mut png = Vec::new();
        image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        Ok(Self { width, height, png })
    }

    /// Write to `dir/lipstick-try-on.png`.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, SnapshotError> {
        let path = dir.join(SNAPSHOT_FILENAME);
        std::fs::write(&path, &self.png)?;
        tracing::info!(path = %path.display(), bytes = self.png.len(), "snapshot saved");
        Ok(path)
    }
}

/// Requests handled by the frame loop between frames.
enum LoopCommand {
    Resize {
        viewport: Viewport,
        reply: oneshot::Sender<(u32, u32)>,
    },
    Snapshot {
        reply: oneshot::Sender<(RgbaImage, Viewport)>,
    },
    Status {
        reply: oneshot::Sender<SessionStatus>,
    },
}

/// Everything the frame loop owns.
struct LoopState {
    compositor: Compositor,
    stream: CaptureStream,
    slot: InferenceSlot,
    last_submitted: Option<u64>,
}

impl LoopState {
    /// One iteration: collect tracker output, feed the tracker, compose.
    fn step(&mut self, shade: &Shade) -> FrameReport {
        if let Some(result) = self.slot.poll() {
            self.compositor.accept_results(result);
        }

        let frame = self.stream.latest();
        let mut submitted = false;
        if let Some(frame) = frame.as_ref() {
            if self.last_submitted != Some(frame.sequence) {
                match self.slot.try_submit(frame.clone()) {
                    SubmitOutcome::Submitted => {
                        self.last_submitted = Some(frame.sequence);
                        submitted = true;
                    }
                    SubmitOutcome::Busy => {
                        tracing::trace!(sequence = frame.sequence, "tracker busy, frame not submitted")
                    }
                    SubmitOutcome::Unavailable => {}
                }
            }
        }

        let view = frame.as_ref().map(|f| f.view());
        let mut report = self.compositor.compose(view.as_ref(), shade);
        report.submitted = submitted;
        report
    }

    fn status(&self, state: SessionState) -> SessionStatus {
        status_of(state, Some(&self.compositor), &self.slot)
    }

    fn handle(&mut self, command: LoopCommand) {
        match command {
            LoopCommand::Resize { viewport, reply } => {
                self.compositor.resize(viewport);
                let _ = reply.send(self.compositor.buffers().dims());
            }
            LoopCommand::Snapshot { reply } => {
                let buffers = self.compositor.buffers();
                let _ = reply.send((buffers.front().clone(), buffers.viewport()));
            }
            LoopCommand::Status { reply } => {
                let _ = reply.send(self.status(SessionState::Running));
            }
        }
    }
}

fn status_of(
    state: SessionState,
    compositor: Option<&Compositor>,
    slot: &InferenceSlot,
) -> SessionStatus {
    SessionStatus {
        state,
        frames_presented: compositor.map_or(0, |c| c.frames_presented()),
        buffer_size: compositor.map(|c| c.buffers().dims()),
        viewport: compositor.map(|c| c.viewport()),
        tracking: compositor.map_or(StabilizerState::Uninitialized, |c| c.stabilizer().state()),
        inference_in_flight: slot.in_flight(),
        inferences_submitted: slot.submitted(),
        inferences_rejected: slot.rejected(),
    }
}

enum LoopEvent {
    Shutdown,
    Command(LoopCommand),
    Frame,
    StreamEnded,
    Tick,
}

async fn run_loop(
    mut state: LoopState,
    shade: watch::Receiver<Shade>,
    mut shutdown: watch::Receiver<bool>,
    mut commands: mpsc::Receiver<LoopCommand>,
    pacing: Pacing,
    period: Duration,
) -> LoopState {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut stream_live = true;

    tracing::debug!(?pacing, period_ms = period.as_millis() as u64, "frame loop started");
    loop {
        let on_frames = pacing == Pacing::VideoFrame && stream_live;
        let event = tokio::select! {
            biased;
            _ = shutdown.changed() => LoopEvent::Shutdown,
            command = commands.recv() => match command {
                Some(command) => LoopEvent::Command(command),
                None => LoopEvent::Shutdown,
            },
            frame = state.stream.next_frame(), if on_frames => match frame {
                Some(_) => LoopEvent::Frame,
                None => LoopEvent::StreamEnded,
            },
            _ = ticker.tick() => LoopEvent::Tick,
        };

        match event {
            LoopEvent::Shutdown => break,
            LoopEvent::Command(command) => state.handle(command),
            LoopEvent::Frame => {
                let current = shade.borrow().clone();
                state.step(&current);
                ticker.reset();
            }
            LoopEvent::StreamEnded => {
                tracing::warn!("capture stream ended; falling back to timed frames");
                stream_live = false;
            }
            LoopEvent::Tick => {
                let current = shade.borrow().clone();
                state.step(&current);
            }
        }
    }
    tracing::debug!("frame loop exited");
    state
}

/// A running frame loop, as seen from the session.
struct ActiveLoop {
    shutdown: watch::Sender<bool>,
    commands: mpsc::Sender<LoopCommand>,
    task: JoinHandle<LoopState>,
}

/// One try-on view. At most one frame loop runs per session.
pub struct Session {
    config: EngineConfig,
    device: Box<dyn CaptureDevice>,
    state: SessionState,
    shade: watch::Sender<Shade>,
    device_pixel_ratio: f32,
    // Parked while idle, owned by the loop while running.
    slot: Option<InferenceSlot>,
    compositor: Option<Compositor>,
    active: Option<ActiveLoop>,
    // Set when a failed frame loop took the tracker down with it.
    tracker_lost: bool,
}

impl Session {
    pub fn new(
        config: EngineConfig,
        device: Box<dyn CaptureDevice>,
        tracker: Option<Box<dyn LandmarkTracker>>,
    ) -> Self {
        let (shade, _) = watch::channel(Shade::bare());
        let device_pixel_ratio = config.visual.device_pixel_ratio;
        Self {
            config,
            device,
            state: SessionState::Idle,
            shade,
            device_pixel_ratio,
            slot: Some(InferenceSlot::new(tracker)),
            compositor: None,
            active: None,
            tracker_lost: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Install a tracker that finished loading after construction. Only
    /// possible while no frame loop is running.
    pub fn set_tracker(&mut self, tracker: Box<dyn LandmarkTracker>) -> bool {
        match self.slot.as_mut() {
            Some(slot) => {
                slot.set_tracker(tracker);
                self.tracker_lost = false;
                tracing::info!("landmark tracker installed");
                true
            }
            None => {
                tracing::warn!("cannot replace the tracker while the session is running");
                false
            }
        }
    }

    /// Switch shades. Picked up by the next frame.
    pub fn select_shade(&self, shade: Shade) {
        tracing::info!(id = shade.id, name = %shade.name, color = shade.color.as_str(), "shade selected");
        self.shade.send_replace(shade);
    }

    pub fn shade(&self) -> Shade {
        self.shade.borrow().clone()
    }

    /// Acquire the camera and start the frame loop. A no-op when already
    /// running; on failure everything acquired so far is released.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.active.is_some() {
            return Ok(());
        }
        let ready = self.slot.as_mut().is_some_and(|slot| slot.try_reclaim());
        if !ready {
            if self.tracker_lost {
                tracing::warn!("start rejected: tracker lost with the previous frame loop");
                return Err(SessionError::TrackerLost);
            }
            tracing::info!("start rejected: tracker not ready");
            return Err(SessionError::ResourceNotReady);
        }

        self.state = SessionState::Starting;
        let profile = self.config.capture.profile;
        let mut stream = match self.device.acquire(&profile) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(error = %e, "camera acquisition failed");
                self.state = SessionState::Idle;
                return Err(SessionError::CameraUnavailable);
            }
        };

        let timeout = Duration::from_millis(self.config.capture.ready_timeout_ms);
        let waited = tokio::time::timeout(timeout, stream.wait_ready()).await;
        if let Err(reason) = waited
            .map_err(|_| "timed out".to_string())
            .and_then(|r| r.map_err(|e| e.to_string()))
        {
            tracing::warn!(reason = %reason, "camera produced no frames");
            stream.stop();
            self.state = SessionState::Idle;
            return Err(SessionError::CameraUnavailable);
        }

        let capture = &self.config.capture;
        let (width, height) = stream
            .natural_size()
            .unwrap_or((capture.fallback_width, capture.fallback_height));
        let viewport = Viewport::new(
            width,
            height,
            self.device_pixel_ratio,
            self.config.visual.dpr_limit,
        );

        let compositor = match self.compositor.take() {
            Some(mut compositor) => {
                compositor.resize(viewport);
                compositor.reset();
                compositor
            }
            None => Compositor::new(
                viewport,
                self.config.smoothing,
                self.config.visual,
                self.config.performance,
            ),
        };
        let Some(slot) = self.slot.take() else {
            self.state = SessionState::Idle;
            return Err(SessionError::ResourceNotReady);
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (command_tx, command_rx) = mpsc::channel(8);
        let period = Duration::from_secs_f64(1.0 / f64::from(profile.target_fps()));
        let task = tokio::spawn(run_loop(
            LoopState {
                compositor,
                stream,
                slot,
                last_submitted: None,
            },
            self.shade.subscribe(),
            shutdown_rx,
            command_rx,
            self.config.performance.pacing,
            period,
        ));

        self.active = Some(ActiveLoop {
            shutdown: shutdown_tx,
            commands: command_tx,
            task,
        });
        self.state = SessionState::Running;
        tracing::info!(
            width,
            height,
            device_width = viewport.device_width(),
            device_height = viewport.device_height(),
            "session started"
        );
        Ok(())
    }

    /// Stop the frame loop and release the camera. Idempotent.
    pub async fn stop(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        self.state = SessionState::Stopping;
        let _ = active.shutdown.send(true);

        match active.task.await {
            Ok(mut state) => {
                state.stream.stop();
                state.compositor.reset();
                state.slot.abandon();
                self.slot = Some(state.slot);
                self.compositor = Some(state.compositor);
            }
            Err(e) => {
                // The loop's state, stream and tracker included, was dropped
                // with the task. `set_tracker` makes the session usable again.
                tracing::error!(error = %e, "frame loop failed");
                self.slot = Some(InferenceSlot::new(None));
                self.compositor = None;
                self.tracker_lost = true;
            }
        }
        self.state = SessionState::Idle;
        tracing::info!("session stopped");
    }

    /// Hiding the view tears the session down; becoming visible again does
    /// not restart it.
    pub async fn set_visibility(&mut self, visibility: Visibility) {
        match visibility {
            Visibility::Hidden if self.active.is_some() => {
                self.stop().await;
                self.state = SessionState::Paused;
                tracing::info!("session paused: view hidden");
            }
            Visibility::Hidden => {}
            Visibility::Visible => {
                tracing::debug!(state = ?self.state, "view visible");
            }
        }
    }

    /// Resize the buffers for a new viewport without touching capture or the
    /// tracker. The pixel ratio is re-capped. Returns the device size.
    pub async fn resize(&mut self, viewport: Viewport) -> Result<(u32, u32), SessionError> {
        let viewport = viewport.with_dpr(viewport.device_pixel_ratio, self.config.visual.dpr_limit);
        self.device_pixel_ratio = viewport.device_pixel_ratio;

        if let Some(active) = self.active.as_ref() {
            let (reply, rx) = oneshot::channel();
            active
                .commands
                .send(LoopCommand::Resize { viewport, reply })
                .await
                .map_err(|_| SessionError::NotRunning)?;
            return rx.await.map_err(|_| SessionError::NotRunning);
        }

        match self.compositor.as_mut() {
            Some(compositor) => {
                compositor.resize(viewport);
                Ok(compositor.buffers().dims())
            }
            None => Ok(viewport.device_size()),
        }
    }

    /// Change only the pixel ratio, keeping the current CSS size. `None`
    /// when no buffers exist yet; the ratio then applies at the next start.
    pub async fn set_device_pixel_ratio(
        &mut self,
        dpr: f32,
    ) -> Result<Option<(u32, u32)>, SessionError> {
        let limit = self.config.visual.dpr_limit;
        match self.status().await.viewport {
            Some(viewport) => self.resize(viewport.with_dpr(dpr, limit)).await.map(Some),
            None => {
                self.device_pixel_ratio = Viewport::new(1, 1, dpr, limit).device_pixel_ratio;
                Ok(None)
            }
        }
    }

    /// Capture the presented frame as a PNG at display resolution.
    pub async fn snapshot(&self) -> Result<Snapshot, SessionError> {
        let (front, viewport) = match self.active.as_ref() {
            Some(active) => {
                let (reply, rx) = oneshot::channel();
                active
                    .commands
                    .send(LoopCommand::Snapshot { reply })
                    .await
                    .map_err(|_| SessionError::NotRunning)?;
                rx.await.map_err(|_| SessionError::NotRunning)?
            }
            None => match self.compositor.as_ref() {
                Some(c) if c.frames_presented() > 0 => {
                    (c.buffers().front().clone(), c.viewport())
                }
                _ => return Err(SessionError::NotRunning),
            },
        };
        Snapshot::encode(&front, viewport).map_err(SessionError::Snapshot)
    }

    pub async fn status(&self) -> SessionStatus {
        if let Some(active) = self.active.as_ref() {
            let (reply, rx) = oneshot::channel();
            if active.commands.send(LoopCommand::Status { reply }).await.is_ok() {
                if let Ok(status) = rx.await {
                    return status;
                }
            }
        }
        match self.slot.as_ref() {
            Some(slot) => status_of(self.state, self.compositor.as_ref(), slot),
            None => SessionStatus {
                state: self.state,
                frames_presented: 0,
                buffer_size: None,
                viewport: None,
                tracking: StabilizerState::Uninitialized,
                inference_in_flight: false,
                inferences_submitted: 0,
                inferences_rejected: 0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{mouth_landmarks, ScriptedTracker, SyntheticCamera};
    use rouge_core::shades;
    use rouge_hw::Frame;

    const W: u32 = 64;
    const H: u32 = 48;

    fn session(camera: &SyntheticCamera, tracker: Option<ScriptedTracker>) -> Session {
        Session::new(
            EngineConfig::default(),
            Box::new(camera.clone()),
            tracker.map(|t| Box::new(t) as Box<dyn LandmarkTracker>),
        )
    }

    fn face_tracker() -> ScriptedTracker {
        ScriptedTracker::returning(Some(mouth_landmarks(0.5, 0.5, 0.25, 0.15)))
    }

    async fn wait_for(session: &Session, done: impl Fn(&SessionStatus) -> bool) -> SessionStatus {
        for _ in 0..300 {
            let status = session.status().await;
            if done(&status) {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached: {:?}", session.status().await);
    }

    #[tokio::test]
    async fn test_start_without_tracker_is_rejected() {
        let camera = SyntheticCamera::with_frames(W, H);
        let mut session = session(&camera, None);

        let err = session.start().await.unwrap_err();
        assert!(matches!(err, SessionError::ResourceNotReady));
        assert_eq!(
            err.to_string(),
            "Resources are still loading, please try again in a moment."
        );
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(camera.acquired(), 0, "camera is never requested");
    }

    #[tokio::test]
    async fn test_late_tracker_allows_start() {
        let camera = SyntheticCamera::with_frames(W, H);
        let mut session = session(&camera, None);
        assert!(session.set_tracker(Box::new(face_tracker())));
        session.start().await.unwrap();
        assert_eq!(session.state(), SessionState::Running);
        session.stop().await;
    }

    #[tokio::test]
    async fn test_denied_camera_returns_to_idle() {
        let camera = SyntheticCamera::denied();
        let mut session = session(&camera, Some(face_tracker()));

        let err = session.start().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Camera access is required. Please allow camera permissions and refresh."
        );
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_ready_timeout_releases_camera() {
        let camera = SyntheticCamera::default();
        let mut config = EngineConfig::default();
        config.capture.ready_timeout_ms = 30;
        let mut session = Session::new(
            config,
            Box::new(camera.clone()),
            Some(Box::new(face_tracker())),
        );

        assert!(matches!(
            session.start().await,
            Err(SessionError::CameraUnavailable)
        ));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(camera.released(), 1);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_releases_once() {
        let camera = SyntheticCamera::with_frames(W, H);
        let mut session = session(&camera, Some(face_tracker()));

        session.start().await.unwrap();
        assert_eq!(session.state(), SessionState::Running);
        session.stop().await;
        session.stop().await;

        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(camera.released(), 1, "capture released exactly once");
    }

    #[tokio::test]
    async fn test_frames_flow_through_tracker() {
        let camera = SyntheticCamera::with_frames(W, H);
        let tracker = face_tracker();
        let mut session = session(&camera, Some(tracker.clone()));
        session.start().await.unwrap();

        for seq in 2..6 {
            camera.publish(Frame::solid(W, H, [128, 128, 128, 255], seq));
            tokio::time::sleep(Duration::from_millis(15)).await;
        }
        let status = wait_for(&session, |s| {
            s.frames_presented >= 3 && s.tracking == StabilizerState::Tracking
        })
        .await;

        assert_eq!(status.buffer_size, Some((W, H)));
        assert!(tracker.calls() >= 1);
        assert!(status.inferences_submitted as usize >= tracker.calls());
        session.stop().await;
    }

    #[tokio::test]
    async fn test_hidden_pauses_until_explicit_start() {
        let camera = SyntheticCamera::with_frames(W, H);
        let mut session = session(&camera, Some(face_tracker()));
        session.start().await.unwrap();

        session.set_visibility(Visibility::Hidden).await;
        assert_eq!(session.state(), SessionState::Paused);
        assert_eq!(camera.released(), 1);

        session.set_visibility(Visibility::Visible).await;
        assert_eq!(session.state(), SessionState::Paused, "no auto-restart");

        session.start().await.unwrap();
        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(camera.acquired(), 2);
        session.stop().await;
        assert_eq!(camera.released(), 2);
    }

    #[tokio::test]
    async fn test_restart_while_inference_in_flight() {
        let camera = SyntheticCamera::with_frames(W, H);
        let tracker = face_tracker().with_delay(Duration::from_millis(300));
        let mut session = session(&camera, Some(tracker.clone()));
        session.start().await.unwrap();
        wait_for(&session, |s| s.inference_in_flight).await;

        session.stop().await;
        session.start().await.unwrap();
        assert_eq!(session.state(), SessionState::Running);

        // The abandoned call finishes, then the new loop submits again.
        camera.publish(Frame::solid(W, H, [128, 128, 128, 255], 2));
        let status = wait_for(&session, |s| s.tracking == StabilizerState::Tracking).await;
        assert!(tracker.calls() >= 2, "restarted loop ran its own inference");
        assert_eq!(status.state, SessionState::Running);
        session.stop().await;
    }

    #[tokio::test]
    async fn test_failed_loop_reports_lost_tracker() {
        let camera = SyntheticCamera::with_frames(W, H);
        let mut session = session(&camera, Some(face_tracker()));
        session.start().await.unwrap();

        if let Some(active) = session.active.as_ref() {
            active.task.abort();
        }
        session.stop().await;
        assert_eq!(session.state(), SessionState::Idle);

        let err = session.start().await.unwrap_err();
        assert!(matches!(err, SessionError::TrackerLost));
        assert_eq!(camera.acquired(), 1, "camera not requested without a tracker");

        assert!(session.set_tracker(Box::new(face_tracker())));
        session.start().await.unwrap();
        assert_eq!(session.state(), SessionState::Running);
        session.stop().await;
    }

    #[tokio::test]
    async fn test_resize_keeps_session_running() {
        let camera = SyntheticCamera::with_frames(W, H);
        let mut session = session(&camera, Some(face_tracker()));
        session.start().await.unwrap();

        let dims = session.resize(Viewport::new(W, H, 2.0, 2.0)).await.unwrap();
        assert_eq!(dims, (W * 2, H * 2));
        let status = session.status().await;
        assert_eq!(status.state, SessionState::Running);
        assert_eq!(status.buffer_size, Some((W * 2, H * 2)));
        assert_eq!(camera.acquired(), 1, "capture was not restarted");

        // Pixel ratio above the limit is capped.
        let dims = session.set_device_pixel_ratio(4.0).await.unwrap();
        assert_eq!(dims, Some((W * 2, H * 2)));
        session.stop().await;
    }

    #[tokio::test]
    async fn test_snapshot_is_css_sized_png() {
        let camera = SyntheticCamera::with_frames(W, H);
        let mut session = session(&camera, Some(face_tracker()));
        session.start().await.unwrap();
        session.select_shade(shades::lookup("Scarlet Siren").unwrap());
        session.resize(Viewport::new(W, H, 2.0, 2.0)).await.unwrap();
        wait_for(&session, |s| s.frames_presented >= 2).await;

        let snapshot = session.snapshot().await.unwrap();
        assert_eq!((snapshot.width, snapshot.height), (W, H));
        assert_eq!(&snapshot.png[..4], &[0x89, b'P', b'N', b'G']);
        let decoded = image::load_from_memory(&snapshot.png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (W, H));
        session.stop().await;

        // The last presented frame is still available after stopping.
        assert!(session.snapshot().await.is_ok());
    }

    #[tokio::test]
    async fn test_snapshot_before_start_fails() {
        let camera = SyntheticCamera::with_frames(W, H);
        let session = session(&camera, Some(face_tracker()));
        assert!(matches!(
            session.snapshot().await,
            Err(SessionError::NotRunning)
        ));
    }

    #[test]
    fn test_snapshot_save() {
        let front = RgbaImage::from_pixel(4, 2, image::Rgba([1, 2, 3, 255]));
        let snapshot = Snapshot::encode(&front, Viewport::new(4, 2, 1.0, 2.0)).unwrap();
        let dir = std::env::temp_dir().join(format!("rouge-snapshot-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = snapshot.save(&dir).unwrap();
        assert_eq!(path.file_name().unwrap(), SNAPSHOT_FILENAME);
        assert_eq!(std::fs::read(&path).unwrap(), snapshot.png);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_select_shade_swaps_atomically() {
        let camera = SyntheticCamera::with_frames(W, H);
        let session = session(&camera, None);
        assert!(session.shade().is_bare());
        let rani = shades::lookup("runway rani").unwrap();
        session.select_shade(rani.clone());
        assert_eq!(session.shade(), rani);
    }
}
