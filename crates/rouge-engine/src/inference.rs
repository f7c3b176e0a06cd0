//! Single-flight landmark inference.
//!
//! The tracker is owned by the slot and moved into a blocking task for each
//! inference; while it is away the slot is busy and further submissions are
//! rejected. Ownership coming back is what marks the request done, so two
//! inferences can never overlap.

use rouge_core::{LandmarkSet, LandmarkTracker, TrackerError};
use rouge_hw::Frame;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

type Completed = (Box<dyn LandmarkTracker>, Result<Option<LandmarkSet>, TrackerError>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The frame was handed to the tracker.
    Submitted,
    /// An inference is already in flight; the frame was dropped.
    Busy,
    /// No tracker is loaded.
    Unavailable,
}

struct Pending {
    rx: oneshot::Receiver<Completed>,
    sequence: u64,
    abandoned: bool,
}

pub struct InferenceSlot {
    tracker: Option<Box<dyn LandmarkTracker>>,
    pending: Option<Pending>,
    submitted: u64,
    rejected: u64,
}

impl InferenceSlot {
    pub fn new(tracker: Option<Box<dyn LandmarkTracker>>) -> Self {
        Self {
            tracker,
            pending: None,
            submitted: 0,
            rejected: 0,
        }
    }

    /// Install a (late-loaded) tracker. Ignored while an inference is in flight.
    pub fn set_tracker(&mut self, tracker: Box<dyn LandmarkTracker>) {
        if self.pending.is_some() {
            tracing::warn!("tracker replacement ignored: inference in flight");
            return;
        }
        self.tracker = Some(tracker);
    }

    /// Tracker present and idle.
    pub fn is_ready(&self) -> bool {
        self.tracker.is_some() && self.pending.is_none()
    }

    /// Tracker loaded: idle, or away on an inference that will hand it back.
    pub fn has_tracker(&self) -> bool {
        self.tracker.is_some() || self.pending.is_some()
    }

    pub fn in_flight(&self) -> bool {
        self.pending.is_some()
    }

    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Start an inference on `frame` unless one is already running.
    /// Must be called from within a tokio runtime.
    pub fn try_submit(&mut self, frame: Arc<Frame>) -> SubmitOutcome {
        if self.pending.is_some() {
            self.rejected += 1;
            return SubmitOutcome::Busy;
        }
        let Some(mut tracker) = self.tracker.take() else {
            return SubmitOutcome::Unavailable;
        };

        let sequence = frame.sequence;
        let (tx, rx) = oneshot::channel();
        tokio::task::spawn_blocking(move || {
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| tracker.infer(&frame.view())))
                .unwrap_or(Err(TrackerError::Panicked));
            // The receiver is gone only if the slot was dropped.
            let _ = tx.send((tracker, result));
        });

        self.submitted += 1;
        self.pending = Some(Pending {
            rx,
            sequence,
            abandoned: false,
        });
        tracing::trace!(sequence, "inference submitted");
        SubmitOutcome::Submitted
    }

    /// Collect a finished inference without waiting.
    ///
    /// `None`: nothing new. `Some(None)`: the tracker ran and saw no face (or
    /// failed). `Some(Some(set))`: fresh landmarks.
    pub fn poll(&mut self) -> Option<Option<LandmarkSet>> {
        let pending = self.pending.as_mut()?;
        match pending.rx.try_recv() {
            Ok(completed) => {
                let pending = self.pending.take()?;
                self.finish(completed, pending.sequence, pending.abandoned)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => {
                let pending = self.pending.take()?;
                self.lost(pending.abandoned)
            }
        }
    }

    /// Wait for the in-flight inference, if any.
    pub async fn settle(&mut self) -> Option<Option<LandmarkSet>> {
        let pending = self.pending.take()?;
        match pending.rx.await {
            Ok(completed) => self.finish(completed, pending.sequence, pending.abandoned),
            Err(_) => self.lost(pending.abandoned),
        }
    }

    /// Ignore the result of the in-flight inference when it arrives.
    pub fn abandon(&mut self) {
        if let Some(pending) = self.pending.as_mut() {
            pending.abandoned = true;
            tracing::debug!(sequence = pending.sequence, "in-flight inference abandoned");
        }
    }

    /// Recover the tracker from a finished (typically abandoned) inference.
    /// Returns whether the slot can serve a new session; an inference still
    /// running is collected by the next `poll`.
    pub fn try_reclaim(&mut self) -> bool {
        if self.pending.is_some() {
            let _ = self.poll();
        }
        self.has_tracker()
    }

    fn finish(
        &mut self,
        (tracker, result): Completed,
        sequence: u64,
        abandoned: bool,
    ) -> Option<Option<LandmarkSet>> {
        self.tracker = Some(tracker);
        if abandoned {
            tracing::debug!(sequence, "discarding abandoned inference result");
            return None;
        }
        match result {
            Ok(landmarks) => {
                tracing::trace!(sequence, face = landmarks.is_some(), "inference complete");
                Some(landmarks)
            }
            Err(e) => {
                tracing::warn!(sequence, error = %e, "landmark inference failed");
                Some(None)
            }
        }
    }

    fn lost(&mut self, abandoned: bool) -> Option<Option<LandmarkSet>> {
        tracing::error!("inference worker exited without returning the tracker");
        (!abandoned).then_some(None)
    }
}
