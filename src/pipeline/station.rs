//! Core station abstraction for the pipeline.

use crate::pipeline::error::StationError;
use crate::pipeline::frame::Frame;
use std::future::Future;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// Asynchronous work queued by a station; resolves to frames for the next station.
pub type SpawnedFrames = Pin<Box<dyn Future<Output = Vec<Frame>> + Send + 'static>>;

/// A processing station in the pipeline.
///
/// Each station receives one frame at a time and returns zero or more frames
/// for the next station, in the order they should travel.
pub trait Station: Send + 'static {
    /// Processes a single frame.
    ///
    /// Returns:
    /// - `Ok(frames)` - Frames to forward (empty when the frame is consumed)
    /// - `Err(StationError)` - Processing failed
    fn process(
        &mut self,
        frame: Frame,
        ctx: &mut StationContext,
    ) -> Result<Vec<Frame>, StationError>;

    /// Returns the name of this station for logging and error reporting.
    fn name(&self) -> &'static str;

    /// Called when the pipeline stops, whether it ended or was cancelled.
    ///
    /// Override this to perform cleanup operations.
    fn shutdown(&mut self) {}
}

pub(crate) struct SpawnedTask {
    pub(crate) token: CancellationToken,
    pub(crate) future: SpawnedFrames,
}

/// Per-call context handed to [`Station::process`].
///
/// Work queued with [`StationContext::spawn`] runs off the dispatch path; its
/// frames re-enter the pipeline right after the spawning station.
pub struct StationContext {
    position: usize,
    cancel: CancellationToken,
    spawned: Vec<SpawnedTask>,
}

impl StationContext {
    pub(crate) fn new(position: usize, cancel: CancellationToken) -> Self {
        Self {
            position,
            cancel,
            spawned: Vec::new(),
        }
    }

    /// Context for driving a station by hand, outside a running pipeline.
    pub fn detached() -> Self {
        Self::new(0, CancellationToken::new())
    }

    /// Index of the station in its pipeline.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Queues asynchronous work.
    ///
    /// Returns a token that cancels just this task. Cancelled work emits nothing.
    pub fn spawn<F>(&mut self, future: F) -> CancellationToken
    where
        F: Future<Output = Vec<Frame>> + Send + 'static,
    {
        let token = self.cancel.child_token();
        self.spawned.push(SpawnedTask {
            token: token.clone(),
            future: Box::pin(future),
        });
        token
    }

    /// Number of tasks queued but not yet handed off.
    pub fn pending(&self) -> usize {
        self.spawned.len()
    }

    pub(crate) fn take_spawned(&mut self) -> Vec<SpawnedTask> {
        std::mem::take(&mut self.spawned)
    }

    /// Runs the queued tasks to completion, in the order they were queued.
    ///
    /// Used when a station is driven outside a pipeline.
    pub async fn run_spawned(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        for task in self.take_spawned() {
            if task.token.is_cancelled() {
                continue;
            }
            tokio::select! {
                biased;
                _ = task.token.cancelled() => {}
                out = task.future => frames.extend(out),
            }
        }
        frames
    }
}
