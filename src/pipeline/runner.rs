//! Drives an ordered chain of stations on a single tokio task.
//!
//! Frames are dispatched one stage at a time: a station sees every frame of
//! the current batch, in order, before the next station sees any of them.
//! Work a station spawns re-enters the chain right after that station when
//! it resolves, so its frames may overtake nothing upstream but may land
//! after unrelated frames that passed through in the meantime.
//!
//! A panic inside a station is reported as a recoverable error for that frame.
//! Spawned work that panics is logged and resumes with no frames.

use crate::error::{ParleyError, Result};
use crate::pipeline::error::{ErrorReporter, LogReporter, StationError};
use crate::pipeline::frame::Frame;
use crate::pipeline::station::{SpawnedTask, Station, StationContext};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

enum Envelope {
    Push(Frame),
    Resume { from: usize, frames: Vec<Frame> },
    End,
}

/// An ordered chain of stations, not yet running.
pub struct Pipeline {
    stations: Vec<Box<dyn Station>>,
    reporter: Arc<dyn ErrorReporter>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            stations: Vec::new(),
            reporter: Arc::new(LogReporter),
        }
    }

    /// Appends a station to the end of the chain.
    pub fn with_station(mut self, station: impl Station) -> Self {
        self.stations.push(Box::new(station));
        self
    }

    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Starts the dispatch loop. Must be called inside a tokio runtime.
    ///
    /// Frames leaving the last station are delivered on the returned receiver.
    pub fn start(self) -> (PipelineHandle, UnboundedReceiver<Frame>) {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let names: Vec<&'static str> = self.stations.iter().map(|s| s.name()).collect();
        tracing::debug!(stations = ?names, "starting pipeline");

        let runner = Runner {
            stations: self.stations,
            reporter: self.reporter,
            cancel: cancel.clone(),
            inbox: inbox_tx.clone(),
            output: output_tx,
            pending: 0,
        };
        let task = tokio::spawn(runner.run(inbox_rx));

        (
            PipelineHandle {
                inbox: inbox_tx,
                cancel,
                task: Some(task),
            },
            output_rx,
        )
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Control handle for a running pipeline. Dropping it cancels the pipeline.
pub struct PipelineHandle {
    inbox: UnboundedSender<Envelope>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PipelineHandle {
    /// Feeds a frame into the first station.
    pub fn push(&self, frame: Frame) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ParleyError::PipelineClosed);
        }
        self.inbox
            .send(Envelope::Push(frame))
            .map_err(|_| ParleyError::PipelineClosed)
    }

    /// Ends the pipeline gracefully.
    ///
    /// Waits for all spawned work to resolve, then sends [`Frame::End`]
    /// through every station and closes the output.
    pub async fn end(&mut self) -> Result<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        if self.inbox.send(Envelope::End).is_err() {
            tracing::debug!("pipeline already stopped before end");
        }
        task.await
            .map_err(|e| ParleyError::Other(format!("pipeline task failed: {e}")))
    }

    /// Cancels the pipeline: in-flight work is discarded and no `End` is emitted.
    pub async fn cancel(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::warn!(error = %e, "pipeline task failed during cancel");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Runner {
    stations: Vec<Box<dyn Station>>,
    reporter: Arc<dyn ErrorReporter>,
    cancel: CancellationToken,
    inbox: UnboundedSender<Envelope>,
    output: UnboundedSender<Frame>,
    pending: usize,
}

impl Runner {
    async fn run(mut self, mut inbox: UnboundedReceiver<Envelope>) {
        let mut ending = false;

        loop {
            if ending && self.pending == 0 {
                self.dispatch(0, vec![Frame::End]);
                tracing::debug!("pipeline ended");
                break;
            }

            let envelope = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!(pending = self.pending, "pipeline cancelled");
                    break;
                }
                envelope = inbox.recv() => envelope,
            };
            // The runner holds a sender itself, so the inbox only closes with the runner.
            let Some(envelope) = envelope else { break };

            match envelope {
                Envelope::Push(frame) if ending => {
                    tracing::debug!(frame = frame.kind(), "dropping frame pushed after end");
                }
                Envelope::Push(frame) => self.dispatch(0, vec![frame]),
                Envelope::Resume { from, frames } => {
                    self.pending = self.pending.saturating_sub(1);
                    if !self.cancel.is_cancelled() {
                        self.dispatch(from, frames);
                    }
                }
                Envelope::End => ending = true,
            }
        }

        self.cancel.cancel();
        for station in &mut self.stations {
            station.shutdown();
        }
    }

    fn dispatch(&mut self, from: usize, frames: Vec<Frame>) {
        let mut batch = frames;

        for position in from..self.stations.len() {
            if batch.is_empty() {
                return;
            }
            let mut next = Vec::with_capacity(batch.len());
            let mut spawned = Vec::new();

            let station = &mut self.stations[position];
            for frame in batch {
                let mut ctx = StationContext::new(position, self.cancel.clone());
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    station.process(frame, &mut ctx)
                }))
                .unwrap_or_else(|payload| {
                    Err(StationError::Recoverable(format!(
                        "panicked: {}",
                        panic_message(&*payload)
                    )))
                });
                spawned.extend(ctx.take_spawned());

                match result {
                    Ok(out) => next.extend(out),
                    Err(error @ StationError::Recoverable(_)) => {
                        self.reporter.report(station.name(), &error);
                    }
                    Err(error @ StationError::Fatal(_)) => {
                        self.reporter.report(station.name(), &error);
                        self.cancel.cancel();
                        return;
                    }
                }
            }

            for task in spawned {
                self.spawn(position + 1, task);
            }
            batch = next;
        }

        for frame in batch {
            if self.output.send(frame).is_err() {
                tracing::debug!("pipeline output receiver dropped");
                break;
            }
        }
    }

    fn spawn(&mut self, from: usize, task: SpawnedTask) {
        self.pending += 1;
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            let SpawnedTask { token, future } = task;
            // Driven as its own task so a panic surfaces as a JoinError here.
            let work = tokio::spawn(future);
            let abort = work.abort_handle();
            let frames = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    abort.abort();
                    Vec::new()
                }
                joined = work => match joined {
                    Ok(frames) => frames,
                    Err(e) => {
                        tracing::error!(error = %e, resume_at = from, "spawned work failed");
                        Vec::new()
                    }
                },
            };
            // The runner may already be gone after a cancel.
            inbox.send(Envelope::Resume { from, frames }).ok();
        });
    }
}

fn panic_message<'a>(payload: &'a (dyn Any + Send + 'static)) -> &'a str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
