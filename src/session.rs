//! Binds client lifecycle events to a running pipeline.

use crate::error::{ParleyError, Result};
use crate::pipeline::{Frame, PipelineHandle};

/// Lifecycle signal from the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent {
    Connected,
    Disconnected,
}

/// One client's conversation over a pipeline.
///
/// Connecting seeds a greeting turn; disconnecting cancels all outstanding
/// work and releases the pipeline's resources.
pub struct ConversationSession {
    handle: PipelineHandle,
    connected: bool,
}

impl ConversationSession {
    pub fn new(handle: PipelineHandle) -> Self {
        Self {
            handle,
            connected: false,
        }
    }

    pub async fn handle_event(&mut self, event: ClientEvent) -> Result<()> {
        match event {
            ClientEvent::Connected => {
                if self.connected {
                    tracing::debug!("duplicate connect ignored");
                    return Ok(());
                }
                self.connected = true;
                tracing::info!("client connected");
                self.handle.push(Frame::Greet)
            }
            ClientEvent::Disconnected => {
                tracing::info!("client disconnected");
                self.connected = false;
                self.handle.cancel().await;
                Ok(())
            }
        }
    }

    /// Feeds an inbound frame (audio or a speech boundary) into the pipeline.
    pub fn push(&self, frame: Frame) -> Result<()> {
        if !self.handle.is_running() {
            return Err(ParleyError::PipelineClosed);
        }
        self.handle.push(frame)
    }

    /// Ends the conversation gracefully once outstanding turns complete.
    pub async fn finish(&mut self) -> Result<()> {
        self.connected = false;
        self.handle.end().await
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }
}
