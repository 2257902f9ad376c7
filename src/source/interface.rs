use crate::error::SourceError;
use crate::frame::FrameData;
use async_trait::async_trait;
use std::time::Duration;

/// Result of asking a source for its next frame
#[derive(Debug, Clone)]
pub enum NextFrame {
    Frame(FrameData),
    /// Nothing right now; the source is reconnecting or timed out
    NotAvailable,
}

impl NextFrame {
    pub fn is_available(&self) -> bool {
        matches!(self, NextFrame::Frame(_))
    }
}

/// What the detection loop pulls frames from.
///
/// `next_frame` never fails and never blocks indefinitely: every failure is
/// folded into `NotAvailable`.
#[async_trait]
pub trait FrameSource: Send {
    async fn next_frame(&mut self) -> NextFrame;

    /// Release the underlying connection. Further calls to `next_frame`
    /// return `NotAvailable`.
    async fn close(&mut self);
}

/// A raw video capability that can connect, read and disconnect but knows
/// nothing about recovery.
#[async_trait]
pub trait SourceBackend: Send {
    /// Human readable target, used in logs
    fn describe(&self) -> String;

    async fn connect(&mut self) -> Result<(), SourceError>;

    /// Wait up to `timeout` for a frame. `Ok(None)` means the wait timed out
    /// while the connection is still believed to be healthy.
    async fn read_frame(&mut self, timeout: Duration) -> Result<Option<FrameData>, SourceError>;

    async fn disconnect(&mut self);
}
