//! Streaming delivery of normalized records.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::model::NormalizedMessage;

/// Returned by a sink after each batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkControl {
    Continue,
    Stop,
}

/// Receives normalized records as they are produced.
///
/// Returning [`SinkControl::Stop`] halts the session immediately; no
/// further rows are decoded.
pub trait MessageSink {
    fn accept(&mut self, batch: &[NormalizedMessage]) -> SinkControl;

    /// Called once after the session's last batch.
    ///
    /// # Errors
    ///
    /// Fails when buffered output cannot be completed.
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<F> MessageSink for F
where
    F: FnMut(&[NormalizedMessage]) -> SinkControl,
{
    fn accept(&mut self, batch: &[NormalizedMessage]) -> SinkControl {
        self(batch)
    }
}

/// Sink collecting every record in memory.
#[derive(Debug, Default)]
pub struct VecSink {
    pub records: Vec<NormalizedMessage>,
}

impl MessageSink for VecSink {
    fn accept(&mut self, batch: &[NormalizedMessage]) -> SinkControl {
        self.records.extend_from_slice(batch);
        SinkControl::Continue
    }
}

/// Sink writing one JSON object per record.
///
/// A write failure stops the session. Buffered writers are flushed by
/// [`MessageSink::finish`].
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> MessageSink for JsonLinesSink<W> {
    fn accept(&mut self, batch: &[NormalizedMessage]) -> SinkControl {
        for record in batch {
            let written = serde_json::to_writer(&mut self.writer, record)
                .map_err(io::Error::from)
                .and_then(|_| self.writer.write_all(b"\n"));
            if let Err(e) = written {
                warn!("Stopping export, failed to write record: {}", e);
                return SinkControl::Stop;
            }
        }
        SinkControl::Continue
    }

    fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Cancellation shared by every session of one export.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
