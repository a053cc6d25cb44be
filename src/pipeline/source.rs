//! Telemetry source abstraction for the transport boundary.
//!
//! Provides a unified trait for reading telemetry frames from different
//! sources: stdin (JSONL, one frame per line) for live piping from a broker
//! shim, and pre-loaded replay for tests and simulation. The broker itself
//! is outside this crate; a source is whatever can produce frames in
//! arrival order.

use anyhow::Result;
use async_trait::async_trait;

use crate::types::TelemetryFrame;

/// Events produced by a telemetry source.
pub enum FrameEvent {
    /// A valid telemetry frame was read.
    Frame(TelemetryFrame),
    /// Source reached end of data.
    Eof,
}

/// Trait abstracting where telemetry frames come from.
///
/// Implementations handle format parsing and pacing internally. The
/// dispatcher calls [`next_frame`](TelemetrySource::next_frame) in a select!
/// with cancellation.
#[async_trait]
pub trait TelemetrySource: Send + 'static {
    /// Read the next frame from the source.
    ///
    /// Returns `FrameEvent::Eof` when no more data is available.
    async fn next_frame(&mut self) -> Result<FrameEvent>;

    /// Human-readable name for logging (e.g. "stdin", "replay").
    fn source_name(&self) -> &str;
}

// ============================================================================
// Stdin Source (JSONL frames)
// ============================================================================

/// Reads JSON-formatted telemetry frames from stdin, one per line.
///
/// Malformed lines are logged and skipped; a bad frame from the broker must
/// never take the engine down.
pub struct StdinSource {
    reader: tokio::io::BufReader<tokio::io::Stdin>,
    line_buffer: String,
}

impl StdinSource {
    pub fn new() -> Self {
        Self {
            reader: tokio::io::BufReader::new(tokio::io::stdin()),
            line_buffer: String::with_capacity(1024),
        }
    }
}

impl Default for StdinSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TelemetrySource for StdinSource {
    async fn next_frame(&mut self) -> Result<FrameEvent> {
        use tokio::io::AsyncBufReadExt;
        loop {
            self.line_buffer.clear();
            let bytes = self.reader.read_line(&mut self.line_buffer).await?;
            if bytes == 0 {
                return Ok(FrameEvent::Eof);
            }
            let line = self.line_buffer.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<TelemetryFrame>(line) {
                Ok(frame) => return Ok(FrameEvent::Frame(frame)),
                Err(e) => {
                    tracing::warn!("[StdinSource] Failed to parse frame: {}", e);
                    // Skip malformed lines and keep reading
                }
            }
        }
    }

    fn source_name(&self) -> &str {
        "stdin"
    }
}

// ============================================================================
// Replay Source (pre-loaded frames)
// ============================================================================

/// Replays pre-loaded frames with optional inter-frame delay.
pub struct ReplaySource {
    frames: std::vec::IntoIter<TelemetryFrame>,
    delay_ms: u64,
    yielded_first: bool,
}

impl ReplaySource {
    pub fn new(frames: Vec<TelemetryFrame>, delay_ms: u64) -> Self {
        Self {
            frames: frames.into_iter(),
            delay_ms,
            yielded_first: false,
        }
    }
}

#[async_trait]
impl TelemetrySource for ReplaySource {
    async fn next_frame(&mut self) -> Result<FrameEvent> {
        if self.yielded_first && self.delay_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.delay_ms)).await;
        }
        match self.frames.next() {
            Some(frame) => {
                self.yielded_first = true;
                Ok(FrameEvent::Frame(frame))
            }
            None => Ok(FrameEvent::Eof),
        }
    }

    fn source_name(&self) -> &str {
        "replay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_replay_source_yields_then_eof() {
        let frame = TelemetryFrame {
            machine_id: "CNC-001".to_string(),
            metrics: BTreeMap::from([("spindle_temp".to_string(), 65.0)]),
            timestamp: 1,
        };
        let mut source = ReplaySource::new(vec![frame], 0);

        assert!(matches!(
            source.next_frame().await.expect("frame"),
            FrameEvent::Frame(_)
        ));
        assert!(matches!(
            source.next_frame().await.expect("eof"),
            FrameEvent::Eof
        ));
    }
}
