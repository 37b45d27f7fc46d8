//! Per-connection session loop.
//!
//! Each cycle drains the socket down to the newest frame, runs the pipeline on
//! the blocking pool and sends one reply. Frames that arrive while a cycle is
//! running are never queued for later; only the newest one survives the next
//! drain.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::TransportError;
use crate::pipeline::FramePipeline;
use crate::tracker::{ChestTracker, PhaseTransition};

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// How long the drain waits for a newer frame before processing.
    pub drain_window: Duration,
    pub expansion_target: f32,
    pub presence_threshold: f32,
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            drain_window: config.scan.drain_window(),
            expansion_target: config.scan.expansion_target,
            presence_threshold: config.pose.presence_threshold,
        }
    }

    fn new_tracker(&self) -> ChestTracker {
        ChestTracker::new(self.expansion_target, self.presence_threshold)
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    /// Cycles that produced a reply.
    pub processed: u64,
    /// Frames replaced by a newer one during a drain.
    pub dropped: u64,
    /// Cycles abandoned because of a malformed frame or pipeline error.
    pub failed: u64,
}

/// Newest message found by a drain.
#[derive(Debug, Clone, PartialEq)]
pub struct Latest {
    pub text: String,
    /// Older messages discarded in favor of `text`.
    pub superseded: u64,
}

/// `text` を最新として保持し、それまでの保持分は破棄数に数える
fn hold(slot: &mut Option<Latest>, text: String) {
    let superseded = slot.take().map_or(0, |prev| prev.superseded + 1);
    *slot = Some(Latest { text, superseded });
}

/// Reads until the connection stays quiet for `window`, keeping only the
/// newest message. `held` is a message already taken off the connection
/// (during the previous cycle) and competes like any other. If nothing is
/// held once the window passes, waits without a timeout for the next one.
///
/// `Ok(None)` means the peer closed the connection. A message held when the
/// connection closes is discarded.
pub async fn read_latest<R>(
    reader: &mut R,
    held: Option<Latest>,
    window: Duration,
) -> Result<Option<Latest>, TransportError>
where
    R: Stream<Item = Result<String, TransportError>> + Unpin,
{
    let mut latest = held;

    loop {
        match tokio::time::timeout(window, reader.next()).await {
            Ok(Some(Ok(text))) => hold(&mut latest, text),
            Ok(Some(Err(e))) => return Err(e),
            Ok(None) => return Ok(None),
            Err(_) => break,
        }
    }

    if latest.is_some() {
        return Ok(latest);
    }

    match reader.next().await {
        Some(Ok(text)) => Ok(Some(Latest { text, superseded: 0 })),
        Some(Err(e)) => Err(e),
        None => Ok(None),
    }
}

/// Keeps reading while a cycle is in flight, holding only the newest frame.
/// Resolves only when the connection closes (`Ok`) or fails (`Err`).
async fn watch_connection<R>(reader: &mut R, held: &mut Option<Latest>) -> Result<(), TransportError>
where
    R: Stream<Item = Result<String, TransportError>> + Unpin,
{
    loop {
        match reader.next().await {
            Some(Ok(text)) => hold(held, text),
            Some(Err(e)) => return Err(e),
            None => return Ok(()),
        }
    }
}

/// Runs one session until the peer disconnects or `cancel` fires.
///
/// Returns `Err` only for transport failures; per-frame errors are logged and
/// the loop continues.
pub async fn run_session<R, W>(
    mut reader: R,
    mut writer: W,
    pipeline: Arc<FramePipeline>,
    options: SessionOptions,
    cancel: CancellationToken,
) -> Result<SessionStats, TransportError>
where
    R: Stream<Item = Result<String, TransportError>> + Unpin,
    W: Sink<String, Error = TransportError> + Unpin,
{
    let mut held: Option<Latest> = None;
    let mut tracker = options.new_tracker();
    let mut stats = SessionStats::default();

    let mut fps_counter: u32 = 0;
    let mut fps_timer = Instant::now();

    loop {
        // 1. Latest-frame acquisition
        let latest = tokio::select! {
            latest = read_latest(&mut reader, held.take(), options.drain_window) => latest?,
            _ = cancel.cancelled() => {
                debug!("session cancelled while waiting for a frame");
                return Ok(stats);
            }
        };
        let Some(latest) = latest else {
            return Ok(stats);
        };
        stats.dropped += latest.superseded;

        // 2-7. Pipeline on the blocking pool
        let job = {
            let pipeline = Arc::clone(&pipeline);
            tokio::task::spawn_blocking(move || pipeline.process(&latest.text, tracker))
        };
        let joined = tokio::select! {
            joined = job => joined,
            _ = cancel.cancelled() => {
                debug!("session cancelled, abandoning in-flight frame");
                return Ok(stats);
            }
            lost = watch_connection(&mut reader, &mut held) => {
                debug!("connection lost, abandoning in-flight frame");
                lost?;
                return Ok(stats);
            }
        };

        let output = match joined {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                stats.failed += 1;
                if e.is_client_fault() {
                    debug!("dropped frame: {:#}", anyhow::Error::from(e));
                } else {
                    warn!("frame processing failed: {:#}", anyhow::Error::from(e));
                }
                continue;
            }
            Err(e) => {
                stats.failed += 1;
                error!("frame pipeline task failed: {}", e);
                continue;
            }
        };

        match output.transition {
            PhaseTransition::Entered => info!("measurement phase started, baseline reset"),
            PhaseTransition::Exited => info!(
                baseline_px = output.tracker.baseline_distance(),
                "measurement phase ended"
            ),
            PhaseTransition::Unchanged => {}
        }

        // 8. Emit
        tokio::select! {
            sent = writer.send(output.reply.to_json()) => sent?,
            _ = cancel.cancelled() => return Ok(stats),
        }
        tracker = output.tracker;
        stats.processed += 1;

        fps_counter += 1;
        if fps_timer.elapsed() >= Duration::from_secs(1) {
            debug!(
                "[fps] {} (dropped={} failed={} baseline={:.1}px)",
                fps_counter,
                stats.dropped,
                stats.failed,
                tracker.baseline_distance()
            );
            fps_counter = 0;
            fps_timer = Instant::now();
        }
    }
}
