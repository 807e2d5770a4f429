//! Analysis Worker
//!
//! Each upload gets its own worker: a tokio task that owns the analyzer and
//! talks to the request handler only through messages. Chunks arrive over a
//! bounded channel, so a slow worker makes `send_chunk` wait, which in turn
//! stops the handler from reading more of the request body.
//!
//! The terminal value (report or fault) travels back through the task's join
//! handle and is observed once, by [`AnalysisWorkerHandle::finish`] or
//! [`AnalysisWorkerHandle::wait`]. A panic inside the analyzer is contained by
//! the task boundary and surfaces as [`AnalysisError::Panicked`].

use std::any::Any;

use axum::body::Bytes;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::Instrument;
use uuid::Uuid;

use super::analyzer::ContentAnalyzer;
use super::types::{AnalysisError, ChunkMessage, Report, WorkerState};

// ============================================================================
// Spawning
// ============================================================================

/// Spawn a worker around `analyzer` with an inbound channel of `capacity`
pub fn spawn(analyzer: Box<dyn ContentAnalyzer>, capacity: usize) -> AnalysisWorkerHandle {
    let id = Uuid::new_v4();
    let (sender, inbound) = mpsc::channel(capacity.max(1));

    let span = tracing::debug_span!("analysis_worker", worker_id = %id);
    let task = tokio::spawn(run(analyzer, inbound).instrument(span));

    AnalysisWorkerHandle {
        id,
        sender: Some(sender),
        task: Some(task),
    }
}

async fn run(
    mut analyzer: Box<dyn ContentAnalyzer>,
    mut inbound: mpsc::Receiver<ChunkMessage>,
) -> Result<Report, AnalysisError> {
    let mut state = WorkerState::Idle;
    let mut chunks: u64 = 0;

    while let Some(message) = inbound.recv().await {
        match message {
            ChunkMessage::Chunk(bytes) => {
                if state == WorkerState::Idle {
                    state = WorkerState::Receiving;
                    tracing::trace!(?state, "First chunk received");
                }
                chunks += 1;

                if let Err(e) = analyzer.update(&bytes) {
                    tracing::debug!(error = %e, chunks, "Analyzer rejected chunk");
                    return Err(e);
                }
            }
            ChunkMessage::End => {
                state = WorkerState::Finalizing;
                tracing::trace!(?state, chunks, "End of stream");
                inbound.close();

                let report = analyzer.finish()?;

                state = WorkerState::Terminated;
                tracing::debug!(
                    ?state,
                    content_hash = %report.content_hash,
                    line_count = report.line_count,
                    error_line_count = report.error_line_count,
                    "Analysis complete"
                );
                return Ok(report);
            }
        }
    }

    tracing::debug!(?state, chunks, "Inbound channel closed without end message");
    Err(AnalysisError::InputClosed)
}

// ============================================================================
// Handle
// ============================================================================

/// Owner's side of one Analysis Worker
///
/// Dropping the handle before the terminal value was observed aborts the
/// worker task.
pub struct AnalysisWorkerHandle {
    id: Uuid,
    sender: Option<mpsc::Sender<ChunkMessage>>,
    task: Option<JoinHandle<Result<Report, AnalysisError>>>,
}

impl AnalysisWorkerHandle {
    /// Worker identifier used in logs
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Forward one chunk, waiting while the inbound channel is full
    ///
    /// Fails with `Terminated` once the worker has stopped accepting input;
    /// call [`wait`](Self::wait) to learn why.
    pub async fn send_chunk(&mut self, chunk: Bytes) -> Result<(), AnalysisError> {
        self.send(ChunkMessage::Chunk(chunk)).await
    }

    /// Send `End` and await the terminal value
    pub async fn finish(mut self) -> Result<Report, AnalysisError> {
        // A failed send means the worker already stopped; its own outcome is
        // the better diagnostic.
        let _ = self.send(ChunkMessage::End).await;
        self.wait().await
    }

    /// Close the inbound channel and await the terminal value
    pub async fn wait(mut self) -> Result<Report, AnalysisError> {
        self.sender.take();

        let Some(task) = self.task.take() else {
            return Err(AnalysisError::Terminated);
        };

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(join_error(e)),
        }
    }

    /// Abort the worker if it is still running
    pub fn terminate(&mut self) {
        self.sender.take();
        if let Some(task) = self.task.take() {
            if !task.is_finished() {
                tracing::debug!(worker_id = %self.id, "Terminating analysis worker");
            }
            task.abort();
        }
    }

    async fn send(&mut self, message: ChunkMessage) -> Result<(), AnalysisError> {
        let sender = self.sender.as_ref().ok_or(AnalysisError::Terminated)?;
        sender
            .send(message)
            .await
            .map_err(|_| AnalysisError::Terminated)
    }
}

impl Drop for AnalysisWorkerHandle {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn join_error(e: JoinError) -> AnalysisError {
    if e.is_panic() {
        AnalysisError::Panicked(panic_message(e.into_panic()))
    } else {
        AnalysisError::Terminated
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalyzerFactory, LineAnalyzerFactory, ReportStatus};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Panics once `remaining` chunks were accepted
    struct PanicOnChunk {
        remaining: usize,
    }

    impl ContentAnalyzer for PanicOnChunk {
        fn update(&mut self, _chunk: &[u8]) -> Result<(), AnalysisError> {
            if self.remaining == 0 {
                panic!("simulated analyzer crash");
            }
            self.remaining -= 1;
            Ok(())
        }

        fn finish(self: Box<Self>) -> Result<Report, AnalysisError> {
            Ok(Report::success("00".to_string(), 0, 0))
        }
    }

    /// Fails on finish; records when it is dropped
    struct FailOnFinish {
        dropped: Arc<AtomicBool>,
    }

    impl ContentAnalyzer for FailOnFinish {
        fn update(&mut self, _chunk: &[u8]) -> Result<(), AnalysisError> {
            Ok(())
        }

        fn finish(self: Box<Self>) -> Result<Report, AnalysisError> {
            Err(AnalysisError::Fault("never finishes".to_string()))
        }
    }

    impl Drop for FailOnFinish {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_report_after_end() {
        let mut handle = spawn(LineAnalyzerFactory::default().create(), 4);

        handle.send_chunk(Bytes::from_static(b"ok\nERR")).await.unwrap();
        handle.send_chunk(Bytes::from_static(b"OR x\n")).await.unwrap();
        let report = handle.finish().await.unwrap();

        assert_eq!(report.line_count, 2);
        assert_eq!(report.error_line_count, 1);
        assert_eq!(report.status, ReportStatus::Success);
    }

    #[tokio::test]
    async fn test_empty_stream_reports() {
        let handle = spawn(LineAnalyzerFactory::default().create(), 1);
        let report = handle.finish().await.unwrap();
        assert_eq!(report.line_count, 0);
    }

    #[tokio::test]
    async fn test_panic_becomes_error_signal() {
        let mut handle = spawn(Box::new(PanicOnChunk { remaining: 1 }), 1);

        handle.send_chunk(Bytes::from_static(b"one")).await.unwrap();
        // The second chunk may or may not be accepted before the task dies.
        let _ = handle.send_chunk(Bytes::from_static(b"two")).await;
        let result = handle.finish().await;

        match result {
            Err(AnalysisError::Panicked(message)) => {
                assert!(message.contains("simulated analyzer crash"))
            }
            other => panic!("expected panic signal, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_closed_without_end_is_error() {
        let mut handle = spawn(LineAnalyzerFactory::default().create(), 2);
        handle.send_chunk(Bytes::from_static(b"partial")).await.unwrap();

        let result = handle.wait().await;
        assert!(matches!(result, Err(AnalysisError::InputClosed)));
    }

    /// Blocks in `update` until the test releases it
    struct Gated {
        gate: std::sync::mpsc::Receiver<()>,
    }

    impl ContentAnalyzer for Gated {
        fn update(&mut self, _chunk: &[u8]) -> Result<(), AnalysisError> {
            self.gate
                .recv()
                .map_err(|_| AnalysisError::Fault("gate closed".to_string()))
        }

        fn finish(self: Box<Self>) -> Result<Report, AnalysisError> {
            Ok(Report::success("ab".to_string(), 0, 0))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_full_channel_applies_backpressure() {
        let (release, gate) = std::sync::mpsc::channel();
        let mut handle = spawn(Box::new(Gated { gate }), 1);

        // First chunk is taken by the worker, which then blocks; the second
        // fills the channel.
        handle.send_chunk(Bytes::from_static(b"1")).await.unwrap();
        handle.send_chunk(Bytes::from_static(b"2")).await.unwrap();

        let third = tokio::time::timeout(
            Duration::from_millis(200),
            handle.send_chunk(Bytes::from_static(b"3")),
        )
        .await;
        assert!(third.is_err(), "send should wait while the channel is full");

        for _ in 0..3 {
            release.send(()).unwrap();
        }
        handle.send_chunk(Bytes::from_static(b"3")).await.unwrap();

        let report = handle.finish().await.unwrap();
        assert_eq!(report.content_hash, "ab");
    }

    #[tokio::test]
    async fn test_finish_fault_is_error_signal() {
        let dropped = Arc::new(AtomicBool::new(false));
        let mut handle = spawn(
            Box::new(FailOnFinish {
                dropped: dropped.clone(),
            }),
            1,
        );
        handle.send_chunk(Bytes::from_static(b"x")).await.unwrap();

        let result = handle.finish().await;
        assert!(matches!(result, Err(AnalysisError::Fault(_))));
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_drop_terminates_worker() {
        let dropped = Arc::new(AtomicBool::new(false));
        let mut handle = spawn(
            Box::new(FailOnFinish {
                dropped: dropped.clone(),
            }),
            1,
        );
        handle.send_chunk(Bytes::from_static(b"x")).await.unwrap();

        drop(handle);

        tokio::time::timeout(Duration::from_secs(5), async {
            while !dropped.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("worker was not terminated");
    }

    #[tokio::test]
    async fn test_send_after_terminate_fails() {
        let mut handle = spawn(LineAnalyzerFactory::default().create(), 1);
        handle.terminate();

        let result = handle.send_chunk(Bytes::from_static(b"late")).await;
        assert!(matches!(result, Err(AnalysisError::Terminated)));
    }
}
