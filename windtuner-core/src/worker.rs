//! # Analysis Worker
//!
//! Runs a [`SpectrumPipeline`] on a dedicated background thread.
//!
//! ## Architecture
//! - **Capture side**: only calls [`SharedRingBuffer::push_samples`]
//! - **Worker thread**: polls the ring buffer, runs a cycle whenever a hop of
//!   new samples is available, publishes an owned copy of the result, sleeps
//! - **Stopping**: a flag checked once per loop; a running cycle always finishes

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{Sender, TrySendError};

use crate::AnalysisResult;
use crate::pipeline::SpectrumPipeline;
use crate::ring_buffer::SharedRingBuffer;

/// Receiver of finished analyses.
pub trait ResultSink: Send + 'static {
    /// Called on the worker thread after every cycle. Must not block for long.
    fn publish(&mut self, result: AnalysisResult);
}

/// Results go through a channel; a full channel drops the newest result.
impl ResultSink for Sender<AnalysisResult> {
    fn publish(&mut self, result: AnalysisResult) {
        match self.try_send(result) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => log::warn!("[ANALYSIS] Result channel full, dropping result"),
            Err(TrySendError::Disconnected(_)) => log::debug!("[ANALYSIS] Result receiver gone"),
        }
    }
}

/// Observable latest value: readers always see the most recent result.
#[derive(Debug, Clone, Default)]
pub struct LatestResult {
    inner: Arc<Mutex<Option<AnalysisResult>>>,
}

impl LatestResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone of the most recent result, if any.
    pub fn get(&self) -> Option<AnalysisResult> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Takes the most recent result, leaving nothing behind.
    pub fn take(&self) -> Option<AnalysisResult> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

impl ResultSink for LatestResult {
    fn publish(&mut self, result: AnalysisResult) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
    }
}

/// Background analysis thread management structure.
///
/// Dropping the worker stops it and waits for the thread.
#[derive(Debug)]
pub struct AnalysisWorker {
    stop: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<SpectrumPipeline>>,
}

impl AnalysisWorker {
    /// Starts the analysis loop.
    ///
    /// # Arguments
    /// * `pipeline` - moved onto the worker thread; returned by [`stop`](Self::stop)
    /// * `ring` - shared with the capture producer
    /// * `sink` - receives every result
    pub fn spawn<S: ResultSink>(
        mut pipeline: SpectrumPipeline,
        ring: Arc<SharedRingBuffer>,
        mut sink: S,
    ) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let poll_interval = Duration::from_millis(pipeline.config().poll_interval_ms);

        let thread_stop = Arc::clone(&stop);
        let thread_handle = thread::Builder::new()
            .name("windtuner-analysis".into())
            .spawn(move || {
                log::info!("[ANALYSIS] Worker started, polling every {:?}", poll_interval);
                let mut reported_overruns = 0;

                while !thread_stop.load(Ordering::Acquire) {
                    if pipeline.run_cycle(&ring) {
                        sink.publish(pipeline.result());
                    }

                    let overruns = ring.overrun_samples();
                    if overruns > reported_overruns {
                        log::warn!(
                            "[ANALYSIS] Ring buffer overrun: {} samples lost ({} total)",
                            overruns - reported_overruns,
                            overruns
                        );
                        reported_overruns = overruns;
                    }

                    thread::sleep(poll_interval);
                }

                log::info!("[ANALYSIS] Worker stopped after {} cycles", pipeline.cycles());
                pipeline
            })
            .context("failed to spawn analysis thread")?;

        Ok(Self {
            stop,
            thread_handle: Some(thread_handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Signals the loop to stop, waits for the cycle in flight and hands the
    /// pipeline back.
    ///
    /// # Returns
    /// * `None` - the worker thread panicked
    pub fn stop(mut self) -> Option<SpectrumPipeline> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Option<SpectrumPipeline> {
        self.stop.store(true, Ordering::Release);
        let handle = self.thread_handle.take()?;
        match handle.join() {
            Ok(pipeline) => Some(pipeline),
            Err(_) => {
                log::error!("[ANALYSIS] Worker thread panicked");
                None
            }
        }
    }
}

impl Drop for AnalysisWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyzerConfig;
    use std::time::Instant;

    fn config() -> AnalyzerConfig {
        AnalyzerConfig {
            fft_size: 1024,
            hop_size: 256,
            poll_interval_ms: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_latest_result_keeps_newest() {
        let mut latest = LatestResult::new();
        assert!(latest.get().is_none());
        latest.publish(AnalysisResult {
            position: 1,
            ..Default::default()
        });
        latest.publish(AnalysisResult {
            position: 2,
            ..Default::default()
        });
        assert_eq!(latest.get().map(|r| r.position), Some(2));
        assert_eq!(latest.take().map(|r| r.position), Some(2));
        assert!(latest.get().is_none());
    }

    #[test]
    fn test_worker_publishes_and_stops() {
        let config = config();
        let ring = Arc::new(SharedRingBuffer::new(config.ring_capacity()));
        let pipeline = SpectrumPipeline::new(config).unwrap();
        let latest = LatestResult::new();

        let worker = AnalysisWorker::spawn(pipeline, Arc::clone(&ring), latest.clone()).unwrap();
        assert!(worker.is_running());

        ring.push_samples(&vec![0.1; 1024]);
        let deadline = Instant::now() + Duration::from_secs(5);
        while latest.get().is_none() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }

        let pipeline = worker.stop().expect("worker should hand back its pipeline");
        assert!(pipeline.cycles() >= 1);
        assert_eq!(latest.get().map(|r| r.position), Some(1024));
    }

    #[test]
    fn test_channel_sink_receives_results() {
        let config = config();
        let ring = Arc::new(SharedRingBuffer::new(config.ring_capacity()));
        let pipeline = SpectrumPipeline::new(config).unwrap();
        let (tx, rx) = crossbeam_channel::bounded(4);

        let worker = AnalysisWorker::spawn(pipeline, Arc::clone(&ring), tx).unwrap();
        ring.push_samples(&vec![0.0; 1024]);
        let result = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("worker should publish a result");
        assert_eq!(result.magnitude_db.len(), 512);
        drop(worker);
    }
}
