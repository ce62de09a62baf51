//! Background synthesis worker
//!
//! Runs the voice on its own thread, pushing generated blocks into the
//! block queue ahead of playback need. The worker has no deadline: it may
//! block on inference and on queue backpressure. The cancel flag is
//! checked every loop iteration and inside the backpressure wait, so
//! `stop` completes in bounded time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::{Controls, Voice, CONTROL_FRAMES};
use crate::engine::ring::BlockProducer;

/// Backoff after a failed generate call
///
/// Keeps a persistently failing backend from spinning a core while still
/// retrying every cycle.
const RETRY_BACKOFF: Duration = Duration::from_millis(5);

/// Handle to the running synthesis worker
pub struct ModelWorker {
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ModelWorker {
    /// Spawn the worker thread
    ///
    /// The voice must already be preloaded; the worker starts generating
    /// immediately.
    pub fn spawn(voice: Box<dyn Voice>, producer: BlockProducer, controls: Arc<Controls>) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));
        let worker_cancel = Arc::clone(&cancel);

        let handle = thread::Builder::new()
            .name("model-worker".to_string())
            .spawn(move || run(voice, producer, controls, worker_cancel))
            .expect("Failed to spawn model worker thread");

        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// Signal the worker to exit and wait for it
    ///
    /// Returns promptly even while the worker is blocked on queue
    /// backpressure.
    pub fn stop(mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ModelWorker {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run(
    mut voice: Box<dyn Voice>,
    mut producer: BlockProducer,
    controls: Arc<Controls>,
    cancel: Arc<AtomicBool>,
) {
    log::info!(
        "Model worker started (block {} frames, queue {} blocks)",
        voice.block_len(),
        producer.capacity_blocks()
    );

    let mut pitch = [0.0f32; CONTROL_FRAMES];
    let mut loudness = [0.0f32; CONTROL_FRAMES];

    while !cancel.load(Ordering::Relaxed) {
        pitch.fill(controls.pitch());
        loudness.fill(controls.loudness());

        match voice.generate(&pitch, &loudness) {
            Ok(block) => {
                if !producer.push_blocking(block.as_slice(), &cancel) {
                    // Cancelled while waiting for queue space
                    break;
                }
            }
            Err(e) => {
                log::warn!("Model inference failed, skipping block: {}", e);
                thread::sleep(RETRY_BACKOFF);
            }
        }
    }

    log::info!("Model worker stopped");
}
