//! Lock-free stream status
//!
//! Counters and flags written by the real-time paths (output callback,
//! capture callback, stream error callback) and read by control threads
//! and diagnostics without locks. Writers use relaxed atomics only.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// The active source came up short and silence was substituted
pub const FLAG_UNDERFLOW: u32 = 1 << 0;
/// The capture ring was full and input samples were dropped
pub const FLAG_CAPTURE_OVERFLOW: u32 = 1 << 1;
/// The stream reported a lost device
pub const FLAG_DEVICE_LOST: u32 = 1 << 2;

/// Lock-free status shared between the real-time paths and control threads
#[derive(Debug, Default)]
pub struct StreamStatus {
    /// Times the active source could not cover a callback request
    underflows: AtomicU64,
    /// Times the capture ring dropped incoming samples
    overflows: AtomicU64,
    /// Output callbacks completed
    callbacks: AtomicU64,
    /// Frames emitted to the device
    frames: AtomicU64,
    /// Flags raised by the most recent callback
    last_flags: AtomicU32,
    /// Flags raised at any point since the status was created
    latched_flags: AtomicU32,
}

impl StreamStatus {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn raise(&self, flag: u32) {
        self.last_flags.fetch_or(flag, Ordering::Relaxed);
        self.latched_flags.fetch_or(flag, Ordering::Relaxed);
    }

    /// Clear the per-callback flags; called at the top of each callback
    #[inline]
    pub(crate) fn begin_callback(&self) {
        self.last_flags.store(0, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_underflow(&self) {
        self.underflows.fetch_add(1, Ordering::Relaxed);
        self.raise(FLAG_UNDERFLOW);
    }

    #[inline]
    pub(crate) fn record_capture_overflow(&self) {
        self.overflows.fetch_add(1, Ordering::Relaxed);
        self.raise(FLAG_CAPTURE_OVERFLOW);
    }

    #[inline]
    pub(crate) fn record_callback(&self, frames: u64) {
        self.callbacks.fetch_add(1, Ordering::Relaxed);
        self.frames.fetch_add(frames, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_device_lost(&self) {
        self.raise(FLAG_DEVICE_LOST);
    }

    /// Number of silence substitutions (lock-free)
    #[inline]
    pub fn underflow_count(&self) -> u64 {
        self.underflows.load(Ordering::Relaxed)
    }

    /// Number of capture drops (lock-free)
    #[inline]
    pub fn overflow_count(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }

    /// Number of completed output callbacks (lock-free)
    #[inline]
    pub fn callback_count(&self) -> u64 {
        self.callbacks.load(Ordering::Relaxed)
    }

    /// Total frames emitted to the device (lock-free)
    #[inline]
    pub fn frames_emitted(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Flags raised by the most recent callback (lock-free)
    #[inline]
    pub fn last_flags(&self) -> u32 {
        self.last_flags.load(Ordering::Relaxed)
    }

    /// Whether the stream has reported a lost device (latched)
    #[inline]
    pub fn device_lost(&self) -> bool {
        self.latched_flags.load(Ordering::Relaxed) & FLAG_DEVICE_LOST != 0
    }

    /// Take a consistent-enough snapshot for display
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            underflows: self.underflow_count(),
            overflows: self.overflow_count(),
            callbacks: self.callback_count(),
            frames: self.frames_emitted(),
            last_flags: self.last_flags(),
            latched_flags: self.latched_flags.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the stream status counters
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusSnapshot {
    pub underflows: u64,
    pub overflows: u64,
    pub callbacks: u64,
    pub frames: u64,
    pub last_flags: u32,
    pub latched_flags: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_underflow_accounting() {
        let status = StreamStatus::new();
        status.record_underflow();
        status.record_underflow();
        assert_eq!(status.underflow_count(), 2);
        assert_eq!(status.last_flags() & FLAG_UNDERFLOW, FLAG_UNDERFLOW);
    }

    #[test]
    fn test_last_flags_reset_per_callback() {
        let status = StreamStatus::new();
        status.record_underflow();
        status.begin_callback();
        assert_eq!(status.last_flags(), 0);
        // Latched view still remembers the anomaly
        assert_eq!(status.snapshot().latched_flags & FLAG_UNDERFLOW, FLAG_UNDERFLOW);
    }

    #[test]
    fn test_device_lost_latches() {
        let status = StreamStatus::new();
        assert!(!status.device_lost());
        status.record_device_lost();
        status.begin_callback();
        assert!(status.device_lost());
    }

    #[test]
    fn test_callback_accounting() {
        let status = StreamStatus::new();
        status.record_callback(512);
        status.record_callback(512);
        let snapshot = status.snapshot();
        assert_eq!(snapshot.callbacks, 2);
        assert_eq!(snapshot.frames, 1024);
    }
}
