// Atomic parameters - Lock-free communication transport ↔ audio thread
// Floats are stored as their bit patterns in atomic integers

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// Thread-safe f32 parameter (gain)
#[derive(Clone, Debug)]
pub struct AtomicF32 {
    inner: Arc<AtomicU32>,
}

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self {
            inner: Arc::new(AtomicU32::new(value.to_bits())),
        }
    }

    /// Set the value (called from the transport thread)
    pub fn set(&self, value: f32) {
        self.inner.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Get the value (called from the audio thread)
    pub fn get(&self) -> f32 {
        f32::from_bits(self.inner.load(Ordering::Relaxed))
    }
}

impl Default for AtomicF32 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Thread-safe f64 value, used for the renderer's published position
#[derive(Clone, Debug)]
pub struct AtomicF64 {
    inner: Arc<AtomicU64>,
}

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self {
            inner: Arc::new(AtomicU64::new(value.to_bits())),
        }
    }

    pub fn set(&self, value: f64) {
        self.inner.store(value.to_bits(), Ordering::Release);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.inner.load(Ordering::Acquire))
    }
}

impl Default for AtomicF64 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Shared on/off switch (mute)
#[derive(Clone, Debug, Default)]
pub struct AtomicFlag {
    inner: Arc<AtomicBool>,
}

impl AtomicFlag {
    pub fn new(value: bool) -> Self {
        Self {
            inner: Arc::new(AtomicBool::new(value)),
        }
    }

    pub fn set(&self, value: bool) {
        self.inner.store(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> bool {
        self.inner.load(Ordering::Relaxed)
    }
}
