use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Rotating list of IPs for one upstream host.
///
/// `next` advances the cursor with a single compare-and-swap; losing the
/// race against a concurrent caller skips one rotation, which is harmless.
#[derive(Debug)]
pub struct IpSet {
    values: Vec<IpAddr>,
    index: AtomicUsize,
}

impl IpSet {
    /// `values` must be non-empty.
    pub fn new(values: Vec<IpAddr>) -> Self {
        debug_assert!(!values.is_empty());
        Self {
            values,
            index: AtomicUsize::new(0),
        }
    }

    pub fn current(&self) -> IpAddr {
        self.values[self.index.load(Ordering::Acquire)]
    }

    pub fn next(&self) {
        let old = self.index.load(Ordering::Acquire);
        let new = (old + 1) % self.values.len();

        let _ = self
            .index
            .compare_exchange(old, new, Ordering::AcqRel, Ordering::Relaxed);
    }

    /// Uniformly random member; used when dialing fresh connections.
    pub fn random(&self) -> IpAddr {
        self.values[fastrand::usize(..self.values.len())]
    }

    pub fn values(&self) -> &[IpAddr] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
