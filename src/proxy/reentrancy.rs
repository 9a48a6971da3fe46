//! Compute reentrancy tracking.
//!
//! A process-wide counter records how many node computes are in flight
//! (several are normal: the host computes different nodes on worker
//! threads). A per-node flag catches a node being computed again while
//! its own compute is still running, which the host never should do.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

static IN_COMPUTE: AtomicI32 = AtomicI32::new(0);

/// Number of proxy computes currently running in the process.
pub fn in_compute() -> i32 {
    IN_COMPUTE.load(Ordering::SeqCst)
}

/// Held for the duration of one node compute.
pub(crate) struct ComputeGuard<'a> {
    node_flag: &'a AtomicBool,
}

impl<'a> ComputeGuard<'a> {
    /// Enter a compute. Returns `None` if `node_flag` is already set.
    pub(crate) fn enter(node_flag: &'a AtomicBool) -> Option<Self> {
        if node_flag.swap(true, Ordering::AcqRel) {
            return None;
        }
        let depth = IN_COMPUTE.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::trace!(depth, "enter compute");
        Some(Self { node_flag })
    }
}

impl Drop for ComputeGuard<'_> {
    fn drop(&mut self) {
        IN_COMPUTE.fetch_sub(1, Ordering::SeqCst);
        self.node_flag.store(false, Ordering::Release);
    }
}

/// Scoped set of a boolean flag; `None` if it was already set.
pub(crate) struct FlagGuard<'a>(&'a AtomicBool);

impl<'a> FlagGuard<'a> {
    pub(crate) fn set(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reentry_is_refused() {
        let flag = AtomicBool::new(false);
        let outer = ComputeGuard::enter(&flag);
        assert!(outer.is_some());
        assert!(ComputeGuard::enter(&flag).is_none());
        drop(outer);
        assert!(ComputeGuard::enter(&flag).is_some());
    }

    #[test]
    fn test_flag_guard_resets() {
        let flag = AtomicBool::new(false);
        {
            let _g = FlagGuard::set(&flag).unwrap();
            assert!(FlagGuard::set(&flag).is_none());
        }
        assert!(!flag.load(Ordering::SeqCst));
    }
}
