use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-wide stop request. Signal handlers only ever set it.
#[derive(Clone, Debug, Default)]
pub struct ShutdownSignal {
    requested: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Route SIGINT/SIGTERM into this signal.
    pub fn install_ctrlc(&self) -> Result<()> {
        let requested = Arc::clone(&self.requested);
        ctrlc::set_handler(move || {
            requested.store(true, Ordering::SeqCst);
        })
        .map_err(|e| anyhow!("failed to set signal handler: {}", e))
    }
}

/// One-shot guard for the teardown sequence.
#[derive(Debug, Default)]
pub struct Teardown {
    done: AtomicBool,
}

impl Teardown {
    pub fn new() -> Self {
        Self::default()
    }

    /// True for exactly one caller, ever.
    pub fn begin(&self) -> bool {
        self.done
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn signal_is_shared_between_clones() {
        let signal = ShutdownSignal::new();
        let handle = signal.clone();
        assert!(!signal.is_requested());
        handle.request();
        handle.request();
        assert!(signal.is_requested());
    }

    #[test]
    fn teardown_runs_once_under_concurrent_callers() {
        let teardown = Arc::new(Teardown::new());
        let winners = Arc::new(AtomicUsize::new(0));
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let teardown = Arc::clone(&teardown);
                let winners = Arc::clone(&winners);
                thread::spawn(move || {
                    if teardown.begin() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert!(teardown.is_done());
        assert!(!teardown.begin());
    }
}
