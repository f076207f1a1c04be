use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared stop flag checked by the sweep between files.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes Ctrl-C / SIGTERM into the flag. A handler that is already
    /// installed is left alone and the flag simply never trips.
    pub fn install_ctrlc() -> Self {
        let interrupt = Self::new();
        let flag = interrupt.flag.clone();
        if let Err(err) = ctrlc::set_handler(move || {
            eprintln!("interrupt received; finishing current file then stopping");
            flag.store(true, Ordering::SeqCst);
        }) {
            eprintln!("interrupt handler unavailable: {err}");
        }
        interrupt
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
