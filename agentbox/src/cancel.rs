//! Operator-initiated cancellation.
//!
//! The engine polls the token at the top of each turn only, so a cancelled run
//! never stops halfway through a batch of tool calls.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::SIGINT;
use signal_hook::flag;

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Cancel on the first Ctrl-C; exit with status 130 on the second.
    pub fn install_sigint(&self) -> io::Result<()> {
        flag::register_conditional_shutdown(SIGINT, 130, Arc::clone(&self.flag))?;
        flag::register(SIGINT, Arc::clone(&self.flag))?;
        Ok(())
    }
}
