//! Termination triggers and the close-once latch shared between them.
//!
//! Three things can end a session: an explicit close from the caller, the
//! host destroying the window, and a console control signal. Whichever fires
//! first wins the latch; the rest become no-ops.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationTrigger {
    Explicit,
    WindowDestroyed,
    ConsoleSignal,
}

impl TerminationTrigger {
    fn as_u8(self) -> u8 {
        match self {
            Self::Explicit => 1,
            Self::WindowDestroyed => 2,
            Self::ConsoleSignal => 3,
        }
    }

    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Explicit),
            2 => Some(Self::WindowDestroyed),
            3 => Some(Self::ConsoleSignal),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct TerminationSignal {
    trigger: AtomicU8,
    closing: AtomicBool,
    closed: Mutex<bool>,
    closed_cv: Condvar,
}

impl TerminationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a termination request. Only the first trigger is kept.
    pub fn request(&self, trigger: TerminationTrigger) {
        if self
            .trigger
            .compare_exchange(0, trigger.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tracing::info!(?trigger, "termination requested");
        }
    }

    pub fn requested(&self) -> Option<TerminationTrigger> {
        TerminationTrigger::from_u8(self.trigger.load(Ordering::Acquire))
    }

    /// Returns true exactly once, for the caller that gets to run teardown.
    pub fn begin_close(&self) -> bool {
        !self.closing.swap(true, Ordering::AcqRel)
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    pub fn mark_closed(&self) {
        if let Ok(mut closed) = self.closed.lock() {
            *closed = true;
        }
        self.closed_cv.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.lock().map(|closed| *closed).unwrap_or(false)
    }

    /// Blocks until teardown finished or `timeout` elapsed. Returns whether
    /// teardown finished.
    pub fn wait_closed(&self, timeout: Duration) -> bool {
        let Ok(guard) = self.closed.lock() else {
            return false;
        };
        match self
            .closed_cv
            .wait_timeout_while(guard, timeout, |closed| !*closed)
        {
            Ok((closed, _)) => *closed,
            Err(_) => false,
        }
    }
}

#[cfg(windows)]
pub use platform::install_console_handler;

/// Console control signals do not exist off Windows; the explicit and
/// window triggers still apply.
#[cfg(not(windows))]
pub fn install_console_handler(_signal: std::sync::Arc<TerminationSignal>) -> anyhow::Result<()> {
    Ok(())
}

#[cfg(windows)]
mod platform {
    use super::{TerminationSignal, TerminationTrigger};
    use anyhow::{Context, Result};
    use once_cell::sync::Lazy;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use windows::Win32::Foundation::BOOL;
    use windows::Win32::System::Console::{
        SetConsoleCtrlHandler, CTRL_BREAK_EVENT, CTRL_CLOSE_EVENT, CTRL_C_EVENT,
    };

    static CONSOLE_SIGNAL: Lazy<Mutex<Option<Arc<TerminationSignal>>>> =
        Lazy::new(|| Mutex::new(None));

    const CLOSE_WAIT: Duration = Duration::from_secs(2);

    /// Routes Ctrl+C, Ctrl+Break and console close to `signal`. The handler
    /// waits for the render thread to finish closing before it returns,
    /// since the process may be torn down right after.
    pub fn install_console_handler(signal: Arc<TerminationSignal>) -> Result<()> {
        let first = match CONSOLE_SIGNAL.lock() {
            Ok(mut guard) => guard.replace(signal).is_none(),
            Err(_) => false,
        };
        if first {
            unsafe { SetConsoleCtrlHandler(Some(console_ctrl_handler), true) }
                .context("install console control handler")?;
        }
        Ok(())
    }

    unsafe extern "system" fn console_ctrl_handler(event: u32) -> BOOL {
        if event != CTRL_C_EVENT && event != CTRL_BREAK_EVENT && event != CTRL_CLOSE_EVENT {
            return BOOL(0);
        }

        let signal = CONSOLE_SIGNAL
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(Arc::clone));
        let Some(signal) = signal else {
            return BOOL(0);
        };

        signal.request(TerminationTrigger::ConsoleSignal);
        if !signal.wait_closed(CLOSE_WAIT) {
            tracing::warn!("render thread did not close the session in time");
        }
        BOOL(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn first_trigger_wins() {
        let signal = TerminationSignal::new();
        assert_eq!(signal.requested(), None);
        signal.request(TerminationTrigger::WindowDestroyed);
        signal.request(TerminationTrigger::ConsoleSignal);
        assert_eq!(signal.requested(), Some(TerminationTrigger::WindowDestroyed));
    }

    #[test]
    fn latch_opens_once() {
        let signal = TerminationSignal::new();
        assert!(signal.begin_close());
        assert!(!signal.begin_close());
        assert!(signal.is_closing());
    }

    #[test]
    fn waiter_is_released_by_mark_closed() {
        let signal = Arc::new(TerminationSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            std::thread::spawn(move || signal.wait_closed(Duration::from_secs(5)))
        };
        signal.mark_closed();
        assert!(waiter.join().expect("waiter thread"));
        assert!(signal.is_closed());
    }

    #[test]
    fn wait_times_out_when_nobody_closes() {
        let signal = TerminationSignal::new();
        assert!(!signal.wait_closed(Duration::from_millis(10)));
    }
}
