//! Local terminal capture
//!
//! The terminal is process-wide state. [`Terminal::capture`] switches it to raw
//! mode and hands back a [`RawModeGuard`]; the previous mode comes back exactly
//! once, either through [`RawModeGuard::restore`] or when the guard is dropped
//! (including during a panic unwind). While a guard is alive, further captures
//! are rejected.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crossterm::cursor::MoveTo;
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, Clear, ClearType};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Terminal mode operations
pub trait TerminalMode: Send + Sync {
    /// Save the current mode and switch to raw mode
    fn enable_raw(&self) -> io::Result<()>;

    /// Return to the saved mode
    fn restore(&self) -> io::Result<()>;

    /// Clear the screen and home the cursor
    fn clear_screen(&self) -> io::Result<()>;
}

/// The controlling terminal, driven through crossterm
#[derive(Debug, Default)]
pub struct CrosstermTerminal;

impl TerminalMode for CrosstermTerminal {
    fn enable_raw(&self) -> io::Result<()> {
        enable_raw_mode()
    }

    fn restore(&self) -> io::Result<()> {
        disable_raw_mode()
    }

    fn clear_screen(&self) -> io::Result<()> {
        let mut stdout = io::stdout();
        execute!(stdout, Clear(ClearType::All), MoveTo(0, 0))?;
        stdout.flush()
    }
}

/// A terminal that can be captured by one session at a time
pub struct Terminal {
    mode: Box<dyn TerminalMode>,
    held: AtomicBool,
}

impl Terminal {
    /// Wrap a terminal implementation
    pub fn new(mode: impl TerminalMode + 'static) -> Arc<Self> {
        Arc::new(Self {
            mode: Box::new(mode),
            held: AtomicBool::new(false),
        })
    }

    /// The process's controlling terminal
    pub fn process() -> Arc<Self> {
        static PROCESS: OnceLock<Arc<Terminal>> = OnceLock::new();
        PROCESS
            .get_or_init(|| Terminal::new(CrosstermTerminal))
            .clone()
    }

    /// Whether a guard currently holds the terminal
    #[must_use]
    pub fn is_captured(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }

    /// Switch to raw mode, or fail with [`Error::TerminalBusy`] if already captured
    pub fn capture(self: &Arc<Self>) -> Result<RawModeGuard> {
        if self
            .held
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::TerminalBusy);
        }

        if let Err(e) = self.mode.enable_raw() {
            self.held.store(false, Ordering::SeqCst);
            return Err(Error::Terminal(e));
        }
        debug!("Terminal switched to raw mode");

        Ok(RawModeGuard {
            terminal: Arc::clone(self),
            restored: false,
        })
    }
}

impl std::fmt::Debug for Terminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Terminal")
            .field("held", &self.is_captured())
            .finish_non_exhaustive()
    }
}

/// Raw mode held for one console session
#[derive(Debug)]
pub struct RawModeGuard {
    terminal: Arc<Terminal>,
    restored: bool,
}

impl RawModeGuard {
    /// Clear the screen. Failures are logged.
    pub fn clear_screen(&self) {
        if let Err(e) = self.terminal.mode.clear_screen() {
            warn!(error = %e, "Failed to clear screen");
        }
    }

    /// Restore the previous terminal mode now
    pub fn restore(mut self) {
        self.restore_once();
    }

    fn restore_once(&mut self) {
        if self.restored {
            return;
        }
        self.restored = true;

        match self.terminal.mode.restore() {
            Ok(()) => debug!("Terminal mode restored"),
            Err(e) => warn!(error = %e, "Failed to restore terminal mode"),
        }
        self.terminal.held.store(false, Ordering::SeqCst);
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        self.restore_once();
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Records mode changes instead of touching a tty
    #[derive(Debug, Default)]
    pub struct FakeTerminal {
        pub raw: AtomicUsize,
        pub restored: AtomicUsize,
        pub cleared: AtomicUsize,
        pub fail_enable: bool,
        pub fail_restore: bool,
    }

    impl TerminalMode for Arc<FakeTerminal> {
        fn enable_raw(&self) -> io::Result<()> {
            if self.fail_enable {
                return Err(io::Error::other("not a tty"));
            }
            self.raw.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn restore(&self) -> io::Result<()> {
            self.restored.fetch_add(1, Ordering::SeqCst);
            if self.fail_restore {
                return Err(io::Error::other("tcsetattr failed"));
            }
            Ok(())
        }

        fn clear_screen(&self) -> io::Result<()> {
            self.cleared.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// A capturable terminal plus a handle to its recordings
    pub fn terminal(fake: FakeTerminal) -> (Arc<Terminal>, Arc<FakeTerminal>) {
        let fake = Arc::new(fake);
        (Terminal::new(fake.clone()), fake)
    }
}

#[cfg(test)]
mod tests {
    use super::fake::{terminal, FakeTerminal};
    use super::*;

    #[test]
    fn test_restore_exactly_once() {
        let (term, fake) = terminal(FakeTerminal::default());

        let guard = term.capture().unwrap();
        assert!(term.is_captured());
        guard.clear_screen();
        guard.restore();

        assert_eq!(fake.raw.load(Ordering::SeqCst), 1);
        assert_eq!(fake.cleared.load(Ordering::SeqCst), 1);
        assert_eq!(fake.restored.load(Ordering::SeqCst), 1);
        assert!(!term.is_captured());
    }

    #[test]
    fn test_second_capture_is_rejected() {
        let (term, fake) = terminal(FakeTerminal::default());

        let guard = term.capture().unwrap();
        assert!(matches!(term.capture(), Err(Error::TerminalBusy)));
        assert_eq!(fake.raw.load(Ordering::SeqCst), 1);

        drop(guard);
        let again = term.capture().unwrap();
        drop(again);
        assert_eq!(fake.restored.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_restore_on_panic() {
        let (term, fake) = terminal(FakeTerminal::default());

        let held = term.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = held.capture().unwrap();
            panic!("relay blew up");
        }));

        assert!(result.is_err());
        assert_eq!(fake.restored.load(Ordering::SeqCst), 1);
        assert!(!term.is_captured());
    }

    #[test]
    fn test_restore_failure_still_releases() {
        let (term, fake) = terminal(FakeTerminal {
            fail_restore: true,
            ..FakeTerminal::default()
        });

        term.capture().unwrap().restore();

        assert_eq!(fake.restored.load(Ordering::SeqCst), 1);
        assert!(!term.is_captured());
        assert!(term.capture().is_ok());
    }

    #[test]
    fn test_enable_failure_leaves_terminal_free() {
        let (term, fake) = terminal(FakeTerminal {
            fail_enable: true,
            ..FakeTerminal::default()
        });

        assert!(matches!(term.capture(), Err(Error::Terminal(_))));
        assert!(!term.is_captured());
        assert_eq!(fake.restored.load(Ordering::SeqCst), 0);
    }
}
