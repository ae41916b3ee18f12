use std::sync::atomic::{AtomicBool, Ordering};

/// Progress-and-interrupt seam between the engine and its caller.
///
/// Workers poll `is_interruption_requested` at `is_refresh_necessary`
/// checkpoints; the master displays labels and percentages. All methods have
/// no-op defaults so tests can implement only what they observe.
pub trait ProgressSink: Sync {
    fn begin_task(&self, _label: &str) {}
    fn end_task(&self) {}
    fn display_main_label(&self, _label: &str) {}
    fn display_label(&self, _label: &str) {}
    fn display_progression(&self, _percent: u64) {}

    fn is_interruption_requested(&self) -> bool {
        false
    }

    /// Rate limiter for progress polling inside record loops.
    fn is_refresh_necessary(&self, counter: u64) -> bool {
        counter & 0x3FFF == 0
    }
}

/// Sink that reports nothing and never interrupts.
pub struct SilentProgress;

impl ProgressSink for SilentProgress {}

/// Stderr sink for the command-line tools. Interruption is a sticky flag the
/// caller raises (e.g. from a signal handler).
pub struct ConsoleProgress {
    program: String,
    verbose: bool,
    interrupted: AtomicBool,
}

impl ConsoleProgress {
    pub fn new(program: &str, verbose: bool) -> Self {
        ConsoleProgress {
            program: program.to_string(),
            verbose,
            interrupted: AtomicBool::new(false),
        }
    }

    pub fn request_interruption(&self) {
        self.interrupted.store(true, Ordering::Relaxed);
    }
}

impl ProgressSink for ConsoleProgress {
    fn begin_task(&self, label: &str) {
        if self.verbose {
            eprintln!("{}: {}", self.program, label);
        }
    }

    fn display_main_label(&self, label: &str) {
        if self.verbose {
            eprintln!("{}: {}", self.program, label);
        }
    }

    fn display_label(&self, label: &str) {
        if self.verbose {
            eprintln!("{}:   {}", self.program, label);
        }
    }

    fn is_interruption_requested(&self) -> bool {
        self.interrupted.load(Ordering::Relaxed)
    }
}
