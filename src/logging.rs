// FieldPose 🚀 AGPL-3.0 License

//! Lightweight logging for the decoding library.
//!
//! A global verbosity flag controls debug output from the decoder; warnings
//! always go to stderr.

use std::sync::atomic::{AtomicBool, Ordering};

/// Global verbosity flag.
static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Set the global verbosity flag.
pub fn set_verbose(verbose: bool) {
    VERBOSE.store(verbose, Ordering::Relaxed);
}

/// Check if verbose output is enabled.
pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

/// Macro for verbose debug messages.
#[macro_export]
macro_rules! verbose {
    ($($arg:tt)*) => {
        if $crate::logging::is_verbose() {
            println!("{}", format!($($arg)*));
        }
    }
}

/// Macro for warning messages.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        eprintln!("{} {}", $crate::logging::warning_tag(), format!($($arg)*));
    }
}

/// The colored `WARNING` prefix used by the [`warn!`](crate::warn) macro.
/// Public so the macro expands in dependent crates without them importing
/// the color crate themselves.
#[doc(hidden)]
#[must_use]
pub fn warning_tag() -> colored::ColoredString {
    use colored::Colorize;
    "WARNING ⚠️".yellow().bold()
}
