//! Phase-tagged logging for integration tests.
//!
//! ```rust,ignore
//! let log = TestLogger::new("routes_locally");
//! log.phase("setup");
//! log.info("engine has 2 models");
//! log.finish_ok();
//! ```
//!
//! `TEST_LOG_LEVEL` (trace, debug, info, warn, error) controls what is
//! printed; the default is `warn`, so passing tests stay quiet.

#![allow(dead_code)]

use std::cell::RefCell;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn from_env() -> Self {
        match std::env::var("TEST_LOG_LEVEL")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "trace" => Self::Trace,
            "debug" => Self::Debug,
            "info" => Self::Info,
            "error" => Self::Error,
            _ => Self::Warn,
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

/// Per-test logger that tracks the current phase and elapsed time.
pub struct TestLogger {
    name: String,
    start: Instant,
    threshold: LogLevel,
    phase: RefCell<String>,
}

impl TestLogger {
    pub fn new(name: &str) -> Self {
        let log = Self {
            name: name.to_string(),
            start: Instant::now(),
            threshold: LogLevel::from_env(),
            phase: RefCell::new("init".to_string()),
        };
        log.log(LogLevel::Debug, "start");
        log
    }

    pub fn phase(&self, phase: &str) {
        *self.phase.borrow_mut() = phase.to_string();
        self.log(LogLevel::Debug, &format!("phase {phase}"));
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn finish_ok(&self) {
        self.log(LogLevel::Info, "ok");
    }

    pub fn finish_err(&self, reason: &str) {
        self.log(LogLevel::Error, &format!("failed: {reason}"));
    }

    fn log(&self, level: LogLevel, message: &str) {
        if level < self.threshold {
            return;
        }
        eprintln!(
            "[{:>5}] {} [{}] +{}ms {message}",
            level.label(),
            self.name,
            self.phase.borrow(),
            self.start.elapsed().as_millis()
        );
    }
}
