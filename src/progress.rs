use std::io::{self, Write};
use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

/// Stderr logger printing `[mm:ss] LEVEL message`, elapsed since start.
pub struct ConsoleLogger {
    level: LevelFilter,
    t0: Instant,
}

impl ConsoleLogger {
    pub fn new(level: LevelFilter) -> Self {
        Self {
            level,
            t0: Instant::now(),
        }
    }

    /// Installs the logger process-wide. Only the binary calls this.
    pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(Self::new(level)))?;
        log::set_max_level(level);
        Ok(())
    }

    fn format_line(&self, level: Level, msg: &std::fmt::Arguments<'_>) -> String {
        let ts = fmt_elapsed(self.t0.elapsed().as_secs_f64());
        format!("[{ts}] {level:<5} {msg}")
    }
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = self.format_line(record.level(), record.args());
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "{line}");
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

/// `-v` count or `--log-level` name to a filter. Names win over the count.
pub fn level_from_args(name: Option<&str>, verbose: u8) -> LevelFilter {
    if let Some(n) = name {
        match n.trim().to_ascii_lowercase().as_str() {
            "off" => return LevelFilter::Off,
            "error" => return LevelFilter::Error,
            "warn" | "warning" => return LevelFilter::Warn,
            "info" => return LevelFilter::Info,
            "debug" => return LevelFilter::Debug,
            "trace" => return LevelFilter::Trace,
            _ => {}
        }
    }
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn fmt_elapsed(seconds: f64) -> String {
    let seconds = seconds.max(0.0) as u64;
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    if h > 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}
