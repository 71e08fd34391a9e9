//! Training loggers.
//!
//! Every backend receives named scalars at a global step.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Instant;

/// Logger trait for different logging backends.
pub trait MetricsLogger: Send {
    /// Log a batch of named scalars at `step`.
    fn log_metrics(&mut self, step: usize, metrics: &BTreeMap<String, f32>);

    /// Log one scalar.
    fn log_scalar(&mut self, name: &str, value: f32, step: usize) {
        let mut metrics = BTreeMap::new();
        metrics.insert(name.to_string(), value);
        self.log_metrics(step, &metrics);
    }

    /// Flush any buffered output.
    fn flush(&mut self) -> io::Result<()>;
}

/// Logs through the `log` facade, at most once per `log_interval` steps.
pub struct ConsoleLogger {
    log_interval: usize,
    last_log_step: Option<usize>,
    start_time: Instant,
}

impl ConsoleLogger {
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval,
            last_log_step: None,
            start_time: Instant::now(),
        }
    }

    fn due(&self, step: usize) -> bool {
        match self.last_log_step {
            None => true,
            Some(last) => step >= last + self.log_interval,
        }
    }
}

impl MetricsLogger for ConsoleLogger {
    fn log_metrics(&mut self, step: usize, metrics: &BTreeMap<String, f32>) {
        if metrics.is_empty() || !self.due(step) {
            return;
        }

        let elapsed = self.start_time.elapsed().as_secs_f32();
        let sps = if elapsed > 0.0 { step as f32 / elapsed } else { 0.0 };
        let line = metrics
            .iter()
            .map(|(name, value)| format!("{name}={value:.4}"))
            .collect::<Vec<_>>()
            .join(" ");
        log::info!("step={step} sps={sps:.0} {line}");

        self.last_log_step = Some(step);
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// CSV file logger, one `step,name,value,elapsed_secs` row per scalar.
pub struct CSVLogger {
    writer: BufWriter<File>,
    start_time: Instant,
}

impl CSVLogger {
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "step,name,value,elapsed_secs")?;

        Ok(Self {
            writer,
            start_time: Instant::now(),
        })
    }
}

impl MetricsLogger for CSVLogger {
    fn log_metrics(&mut self, step: usize, metrics: &BTreeMap<String, f32>) {
        let elapsed = self.start_time.elapsed().as_secs_f32();
        for (name, value) in metrics {
            if let Err(e) = writeln!(self.writer, "{step},{name},{value},{elapsed:.2}") {
                log::warn!("failed to write metrics row: {e}");
                return;
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl Drop for CSVLogger {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            log::warn!("failed to flush metrics.csv: {e}");
        }
    }
}

/// Multi-logger that writes to multiple backends.
#[derive(Default)]
pub struct MultiLogger {
    loggers: Vec<Box<dyn MetricsLogger>>,
}

impl MultiLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<L: MetricsLogger + 'static>(mut self, logger: L) -> Self {
        self.loggers.push(Box::new(logger));
        self
    }

    pub fn len(&self) -> usize {
        self.loggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loggers.is_empty()
    }
}

impl MetricsLogger for MultiLogger {
    fn log_metrics(&mut self, step: usize, metrics: &BTreeMap<String, f32>) {
        for logger in &mut self.loggers {
            logger.log_metrics(step, metrics);
        }
    }

    /// Flushes every backend and returns the first error.
    fn flush(&mut self) -> io::Result<()> {
        let mut result = Ok(());
        for logger in &mut self.loggers {
            if let Err(e) = logger.flush() {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Records every call, for checking fan-out.
    struct Recording(Arc<Mutex<Vec<(usize, String, f32)>>>);

    impl MetricsLogger for Recording {
        fn log_metrics(&mut self, step: usize, metrics: &BTreeMap<String, f32>) {
            let mut seen = self.0.lock();
            for (k, v) in metrics {
                seen.push((step, k.clone(), *v));
            }
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPipe;

    impl MetricsLogger for BrokenPipe {
        fn log_metrics(&mut self, _step: usize, _metrics: &BTreeMap<String, f32>) {}

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    #[test]
    fn test_multi_logger_reports_flush_error() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut multi = MultiLogger::new()
            .add(BrokenPipe)
            .add(Recording(seen.clone()));
        multi.log_scalar("Loss/policy_loss", 0.5, 3);
        let err = multi.flush().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        // the healthy backend still received the row
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_console_logger_interval() {
        let mut logger = ConsoleLogger::new(10);
        assert!(logger.due(0));
        logger.log_scalar("Loss/value_loss", 1.0, 0);
        assert!(!logger.due(5));
        assert!(logger.due(10));
    }

    #[test]
    fn test_csv_logger_writes_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        {
            let mut logger = CSVLogger::new(&path).unwrap();
            let mut metrics = BTreeMap::new();
            metrics.insert("Rewards/rew_avg".to_string(), 2.5);
            metrics.insert("Game/ep_len_avg".to_string(), 10.0);
            logger.log_metrics(64, &metrics);
        }
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "step,name,value,elapsed_secs");
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("64,Game/ep_len_avg,10,"));
        assert!(lines[2].starts_with("64,Rewards/rew_avg,2.5,"));
    }

    #[test]
    fn test_multi_logger_fans_out() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut multi = MultiLogger::new()
            .add(Recording(seen.clone()))
            .add(Recording(seen.clone()));
        multi.log_scalar("Test/cumulative_reward", 3.0, 7);
        multi.flush().unwrap();
        assert_eq!(multi.len(), 2);
        assert_eq!(seen.lock().len(), 2);
        assert_eq!(seen.lock()[0], (7, "Test/cumulative_reward".to_string(), 3.0));
    }
}
