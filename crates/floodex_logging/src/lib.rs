//! Shared logging setup for floodex binaries.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const DEFAULT_LOG_FILTER: &str = "floodex=info,floodex_scout=info";
const KEPT_GENERATIONS: usize = 5;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Logging configuration.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Defaults to [`logs_dir`]
    pub log_dir: Option<PathBuf>,
    /// Console shows debug output for floodex crates
    pub verbose: bool,
    /// File layer writes JSON lines
    pub json: bool,
}

/// Initialize tracing with a rolling file writer and stderr output.
///
/// Returns the directory the log file lives in.
pub fn init_logging(config: LogConfig<'_>) -> Result<PathBuf> {
    let log_dir = match config.log_dir {
        Some(dir) => {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            dir
        }
        None => ensure_logs_dir().context("Failed to ensure log directory")?,
    };
    let log = SizeCappedLog::open(&log_dir, config.app_name, KEPT_GENERATIONS, MAX_LOG_FILE_SIZE)
        .with_context(|| format!("Failed to open log file for {}", config.app_name))?;
    // fmt's MakeWriter impl for Mutex<W> recovers from a poisoned lock
    let file_writer = Mutex::new(log);

    let file_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let console_filter = if config.verbose {
        EnvFilter::new("floodex=debug,floodex_scout=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let file_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_filter(file_filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_filter(file_filter)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(log_dir)
}

/// Floodex home directory: `$FLOODEX_HOME`, else `~/.floodex`.
pub fn floodex_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("FLOODEX_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".floodex")
}

/// Default logs directory: `~/.floodex/logs`
pub fn logs_dir() -> PathBuf {
    floodex_home().join("logs")
}

/// Ensure the default logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

/// Append-only log file that rolls over once it passes `max_bytes`.
///
/// Generation 0 is `<name>.log`; older generations are `<name>.log.<n>`
/// and at most `generations` files exist at any time.
struct SizeCappedLog {
    dir: PathBuf,
    stem: String,
    generations: usize,
    max_bytes: u64,
    written: u64,
    file: File,
}

impl SizeCappedLog {
    fn open(dir: &Path, name: &str, generations: usize, max_bytes: u64) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let stem = file_stem(name);
        let path = generation_path(dir, &stem, 0);
        let (file, written) = append_to(&path)?;
        let mut log = Self {
            dir: dir.to_path_buf(),
            stem,
            generations: generations.max(1),
            max_bytes,
            written,
            file,
        };
        if log.written > log.max_bytes {
            log.roll()?;
        }
        Ok(log)
    }

    fn path(&self, generation: usize) -> PathBuf {
        generation_path(&self.dir, &self.stem, generation)
    }

    fn roll(&mut self) -> io::Result<()> {
        let _ = self.file.flush();
        let last = self.generations - 1;
        if last == 0 {
            remove_if_present(&self.path(0))?;
        } else {
            remove_if_present(&self.path(last))?;
            for generation in (0..last).rev() {
                let from = self.path(generation);
                if from.exists() {
                    fs::rename(&from, self.path(generation + 1))?;
                }
            }
        }
        let (file, written) = append_to(&self.path(0))?;
        self.file = file;
        self.written = written;
        Ok(())
    }
}

impl Write for SizeCappedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let would_overflow = self.written + buf.len() as u64 > self.max_bytes;
        if self.written > 0 && would_overflow {
            self.roll()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn append_to(path: &Path) -> io::Result<(File, u64)> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let len = file.metadata()?.len();
    Ok((file, len))
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

fn generation_path(dir: &Path, stem: &str, generation: usize) -> PathBuf {
    match generation {
        0 => dir.join(format!("{stem}.log")),
        n => dir.join(format!("{stem}.log.{n}")),
    }
}

/// Keeps `[A-Za-z0-9_-]`, everything else becomes `_`.
fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}
