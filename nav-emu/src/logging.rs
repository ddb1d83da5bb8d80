//! Logger setup
//!
//! `env_logger` writes every record to stderr and, when a log file is
//! configured, to a size-rotated file as well. `RUST_LOG` overrides the
//! configured level.
//!
//! Line format: `2025-05-13 06:40:16 INFO nav_emu::server::listener: ...`

use crate::config::LoggingConfig;
use crate::error::{Error, Result};
use env_logger::{Env, Target};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Set while the terminal is in raw mode; lines then need an explicit `\r`
static RAW_LINE_ENDINGS: AtomicBool = AtomicBool::new(false);

pub fn set_raw_line_endings(enabled: bool) {
    RAW_LINE_ENDINGS.store(enabled, Ordering::Relaxed);
}

/// Install the global logger; fails if one is already installed
pub fn init(config: &LoggingConfig) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or(&config.level));
    builder.format(|buf, record| {
        let eol = if RAW_LINE_ENDINGS.load(Ordering::Relaxed) {
            "\r\n"
        } else {
            "\n"
        };
        write!(
            buf,
            "{} {} {}: {}{}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.target(),
            record.args(),
            eol
        )
    });

    if let Some(ref path) = config.file {
        let rotation = FileRotation {
            max_size: config.max_bytes,
            max_files: config.backups,
        };
        let file = RotatingFileWriter::open(path, rotation)
            .map_err(|e| Error::Logging(format!("{}: {}", path.display(), e)))?;
        builder.target(Target::Pipe(Box::new(Tee {
            console: io::stderr(),
            file,
        })));
    }

    builder
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))?;

    if let Some(ref path) = config.file {
        log::info!("Logging to {}", path.display());
    }
    Ok(())
}

/// Writes each record to the console and the log file
struct Tee {
    console: io::Stderr,
    file: RotatingFileWriter,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // Console output is best effort; the file decides the result
        let _ = self.console.write_all(buf);
        self.file.write_all(buf)?;
        self.file.flush()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = self.console.flush();
        self.file.flush()
    }
}

/// Size limit and backup count for the log file
#[derive(Debug, Clone, Copy)]
pub struct FileRotation {
    /// File size in bytes at which the next write rotates
    pub max_size: u64,
    /// Rotated files kept; 0 truncates in place
    pub max_files: usize,
}

/// Append-only log file with size-based rotation
///
/// Rotation shifts `emu.1.log` to `emu.2.log` and so on, drops the backup
/// past `max_files`, then moves the current file to `emu.1.log`.
pub struct RotatingFileWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    rotation: FileRotation,
    current_size: u64,
}

impl RotatingFileWriter {
    pub fn open(path: impl AsRef<Path>, rotation: FileRotation) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let current_size = file.metadata()?.len();

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            rotation,
            current_size,
        })
    }

    fn maybe_rotate(&mut self) -> io::Result<()> {
        if self.current_size < self.rotation.max_size {
            return Ok(());
        }
        self.writer.flush()?;

        let max_files = self.rotation.max_files;
        let file = if max_files == 0 {
            File::create(&self.path)?
        } else {
            for i in (1..=max_files).rev() {
                let old_path = rotated_path(&self.path, i);
                if !old_path.exists() {
                    continue;
                }
                if i == max_files {
                    fs::remove_file(&old_path)?;
                } else {
                    fs::rename(&old_path, rotated_path(&self.path, i + 1))?;
                }
            }
            fs::rename(&self.path, rotated_path(&self.path, 1))?;
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?
        };

        self.writer = BufWriter::new(file);
        self.current_size = 0;
        Ok(())
    }
}

impl Write for RotatingFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.maybe_rotate()?;
        let n = self.writer.write(buf)?;
        self.current_size += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Backup path: `logs/emu.log` -> `logs/emu.2.log`, `logs/emu` -> `logs/emu.2`
pub fn rotated_path(base: &Path, index: usize) -> PathBuf {
    let stem = base.file_stem().unwrap_or_default().to_string_lossy();
    let name = match base.extension() {
        Some(ext) => format!("{}.{}.{}", stem, index, ext.to_string_lossy()),
        None => format!("{}.{}", stem, index),
    };
    base.with_file_name(name)
}
