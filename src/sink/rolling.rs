//! A size-based rolling file sink.

use super::RotationPolicy;
use crate::core::RollingSink;
use crate::error::SinkError;
use chrono::{Local, NaiveDate};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Appends to `<stem>.log` and rolls it over to `<stem>.<YYYY-MM-DD>.<i>.log`
/// once the next write would push it past `max_file_size`.
///
/// After each rollover, rotated siblings older than `max_history_days` are
/// removed, then the oldest remaining ones until their combined size fits
/// within `total_size_cap`.
#[derive(Debug)]
pub struct RollingFileSink {
    directory: PathBuf,
    stem: String,
    policy: RotationPolicy,
    file: Option<File>,
    current_size: u64,
}

impl RollingFileSink {
    pub fn open(directory: &Path, stem: &str, policy: RotationPolicy) -> Result<Self, SinkError> {
        let active = directory.join(format!("{stem}.log"));
        let file = open_append(&active).map_err(|source| SinkError::OpenFile {
            path: active.clone(),
            source,
        })?;
        let current_size = file
            .metadata()
            .map_err(|source| SinkError::OpenFile {
                path: active.clone(),
                source,
            })?
            .len();

        Ok(Self {
            directory: directory.to_path_buf(),
            stem: stem.to_string(),
            policy,
            file: Some(file),
            current_size,
        })
    }

    /// Path of the file currently being written.
    pub fn active_path(&self) -> PathBuf {
        self.directory.join(format!("{}.log", self.stem))
    }

    fn roll_over(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }

        let today = Local::now().date_naive();
        let rotated = self.next_rotated_path(today);
        fs::rename(self.active_path(), &rotated)?;
        debug!(from = %self.active_path().display(), to = %rotated.display(), "Rolled over log file");

        self.file = Some(open_append(&self.active_path())?);
        self.current_size = 0;

        if let Err(e) = self.prune(today) {
            warn!(directory = %self.directory.display(), error = %e, "Failed to prune rotated log files");
        }
        Ok(())
    }

    fn next_rotated_path(&self, date: NaiveDate) -> PathBuf {
        let mut index = 0u32;
        loop {
            let candidate = self
                .directory
                .join(format!("{}.{}.{}.log", self.stem, date.format("%Y-%m-%d"), index));
            if !candidate.exists() {
                return candidate;
            }
            index += 1;
        }
    }

    /// Rotated files of this sink, oldest first, with their sizes.
    fn rotated_files(&self) -> io::Result<Vec<(NaiveDate, u32, PathBuf, u64)>> {
        let prefix = format!("{}.", self.stem);
        let mut rotated = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(rest) = name.strip_prefix(&prefix).and_then(|r| r.strip_suffix(".log")) else {
                continue;
            };
            let Some((date, index)) = rest.rsplit_once('.') else { continue };
            let (Ok(date), Ok(index)) = (NaiveDate::parse_from_str(date, "%Y-%m-%d"), index.parse::<u32>()) else {
                continue;
            };
            rotated.push((date, index, entry.path(), entry.metadata()?.len()));
        }
        rotated.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        Ok(rotated)
    }

    fn prune(&self, today: NaiveDate) -> io::Result<()> {
        let mut rotated = self.rotated_files()?;

        let oldest_kept = today - chrono::Duration::days(i64::from(self.policy.max_history_days));
        rotated.retain(|(date, _, path, _)| {
            if *date < oldest_kept {
                remove_rotated(path);
                false
            } else {
                true
            }
        });

        let mut total: u64 = rotated.iter().map(|(_, _, _, len)| *len).sum();
        for (_, _, path, len) in &rotated {
            if total <= self.policy.total_size_cap {
                break;
            }
            remove_rotated(path);
            total = total.saturating_sub(*len);
        }
        Ok(())
    }
}

impl RollingSink for RollingFileSink {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.file.is_none() {
            return Err(io::Error::other("sink is closed"));
        }
        let len = bytes.len() as u64;
        if self.current_size > 0 && self.current_size + len > self.policy.max_file_size {
            self.roll_over()?;
        }
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::other("sink is closed"))?;
        file.write_all(bytes)?;
        self.current_size += len;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            file.sync_all()?;
        }
        Ok(())
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn remove_rotated(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed rotated log file"),
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove rotated log file"),
    }
}
