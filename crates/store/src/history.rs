use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

use repomirror_types::{MirrorError, Result};

/// UTC wall-clock time at second precision.
pub type Timestamp = PrimitiveDateTime;

const FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

pub fn now_utc() -> Timestamp {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

/// `YYYY-MM-DDTHH:MM:SS`
pub fn format_timestamp(ts: Timestamp) -> Result<String> {
    ts.format(FORMAT)
        .map_err(|e| MirrorError::History(format!("cannot format {ts}: {e}")))
}

/// The single-line file recording when the last run started.
#[derive(Debug, Clone)]
pub struct RunHistory {
    path: PathBuf,
}

impl RunHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when no run has been recorded yet.
    pub fn last_run(&self) -> Result<Option<Timestamp>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        PrimitiveDateTime::parse(trimmed, FORMAT)
            .map(Some)
            .map_err(|e| {
                MirrorError::History(format!(
                    "{}: cannot parse '{trimmed}': {e}",
                    self.path.display()
                ))
            })
    }

    /// Replace the recorded timestamp. Written to a sibling temp file first so
    /// an interrupted write never leaves a truncated file behind.
    pub fn record(&self, started: Timestamp) -> Result<()> {
        let text = format_timestamp(started)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
