//! Tab-separated description ledger.
//!
//! Format: a header line followed by one row per prepared item:
//! `url\tcaption\tdownloaded_at\tuploaded_at`. The upload column is empty until
//! the item is published. Captions routinely contain newlines and tabs, so
//! fields are escaped (`\\`, `\t`, `\n`, `\r`).

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tokio::fs;
use tracing::{debug, error};

use crate::store::write_atomic;
use crate::{LedgerRow, StoreError, TIMESTAMP_FORMAT};

/// Header line of the ledger file.
pub const LEDGER_HEADER: &str = "url\tcaption\tdownloaded_at\tuploaded_at";

/// Handle to the ledger file.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write an empty ledger (header only) if none exists yet.
    pub async fn initialize(&self) -> Result<(), StoreError> {
        if !fs::try_exists(&self.path).await? {
            write_atomic(&self.path, render(&[]).as_bytes()).await?;
            debug!(path = %self.path.display(), "initialized ledger");
        }
        Ok(())
    }

    /// Read every well-formed row.
    ///
    /// A file with an unexpected header is treated as empty; individual
    /// malformed rows are skipped.
    pub async fn rows(&self) -> Result<Vec<LedgerRow>, StoreError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        match parse(&self.path, &content) {
            Ok(rows) => Ok(rows),
            Err(e) => {
                error!(error = %e, "ledger unreadable, treating as empty");
                Ok(Vec::new())
            }
        }
    }

    /// Append rows and persist.
    #[tracing::instrument(skip(self, rows), fields(count = rows.len()))]
    pub async fn append(&self, rows: &[LedgerRow]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut all = self.rows().await?;
        all.extend_from_slice(rows);
        write_atomic(&self.path, render(&all).as_bytes()).await
    }

    /// Stamp the upload time on the oldest not-yet-uploaded row for
    /// `reference`.
    ///
    /// A reference listed twice has one row per prepared copy, and each
    /// publish stamps exactly one of them. Returns whether a row was stamped.
    #[tracing::instrument(skip(self))]
    pub async fn mark_uploaded(
        &self,
        reference: &str,
        at: NaiveDateTime,
    ) -> Result<bool, StoreError> {
        let mut rows = self.rows().await?;
        let Some(row) = rows
            .iter_mut()
            .find(|r| r.reference == reference && r.uploaded_at.is_none())
        else {
            return Ok(false);
        };

        row.uploaded_at = Some(at);
        write_atomic(&self.path, render(&rows).as_bytes()).await?;
        Ok(true)
    }
}

fn render(rows: &[LedgerRow]) -> String {
    let mut out = String::from(LEDGER_HEADER);
    out.push('\n');
    for row in rows {
        out.push_str(&escape(&row.reference));
        out.push('\t');
        out.push_str(&escape(&row.caption));
        out.push('\t');
        out.push_str(&row.downloaded_at.format(TIMESTAMP_FORMAT).to_string());
        out.push('\t');
        if let Some(at) = row.uploaded_at {
            out.push_str(&at.format(TIMESTAMP_FORMAT).to_string());
        }
        out.push('\n');
    }
    out
}

fn parse(path: &Path, content: &str) -> Result<Vec<LedgerRow>, StoreError> {
    let mut lines = content.lines();
    match lines.next() {
        Some(header) if header == LEDGER_HEADER => {}
        Some(_) => {
            return Err(StoreError::Corrupt {
                path: path.to_path_buf(),
                reason: "unexpected header".to_string(),
            });
        }
        None => return Ok(Vec::new()),
    }

    let mut rows = Vec::new();
    for (index, line) in lines.enumerate() {
        if line.is_empty() {
            continue;
        }
        match parse_row(line) {
            Some(row) => rows.push(row),
            // +2: one for the header, one for 1-based numbering
            None => error!(path = %path.display(), line = index + 2, "skipping malformed ledger row"),
        }
    }
    Ok(rows)
}

fn parse_row(line: &str) -> Option<LedgerRow> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != 4 {
        return None;
    }

    let downloaded_at = NaiveDateTime::parse_from_str(fields[2], TIMESTAMP_FORMAT).ok()?;
    let uploaded_at = if fields[3].is_empty() {
        None
    } else {
        Some(NaiveDateTime::parse_from_str(fields[3], TIMESTAMP_FORMAT).ok()?)
    };

    Some(LedgerRow {
        reference: unescape(fields[0]),
        caption: unescape(fields[1]),
        downloaded_at,
        uploaded_at,
    })
}

fn escape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for c in field.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
