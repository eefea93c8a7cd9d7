//! Before/after configuration reports.
//!
//! Every configured device produces one HTML page comparing its running
//! configuration before and after the licensing template was applied.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use similar::{Algorithm, DiffTag, capture_diff_slices_deadline};
use tracing::info;

use crate::error::AuditError;

/// Time allowed for the exact diff before falling back to a coarser one.
pub const DIFF_DEADLINE: Duration = Duration::from_secs(2);

static TEMP_SUFFIX: AtomicU64 = AtomicU64::new(0);

/// One line of a line-oriented diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffLine {
    /// Present on both sides.
    Same(String),
    /// Only in the previous configuration.
    Removed(String),
    /// Only in the new configuration.
    Added(String),
}

/// Line diff between two command outputs.
///
/// Uses Myers' algorithm, which needs memory linear in the input. Past
/// [`DIFF_DEADLINE`] the remaining region is reported as a block replacement
/// instead of the minimal edit.
pub fn diff_lines(before: &[String], after: &[String]) -> Vec<DiffLine> {
    let deadline = Instant::now().checked_add(DIFF_DEADLINE);
    let ops = capture_diff_slices_deadline(Algorithm::Myers, before, after, deadline);

    let mut diff = Vec::with_capacity(before.len().max(after.len()));
    for op in ops {
        let (tag, old, new) = op.as_tag_tuple();
        match tag {
            DiffTag::Equal => {
                diff.extend(before[old].iter().cloned().map(DiffLine::Same));
            }
            DiffTag::Delete => {
                diff.extend(before[old].iter().cloned().map(DiffLine::Removed));
            }
            DiffTag::Insert => {
                diff.extend(after[new].iter().cloned().map(DiffLine::Added));
            }
            DiffTag::Replace => {
                diff.extend(before[old].iter().cloned().map(DiffLine::Removed));
                diff.extend(after[new].iter().cloned().map(DiffLine::Added));
            }
        }
    }
    diff
}

/// Escapes text for inclusion in HTML element content or attributes.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Rendered configuration change report for one device.
#[derive(Debug, Clone)]
pub struct AuditReport {
    /// Hostname, or the address when the hostname is unknown.
    pub hostname: String,
    /// Address the device was reached at.
    pub address: String,
    /// When the report was built.
    pub generated_at: DateTime<Utc>,
    /// Diff of the running configuration, in device order.
    pub lines: Vec<DiffLine>,
}

impl AuditReport {
    /// Diffs `before` against `after` for one device.
    ///
    /// CPU bound for large configurations; async callers should run it
    /// through [`tokio::task::spawn_blocking`].
    pub fn new(
        hostname: impl Into<String>,
        address: impl Into<String>,
        before: &[String],
        after: &[String],
    ) -> Self {
        Self {
            hostname: hostname.into(),
            address: address.into(),
            generated_at: Utc::now(),
            lines: diff_lines(before, after),
        }
    }

    /// Number of lines only present after the change.
    pub fn added(&self) -> usize {
        self.lines
            .iter()
            .filter(|line| matches!(line, DiffLine::Added(_)))
            .count()
    }

    /// Number of lines only present before the change.
    pub fn removed(&self) -> usize {
        self.lines
            .iter()
            .filter(|line| matches!(line, DiffLine::Removed(_)))
            .count()
    }

    /// Side-by-side HTML table, previous configuration on the left.
    pub fn to_html(&self) -> String {
        let mut rows = String::new();
        let (mut left_no, mut right_no) = (0usize, 0usize);
        for line in &self.lines {
            let row = match line {
                DiffLine::Same(text) => {
                    left_no += 1;
                    right_no += 1;
                    let text = escape_html(text);
                    format!(
                        "<tr><td class=\"no\">{left_no}</td><td>{text}</td>\
                         <td class=\"no\">{right_no}</td><td>{text}</td></tr>\n"
                    )
                }
                DiffLine::Removed(text) => {
                    left_no += 1;
                    format!(
                        "<tr><td class=\"no\">{left_no}</td><td class=\"sub\">{}</td>\
                         <td class=\"no\"></td><td></td></tr>\n",
                        escape_html(text)
                    )
                }
                DiffLine::Added(text) => {
                    right_no += 1;
                    format!(
                        "<tr><td class=\"no\"></td><td></td>\
                         <td class=\"no\">{right_no}</td><td class=\"add\">{}</td></tr>\n",
                        escape_html(text)
                    )
                }
            };
            rows.push_str(&row);
        }

        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
             <title>{host} configuration diff</title>\n<style>\n\
             table {{ font-family: Courier, monospace; border-collapse: collapse; }}\n\
             td {{ padding: 0 6px; white-space: pre; }}\n\
             td.no {{ color: #888; text-align: right; }}\n\
             td.add {{ background: #aaffaa; }}\n\
             td.sub {{ background: #ffaaaa; }}\n\
             </style>\n</head>\n<body>\n\
             <h3>{host} ({address}) generated {generated}: +{added} -{removed}</h3>\n\
             <table>\n<tr><th></th><th>Before</th><th></th><th>After</th></tr>\n\
             {rows}</table>\n</body>\n</html>\n",
            host = escape_html(&self.hostname),
            address = escape_html(&self.address),
            generated = self.generated_at.to_rfc3339(),
            added = self.added(),
            removed = self.removed(),
        )
    }
}

/// Destination for audit reports.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Stores `report`; called once per configured device.
    async fn persist(&self, report: &AuditReport) -> Result<(), AuditError>;
}

/// Writes one HTML file per device into a directory.
///
/// A device gets `<hostname>.html`. When another address already owns that
/// name, the address is appended (`<hostname>_<address>.html`) so devices
/// sharing a hostname do not overwrite each other. Files are written to a
/// temporary name and renamed into place.
#[derive(Debug, Clone)]
pub struct FileAuditSink {
    dir: PathBuf,
    owners: Arc<Mutex<HashMap<String, String>>>,
}

impl FileAuditSink {
    /// Sink writing into `dir`, created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            owners: Arc::default(),
        }
    }

    /// Directory the reports are written to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Report path for the device `hostname` at `address`.
    pub fn path_for(&self, hostname: &str, address: &str) -> PathBuf {
        let stem = file_stem(hostname);
        let mut owners = self.owners.lock().unwrap_or_else(PoisonError::into_inner);
        let owner = owners
            .entry(stem.clone())
            .or_insert_with(|| address.to_string());

        if owner.as_str() == address {
            self.dir.join(format!("{stem}.html"))
        } else {
            self.dir
                .join(format!("{stem}_{}.html", sanitize(address)))
        }
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn file_stem(hostname: &str) -> String {
    let stem = sanitize(hostname);
    if stem.is_empty() || stem.starts_with('.') {
        format!("device{stem}")
    } else {
        stem
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn persist(&self, report: &AuditReport) -> Result<(), AuditError> {
        let path = self.path_for(&report.hostname, &report.address);
        let write_err = |source| AuditError::Write {
            path: path.display().to_string(),
            source,
        };
        let suffix = TEMP_SUFFIX.fetch_add(1, Ordering::Relaxed);
        let temp = path.with_extension(format!("html.{}.{suffix}.tmp", std::process::id()));

        tokio::fs::create_dir_all(&self.dir).await.map_err(write_err)?;
        tokio::fs::write(&temp, report.to_html())
            .await
            .map_err(write_err)?;
        tokio::fs::rename(&temp, &path).await.map_err(write_err)?;
        info!(
            hostname = %report.hostname,
            address = %report.address,
            path = %path.display(),
            added = report.added(),
            removed = report.removed(),
            "configuration diff written"
        );
        Ok(())
    }
}

/// Discards reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAuditSink;

#[async_trait]
impl AuditSink for NullAuditSink {
    async fn persist(&self, _report: &AuditReport) -> Result<(), AuditError> {
        Ok(())
    }
}
