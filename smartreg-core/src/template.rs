//! Licensing configuration template.

use std::path::{Path, PathBuf};

use crate::error::{RegistrationError, Result};

/// Licensing configuration pushed verbatim to every device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigTemplate {
    source: Option<PathBuf>,
    raw: String,
    lines: Vec<String>,
}

impl ConfigTemplate {
    /// Builds a template from configuration text.
    ///
    /// Blank lines and `!` comment lines are kept in the raw text shown to
    /// operators but are not sent to devices.
    pub fn from_text(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let lines = raw
            .lines()
            .map(str::trim_end)
            .filter(|line| {
                let trimmed = line.trim_start();
                !trimmed.is_empty() && !trimmed.starts_with('!')
            })
            .map(str::to_string)
            .collect();
        Self {
            source: None,
            raw,
            lines,
        }
    }

    /// Reads a template file; a file without configuration lines is rejected.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let mut template = Self::from_text(raw);
        if template.lines.is_empty() {
            return Err(RegistrationError::Template(format!(
                "{} contains no configuration lines",
                path.display()
            )));
        }
        template.source = Some(path.to_path_buf());
        Ok(template)
    }

    /// File the template was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Text as written, comments included.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Lines sent to devices.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}
