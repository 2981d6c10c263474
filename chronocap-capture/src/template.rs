//! Output filename template rendering.
//!
//! Both the capture workers (to open interim files) and the merging thread
//! (to re-discover those files and name the merged output) derive names
//! from the same template, so rendering must be pure and deterministic in
//! its inputs: the interval timestamp, an optional worker index, whether a
//! trace-format scheme prefix is wanted, and an optional marker extension.
//!
//! Beyond the strftime directives (rendered in UTC), the template supports:
//! - `%N` — the configured monitor id (empty when unset)
//! - `%P` — the fixed program tag, kept for compatibility with existing
//!   archive layouts
//! - `%f` — the trace format extension (`pcap` for `pcapfile`)
//! - `%s` — the interval timestamp as unix seconds

use chrono::format::{Item, StrftimeItems};
use chrono::{TimeZone, Utc};
use thiserror::Error;

/// Tag substituted for `%P`.
pub const PROGRAM_TAG: &str = "chronocap";

/// Upper bound on a rendered file name.
const MAX_NAME_LEN: usize = 4096;

/// Errors from rendering a file name.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("rendered file name is too long")]
    TooLong,

    #[error("template contains an unrecognised directive")]
    BadDirective,

    #[error("timestamp {0} cannot be rendered")]
    BadTimestamp(u32),
}

/// Marker extension appended to merged-output names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    None,
    Done,
    Stats,
}

/// A configured filename template.
#[derive(Debug, Clone)]
pub struct NameTemplate {
    template: String,
    monitor_id: Option<String>,
    format: String,
}

impl NameTemplate {
    pub fn new(template: &str, monitor_id: Option<&str>, format: &str) -> Self {
        Self {
            template: template.to_string(),
            monitor_id: monitor_id.map(String::from),
            format: format.to_string(),
        }
    }

    fn extension(&self) -> &str {
        if self.format == "pcapfile" {
            "pcap"
        } else {
            &self.format
        }
    }

    /// Render a file name.
    ///
    /// `worker` selects the interim file for that worker (`--<index>`
    /// suffix); markers apply only when `worker` is absent. `with_scheme`
    /// prefixes `<format>:` to build a trace URI.
    pub fn derive(
        &self,
        timestamp: u32,
        worker: Option<usize>,
        with_scheme: bool,
        marker: Marker,
    ) -> Result<String, TemplateError> {
        let mut scratch = String::with_capacity(self.template.len() + 32);
        if with_scheme {
            scratch.push_str(&self.format);
            scratch.push(':');
        }

        let mut chars = self.template.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '%' {
                scratch.push(c);
                continue;
            }
            match chars.peek().copied() {
                Some('N') => {
                    chars.next();
                    if let Some(monitor) = &self.monitor_id {
                        scratch.push_str(monitor);
                    }
                }
                Some('P') => {
                    chars.next();
                    scratch.push_str(PROGRAM_TAG);
                }
                Some('f') => {
                    chars.next();
                    scratch.push_str(self.extension());
                }
                Some('s') => {
                    chars.next();
                    scratch.push_str(&timestamp.to_string());
                }
                // Anything else is left for the strftime pass.
                _ => scratch.push('%'),
            }
        }

        match worker {
            Some(index) => {
                scratch.push_str("--");
                scratch.push_str(&index.to_string());
            }
            None => match marker {
                Marker::Done => scratch.push_str(".done"),
                Marker::Stats => scratch.push_str(".stats"),
                Marker::None => {}
            },
        }

        if scratch.len() > MAX_NAME_LEN {
            return Err(TemplateError::TooLong);
        }

        let when = Utc
            .timestamp_opt(timestamp as i64, 0)
            .single()
            .ok_or(TemplateError::BadTimestamp(timestamp))?;
        let items: Vec<Item> = StrftimeItems::new(&scratch).collect();
        if items.iter().any(|item| matches!(item, Item::Error)) {
            return Err(TemplateError::BadDirective);
        }
        let rendered = when.format_with_items(items.into_iter()).to_string();

        if rendered.len() > MAX_NAME_LEN {
            return Err(TemplateError::TooLong);
        }
        Ok(rendered)
    }

    /// Interim file path for `(interval, worker)`, as written by workers.
    pub fn interim(&self, timestamp: u32, worker: usize) -> Result<String, TemplateError> {
        self.derive(timestamp, Some(worker), false, Marker::None)
    }

    /// Interim file URI for `(interval, worker)`, as read by the merger.
    pub fn interim_uri(&self, timestamp: u32, worker: usize) -> Result<String, TemplateError> {
        self.derive(timestamp, Some(worker), true, Marker::None)
    }

    /// Merged output URI for an interval.
    pub fn merged_uri(&self, timestamp: u32) -> Result<String, TemplateError> {
        self.derive(timestamp, None, true, Marker::None)
    }

    /// `.done` marker path for an interval.
    pub fn done_marker(&self, timestamp: u32) -> Result<String, TemplateError> {
        self.derive(timestamp, None, false, Marker::Done)
    }

    /// `.stats` sidecar path for an interval.
    pub fn stats_file(&self, timestamp: u32) -> Result<String, TemplateError> {
        self.derive(timestamp, None, false, Marker::Stats)
    }
}
