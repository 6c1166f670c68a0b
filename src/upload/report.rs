use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::Local;
use crossterm::style::Stylize;

use crate::{
    error::Error,
    misc::{format_elapsed, format_size, plural},
};

#[derive(Debug)]
pub struct UploadResult {
    pub destination_key: String,
    pub local_path: PathBuf,
    pub outcome: Result<u64, Error>,
}

impl UploadResult {
    pub fn success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn error(&self) -> Option<&Error> {
        self.outcome.as_ref().err()
    }
}

#[derive(Debug)]
pub struct Report {
    pub results: Vec<UploadResult>,
    pub elapsed: Duration,
    /// Set when the run was interrupted, even if every launched upload went through.
    pub interrupted: bool,
}

impl Report {
    pub fn uploaded(&self) -> usize {
        self.results.iter().filter(|r| r.success()).count()
    }

    pub fn uploaded_bytes(&self) -> u64 {
        self.results
            .iter()
            .filter_map(|r| r.outcome.as_ref().ok())
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &UploadResult> {
        self.results.iter().filter(|r| !r.success())
    }

    pub fn cancelled(&self) -> usize {
        self.failures()
            .filter(|r| matches!(r.error(), Some(Error::Cancelled)))
            .count()
    }

    pub fn is_success(&self) -> bool {
        !self.interrupted && self.results.iter().all(UploadResult::success)
    }

    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} uploaded ({}) in {} at {}.",
            plural(self.uploaded(), "blob"),
            format_size(self.uploaded_bytes()),
            format_elapsed(self.elapsed),
            Local::now().format("%Y-%m-%d %H:%M:%S"),
        );
        let failed = self.results.len() - self.uploaded() - self.cancelled();
        if failed > 0 {
            summary.push_str(&format!(" {} failed.", plural(failed, "upload")));
        }
        if self.cancelled() > 0 {
            summary.push_str(&format!(" {} cancelled.", plural(self.cancelled(), "upload")));
        }
        if self.interrupted {
            summary.push_str(" Interrupted.");
        }
        summary
    }
}

/// Coloured progress lines. Normal progress goes to stdout, failures to stderr.
#[derive(Clone, Copy, Debug, Default)]
pub struct Printer {
    pub quiet: bool,
}

impl Printer {
    pub fn uploading(&self, path: &Path, content_type: Option<&str>) {
        if !self.quiet {
            let line = format!(
                "Uploading '{}' ({}).",
                path.display(),
                content_type.unwrap_or("no content type")
            );
            println!("{}", line.yellow());
        }
    }

    pub fn uploaded(&self, path: &Path) {
        if !self.quiet {
            let line = format!("'{}' uploaded successfully to blob container.", path.display());
            println!("{}", line.green());
        }
    }

    pub fn failed(&self, result: &UploadResult) {
        if let Some(err) = result.error() {
            log::debug!("{} failed: {:?}", result.destination_key, err);
            let line = format!("'{}' failed: {}", result.local_path.display(), err);
            eprintln!("{}", line.red());
        }
    }

    pub fn summary(&self, report: &Report) {
        report.failures().for_each(|f| self.failed(f));
        let summary = report.summary();
        if report.is_success() {
            println!("{}", summary);
        } else {
            eprintln!("{}", summary.red());
        }
    }
}
