use std::{fmt, io};

use serde::Serialize;

/// Outcome of counting one collection.
///
/// Emitted as soon as the count is known, before any deletion, so a later
/// failure still leaves this line visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub collection: String,
    /// Records older than the cutoff at the time of counting.
    pub matched_count: u64,
    /// True when the run only reports and never deletes.
    pub dry_run: bool,
}

impl fmt::Display for PruneReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dry_run {
            write!(f, "[dryrun] ")?;
        }
        write!(
            f,
            "pruning {} entries from {}...",
            self.matched_count, self.collection
        )
    }
}

/// Receives reports as they are produced.
pub trait ReportSink {
    fn emit(&mut self, report: &PruneReport) -> io::Result<()>;
}

/// Collects reports in memory.
impl ReportSink for Vec<PruneReport> {
    fn emit(&mut self, report: &PruneReport) -> io::Result<()> {
        self.push(report.clone());
        Ok(())
    }
}

/// Writes one human-readable line per report, flushing after each.
pub struct LineSink<W> {
    out: W,
}

impl<W: io::Write> LineSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: io::Write> ReportSink for LineSink<W> {
    fn emit(&mut self, report: &PruneReport) -> io::Result<()> {
        writeln!(self.out, "{report}")?;
        self.out.flush()
    }
}

/// Results from a single prune run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct PruneSummary {
    /// One report per collection with a retention policy, in processing order.
    pub reports: Vec<PruneReport>,
    /// Records actually removed. Always zero for dry runs.
    pub deleted: u64,
    /// Whether the storage compaction pass ran.
    pub compacted: bool,
}

impl PruneSummary {
    /// Total records matched across all collections.
    pub fn total_matched(&self) -> u64 {
        self.reports.iter().map(|r| r.matched_count).sum()
    }

    /// Check if any records were deleted.
    pub fn has_deletions(&self) -> bool {
        self.deleted > 0
    }
}
