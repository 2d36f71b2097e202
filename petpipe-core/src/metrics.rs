//! Pipeline metrics
//!
//! Process-wide counters rendered in Prometheus text format, and
//! [`PipelineStats`], the per-stream view each [`Samples`] keeps for itself.
//!
//! [`Samples`]: crate::dataset::Samples

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Monotonic counter
pub struct Counter {
    name: &'static str,
    help: &'static str,
    value: AtomicU64,
}

impl Counter {
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.inc_by(1);
    }

    pub fn inc_by(&self, delta: u64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    fn render(&self, out: &mut String) {
        header(out, self.name, self.help, "counter");
        let _ = writeln!(out, "{} {}", self.name, self.get());
    }
}

/// Why an archive entry left the pipeline before reaching a join
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Rejected by a stream filter (suffix, hidden file, other split)
    Filter,
    /// Annotation entry outside every known stream, e.g. `xmls/`
    Unclassified,
}

impl DropReason {
    pub const ALL: [DropReason; 2] = [DropReason::Filter, DropReason::Unclassified];

    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::Filter => "filter",
            DropReason::Unclassified => "unclassified",
        }
    }
}

/// Dropped-entry counter labelled by [`DropReason`]
pub struct DroppedEntries {
    by_reason: [AtomicU64; 2],
}

impl DroppedEntries {
    const NAME: &'static str = "petpipe_entries_dropped_total";

    pub const fn new() -> Self {
        Self {
            by_reason: [AtomicU64::new(0), AtomicU64::new(0)],
        }
    }

    pub fn record(&self, reason: DropReason) {
        self.by_reason[reason as usize].fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, reason: DropReason) -> u64 {
        self.by_reason[reason as usize].load(Ordering::Relaxed)
    }

    fn render(&self, out: &mut String) {
        header(out, Self::NAME, "Archive entries discarded before joining", "counter");
        for reason in DropReason::ALL {
            let _ = writeln!(
                out,
                "{}{{reason=\"{}\"}} {}",
                Self::NAME,
                reason.as_str(),
                self.get(reason)
            );
        }
    }
}

impl Default for DroppedEntries {
    fn default() -> Self {
        Self::new()
    }
}

/// Count and total time of an operation, exported as a summary
pub struct Latency {
    name: &'static str,
    help: &'static str,
    count: AtomicU64,
    total_nanos: AtomicU64,
}

impl Latency {
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            count: AtomicU64::new(0),
            total_nanos: AtomicU64::new(0),
        }
    }

    /// Run `f` and record how long it took
    pub fn time<R>(&self, f: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let result = f();
        let nanos = u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_nanos.fetch_add(nanos, Ordering::Relaxed);
        result
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn total_seconds(&self) -> f64 {
        self.total_nanos.load(Ordering::Relaxed) as f64 / 1e9
    }

    fn render(&self, out: &mut String) {
        header(out, self.name, self.help, "summary");
        let _ = writeln!(out, "{}_sum {}", self.name, self.total_seconds());
        let _ = writeln!(out, "{}_count {}", self.name, self.count());
    }
}

fn header(out: &mut String, name: &str, help: &str, kind: &str) {
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} {}", name, kind);
}

/// Process-wide metrics shared by every pipeline
pub mod standard {
    use super::{Counter, DroppedEntries, Latency};

    pub static SAMPLES_EMITTED: Counter =
        Counter::new("petpipe_samples_emitted_total", "Samples produced by all pipelines");

    pub static BYTES_READ: Counter =
        Counter::new("petpipe_bytes_read_total", "Bytes read from extracted resources");

    pub static ENTRIES_DROPPED: DroppedEntries = DroppedEntries::new();

    pub static DECODE_LATENCY: Latency =
        Latency::new("petpipe_decode_seconds", "Time spent decoding images and trimaps");
}

/// Render the process-wide metrics
pub fn gather_pipeline_metrics() -> String {
    let mut out = String::new();
    standard::SAMPLES_EMITTED.render(&mut out);
    standard::BYTES_READ.render(&mut out);
    standard::ENTRIES_DROPPED.render(&mut out);
    standard::DECODE_LATENCY.render(&mut out);
    out
}

/// Counters for a single sample stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Samples this stream produced
    pub emitted: u64,
    /// Entries currently held by the demultiplexer and both joins
    pub buffered: usize,
    /// Highest `buffered` seen so far
    pub peak_buffered: usize,
    /// Classification records dropped for lack of a trimap or image
    pub unmatched_records: u64,
}

impl PipelineStats {
    pub(crate) fn observe_buffered(&mut self, buffered: usize) {
        self.buffered = buffered;
        self.peak_buffered = self.peak_buffered.max(buffered);
    }

    /// Prometheus text for this stream, labelled with `pipeline`
    pub fn to_prometheus(&self, pipeline: &str) -> String {
        let mut out = String::new();
        let rows: [(&str, &str, &str, u64); 4] = [
            ("petpipe_pipeline_samples", "counter", "Samples produced by this pipeline", self.emitted),
            ("petpipe_pipeline_buffered", "gauge", "Entries held awaiting a join partner", self.buffered as u64),
            ("petpipe_pipeline_peak_buffered", "gauge", "Largest join backlog seen", self.peak_buffered as u64),
            ("petpipe_pipeline_unmatched_records", "counter", "Records without trimap or image", self.unmatched_records),
        ];
        for (name, kind, help, value) in rows {
            header(&mut out, name, help, kind);
            let _ = writeln!(out, "{}{{pipeline=\"{}\"}} {}", name, pipeline, value);
        }
        out
    }
}
