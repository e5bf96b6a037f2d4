use crate::aggregate::{LatencyRange, StatTriple};
use crate::benchmark::BenchmarkConfig;
use crate::cli::BenchmarkKind;
use crate::operation::SyncOperation;
use crate::overlap::OverlapOutcome;
use crate::percentile::PercentileSpec;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Identity of one rank, printed at verbosity level 1 and above.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankInfo {
    pub rank: usize,
    pub size: usize,
    pub pid: u32,
    pub host: String,
    pub skip: usize,
    pub iterations: usize,
}

impl RankInfo {
    /// Describe the calling rank.
    pub fn collect(rank: usize, size: usize, skip: usize, iterations: usize) -> Self {
        Self {
            rank,
            size,
            pid: std::process::id(),
            host: hostname(),
            skip,
            iterations,
        }
    }
}

impl std::fmt::Display for RankInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{:4}/{:4}]: PID {}, Host {}, skip {}, iter {}",
            self.rank, self.size, self.pid, self.host, self.skip, self.iterations
        )
    }
}

fn hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Run parameters repeated in every report footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLabels {
    pub iterations: usize,
    pub skip: usize,
    pub ranks: usize,
}

/// Group-wide result of the average-latency benchmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvgLatencyReport {
    pub latency: StatTriple,
    pub operation: SyncOperation,
    pub labels: RunLabels,
}

/// One requested percentile and its group-wide triple.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TailLatency {
    pub percentile: PercentileSpec,
    pub latency: StatTriple,
}

/// Group-wide result of the tail-latency benchmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TailLatencyReport {
    /// Aggregate of the per-rank averages of per-iteration latencies.
    pub noised_average: StatTriple,
    /// Global minimum and maximum over all retained samples.
    pub range: LatencyRange,
    /// In request order.
    pub tails: Vec<TailLatency>,
    pub operation: SyncOperation,
    pub labels: RunLabels,
}

/// Group-wide result of the overlap benchmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlapReport {
    pub outcome: OverlapOutcome,
    pub labels: RunLabels,
}

/// Report produced by the reporting rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "benchmark", rename_all = "kebab-case")]
pub enum Report {
    AvgLatency(AvgLatencyReport),
    TailLatency(TailLatencyReport),
    Overlap(OverlapReport),
}

impl Report {
    pub fn kind(&self) -> BenchmarkKind {
        match self {
            Report::AvgLatency(_) => BenchmarkKind::AvgLatency,
            Report::TailLatency(_) => BenchmarkKind::TailLatency,
            Report::Overlap(_) => BenchmarkKind::Overlap,
        }
    }
}

/// Fixed-width text rendering of reports and verbose per-rank details.
pub struct ReportFormatter<W: Write> {
    out: W,
}

impl<W: Write> ReportFormatter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn write_report(&mut self, report: &Report) -> io::Result<()> {
        match report {
            Report::AvgLatency(avg) => self.write_avg_latency(avg),
            Report::TailLatency(tail) => self.write_tail_latency(tail),
            Report::Overlap(overlap) => self.write_overlap(overlap),
        }
    }

    fn write_signature(&mut self, kind: BenchmarkKind) -> io::Result<()> {
        writeln!(self.out, "# {}", kind.title())
    }

    fn write_labels_header(&mut self) -> io::Result<()> {
        write!(self.out, "{:>7}{:>5}{:>6}", "Iter.", "skip", "#PEs")
    }

    fn write_labels(&mut self, labels: &RunLabels) -> io::Result<()> {
        write!(
            self.out,
            "{:>7}{:>5}{:>6}",
            labels.iterations, labels.skip, labels.ranks
        )
    }

    fn write_avg_latency(&mut self, report: &AvgLatencyReport) -> io::Result<()> {
        self.write_signature(BenchmarkKind::AvgLatency)?;
        write!(self.out, "{:>5}{:>10}{:>10}", "# Avg", "Min", "Max")?;
        self.write_labels_header()?;
        writeln!(self.out, "{:>20}", "Func.")?;

        let latency = &report.latency;
        write!(
            self.out,
            "{:>5.2}{:>10.2}{:>10.2}",
            latency.average, latency.minimum, latency.maximum
        )?;
        self.write_labels(&report.labels)?;
        writeln!(self.out, "{:>20}", report.operation.name())
    }

    fn write_tail_latency(&mut self, report: &TailLatencyReport) -> io::Result<()> {
        self.write_signature(BenchmarkKind::TailLatency)?;
        write!(self.out, "{:>22}{:>18}", "Noised-Avg", "Range")?;
        for tail in &report.tails {
            write!(self.out, "{:>24}", tail.percentile.to_string())?;
        }
        self.write_labels_header()?;
        writeln!(self.out, "{:>20}", "Func.")?;

        write!(
            self.out,
            "{:>22}{:>18}",
            report.noised_average.to_string(),
            report.range.to_string()
        )?;
        for tail in &report.tails {
            write!(self.out, "{:>24}", tail.latency.to_string())?;
        }
        self.write_labels(&report.labels)?;
        writeln!(self.out, "{:>20}", report.operation.name())
    }

    fn write_overlap(&mut self, report: &OverlapReport) -> io::Result<()> {
        writeln!(
            self.out,
            "{:>18}   {:>24}   {:>24}   {:>24}   {:>24}   {:>24}",
            "Computation-Amount",
            "Overall-Latency",
            "Network-latency",
            "Computation-Latency",
            "Overhead",
            "Availability"
        )?;
        let network = report.outcome.communication.to_string();
        for row in &report.outcome.rows {
            writeln!(
                self.out,
                "{:>18}   {:>24}   {:>24}   {:>24}   {:>24}   {:>24}",
                row.workload_size,
                row.overlapped.to_string(),
                network,
                row.computation.to_string(),
                row.overhead.to_string(),
                row.availability.to_string()
            )?;
        }

        self.write_signature(BenchmarkKind::Overlap)?;
        self.write_labels_header()?;
        writeln!(self.out)?;
        self.write_labels(&report.labels)?;
        writeln!(self.out)
    }

    /// One identity line per rank, in rank order.
    pub fn write_rank_info(&mut self, ranks: &[RankInfo]) -> io::Result<()> {
        for info in ranks {
            writeln!(self.out, "{}", info)?;
        }
        Ok(())
    }

    /// Sorted per-iteration latencies of one rank.
    pub fn write_samples(&mut self, rank: usize, size: usize, samples: &[f64]) -> io::Result<()> {
        for (iteration, latency) in samples.iter().enumerate() {
            writeln!(
                self.out,
                "[{:4}:{:4}]\titer {:7}, latency {:15.2}",
                rank, size, iteration, latency
            )?;
        }
        Ok(())
    }
}

/// System information for reproducibility
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub architecture: String,
    pub cpu_cores: usize,
    pub hostname: String,
    pub benchmark_version: String,
}

impl SystemInfo {
    pub fn collect() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            cpu_cores: num_cpus::get(),
            hostname: hostname(),
            benchmark_version: crate::VERSION.to_string(),
        }
    }
}

/// Benchmark metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub version: String,
    pub run_id: uuid::Uuid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub system_info: SystemInfo,
}

#[derive(Debug, Serialize)]
struct ResultsFile<'a> {
    metadata: RunMetadata,
    configuration: &'a BenchmarkConfig,
    report: &'a Report,
    ranks: &'a [RankInfo],
}

/// Writes the JSON results file.
pub struct ResultsManager {
    output_file: PathBuf,
}

impl ResultsManager {
    pub fn new(output_file: &Path) -> Self {
        Self {
            output_file: output_file.to_path_buf(),
        }
    }

    pub fn output_file(&self) -> &Path {
        &self.output_file
    }

    /// Serialize one run with its metadata and write it out.
    ///
    /// NaN statistics (undefined availability) are written as `null`.
    pub fn write(
        &self,
        configuration: &BenchmarkConfig,
        report: &Report,
        ranks: &[RankInfo],
    ) -> Result<RunMetadata> {
        let metadata = RunMetadata {
            version: crate::VERSION.to_string(),
            run_id: uuid::Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            system_info: SystemInfo::collect(),
        };
        debug!("Writing results for run {}", metadata.run_id);

        let file = ResultsFile {
            metadata: metadata.clone(),
            configuration,
            report,
            ranks,
        };
        let json = serde_json::to_string_pretty(&file).context("Failed to serialize results")?;
        std::fs::write(&self.output_file, json).with_context(|| {
            format!(
                "Failed to write results to {}",
                self.output_file.display()
            )
        })?;

        info!("Results written to: {:?}", self.output_file);
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlap::OverlapRow;

    fn labels() -> RunLabels {
        RunLabels {
            iterations: 10000,
            skip: 200,
            ranks: 4,
        }
    }

    fn render(report: &Report) -> String {
        let mut formatter = ReportFormatter::new(Vec::new());
        formatter.write_report(report).unwrap();
        String::from_utf8(formatter.into_inner()).unwrap()
    }

    #[test]
    fn test_avg_latency_layout() {
        let report = Report::AvgLatency(AvgLatencyReport {
            latency: StatTriple {
                average: 1.5,
                minimum: 1.25,
                maximum: 2.0,
            },
            operation: SyncOperation::SyncAll,
            labels: labels(),
        });
        let text = render(&report);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "# Group sync avg latency test");
        assert_eq!(
            lines[1],
            format!(
                "{:>5}{:>10}{:>10}{:>7}{:>5}{:>6}{:>20}",
                "# Avg", "Min", "Max", "Iter.", "skip", "#PEs", "Func."
            )
        );
        assert_eq!(
            lines[2],
            " 1.50      1.25      2.00  10000  200     4            sync_all"
        );
    }

    #[test]
    fn test_tail_latency_layout() {
        let report = Report::TailLatency(TailLatencyReport {
            noised_average: StatTriple::uniform(3.0),
            range: LatencyRange {
                minimum: 0.5,
                maximum: 9.0,
            },
            tails: vec![
                TailLatency {
                    percentile: PercentileSpec::try_from(0.99).unwrap(),
                    latency: StatTriple::uniform(8.0),
                },
                TailLatency {
                    percentile: PercentileSpec::try_from(0.95).unwrap(),
                    latency: StatTriple::uniform(7.0),
                },
            ],
            operation: SyncOperation::BarrierAll,
            labels: labels(),
        });
        let text = render(&report);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "# Group sync tail-latency test");
        assert!(lines[1].contains("Noised-Avg"));
        let header_99 = lines[1].find("99.0%").unwrap();
        let header_95 = lines[1].find("95.0%").unwrap();
        assert!(header_99 < header_95);
        assert!(lines[2].starts_with(&format!("{:>22}", "3.00 [3.00-3.00]")));
        assert!(lines[2].contains("[0.50-9.00]"));
        assert!(lines[2].contains("8.00 [8.00-8.00]"));
        assert!(lines[2].ends_with("barrier_all"));
        assert_eq!(lines[1].len(), lines[2].len());
    }

    #[test]
    fn test_overlap_layout() {
        let row = |size: usize| OverlapRow {
            workload_size: size,
            computation: StatTriple::uniform(size as f64),
            overlapped: StatTriple::uniform(size as f64 + 1.0),
            overhead: StatTriple::uniform(1.0),
            availability: StatTriple::uniform(0.5),
        };
        let report = Report::Overlap(OverlapReport {
            outcome: OverlapOutcome {
                communication: StatTriple::uniform(2.0),
                rows: vec![row(1), row(2)],
            },
            labels: labels(),
        });
        let text = render(&report);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].starts_with("Computation-Amount"));
        assert!(lines[1].starts_with(&format!("{:>18}", 1)));
        assert!(lines[2].contains("2.00 [2.00-2.00]"));
        assert!(lines[2].ends_with("0.50 [0.50-0.50]"));
        assert_eq!(lines[3], "# Group sync overlap benchmark");
        assert_eq!(lines[4], "  Iter. skip  #PEs");
        assert_eq!(lines[5], "  10000  200     4");
    }

    #[test]
    fn test_rank_info_line() {
        let info = RankInfo {
            rank: 3,
            size: 16,
            pid: 4242,
            host: "node01".to_string(),
            skip: 200,
            iterations: 10000,
        };
        assert_eq!(
            info.to_string(),
            "[   3/  16]: PID 4242, Host node01, skip 200, iter 10000"
        );
    }

    #[test]
    fn test_collect_rank_info_uses_this_process() {
        let info = RankInfo::collect(1, 2, 5, 50);
        assert_eq!(info.pid, std::process::id());
        assert!(!info.host.is_empty());
    }

    #[test]
    fn test_sample_dump() {
        let mut formatter = ReportFormatter::new(Vec::new());
        formatter.write_samples(1, 2, &[0.5, 12.25]).unwrap();
        let text = String::from_utf8(formatter.into_inner()).unwrap();
        assert_eq!(
            text,
            "[   1:   2]\titer       0, latency            0.50\n\
             [   1:   2]\titer       1, latency           12.25\n"
        );
    }

    #[test]
    fn test_report_serializes_with_tag() {
        let report = Report::AvgLatency(AvgLatencyReport {
            latency: StatTriple::uniform(1.0),
            operation: SyncOperation::Empty,
            labels: labels(),
        });
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["benchmark"], "avg-latency");
        assert_eq!(value["operation"], "Empty");
        assert_eq!(value["labels"]["ranks"], 4);
        assert_eq!(report.kind(), BenchmarkKind::AvgLatency);
    }
}
