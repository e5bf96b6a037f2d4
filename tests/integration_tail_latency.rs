use anyhow::Result;
use clap::Parser;
use sync_bench::{
    cli::Args, results::TailLatencyReport, BenchmarkConfig, BenchmarkRunner, LaunchOptions,
    Report, ReportFormatter, ThreadGroup,
};

fn run_tail(argv: &[&str]) -> Result<(TailLatencyReport, Vec<sync_bench::RankOutput>)> {
    let mut full = vec!["sync-bench", "tail-latency"];
    full.extend_from_slice(argv);
    let config = BenchmarkConfig::from_args(&Args::parse_from(full))?;
    let ranks = config.ranks;
    let runner = BenchmarkRunner::new(config);
    let outputs = ThreadGroup::launch(ranks, LaunchOptions::default(), |member| {
        Ok(runner.run(member)?)
    })?;
    match &outputs[0].report {
        Some(Report::TailLatency(report)) => Ok((report.clone(), outputs)),
        other => panic!("unexpected report {:?}", other),
    }
}

/// Percentile columns follow request order and stay inside the global range.
#[test]
fn tail_latency_smoke() -> Result<()> {
    let (report, _) = run_tail(&["-i", "500", "-s", "20", "-p", "0.99,0.95,0.5", "-n", "3"])?;

    let fractions: Vec<f64> = report.tails.iter().map(|t| t.percentile.fraction()).collect();
    assert_eq!(fractions, vec![0.99, 0.95, 0.5]);

    let range = report.range;
    assert!(range.minimum <= range.maximum);
    for tail in &report.tails {
        let latency = tail.latency;
        assert!(latency.minimum <= latency.average && latency.average <= latency.maximum);
        assert!(range.minimum <= latency.minimum && latency.maximum <= range.maximum);
    }
    let noised = report.noised_average;
    assert!(range.minimum <= noised.minimum && noised.maximum <= range.maximum);
    Ok(())
}

#[test]
fn tail_latency_text_report_has_one_column_per_percentile() -> Result<()> {
    let (report, _) = run_tail(&["-i", "100", "-s", "0", "-p", "0.9,0.75"])?;

    let mut formatter = ReportFormatter::new(Vec::new());
    formatter.write_report(&Report::TailLatency(report))?;
    let text = String::from_utf8(formatter.into_inner())?;
    let lines: Vec<&str> = text.lines().collect();

    assert!(lines[1].contains("90.0%"));
    assert!(lines[1].contains("75.0%"));
    assert_eq!(lines[2].matches('[').count(), 4);
    Ok(())
}

#[test]
fn tail_latency_sample_dump_at_verbosity_two() -> Result<()> {
    let (_, outputs) = run_tail(&["-i", "30", "-s", "5", "-V", "2", "-n", "2"])?;

    let mut formatter = ReportFormatter::new(Vec::new());
    for output in &outputs {
        let samples = output.samples.as_ref().expect("samples kept at verbosity 2");
        assert_eq!(samples.len(), 30);
        formatter.write_samples(output.info.rank, output.info.size, samples)?;
    }
    let text = String::from_utf8(formatter.into_inner())?;
    assert_eq!(text.lines().count(), 60);
    assert!(text.starts_with("[   0:   2]\titer       0, latency"));
    Ok(())
}

#[test]
fn tail_latency_without_verbosity_keeps_no_samples() -> Result<()> {
    let (_, outputs) = run_tail(&["-i", "30", "-s", "5", "-V", "1"])?;
    assert!(outputs.iter().all(|output| output.samples.is_none()));
    Ok(())
}
