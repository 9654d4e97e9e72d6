use std::fmt;
use std::path::Path;

use log::info;

use plotters::prelude::*;

use crate::frame::StepFrame;
use crate::metric::{run_start, RunIndex, RunKey};

static CHART_SIZE: (u32, u32) = (1024, 640);

static SECONDS_PER_DAY: f64 = 86400.0;

#[derive(Debug)]
pub enum Error {
	NoSuchMetric(String),
	Drawing(String),
}

impl fmt::Display for Error {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::NoSuchMetric(m) => write!(f, "no metric {:?} in frame", m),
			Self::Drawing(e) => write!(f, "failed to draw chart: {}", e),
		}
	}
}

impl std::error::Error for Error {}

fn drawing<E: fmt::Display>(e: E) -> Error {
	Error::Drawing(e.to_string())
}

/// Length of each run, as the number of samples of `statistic`.
pub fn run_lengths(frame: &StepFrame, statistic: &str) -> Result<Vec<(RunKey, usize)>, Error> {
	let metric = match frame.metric(statistic) {
		Some(v) => v,
		None => return Err(Error::NoSuchMetric(statistic.to_string())),
	};
	Ok(metric
		.keys()
		.into_iter()
		.map(|k| (k, metric.count(&k).unwrap_or(0)))
		.collect())
}

/// Run lengths against days since the first run, ordered by start time.
/// Runs without a known start are left out.
pub fn lengths_over_time(lengths: &[(RunKey, usize)], runs: &RunIndex) -> Vec<(f64, f64)> {
	let mut dated: Vec<_> = lengths
		.iter()
		.filter_map(|(k, len)| Some((run_start(k, runs)?, *len)))
		.collect();
	dated.sort_by_key(|(start, _)| *start);
	let t0 = match dated.first() {
		Some((start, _)) => *start,
		None => return Vec::new(),
	};
	dated
		.into_iter()
		.map(|(start, len)| {
			let days = (start - t0).num_seconds() as f64 / SECONDS_PER_DAY;
			(days, len as f64)
		})
		.collect()
}

/// Equal-width histogram over the range of `values`.
///
/// Returns the lower edge, the bin width and the counts. The last bin is
/// closed on both ends. A degenerate range is widened to one unit around
/// the single value.
pub fn histogram(values: &[f64], bins: usize) -> (f64, f64, Vec<usize>) {
	let bins = bins.max(1);
	let mut counts = vec![0usize; bins];
	if values.is_empty() {
		return (0.0, 1.0 / bins as f64, counts);
	}
	let mut lo = values.iter().copied().fold(f64::INFINITY, f64::min);
	let mut hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
	if lo == hi {
		lo -= 0.5;
		hi += 0.5;
	}
	let width = (hi - lo) / bins as f64;
	for v in values {
		let bin = (((v - lo) / width) as usize).min(bins - 1);
		counts[bin] += 1;
	}
	(lo, width, counts)
}

/// Line chart of run lengths over the start dates of the runs.
pub fn plot_run_lengths(frame: &StepFrame, runs: &RunIndex, statistic: &str, out: &Path) -> Result<(), Error> {
	let points = lengths_over_time(&run_lengths(frame, statistic)?, runs);
	let x_max = points.last().map(|p| p.0).unwrap_or(0.0).max(1.0);
	let y_max = points.iter().map(|p| p.1).fold(0.0, f64::max).max(1.0);

	let root = SVGBackend::new(out, CHART_SIZE).into_drawing_area();
	root.fill(&WHITE).map_err(drawing)?;
	let mut chart = ChartBuilder::on(&root)
		.caption("Length of runs for the step", ("sans-serif", 24))
		.margin(10)
		.x_label_area_size(40)
		.y_label_area_size(60)
		.build_cartesian_2d(0f64..x_max, 0f64..y_max * 1.05)
		.map_err(drawing)?;
	chart
		.configure_mesh()
		.x_desc("date of exe run (days since first run)")
		.y_desc("run length (s)")
		.draw()
		.map_err(drawing)?;
	chart
		.draw_series(LineSeries::new(points.iter().copied(), &BLUE))
		.map_err(drawing)?;
	root.present().map_err(drawing)?;
	info!("wrote {} runs to {:?}", points.len(), out);
	Ok(())
}

/// Histogram of run lengths.
pub fn plot_run_length_histogram(frame: &StepFrame, statistic: &str, bins: usize, out: &Path) -> Result<(), Error> {
	let lengths: Vec<f64> = run_lengths(frame, statistic)?
		.into_iter()
		.map(|(_, len)| len as f64)
		.collect();
	let (lo, width, counts) = histogram(&lengths, bins);
	let x_max = lo + width * counts.len() as f64;
	let y_max = counts.iter().copied().max().unwrap_or(0).max(1) as f64;

	let root = SVGBackend::new(out, CHART_SIZE).into_drawing_area();
	root.fill(&WHITE).map_err(drawing)?;
	let mut chart = ChartBuilder::on(&root)
		.caption("Histogram of run lengths", ("sans-serif", 24))
		.margin(10)
		.x_label_area_size(40)
		.y_label_area_size(60)
		.build_cartesian_2d(lo..x_max, 0f64..y_max * 1.05)
		.map_err(drawing)?;
	chart
		.configure_mesh()
		.x_desc("Length of run (s)")
		.y_desc("number of executions")
		.draw()
		.map_err(drawing)?;
	chart
		.draw_series(counts.iter().enumerate().map(|(i, count)| {
			let x0 = lo + width * i as f64;
			Rectangle::new([(x0, 0.0), (x0 + width, *count as f64)], BLUE.mix(0.6).filled())
		}))
		.map_err(drawing)?;
	root.present().map_err(drawing)?;
	info!("wrote histogram of {} runs to {:?}", lengths.len(), out);
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	use chrono::{Duration, TimeZone, Utc};

	use crate::frame::MetricFrame;
	use crate::metric::{Elapsed, RunMeta, Series};

	fn frame() -> (StepFrame, RunIndex) {
		let t0 = Utc.with_ymd_and_hms(2016, 3, 1, 10, 0, 0).unwrap();
		let series = |n: i64| -> Series<Elapsed> {
			(0..n).map(|i| (Elapsed::from_centis(i * 100), i as f64)).collect()
		};
		let mut runs = RunIndex::new();
		runs.insert(RunKey::Hash(1), RunMeta::new("host=a", &(t0 + Duration::days(2))));
		runs.insert(RunKey::Hash(2), RunMeta::new("host=a", &t0));
		let mut step = StepFrame::new();
		step.insert("stat.stime", MetricFrame::concat(vec![
			(RunKey::Hash(1), series(30)),
			(RunKey::Hash(2), series(10)),
			(RunKey::Hash(3), series(20)),
		]));
		(step, runs)
	}

	#[test]
	fn test_run_lengths() {
		let (step, _) = frame();
		assert_eq!(
			run_lengths(&step, "stat.stime").unwrap(),
			vec![(RunKey::Hash(1), 30), (RunKey::Hash(2), 10), (RunKey::Hash(3), 20)]
		);
		match run_lengths(&step, "stat.utime") {
			Err(Error::NoSuchMetric(_)) => (),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn test_lengths_over_time_sorted_by_start() {
		let (step, runs) = frame();
		let lengths = run_lengths(&step, "stat.stime").unwrap();
		assert_eq!(lengths_over_time(&lengths, &runs), vec![(0.0, 10.0), (2.0, 30.0)]);
	}

	#[test]
	fn test_histogram() {
		let (lo, width, counts) = histogram(&[1.0, 2.0, 2.0, 5.0], 4);
		assert_eq!(lo, 1.0);
		assert_eq!(width, 1.0);
		assert_eq!(counts, vec![1, 2, 0, 1]);
	}

	#[test]
	fn test_histogram_single_value() {
		let (lo, width, counts) = histogram(&[7.0, 7.0], 2);
		assert_eq!(lo, 6.5);
		assert_eq!(width, 0.5);
		assert_eq!(counts, vec![0, 2]);
	}

	#[test]
	fn test_plots_are_written() {
		let (step, runs) = frame();
		let dir = std::env::temp_dir();
		let lines = dir.join(format!("run_metrics_lengths_{}.svg", std::process::id()));
		let hist = dir.join(format!("run_metrics_hist_{}.svg", std::process::id()));
		plot_run_lengths(&step, &runs, "stat.stime", &lines).unwrap();
		plot_run_length_histogram(&step, "stat.stime", 50, &hist).unwrap();
		let svg = std::fs::read_to_string(&lines).unwrap();
		std::fs::remove_file(&lines).unwrap();
		std::fs::remove_file(&hist).unwrap();
		assert!(svg.contains("<svg"));
	}
}
