//! Building frames of step runs and correlating host metrics with them.
//!
//! Fetch failures never abort assembly: the instance or run concerned is
//! logged and left out of the result.

use chrono::{DateTime, Duration, Utc};

use log::{info, warn};

use crate::align::align_at_zero;
use crate::frame::{MetricFrame, StepFrame};
use crate::metric::{KeyMode, RunIndex};
use crate::tsdb::{Aggregator, Query, Source};

/// Query options shared by all fetches.
#[derive(Debug, Clone)]
pub struct Settings {
	pub start: DateTime<Utc>,
	pub end: DateTime<Utc>,
	pub aggregator: Aggregator,
	pub downsample: Option<String>,
	pub rate: bool,
	pub key_mode: KeyMode,
	pub reference_metric: String,
}

impl Settings {
	pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
		Self{
			start,
			end,
			aggregator: Aggregator::default(),
			downsample: None,
			rate: false,
			key_mode: KeyMode::default(),
			reference_metric: "io.syscw".into(),
		}
	}

	pub fn from_config(config: &crate::config::Config) -> Self {
		Self{
			start: config.tsdb.window.start,
			end: config.tsdb.window.end,
			aggregator: config.tsdb.aggregator,
			downsample: config.tsdb.downsample.clone(),
			rate: config.tsdb.rate,
			key_mode: config.frame.key,
			reference_metric: config.frame.reference_metric.clone(),
		}
	}

	/// Query for `metric` over `[start, end]` with the shared options.
	pub fn query(&self, metric: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Query {
		let mut q = Query::new(metric, start, end);
		q.aggregator = self.aggregator;
		q.downsample = self.downsample.clone();
		q.rate = self.rate;
		q
	}
}

pub struct Assembler<S> {
	source: S,
	settings: Settings,
}

impl<S: Source> Assembler<S> {
	pub fn new(source: S, settings: Settings) -> Self {
		Self{source, settings}
	}

	pub fn source(&self) -> &S {
		&self.source
	}

	/// Fetch one metric of every instance and put the runs side by side.
	///
	/// Instances which fail to fetch, have no samples or carry no host tag
	/// are skipped.
	pub async fn metric_frame<T: AsRef<str>>(&self, metric: &str, instances: &[T]) -> (MetricFrame, RunIndex) {
		let mut frame = MetricFrame::new();
		let mut runs = RunIndex::new();
		for instance in instances.iter().map(|i| i.as_ref()) {
			let name = format!("{}.{}", instance, metric);
			let query = self.settings.query(&name, self.settings.start, self.settings.end);
			let fetched = match self.source.fetch(&query).await {
				Ok(v) => v,
				Err(e) => {
					warn!("skipping {}: {}", name, e);
					continue;
				}
			};
			if fetched.series.is_empty() {
				continue;
			}
			let meta = match fetched.meta {
				Some(v) => v,
				None => {
					warn!("skipping {}: response carries no host tag", name);
					continue;
				}
			};
			let key = self.settings.key_mode.key(&meta, instance);
			frame.push(key, align_at_zero(&fetched.series, None));
			runs.insert(key, meta);
		}
		(frame, runs)
	}

	/// One metric frame per metric of the step.
	pub async fn step_frame<T: AsRef<str>, M: AsRef<str>>(&self, instances: &[T], metrics: &[M]) -> (StepFrame, RunIndex) {
		let mut frame = StepFrame::new();
		let mut runs = RunIndex::new();
		for metric in metrics.iter().map(|m| m.as_ref()) {
			info!("creating a frame for metric {}", metric);
			let (metric_frame, metric_runs) = self.metric_frame(metric, instances).await;
			frame.insert(metric, metric_frame);
			runs.extend(metric_runs);
		}
		(frame, runs)
	}

	/// Fetch a host metric for every run of the step frame.
	///
	/// A run's window starts at its start time and lasts as many seconds as
	/// the reference metric has samples for the run. The host series is
	/// aligned to the run's start time.
	pub async fn host_metric_frame(&self, step_frame: &StepFrame, host_metric: &str, runs: &RunIndex) -> MetricFrame {
		let mut frame = MetricFrame::new();
		let reference = match step_frame.metric(&self.settings.reference_metric) {
			Some(v) => v,
			None => {
				warn!("no {} in step frame, cannot correlate {}", self.settings.reference_metric, host_metric);
				return frame;
			}
		};
		for key in reference.keys() {
			let run_length = reference.count(&key).unwrap_or(0);
			let meta = match runs.get(&key) {
				Some(v) => v,
				None => {
					warn!("skipping run {} for {}: no metadata", key, host_metric);
					continue;
				}
			};
			let end = meta.start + Duration::seconds(run_length as i64);
			let query = self.settings.query(host_metric, meta.start, end).with_tags(&meta.host);
			let fetched = match self.source.fetch(&query).await {
				Ok(v) => v,
				Err(e) => {
					warn!("skipping run {} for {}: {}", key, host_metric, e);
					continue;
				}
			};
			frame.push(key, align_at_zero(&fetched.series, Some(&meta.start)));
		}
		frame
	}

	/// Host metric frames for all `host_metrics`.
	pub async fn host_frame<M: AsRef<str>>(&self, step_frame: &StepFrame, runs: &RunIndex, host_metrics: &[M]) -> StepFrame {
		let mut frame = StepFrame::new();
		for host_metric in host_metrics.iter().map(|m| m.as_ref()) {
			info!("creating a frame for metric {}", host_metric);
			let metric_frame = self.host_metric_frame(step_frame, host_metric, runs).await;
			frame.insert(host_metric, metric_frame);
		}
		frame
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use std::cell::RefCell;
	use std::collections::HashMap;

	use chrono::TimeZone;

	use crate::metric::{Elapsed, RunKey};
	use crate::tsdb::{parse_response, Error, Fetched, Precision};

	/// Answers from canned plain text responses; unknown metrics fail.
	#[derive(Default)]
	struct Canned {
		responses: HashMap<String, String>,
		queries: RefCell<Vec<Query>>,
	}

	impl Canned {
		fn with(mut self, metric: &str, body: String) -> Self {
			self.responses.insert(metric.to_string(), body);
			self
		}
	}

	impl Source for Canned {
		async fn fetch(&self, query: &Query) -> Result<Fetched, Error> {
			self.queries.borrow_mut().push(query.clone());
			match self.responses.get(&query.metric) {
				Some(body) => parse_response(body, Precision::Seconds),
				None => Err(Error::Status(reqwest::StatusCode::INTERNAL_SERVER_ERROR)),
			}
		}
	}

	fn t0() -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2016, 3, 1, 10, 0, 0).unwrap()
	}

	fn body(metric: &str, start: DateTime<Utc>, offsets: &[i64], host: &str) -> String {
		offsets
			.iter()
			.enumerate()
			.map(|(i, o)| format!("{} {} {} {}\n", metric, start.timestamp() + o, i + 1, host))
			.collect()
	}

	fn settings(key_mode: KeyMode) -> Settings {
		let mut s = Settings::new(
			Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap(),
			Utc.with_ymd_and_hms(2017, 1, 1, 0, 0, 0).unwrap(),
		);
		s.key_mode = key_mode;
		s
	}

	fn source() -> Canned {
		let a = t0();
		let b = t0() + Duration::minutes(5);
		Canned::default()
			.with("exe.s.1.io.syscw", body("exe.s.1.io.syscw", a, &[0, 1, 2], "host=n1"))
			.with("exe.s.2.io.syscw", body("exe.s.2.io.syscw", b, &[0, 1, 2, 3], "host=n2"))
			.with("exe.s.3.io.syscw", String::new())
			.with("exe.s.1.cpu.time", body("exe.s.1.cpu.time", a, &[0, 2], "host=n1"))
			.with("exe.s.2.cpu.time", body("exe.s.2.cpu.time", b, &[0, 5], "host=n2"))
			.with("proc.meminfo.free", body("proc.meminfo.free", a, &[1, 2], "host=n1"))
	}

	#[tokio::test]
	async fn test_metric_frame_skips_failed_and_empty_instances() {
		let assembler = Assembler::new(source(), settings(KeyMode::Timestamp));
		let instances = ["exe.s.1", "exe.s.2", "exe.s.3", "exe.s.4"];
		let (frame, runs) = assembler.metric_frame("io.syscw", &instances).await;
		let b = t0() + Duration::minutes(5);
		assert_eq!(frame.keys(), vec![RunKey::Start(t0()), RunKey::Start(b)]);
		assert_eq!(runs.len(), 2);
		assert_eq!(runs[&RunKey::Start(b)].host.as_str(), "host=n2");
		assert_eq!(frame.count(&RunKey::Start(t0())), Some(3));
		assert_eq!(frame.count(&RunKey::Start(b)), Some(4));
		assert_eq!(
			frame.index().map(|e| e.centis()).collect::<Vec<_>>(),
			vec![0, 100, 200, 300]
		);
		assert_eq!(frame.get(&RunKey::Start(b), &Elapsed::from_centis(300)), Some(4.0));
		assert_eq!(assembler.source().queries.borrow().len(), 4);
	}

	#[tokio::test]
	async fn test_step_frame_keys_agree_across_metrics() {
		let assembler = Assembler::new(source(), settings(KeyMode::Hash));
		let (frame, runs) = assembler
			.step_frame(&["exe.s.1", "exe.s.2"], &["io.syscw", "cpu.time"])
			.await;
		assert_eq!(frame.len(), 2);
		assert_eq!(runs.len(), 2);
		let syscw = frame.metric("io.syscw").unwrap();
		let cpu = frame.metric("cpu.time").unwrap();
		assert_eq!(syscw.keys(), cpu.keys());
		assert_eq!(
			frame.index().map(|e| e.centis()).collect::<Vec<_>>(),
			vec![0, 100, 200, 300, 500]
		);
	}

	#[tokio::test]
	async fn test_host_metric_frame_uses_run_window() {
		let assembler = Assembler::new(source(), settings(KeyMode::Timestamp));
		let (frame, runs) = assembler
			.step_frame(&["exe.s.1", "exe.s.2"], &["io.syscw"])
			.await;
		let host = assembler
			.host_frame(&frame, &runs, &["proc.meminfo.free", "proc.missing"])
			.await;

		let free = host.metric("proc.meminfo.free").unwrap();
		// both runs are queried, the canned source ignores tags and windows
		assert_eq!(free.len(), 2);
		assert_eq!(
			free.column(&RunKey::Start(t0())).unwrap().values().keys().map(|e| e.centis()).collect::<Vec<_>>(),
			vec![100, 200]
		);
		assert!(host.metric("proc.missing").unwrap().is_empty());

		let queries = assembler.source().queries.borrow();
		let q = queries.iter().find(|q| q.metric == "proc.meminfo.free").unwrap();
		assert_eq!(q.tags, "host=n1");
		assert_eq!(q.start, t0());
		assert_eq!(q.end, t0() + Duration::seconds(3));
	}

	#[tokio::test]
	async fn test_host_metric_frame_without_reference_is_empty() {
		let assembler = Assembler::new(source(), settings(KeyMode::Hash));
		let (frame, runs) = assembler.step_frame(&["exe.s.1"], &["cpu.time"]).await;
		let host = assembler.host_metric_frame(&frame, "proc.meminfo.free", &runs).await;
		assert!(host.is_empty());
	}
}
