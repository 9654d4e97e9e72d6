use std::collections::{BTreeMap, BTreeSet};

use log::warn;

use smartstring::alias::{String as SmartString};

use crate::metric::{Elapsed, OrderedVec, RunKey, Series};

mod export;

pub use self::export::{write_metric_frame, write_step_frame};

/// One aligned run within a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
	key: RunKey,
	values: OrderedVec<Elapsed, f64>,
}

impl Column {
	pub fn new(key: RunKey, series: Series<Elapsed>) -> Self {
		Self {
			key,
			values: series.into_points().into_iter().collect(),
		}
	}

	pub fn key(&self) -> &RunKey {
		&self.key
	}

	pub fn get(&self, at: &Elapsed) -> Option<f64> {
		self.values.get(at).copied()
	}

	pub fn values(&self) -> &OrderedVec<Elapsed, f64> {
		&self.values
	}

	/// Number of non-missing samples.
	pub fn count(&self) -> usize {
		self.values.values().filter(|v| !v.is_nan()).count()
	}
}

/// Runs of a single metric side by side on a shared elapsed-time index.
///
/// Run keys are expected to be unique, but duplicates are kept as separate
/// columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricFrame {
	index: BTreeSet<Elapsed>,
	columns: Vec<Column>,
}

impl MetricFrame {
	pub fn new() -> Self {
		Self::default()
	}

	/// Concatenate aligned series into a frame, one column per key.
	pub fn concat<T: IntoIterator<Item = (RunKey, Series<Elapsed>)>>(series: T) -> Self {
		let mut result = Self::new();
		for (key, s) in series {
			result.push(key, s);
		}
		result
	}

	pub fn push(&mut self, key: RunKey, series: Series<Elapsed>) {
		if self.columns.iter().any(|c| c.key == key) {
			warn!("duplicate run key {} in frame", key);
		}
		let column = Column::new(key, series);
		self.index.extend(column.values.keys().copied());
		self.columns.push(column);
	}

	pub fn index(&self) -> impl Iterator<Item = &Elapsed> + '_ {
		self.index.iter()
	}

	pub fn columns(&self) -> &[Column] {
		&self.columns
	}

	/// Distinct run keys, in order of first appearance.
	pub fn keys(&self) -> Vec<RunKey> {
		let mut seen = BTreeSet::new();
		self.columns
			.iter()
			.filter(|c| seen.insert(c.key))
			.map(|c| c.key)
			.collect()
	}

	pub fn column(&self, key: &RunKey) -> Option<&Column> {
		self.columns.iter().find(|c| c.key == *key)
	}

	/// Non-missing sample count of a run; the largest one if the key is
	/// duplicated.
	pub fn count(&self, key: &RunKey) -> Option<usize> {
		self.columns
			.iter()
			.filter(|c| c.key == *key)
			.map(Column::count)
			.max()
	}

	pub fn get(&self, key: &RunKey, at: &Elapsed) -> Option<f64> {
		self.column(key)?.get(at)
	}

	pub fn len(&self) -> usize {
		self.columns.len()
	}

	pub fn is_empty(&self) -> bool {
		self.columns.is_empty()
	}
}

/// Frames of several metrics, keyed by metric name, on a shared index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepFrame {
	index: BTreeSet<Elapsed>,
	metrics: BTreeMap<SmartString, MetricFrame>,
}

impl StepFrame {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&mut self, metric: &str, frame: MetricFrame) {
		self.index.extend(frame.index().copied());
		self.metrics.insert(metric.into(), frame);
	}

	pub fn metric(&self, metric: &str) -> Option<&MetricFrame> {
		self.metrics.get(metric)
	}

	pub fn metrics(&self) -> impl Iterator<Item = (&str, &MetricFrame)> + '_ {
		self.metrics.iter().map(|(k, v)| (k.as_str(), v))
	}

	pub fn index(&self) -> impl Iterator<Item = &Elapsed> + '_ {
		self.index.iter()
	}

	pub fn get(&self, metric: &str, key: &RunKey, at: &Elapsed) -> Option<f64> {
		self.metric(metric)?.get(key, at)
	}

	pub fn len(&self) -> usize {
		self.metrics.len()
	}

	pub fn is_empty(&self) -> bool {
		self.metrics.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn aligned(points: &[(i64, f64)]) -> Series<Elapsed> {
		points.iter().map(|(c, v)| (Elapsed::from_centis(*c), *v)).collect()
	}

	#[test]
	fn test_concat_unions_indices() {
		let frame = MetricFrame::concat(vec![
			(RunKey::Hash(1), aligned(&[(0, 1.0), (100, 2.0)])),
			(RunKey::Hash(2), aligned(&[(0, 3.0), (150, 4.0), (200, 5.0)])),
		]);
		assert_eq!(frame.len(), 2);
		assert_eq!(frame.keys(), vec![RunKey::Hash(1), RunKey::Hash(2)]);
		assert_eq!(
			frame.index().map(|e| e.centis()).collect::<Vec<_>>(),
			vec![0, 100, 150, 200]
		);
		assert_eq!(frame.get(&RunKey::Hash(1), &Elapsed::from_centis(100)), Some(2.0));
		assert_eq!(frame.get(&RunKey::Hash(1), &Elapsed::from_centis(150)), None);
		assert_eq!(frame.get(&RunKey::Hash(2), &Elapsed::from_centis(150)), Some(4.0));
	}

	#[test]
	fn test_count_skips_nan_and_takes_max_over_duplicates() {
		let frame = MetricFrame::concat(vec![
			(RunKey::Hash(7), aligned(&[(0, 1.0), (100, f64::NAN)])),
			(RunKey::Hash(7), aligned(&[(0, 1.0), (100, 2.0), (200, 3.0)])),
		]);
		assert_eq!(frame.keys(), vec![RunKey::Hash(7)]);
		assert_eq!(frame.len(), 2);
		assert_eq!(frame.count(&RunKey::Hash(7)), Some(3));
		assert_eq!(frame.column(&RunKey::Hash(7)).unwrap().count(), 1);
		assert_eq!(frame.count(&RunKey::Hash(8)), None);
	}

	#[test]
	fn test_step_frame_shares_index() {
		let mut step = StepFrame::new();
		step.insert("cpu.time", MetricFrame::concat(vec![(RunKey::Hash(1), aligned(&[(0, 1.0)]))]));
		step.insert("io.syscw", MetricFrame::concat(vec![(RunKey::Hash(1), aligned(&[(300, 2.0)]))]));
		assert_eq!(step.len(), 2);
		assert_eq!(step.index().map(|e| e.centis()).collect::<Vec<_>>(), vec![0, 300]);
		assert_eq!(step.get("io.syscw", &RunKey::Hash(1), &Elapsed::from_centis(300)), Some(2.0));
		assert_eq!(step.metrics().map(|(k, _)| k).collect::<Vec<_>>(), vec!["cpu.time", "io.syscw"]);
	}
}
