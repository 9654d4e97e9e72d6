use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use smartstring::alias::{String as SmartString};

use serde_derive::{Deserialize, Serialize};

mod orderedvec;

pub use orderedvec::OrderedVec;

/// Leading component of all per-process metric names.
pub const PROCESS_PREFIX: &str = "exe";

/// Classified metric name.
///
/// Per-process metrics are named `exe.<step>.<pid>.<statistic>`, where the
/// statistic may itself contain dots (e.g. `cpu.time`). Everything else is a
/// host metric.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MetricName {
	Process {
		step: SmartString,
		/// Empty if the name ends after the step.
		pid: SmartString,
		/// Empty if the name ends after the pid.
		statistic: SmartString,
	},
	Host(SmartString),
}

impl MetricName {
	pub fn parse(name: &str) -> Self {
		let mut parts = name.splitn(4, '.');
		match (parts.next(), parts.next()) {
			(Some(PROCESS_PREFIX), Some(step)) if !step.is_empty() => Self::Process {
				step: step.into(),
				pid: parts.next().unwrap_or("").into(),
				statistic: parts.next().unwrap_or("").into(),
			},
			_ => Self::Host(name.into()),
		}
	}

	pub fn step(&self) -> Option<&str> {
		match self {
			Self::Process { step, .. } => Some(step),
			Self::Host(_) => None,
		}
	}

	/// Instance id (`exe.<step>.<pid>`) of a process metric.
	pub fn instance(&self) -> Option<SmartString> {
		match self {
			Self::Process { step, pid, .. } if !pid.is_empty() => {
				let mut result = SmartString::new();
				result.push_str(PROCESS_PREFIX);
				result.push('.');
				result.push_str(step);
				result.push('.');
				result.push_str(pid);
				Some(result)
			}
			_ => None,
		}
	}

	pub fn statistic(&self) -> Option<&str> {
		match self {
			Self::Process { statistic, .. } if !statistic.is_empty() => Some(statistic),
			_ => None,
		}
	}
}

impl fmt::Display for MetricName {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Host(name) => f.write_str(name),
			Self::Process { step, pid, statistic } => {
				write!(f, "{}.{}", PROCESS_PREFIX, step)?;
				for part in [pid, statistic] {
					if part.is_empty() {
						break;
					}
					write!(f, ".{}", part)?;
				}
				Ok(())
			}
		}
	}
}

/// Time elapsed since the start of a run, in hundredths of a second.
///
/// Integer storage makes elapsed offsets usable as exact, ordered index
/// keys when series of different runs are merged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Elapsed(i64);

impl Elapsed {
	pub const ZERO: Elapsed = Elapsed(0);

	pub fn from_centis(centis: i64) -> Self {
		Self(centis)
	}

	/// Fix a duration in seconds to two decimal places.
	pub fn from_secs_f64(secs: f64) -> Self {
		Self((secs * 100.0).round() as i64)
	}

	pub fn centis(&self) -> i64 {
		self.0
	}

	pub fn as_secs_f64(&self) -> f64 {
		self.0 as f64 / 100.0
	}
}

impl fmt::Display for Elapsed {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		let sign = if self.0 < 0 { "-" } else { "" };
		let abs = self.0.unsigned_abs();
		write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
	}
}

/// Sequence of samples in the order they were received.
#[derive(Clone, Debug, PartialEq)]
pub struct Series<I> {
	points: Vec<(I, f64)>,
}

impl<I> Default for Series<I> {
	fn default() -> Self {
		Self { points: Vec::new() }
	}
}

impl<I> Series<I> {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn from_points(points: Vec<(I, f64)>) -> Self {
		Self { points }
	}

	pub fn push(&mut self, index: I, value: f64) {
		self.points.push((index, value))
	}

	pub fn len(&self) -> usize {
		self.points.len()
	}

	pub fn is_empty(&self) -> bool {
		self.points.is_empty()
	}

	pub fn first(&self) -> Option<&(I, f64)> {
		self.points.first()
	}

	pub fn points(&self) -> &[(I, f64)] {
		&self.points
	}

	pub fn iter(&self) -> std::slice::Iter<'_, (I, f64)> {
		self.points.iter()
	}

	pub fn into_points(self) -> Vec<(I, f64)> {
		self.points
	}
}

impl<I: PartialOrd> Series<I> {
	/// Drop all samples outside of `[start, end]`.
	pub fn trim(&mut self, start: &I, end: &I) {
		self.points.retain(|(i, _)| i >= start && i <= end)
	}
}

impl<I> FromIterator<(I, f64)> for Series<I> {
	fn from_iter<T: IntoIterator<Item = (I, f64)>>(iter: T) -> Self {
		Self { points: iter.into_iter().collect() }
	}
}

/// Round a timestamp to the nearest full second, ties to even.
pub fn round_to_second(ts: &DateTime<Utc>) -> DateTime<Utc> {
	let secs = ts.timestamp();
	let nanos = ts.timestamp_subsec_nanos();
	let round_up = nanos > 500_000_000 || (nanos == 500_000_000 && secs % 2 != 0);
	let secs = if round_up { secs + 1 } else { secs };
	Utc.timestamp_opt(secs, 0).single().unwrap_or(*ts)
}

/// Where and when a run happened.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMeta {
	/// Host tag as reported by the TSDB, e.g. `host=node17`.
	pub host: SmartString,
	/// First sample timestamp, rounded to the second.
	pub start: DateTime<Utc>,
}

impl RunMeta {
	pub fn new(host: &str, first_sample: &DateTime<Utc>) -> Self {
		Self {
			host: host.into(),
			start: round_to_second(first_sample),
		}
	}
}

/// Identity of one run, used as column key in frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RunKey {
	Hash(u64),
	Start(DateTime<Utc>),
}

impl fmt::Display for RunKey {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Hash(h) => write!(f, "{:016x}", h),
			Self::Start(ts) => f.write_str(&ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
		}
	}
}

/// How run keys are derived from run metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyMode {
	/// Hash of start time, host and instance id.
	Hash,
	/// The start time itself.
	Timestamp,
}

impl Default for KeyMode {
	fn default() -> Self {
		Self::Hash
	}
}

impl KeyMode {
	/// Derive the key of a run.
	///
	/// All metrics of one instance share the rounded start time, so they map
	/// to the same key.
	pub fn key(&self, meta: &RunMeta, instance: &str) -> RunKey {
		match self {
			Self::Hash => {
				let mut hasher = DefaultHasher::new();
				meta.start.timestamp().hash(&mut hasher);
				meta.host.as_str().hash(&mut hasher);
				instance.hash(&mut hasher);
				RunKey::Hash(hasher.finish())
			}
			Self::Timestamp => RunKey::Start(meta.start),
		}
	}
}

/// Metadata of every run in a frame.
pub type RunIndex = BTreeMap<RunKey, RunMeta>;

/// Start time of a run, from its metadata or from the key itself.
pub fn run_start(key: &RunKey, runs: &RunIndex) -> Option<DateTime<Utc>> {
	match runs.get(key) {
		Some(meta) => Some(meta.start),
		None => match key {
			RunKey::Start(ts) => Some(*ts),
			RunKey::Hash(_) => None,
		},
	}
}
