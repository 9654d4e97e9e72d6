use chrono::{DateTime, Utc};

use crate::metric::{Elapsed, OrderedVec, Series};

/// Julian day number of the unix epoch.
static UNIX_EPOCH_JULIAN_DAY: f64 = 2440587.5;

static SECONDS_PER_DAY: f64 = 86400.0;

/// Index types which can be placed on a continuous day-count axis.
pub trait TimeIndex {
	fn day_count(&self) -> f64;
}

impl TimeIndex for DateTime<Utc> {
	/// Julian date.
	fn day_count(&self) -> f64 {
		let secs = self.timestamp() as f64 + self.timestamp_subsec_nanos() as f64 * 1e-9;
		secs / SECONDS_PER_DAY + UNIX_EPOCH_JULIAN_DAY
	}
}

impl TimeIndex for Elapsed {
	fn day_count(&self) -> f64 {
		self.as_secs_f64() / SECONDS_PER_DAY
	}
}

/// Re-index a series to seconds elapsed since `start`.
///
/// Without an explicit start, the first sample marks the start of the run.
/// Offsets are fixed to two decimal places. Samples which land on the same
/// offset are collapsed, keeping the first one; the result is sorted by
/// offset.
///
/// Aligning an already aligned series is a no-op.
pub fn align_at_zero<I: TimeIndex>(series: &Series<I>, start: Option<&I>) -> Series<Elapsed> {
	let t0 = match start.or_else(|| series.first().map(|(i, _)| i)) {
		Some(t0) => t0.day_count(),
		None => return Series::new(),
	};
	let deduped: OrderedVec<Elapsed, f64> = series
		.iter()
		.map(|(i, v)| (Elapsed::from_secs_f64((i.day_count() - t0) * SECONDS_PER_DAY), *v))
		.collect();
	Series::from_points(deduped.into())
}
