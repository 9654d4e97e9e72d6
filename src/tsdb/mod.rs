use std::fmt;
use std::io;

use chrono::{DateTime, TimeZone, Utc};

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use serde_derive::{Deserialize, Serialize};

use crate::metric::{RunMeta, Series};

mod client;
mod file;

pub use client::{Auth, Client};
pub use file::FileSource;

/// Time format of the `start` and `end` query parameters.
pub static QUERY_TIME_FORMAT: &str = "%Y/%m/%d-%H:%M:%S";

const EXPRESSION_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
	.remove(b'.')
	.remove(b'-')
	.remove(b'_');

#[derive(Debug)]
pub enum Error {
	Request(reqwest::Error),
	Status(reqwest::StatusCode),
	Malformed{line: usize, reason: &'static str},
	IO(io::Error),
}

impl fmt::Display for Error {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Request(e) => fmt::Display::fmt(e, f),
			Self::Status(s) => write!(f, "tsdb responded with {}", s),
			Self::Malformed{line, reason} => write!(f, "malformed response line {}: {}", line, reason),
			Self::IO(e) => write!(f, "i/o error: {}", e),
		}
	}
}

impl std::error::Error for Error {}

impl From<reqwest::Error> for Error {
	fn from(err: reqwest::Error) -> Self {
		Self::Request(err)
	}
}

impl From<io::Error> for Error {
	fn from(err: io::Error) -> Self {
		Self::IO(err)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregator {
	Min,
	Sum,
	Max,
	Avg,
}

impl Aggregator {
	pub fn value(&self) -> &'static str {
		match self {
			Self::Min => "min",
			Self::Sum => "sum",
			Self::Max => "max",
			Self::Avg => "avg",
		}
	}
}

impl Default for Aggregator {
	fn default() -> Self {
		Self::Avg
	}
}

/// Unit of the raw timestamps in a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precision {
	Milliseconds,
	Seconds,
}

impl Precision {
	pub fn decode_timestamp(&self, raw: i64) -> Option<DateTime<Utc>> {
		match self {
			Self::Seconds => Utc.timestamp_opt(raw, 0).single(),
			Self::Milliseconds => Utc.timestamp_millis_opt(raw).single(),
		}
	}
}

/// Query for a single metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
	pub metric: String,
	pub start: DateTime<Utc>,
	pub end: DateTime<Utc>,
	/// Tag filter such as `host=foo,type=user|system`; empty for none.
	pub tags: String,
	pub aggregator: Aggregator,
	/// Downsampling spec such as `60m-avg`.
	pub downsample: Option<String>,
	pub rate: bool,
}

impl Query {
	pub fn new(metric: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
		Self {
			metric: metric.to_string(),
			start,
			end,
			tags: String::new(),
			aggregator: Aggregator::default(),
			downsample: None,
			rate: false,
		}
	}

	pub fn with_tags(mut self, tags: &str) -> Self {
		self.tags = tags.to_string();
		self
	}

	/// The `m` parameter, e.g. `avg:60m-avg:rate:proc.loadavg{host=a}`.
	pub fn expression(&self) -> String {
		let mut result = self.aggregator.value().to_string();
		if let Some(downsample) = self.downsample.as_ref().map(|d| d.trim()) {
			if !downsample.is_empty() {
				result.push(':');
				result.push_str(downsample);
			}
		}
		if self.rate {
			result.push_str(":rate");
		}
		result.push(':');
		result.push_str(&self.metric);
		if !self.tags.is_empty() {
			result.push('{');
			result.push_str(&self.tags);
			result.push('}');
		}
		result
	}

	/// Path and query string relative to the TSDB root, asking for the
	/// plain text response format.
	pub fn path(&self) -> String {
		format!(
			"q?start={}&end={}&m={}&ascii",
			utf8_percent_encode(&self.start.format(QUERY_TIME_FORMAT).to_string(), EXPRESSION_ESCAPE),
			utf8_percent_encode(&self.end.format(QUERY_TIME_FORMAT).to_string(), EXPRESSION_ESCAPE),
			utf8_percent_encode(&self.expression(), EXPRESSION_ESCAPE),
		)
	}
}

/// Result of a single query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Fetched {
	pub series: Series<DateTime<Utc>>,
	/// Absent for empty responses and for responses without tags.
	pub meta: Option<RunMeta>,
}

impl Fetched {
	pub fn trim(&mut self, start: &DateTime<Utc>, end: &DateTime<Utc>) {
		self.series.trim(start, end)
	}
}

/// Parse plain text response lines of the form
/// `<metric> <timestamp> <value> [<tag>...]`.
///
/// The run metadata takes the host tag from the last line and the start
/// time from the first.
pub fn parse_response(body: &str, precision: Precision) -> Result<Fetched, Error> {
	let mut series = Series::new();
	let mut host = None;
	for (lineno, line) in body.lines().enumerate() {
		if line.trim().is_empty() {
			continue;
		}
		let mut fields = line.split_whitespace();
		let _metric = fields.next();
		let timestamp = match fields.next().map(|v| v.parse::<i64>()) {
			Some(Ok(v)) => v,
			Some(Err(_)) => return Err(Error::Malformed{line: lineno + 1, reason: "invalid timestamp"}),
			None => return Err(Error::Malformed{line: lineno + 1, reason: "missing timestamp"}),
		};
		let timestamp = match precision.decode_timestamp(timestamp) {
			Some(v) => v,
			None => return Err(Error::Malformed{line: lineno + 1, reason: "timestamp out of range"}),
		};
		let value = match fields.next().map(|v| v.parse::<f64>()) {
			Some(Ok(v)) => v,
			Some(Err(_)) => return Err(Error::Malformed{line: lineno + 1, reason: "invalid value"}),
			None => return Err(Error::Malformed{line: lineno + 1, reason: "missing value"}),
		};
		host = fields.next();
		series.push(timestamp, value);
	}

	let meta = match (series.first(), host) {
		(Some((first, _)), Some(host)) => Some(RunMeta::new(host, first)),
		_ => None,
	};
	Ok(Fetched{series, meta})
}

/// Something that answers metric queries.
#[allow(async_fn_in_trait)]
pub trait Source {
	async fn fetch(&self, query: &Query) -> Result<Fetched, Error>;
}
