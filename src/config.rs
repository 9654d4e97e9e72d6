use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use log::info;

use serde_derive::Deserialize;

use crate::catalog;
use crate::metric::KeyMode;
use crate::tsdb;

#[derive(Debug)]
pub enum Error {
	IO(io::Error),
	Parse(toml::de::Error),
}

impl fmt::Display for Error {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::IO(e) => write!(f, "failed to read config: {}", e),
			Self::Parse(e) => write!(f, "invalid config: {}", e),
		}
	}
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Self {
		Self::IO(e)
	}
}

impl From<toml::de::Error> for Error {
	fn from(e: toml::de::Error) -> Self {
		Self::Parse(e)
	}
}

fn default_host() -> String {
	"localhost".into()
}

fn default_port() -> u16 {
	4242
}

fn default_window_start() -> DateTime<Utc> {
	Utc.with_ymd_and_hms(2016, 1, 18, 14, 10, 0).unwrap()
}

fn default_window_end() -> DateTime<Utc> {
	Utc.with_ymd_and_hms(2016, 12, 24, 11, 30, 0).unwrap()
}

fn default_reference_metric() -> String {
	"io.syscw".into()
}

fn default_host_excludes() -> Vec<String> {
	catalog::DEFAULT_HOST_EXCLUDES.iter().map(|s| s.to_string()).collect()
}

fn default_hbase_bin() -> String {
	"hbase-1.2.3/bin".into()
}

fn default_scan_file() -> String {
	"tsdb-uid.scan".into()
}

fn default_statistic() -> String {
	"stat.stime".into()
}

fn default_bins() -> usize {
	50
}

fn default_output_dir() -> PathBuf {
	".".into()
}

fn default_file_precision() -> tsdb::Precision {
	tsdb::Precision::Milliseconds
}

fn bool_true() -> bool {
	true
}

#[derive(Debug, Clone, Deserialize)]
pub struct Window {
	#[serde(default = "default_window_start")]
	pub start: DateTime<Utc>,
	#[serde(default = "default_window_end")]
	pub end: DateTime<Utc>,
}

impl Default for Window {
	fn default() -> Self {
		Self{
			start: default_window_start(),
			end: default_window_end(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct TsdbConfig {
	#[serde(default = "default_host")]
	pub host: String,
	#[serde(default = "default_port")]
	pub port: u16,
	#[serde(default)]
	pub auth: tsdb::Auth,
	#[serde(default)]
	pub aggregator: tsdb::Aggregator,
	#[serde(default)]
	pub downsample: Option<String>,
	#[serde(default)]
	pub rate: bool,
	#[serde(default = "bool_true")]
	pub trim: bool,
	/// Request timeout in seconds.
	#[serde(default)]
	pub timeout: Option<f64>,
	#[serde(default)]
	pub window: Window,
	/// Timestamp unit of collector dump files.
	#[serde(default = "default_file_precision")]
	pub file_precision: tsdb::Precision,
}

impl Default for TsdbConfig {
	fn default() -> Self {
		Self{
			host: default_host(),
			port: default_port(),
			auth: tsdb::Auth::default(),
			aggregator: tsdb::Aggregator::default(),
			downsample: None,
			rate: false,
			trim: true,
			timeout: None,
			window: Window::default(),
			file_precision: default_file_precision(),
		}
	}
}

impl TsdbConfig {
	pub fn base_url(&self) -> String {
		format!("http://{}:{}", self.host, self.port)
	}

	pub fn build_client(&self) -> Result<tsdb::Client, tsdb::Error> {
		let timeout = self.timeout.map(Duration::from_secs_f64);
		let mut client = tsdb::Client::with_timeout(self.base_url(), self.auth.clone(), timeout)?;
		client.set_trim(self.trim);
		Ok(client)
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrameConfig {
	#[serde(default)]
	pub key: KeyMode,
	/// Metric whose columns define the runs and their lengths during host
	/// correlation.
	#[serde(default = "default_reference_metric")]
	pub reference_metric: String,
}

impl Default for FrameConfig {
	fn default() -> Self {
		Self{
			key: KeyMode::default(),
			reference_metric: default_reference_metric(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
	#[serde(default = "default_host_excludes")]
	pub host_excludes: Vec<String>,
}

impl Default for CatalogConfig {
	fn default() -> Self {
		Self{
			host_excludes: default_host_excludes(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
	#[serde(default = "default_host")]
	pub host: String,
	/// Location of the hbase binaries on `host`, relative to the login
	/// directory or absolute.
	#[serde(default = "default_hbase_bin")]
	pub hbase_bin: String,
	#[serde(default = "default_scan_file")]
	pub file: String,
	/// Login name for the copy; `$USER` if unset.
	#[serde(default)]
	pub user: Option<String>,
}

impl Default for RemoteConfig {
	fn default() -> Self {
		Self{
			host: default_host(),
			hbase_bin: default_hbase_bin(),
			file: default_scan_file(),
			user: None,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlotConfig {
	#[serde(default = "default_statistic")]
	pub statistic: String,
	#[serde(default = "default_bins")]
	pub bins: usize,
	#[serde(default = "default_output_dir")]
	pub output_dir: PathBuf,
}

impl Default for PlotConfig {
	fn default() -> Self {
		Self{
			statistic: default_statistic(),
			bins: default_bins(),
			output_dir: default_output_dir(),
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
	#[serde(default)]
	pub tsdb: TsdbConfig,
	#[serde(default)]
	pub frame: FrameConfig,
	#[serde(default)]
	pub catalog: CatalogConfig,
	#[serde(default)]
	pub remote: RemoteConfig,
	#[serde(default)]
	pub plot: PlotConfig,
}

impl Config {
	/// Read the config file; a missing file yields the defaults.
	pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
		let path = path.as_ref();
		let config_s = match std::fs::read_to_string(path) {
			Ok(s) => s,
			Err(e) if e.kind() == io::ErrorKind::NotFound => {
				info!("no config at {:?}, using defaults", path);
				return Ok(Self::default());
			},
			Err(e) => return Err(e.into()),
		};
		Ok(toml::from_str(&config_s)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_empty_config_is_default() {
		let config: Config = toml::from_str("").unwrap();
		assert_eq!(config.tsdb.port, 4242);
		assert_eq!(config.tsdb.aggregator, tsdb::Aggregator::Avg);
		assert!(config.tsdb.trim);
		assert_eq!(config.tsdb.window.start, default_window_start());
		assert_eq!(config.frame.key, KeyMode::Hash);
		assert_eq!(config.frame.reference_metric, "io.syscw");
		assert_eq!(config.catalog.host_excludes, vec!["exe", "net", "tcollector"]);
		assert_eq!(config.plot.bins, 50);
	}

	#[test]
	fn test_full_config() {
		let config: Config = toml::from_str(r#"
			[tsdb]
			host = "spui.example.org"
			port = 4343
			aggregator = "max"
			downsample = "1m-avg"
			rate = true
			timeout = 2.5
			file_precision = "Seconds"

			[tsdb.auth]
			type = "HTTP"
			username = "u"
			password = "p"

			[tsdb.window]
			start = "2016-05-01T00:00:00Z"

			[frame]
			key = "timestamp"
			reference_metric = "stat.stime"

			[remote]
			host = "hbase.example.org"
			user = "analyst"
		"#).unwrap();
		assert_eq!(config.tsdb.base_url(), "http://spui.example.org:4343");
		assert_eq!(config.tsdb.aggregator, tsdb::Aggregator::Max);
		assert_eq!(config.tsdb.downsample.as_deref(), Some("1m-avg"));
		assert!(config.tsdb.rate);
		assert_eq!(config.tsdb.timeout, Some(2.5));
		assert_eq!(config.tsdb.file_precision, tsdb::Precision::Seconds);
		assert_eq!(config.tsdb.window.start, Utc.with_ymd_and_hms(2016, 5, 1, 0, 0, 0).unwrap());
		assert_eq!(config.tsdb.window.end, default_window_end());
		assert_eq!(config.frame.key, KeyMode::Timestamp);
		assert_eq!(config.remote.user.as_deref(), Some("analyst"));
		assert_eq!(config.remote.file, "tsdb-uid.scan");
	}

	#[test]
	fn test_missing_file_is_default() {
		let config = Config::load("/nonexistent/run_metrics/config.toml").unwrap();
		assert_eq!(config.tsdb.host, "localhost");
	}
}
