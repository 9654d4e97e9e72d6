//! Metric discovery from a dump of the TSDB uid table.
//!
//! The uid table holds every name twice, once per lookup direction. Lines
//! of the reverse (id to name) direction start with an escaped binary id
//! and are dropped by [`strip_lines`]. In the remaining lines the first
//! whitespace-delimited token is the name.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use log::debug;

use smartstring::alias::{String as SmartString};

use crate::metric::MetricName;

/// Start of lines holding a binary uid.
static BINARY_MARKER: &[u8] = b" \\x";

/// Column qualifier of metric name rows.
static METRICS_QUALIFIER: &str = "metrics";

/// Name fragments which exclude a metric from the host metrics.
pub static DEFAULT_HOST_EXCLUDES: &[&str] = &["exe", "net", "tcollector"];

fn for_each_line<R: BufRead, F: FnMut(&str)>(mut source: R, mut f: F) -> io::Result<()> {
	let mut buf = Vec::new();
	loop {
		buf.clear();
		if source.read_until(b'\n', &mut buf)? == 0 {
			return Ok(());
		}
		f(&String::from_utf8_lossy(&buf));
	}
}

fn first_token(line: &str) -> Option<&str> {
	line.split_whitespace().next()
}

fn process_name(line: &str) -> Option<MetricName> {
	match MetricName::parse(first_token(line)?) {
		name @ MetricName::Process{..} => Some(name),
		MetricName::Host(_) => None,
	}
}

/// Copy all lines which do not start with a binary uid.
///
/// Returns the number of lines kept.
pub fn strip_lines<R: BufRead, W: Write>(mut source: R, mut dest: W) -> io::Result<usize> {
	let mut buf = Vec::new();
	let mut kept = 0;
	loop {
		buf.clear();
		if source.read_until(b'\n', &mut buf)? == 0 {
			break;
		}
		if buf.starts_with(BINARY_MARKER) {
			continue;
		}
		dest.write_all(&buf)?;
		kept += 1;
	}
	dest.flush()?;
	Ok(kept)
}

/// [`strip_lines`] from `input` into a new file at `output`.
pub fn strip_file<P: AsRef<Path>, Q: AsRef<Path>>(input: P, output: Q) -> io::Result<usize> {
	let source = BufReader::new(File::open(input)?);
	let dest = BufWriter::new(File::create(output.as_ref())?);
	let kept = strip_lines(source, dest)?;
	debug!("kept {} lines in {:?}", kept, output.as_ref());
	Ok(kept)
}

/// All pipeline steps.
pub fn steps<R: BufRead>(source: R) -> io::Result<BTreeSet<SmartString>> {
	let mut result = BTreeSet::new();
	for_each_line(source, |line| {
		if let Some(step) = process_name(line).as_ref().and_then(MetricName::step) {
			result.insert(step.into());
		}
	})?;
	Ok(result)
}

/// All metrics which are neither per-process nor excluded by one of the
/// name fragments in `excludes`.
pub fn host_metrics<R: BufRead, S: AsRef<str>>(source: R, excludes: &[S]) -> io::Result<BTreeSet<SmartString>> {
	let mut result = BTreeSet::new();
	for_each_line(source, |line| {
		if !line.contains(METRICS_QUALIFIER) {
			return;
		}
		let name = match first_token(line) {
			Some(v) => v,
			None => return,
		};
		if excludes.iter().any(|e| name.contains(e.as_ref())) {
			return;
		}
		result.insert(name.into());
	})?;
	Ok(result)
}

/// All instance ids (`exe.<step>.<pid>`) of a step.
pub fn step_instances<R: BufRead>(step: &str, source: R) -> io::Result<BTreeSet<SmartString>> {
	let mut result = BTreeSet::new();
	for_each_line(source, |line| {
		let name = match process_name(line) {
			Some(v) => v,
			None => return,
		};
		if name.step() != Some(step) {
			return;
		}
		if let Some(instance) = name.instance() {
			result.insert(instance);
		}
	})?;
	Ok(result)
}

/// All statistics recorded for a step, e.g. `cpu.time`.
pub fn step_metrics<R: BufRead>(step: &str, source: R) -> io::Result<BTreeSet<SmartString>> {
	let mut result = BTreeSet::new();
	for_each_line(source, |line| {
		let name = match process_name(line) {
			Some(v) => v,
			None => return,
		};
		if name.step() != Some(step) {
			return;
		}
		if let Some(statistic) = name.statistic() {
			result.insert(statistic.into());
		}
	})?;
	Ok(result)
}

fn open<P: AsRef<Path>>(path: P) -> io::Result<BufReader<File>> {
	Ok(BufReader::new(File::open(path)?))
}

pub fn steps_in_file<P: AsRef<Path>>(path: P) -> io::Result<BTreeSet<SmartString>> {
	steps(open(path)?)
}

pub fn host_metrics_in_file<P: AsRef<Path>, S: AsRef<str>>(path: P, excludes: &[S]) -> io::Result<BTreeSet<SmartString>> {
	host_metrics(open(path)?, excludes)
}

pub fn step_instances_in_file<P: AsRef<Path>>(step: &str, path: P) -> io::Result<BTreeSet<SmartString>> {
	step_instances(step, open(path)?)
}

pub fn step_metrics_in_file<P: AsRef<Path>>(step: &str, path: P) -> io::Result<BTreeSet<SmartString>> {
	step_metrics(step, open(path)?)
}

#[cfg(test)]
mod tests {
	use super::*;

	static DUMP: &str = "\
exe.stepA.123.cpu.time column=id:metrics, timestamp=1453126200, value=\\x00\\x00\\x01\n \
\\x00\\x00\\x01 column=name:metrics, timestamp=1453126200, value=exe.stepA.123.cpu.time\n\
exe.stepA.456.cpu.time column=id:metrics, timestamp=1453126201, value=\\x00\\x00\\x02\n\
exe.stepA.456.io.syscw column=id:metrics, timestamp=1453126201, value=\\x00\\x00\\x03\n\
exe.stepB.789.cpu.time column=id:metrics, timestamp=1453126202, value=\\x00\\x00\\x04\n\
proc.meminfo.buffers column=id:metrics, timestamp=1453126202, value=\\x00\\x00\\x05\n\
proc.net.bytes column=id:metrics, timestamp=1453126202, value=\\x00\\x00\\x06\n\
tcollector.reader.lines_collected column=id:metrics, timestamp=1453126202, value=\\x00\\x00\\x07\n\
host column=id:tagk, timestamp=1453126202, value=\\x00\\x00\\x01\n\
\n\
ROW COLUMN+CELL\n";

	fn names(set: BTreeSet<SmartString>) -> Vec<String> {
		set.into_iter().map(|s| s.to_string()).collect()
	}

	fn stripped() -> Vec<u8> {
		let mut out = Vec::new();
		strip_lines(DUMP.as_bytes(), &mut out).unwrap();
		out
	}

	#[test]
	fn test_strip_drops_binary_rows() {
		let out = stripped();
		let out = String::from_utf8(out).unwrap();
		assert_eq!(out.lines().count(), DUMP.lines().count() - 1);
		assert!(!out.contains("column=name:metrics"));
	}

	#[test]
	fn test_steps_from_two_instances() {
		let dump = "exe.stepA.123.cpu.time 5 0.2\nexe.stepA.456.cpu.time 7 0.3\n";
		assert_eq!(names(steps(dump.as_bytes()).unwrap()), vec!["stepA"]);
	}

	#[test]
	fn test_steps() {
		assert_eq!(names(steps(&stripped()[..]).unwrap()), vec!["stepA", "stepB"]);
	}

	#[test]
	fn test_host_metrics() {
		assert_eq!(
			names(host_metrics(&stripped()[..], DEFAULT_HOST_EXCLUDES).unwrap()),
			vec!["proc.meminfo.buffers"]
		);
		let none: &[&str] = &[];
		assert_eq!(host_metrics(&stripped()[..], none).unwrap().len(), 7);
	}

	#[test]
	fn test_step_instances() {
		assert_eq!(
			names(step_instances("stepA", &stripped()[..]).unwrap()),
			vec!["exe.stepA.123", "exe.stepA.456"]
		);
		assert!(step_instances("stepC", &stripped()[..]).unwrap().is_empty());
	}

	#[test]
	fn test_step_metrics() {
		assert_eq!(
			names(step_metrics("stepA", &stripped()[..]).unwrap()),
			vec!["cpu.time", "io.syscw"]
		);
		assert_eq!(names(step_metrics("stepB", &stripped()[..]).unwrap()), vec!["cpu.time"]);
	}

	#[test]
	fn test_strip_file() {
		let dir = std::env::temp_dir();
		let input = dir.join(format!("run_metrics_scan_{}", std::process::id()));
		let output = dir.join(format!("run_metrics_stripped_{}", std::process::id()));
		std::fs::write(&input, DUMP).unwrap();
		let kept = strip_file(&input, &output).unwrap();
		let steps = steps_in_file(&output).unwrap();
		std::fs::remove_file(&input).unwrap();
		std::fs::remove_file(&output).unwrap();
		assert_eq!(kept, DUMP.lines().count() - 1);
		assert_eq!(names(steps), vec!["stepA", "stepB"]);
	}
}
