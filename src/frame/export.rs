use std::io;

use super::{MetricFrame, StepFrame};

fn format_value(v: Option<f64>) -> String {
	match v {
		Some(v) if !v.is_nan() => format!("{}", v),
		_ => String::new(),
	}
}

/// Write a frame as CSV: one row per elapsed offset, one column per run.
///
/// Missing samples are written as empty cells.
pub fn write_metric_frame<W: io::Write>(frame: &MetricFrame, dest: W) -> csv::Result<()> {
	let mut writer = csv::Writer::from_writer(dest);
	let mut header = Vec::with_capacity(frame.len() + 1);
	header.push("elapsed".to_string());
	header.extend(frame.columns().iter().map(|c| c.key().to_string()));
	writer.write_record(&header)?;

	for at in frame.index() {
		let mut row = Vec::with_capacity(header.len());
		row.push(at.to_string());
		row.extend(frame.columns().iter().map(|c| format_value(c.get(at))));
		writer.write_record(&row)?;
	}
	writer.flush()?;
	Ok(())
}

/// Write a step frame as CSV with `<metric>/<run>` column titles.
pub fn write_step_frame<W: io::Write>(frame: &StepFrame, dest: W) -> csv::Result<()> {
	let mut writer = csv::Writer::from_writer(dest);
	let mut header = vec!["elapsed".to_string()];
	for (metric, metric_frame) in frame.metrics() {
		header.extend(metric_frame.columns().iter().map(|c| format!("{}/{}", metric, c.key())));
	}
	writer.write_record(&header)?;

	for at in frame.index() {
		let mut row = Vec::with_capacity(header.len());
		row.push(at.to_string());
		for (_, metric_frame) in frame.metrics() {
			row.extend(metric_frame.columns().iter().map(|c| format_value(c.get(at))));
		}
		writer.write_record(&row)?;
	}
	writer.flush()?;
	Ok(())
}
