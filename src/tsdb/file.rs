use std::path::PathBuf;

use log::debug;

use super::{parse_response, Error, Fetched, Precision, Query, Source};

static PUT_MARKER: &str = "put ";

/// Select the samples of `metric` from collector output.
///
/// Collector output consists of `put <metric> <timestamp> <value> <tags...>`
/// lines. A line is selected if its metric matches exactly and it contains
/// every tag in `tags`. The `put ` prefix is stripped from the result.
pub fn select_put_lines<'x>(dump: &'x str, metric: &str, tags: &[&str]) -> Vec<&'x str> {
	dump.lines()
		.filter_map(|line| {
			let at = line.find(PUT_MARKER)?;
			let rest = &line[at + PUT_MARKER.len()..];
			if rest.split_whitespace().next() != Some(metric) {
				return None;
			}
			if !tags.iter().all(|tag| rest.contains(tag)) {
				return None;
			}
			Some(rest)
		})
		.collect()
}

/// Answers queries from a collector dump file instead of a live TSDB.
pub struct FileSource {
	path: PathBuf,
	precision: Precision,
}

impl FileSource {
	pub fn new(path: PathBuf, precision: Precision) -> Self {
		Self{path, precision}
	}
}

impl Source for FileSource {
	async fn fetch(&self, query: &Query) -> Result<Fetched, Error> {
		let dump = tokio::fs::read_to_string(&self.path).await?;
		let tags: Vec<&str> = query.tags.split(',').filter(|t| !t.is_empty()).collect();
		let lines = select_put_lines(&dump, &query.metric, &tags);
		debug!("{} lines for {} in {:?}", lines.len(), query.metric, self.path);
		let mut fetched = parse_response(&lines.join("\n"), self.precision)?;
		fetched.trim(&query.start, &query.end);
		Ok(fetched)
	}
}
