use std::time::Duration;

use log::debug;

use serde_derive::{Deserialize, Serialize};

use super::{parse_response, Error, Fetched, Precision, Query, Source};

static CACHES_DROPPED: &str = "Caches dropped.";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Auth {
	None,
	HTTP{username: String, password: String},
}

impl Default for Auth {
	fn default() -> Self {
		Self::None
	}
}

impl Auth {
	pub fn apply(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
		match self {
			Self::None => req,
			Self::HTTP{username, password} => req.basic_auth(username, Some(password)),
		}
	}
}

/// HTTP client for the TSDB query interface.
pub struct Client {
	client: reqwest::Client,
	base_url: String,
	auth: Auth,
	trim: bool,
}

impl Client {
	pub fn new(base_url: String, auth: Auth) -> Self {
		Self{
			client: reqwest::Client::new(),
			base_url: base_url.trim_end_matches('/').to_string(),
			auth,
			trim: true,
		}
	}

	pub fn with_timeout(
			base_url: String,
			auth: Auth,
			timeout: Option<Duration>) -> Result<Self, Error>
	{
		let mut builder = reqwest::Client::builder();
		if let Some(timeout) = timeout {
			builder = builder.timeout(timeout);
		}
		let mut result = Self::new(base_url, auth);
		result.client = builder.build()?;
		Ok(result)
	}

	/// Whether samples outside the query window are dropped. On by default,
	/// the TSDB returns extra samples around the window edges.
	pub fn set_trim(&mut self, trim: bool) {
		self.trim = trim;
	}

	async fn get(&self, path: &str) -> Result<String, Error> {
		let url = format!("{}/{}", self.base_url, path);
		debug!("GET {}", url);
		let req = self.auth.apply(self.client.get(url));
		let resp = req.send().await?;
		match resp.error_for_status() {
			Ok(resp) => Ok(resp.text().await?),
			Err(e) => match e.status() {
				Some(status) => Err(Error::Status(status)),
				None => Err(Error::Request(e)),
			},
		}
	}

	/// Fetch a single time series.
	///
	/// An empty answer is an empty series, not an error.
	pub async fn query(&self, query: &Query) -> Result<Fetched, Error> {
		let body = self.get(&query.path()).await?;
		let mut fetched = parse_response(&body, Precision::Seconds)?;
		if self.trim {
			fetched.trim(&query.start, &query.end);
		}
		Ok(fetched)
	}

	/// Ask the TSDB to drop its caches. Returns whether it confirmed.
	pub async fn drop_caches(&self) -> Result<bool, Error> {
		let body = self.get("dropcaches").await?;
		Ok(body.trim() == CACHES_DROPPED)
	}
}

impl Source for Client {
	async fn fetch(&self, query: &Query) -> Result<Fetched, Error> {
		self.query(query).await
	}
}
