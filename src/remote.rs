use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use log::{debug, info};

use tokio::process::Command;

use crate::config::RemoteConfig;

#[derive(Debug)]
pub enum Error {
	IO(io::Error),
	Failed{command: &'static str, status: ExitStatus, stderr: String},
	MissingUser,
}

impl fmt::Display for Error {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::IO(e) => write!(f, "failed to spawn: {}", e),
			Self::Failed{command, status, stderr} => {
				write!(f, "{} failed ({})", command, status)?;
				if !stderr.trim().is_empty() {
					write!(f, ": {}", stderr.trim())?;
				}
				Ok(())
			},
			Self::MissingUser => f.write_str("no remote user configured and $USER is unset"),
		}
	}
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Self {
		Self::IO(e)
	}
}

/// Shell command which dumps the uid table into `~/<file>` on the hbase host.
pub fn scan_command(hbase_bin: &str, file: &str) -> String {
	format!("cd {} ; export JAVA_HOME=/usr ; ./hbase shell ./scan > ~/{}", hbase_bin, file)
}

/// `scp` source of the dump.
pub fn copy_source(user: &str, host: &str, file: &str) -> String {
	format!("{}@{}:{}", user, host, file)
}

async fn run(command: &'static str, cmd: &mut Command) -> Result<(), Error> {
	debug!("running {:?}", cmd);
	let output = cmd.output().await?;
	if !output.status.success() {
		return Err(Error::Failed{
			command,
			status: output.status,
			stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
		});
	}
	Ok(())
}

/// Dump the uid table on the hbase host and copy the dump into `dest_dir`.
///
/// Returns the local path of the dump.
pub async fn fetch_metadata(config: &RemoteConfig, dest_dir: &Path) -> Result<PathBuf, Error> {
	let user = match config.user.clone().or_else(|| std::env::var("USER").ok()) {
		Some(v) => v,
		None => return Err(Error::MissingUser),
	};

	info!("scanning uid table on {}", config.host);
	run("ssh", Command::new("ssh")
		.arg(&config.host)
		.arg(scan_command(&config.hbase_bin, &config.file))).await?;

	info!("copying {} from {}", config.file, config.host);
	run("scp", Command::new("scp")
		.arg(copy_source(&user, &config.host, &config.file))
		.arg(dest_dir)).await?;

	Ok(dest_dir.join(&config.file))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_scan_command() {
		assert_eq!(
			scan_command("hbase-1.2.3/bin", "tsdb-uid.scan"),
			"cd hbase-1.2.3/bin ; export JAVA_HOME=/usr ; ./hbase shell ./scan > ~/tsdb-uid.scan"
		);
	}

	#[test]
	fn test_copy_source() {
		assert_eq!(copy_source("analyst", "hbase1", "dump"), "analyst@hbase1:dump");
	}

	#[tokio::test]
	async fn test_failed_command_is_reported() {
		match run("false", &mut Command::new("false")).await {
			Err(Error::Failed{command: "false", ..}) => (),
			Err(Error::IO(_)) => (), // no coreutils
			other => panic!("unexpected result: {:?}", other),
		}
	}
}
