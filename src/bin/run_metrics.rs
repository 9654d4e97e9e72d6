use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use env_logger;

use log::info;

use smartstring::alias::{String as SmartString};

use structopt::StructOpt;

use run_metrics::align::align_at_zero;
use run_metrics::assemble::{Assembler, Settings};
use run_metrics::catalog;
use run_metrics::config::Config;
use run_metrics::frame;
use run_metrics::metric::RunIndex;
use run_metrics::remote;
use run_metrics::tsdb::{FileSource, Source};

#[derive(StructOpt, Debug)]
#[structopt(name = "run_metrics")]
struct Opt {
	/// Configuration file; defaults apply if it does not exist.
	#[structopt(short, long, default_value = "config.toml", parse(from_os_str))]
	config: PathBuf,
	#[structopt(subcommand)]
	cmd: Cmd,
}

#[derive(StructOpt, Debug)]
struct Step {
	step: String,
	/// Stripped uid table dump.
	#[structopt(parse(from_os_str))]
	metrics_file: PathBuf,
	/// Read samples from a collector dump instead of querying the TSDB.
	#[structopt(long, parse(from_os_str))]
	from_dump: Option<PathBuf>,
}

#[derive(StructOpt, Debug)]
enum Cmd {
	/// Dump the uid table on the hbase host and copy it here.
	FetchMetadata {
		#[structopt(long, default_value = ".", parse(from_os_str))]
		dest: PathBuf,
	},
	/// Drop the binary uid rows from a uid table dump.
	Strip {
		#[structopt(parse(from_os_str))]
		input: PathBuf,
		#[structopt(default_value = "metrics", parse(from_os_str))]
		output: PathBuf,
	},
	/// List pipeline steps.
	Steps {
		#[structopt(parse(from_os_str))]
		metrics_file: PathBuf,
	},
	/// List host metrics.
	HostMetrics {
		#[structopt(parse(from_os_str))]
		metrics_file: PathBuf,
	},
	/// List the instances of a step.
	Instances {
		step: String,
		#[structopt(parse(from_os_str))]
		metrics_file: PathBuf,
	},
	/// List the metrics of a step.
	Metrics {
		step: String,
		#[structopt(parse(from_os_str))]
		metrics_file: PathBuf,
	},
	/// Build the step frame and the correlated host frame as CSV.
	Frame {
		#[structopt(flatten)]
		step: Step,
		#[structopt(long, default_value = "step.csv", parse(from_os_str))]
		out: PathBuf,
		/// Also correlate host metrics and write them here.
		#[structopt(long, parse(from_os_str))]
		host_out: Option<PathBuf>,
	},
	/// Plot run lengths of a step.
	#[cfg(feature = "plot")]
	Plot {
		#[structopt(flatten)]
		step: Step,
	},
	/// Fetch a single metric over the configured window.
	Query {
		metric: String,
		#[structopt(long, default_value = "")]
		tags: String,
		/// Print seconds since the first sample instead of timestamps.
		#[structopt(long)]
		aligned: bool,
	},
	/// Ask the TSDB to drop its caches.
	DropCaches,
}

fn print_all(names: impl IntoIterator<Item = SmartString>) {
	for name in names {
		println!("{}", name);
	}
}

async fn build_step_frame<S: Source>(
		assembler: &Assembler<S>,
		step: &Step) -> Result<(frame::StepFrame, RunIndex), Box<dyn std::error::Error>>
{
	let instances: Vec<_> = catalog::step_instances_in_file(&step.step, &step.metrics_file)?.into_iter().collect();
	let metrics: Vec<_> = catalog::step_metrics_in_file(&step.step, &step.metrics_file)?.into_iter().collect();
	info!("{} has {} instances and {} metrics", step.step, instances.len(), metrics.len());
	Ok(assembler.step_frame(&instances[..], &metrics[..]).await)
}

async fn run_frame<S: Source>(
		assembler: Assembler<S>,
		config: &Config,
		step: &Step,
		out: &Path,
		host_out: Option<&PathBuf>) -> Result<(), Box<dyn std::error::Error>>
{
	let (step_frame, runs) = build_step_frame(&assembler, step).await?;
	frame::write_step_frame(&step_frame, BufWriter::new(File::create(out)?))?;
	info!("wrote {} runs to {:?}", runs.len(), out);

	if let Some(host_out) = host_out {
		let host_metrics: Vec<_> = catalog::host_metrics_in_file(&step.metrics_file, &config.catalog.host_excludes[..])?
			.into_iter()
			.collect();
		let host_frame = assembler.host_frame(&step_frame, &runs, &host_metrics[..]).await;
		frame::write_step_frame(&host_frame, BufWriter::new(File::create(host_out)?))?;
		info!("wrote {} host metrics to {:?}", host_frame.len(), host_out);
	}
	Ok(())
}

#[cfg(feature = "plot")]
async fn run_plot<S: Source>(
		assembler: Assembler<S>,
		config: &Config,
		step: &Step) -> Result<(), Box<dyn std::error::Error>>
{
	use run_metrics::plot;

	let (step_frame, runs) = build_step_frame(&assembler, step).await?;
	let dir = &config.plot.output_dir;
	plot::plot_run_lengths(
		&step_frame,
		&runs,
		&config.plot.statistic,
		&dir.join(format!("{}-lengths.svg", step.step)),
	)?;
	plot::plot_run_length_histogram(
		&step_frame,
		&config.plot.statistic,
		config.plot.bins,
		&dir.join(format!("{}-histogram.svg", step.step)),
	)?;
	Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	env_logger::init();
	let opt = Opt::from_args();
	let config = Config::load(&opt.config)?;
	let settings = Settings::from_config(&config);

	match opt.cmd {
		Cmd::FetchMetadata{dest} => {
			let path = remote::fetch_metadata(&config.remote, &dest).await?;
			println!("{}", path.display());
		},
		Cmd::Strip{input, output} => {
			let kept = catalog::strip_file(&input, &output)?;
			info!("kept {} lines", kept);
			println!("{}", output.display());
		},
		Cmd::Steps{metrics_file} => print_all(catalog::steps_in_file(&metrics_file)?),
		Cmd::HostMetrics{metrics_file} => print_all(catalog::host_metrics_in_file(
			&metrics_file,
			&config.catalog.host_excludes[..],
		)?),
		Cmd::Instances{step, metrics_file} => print_all(catalog::step_instances_in_file(&step, &metrics_file)?),
		Cmd::Metrics{step, metrics_file} => print_all(catalog::step_metrics_in_file(&step, &metrics_file)?),
		Cmd::Frame{step, out, host_out} => match &step.from_dump {
			Some(dump) => {
				let source = FileSource::new(dump.clone(), config.tsdb.file_precision);
				run_frame(Assembler::new(source, settings), &config, &step, &out, host_out.as_ref()).await?
			},
			None => {
				let client = config.tsdb.build_client()?;
				run_frame(Assembler::new(client, settings), &config, &step, &out, host_out.as_ref()).await?
			},
		},
		#[cfg(feature = "plot")]
		Cmd::Plot{step} => match &step.from_dump {
			Some(dump) => {
				let source = FileSource::new(dump.clone(), config.tsdb.file_precision);
				run_plot(Assembler::new(source, settings), &config, &step).await?
			},
			None => {
				let client = config.tsdb.build_client()?;
				run_plot(Assembler::new(client, settings), &config, &step).await?
			},
		},
		Cmd::Query{metric, tags, aligned} => {
			let client = config.tsdb.build_client()?;
			let query = settings.query(&metric, settings.start, settings.end).with_tags(&tags);
			let fetched = client.query(&query).await?;
			if let Some(meta) = fetched.meta.as_ref() {
				info!("{} started at {} on {}", metric, meta.start, meta.host);
			}
			if aligned {
				for (at, v) in align_at_zero(&fetched.series, None).iter() {
					println!("{} {}", at, v);
				}
			} else {
				for (at, v) in fetched.series.iter() {
					println!("{} {}", at.to_rfc3339(), v);
				}
			}
		},
		Cmd::DropCaches => {
			let client = config.tsdb.build_client()?;
			if client.drop_caches().await? {
				println!("Caches dropped.");
			} else {
				return Err("tsdb did not confirm dropping its caches".into());
			}
		},
	}
	Ok(())
}
