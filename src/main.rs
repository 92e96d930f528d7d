use clap::{Arg, ArgAction, ArgMatches, Command};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use tidesync::config::{parse_duration_option, Config, ModifyWindow};
use tidesync::error::ConfigError;
use tidesync::logging::*;
use tidesync::scheduler;

fn build_command() -> Command {
	Command::new("tidesync")
		.version(env!("CARGO_PKG_VERSION"))
		.about("Two-way sync between a local directory and an rclone remote")
		.arg(Arg::new("remote_path").required(true).help("rclone remote, e.g. gdrive:Sync"))
		.arg(Arg::new("local_path").required(true).help("Local directory"))
		.arg(
			Arg::new("config")
				.short('c')
				.long("config")
				.value_name("FILE")
				.help("TOML configuration file; command line options override it"),
		)
		.arg(
			Arg::new("poll-interval")
				.long("poll-interval")
				.value_name("DURATION")
				.help("Time between remote listings [default: 1s]"),
		)
		.arg(
			Arg::new("modify-window")
				.long("modify-window")
				.value_name("DURATION")
				.help("Timestamp tolerance, passed verbatim to rclone [default: 1s]"),
		)
		.arg(
			Arg::new("batch-cooldown")
				.long("batch-cooldown")
				.value_name("DURATION")
				.help("Quiet time after the last change before syncing [default: 1s]"),
		)
		.arg(
			Arg::new("transfers")
				.short('j')
				.long("transfers")
				.value_name("N")
				.value_parser(clap::value_parser!(usize))
				.help("Concurrent rclone operations [default: 4]"),
		)
		.arg(Arg::new("rclone").long("rclone").value_name("PATH").help("rclone executable"))
		.arg(
			Arg::new("rclone-arg")
				.long("rclone-arg")
				.value_name("FLAG")
				.action(ArgAction::Append)
				.allow_hyphen_values(true)
				.help("Extra flag for every rclone call (repeatable)"),
		)
		.arg(
			Arg::new("exclude")
				.short('x')
				.long("exclude")
				.value_name("GLOB")
				.action(ArgAction::Append)
				.help("Exclude matching paths on both sides (repeatable)"),
		)
		.arg(
			Arg::new("dedupe")
				.long("dedupe")
				.action(ArgAction::SetTrue)
				.help("Run rclone dedupe (newest) on the remote around each sync"),
		)
		.arg(
			Arg::new("dry-run")
				.short('n')
				.long("dry-run")
				.action(ArgAction::SetTrue)
				.help("Log planned operations without running them"),
		)
		.arg(
			Arg::new("verbose")
				.short('v')
				.long("verbose")
				.action(ArgAction::SetTrue)
				.help("Debug logging"),
		)
}

/// Defaults, then the config file, then command line options
fn config_from_matches(matches: &ArgMatches) -> Result<Config, ConfigError> {
	let mut config = match matches.get_one::<String>("config") {
		Some(file) => Config::from_file(&PathBuf::from(file))?,
		None => Config::default(),
	};

	if let Some(remote) = matches.get_one::<String>("remote_path") {
		config.remote_path = remote.clone();
	}
	if let Some(local) = matches.get_one::<String>("local_path") {
		config.local_path = PathBuf::from(local);
	}
	if let Some(value) = matches.get_one::<String>("poll-interval") {
		config.poll_interval = parse_duration_option("--poll-interval", value)?;
	}
	if let Some(value) = matches.get_one::<String>("modify-window") {
		config.modify_window = ModifyWindow::parse(value)?;
	}
	if let Some(value) = matches.get_one::<String>("batch-cooldown") {
		config.batch_cooldown = parse_duration_option("--batch-cooldown", value)?;
	}
	if let Some(transfers) = matches.get_one::<usize>("transfers") {
		config.transfers = *transfers;
	}
	if let Some(rclone) = matches.get_one::<String>("rclone") {
		config.rclone = rclone.clone();
	}
	if let Some(args) = matches.get_many::<String>("rclone-arg") {
		config.rclone_args.extend(args.cloned());
	}
	if let Some(patterns) = matches.get_many::<String>("exclude") {
		config.exclude_patterns.extend(patterns.cloned());
	}
	if matches.get_flag("dedupe") {
		config.dedupe = true;
	}
	if matches.get_flag("dry-run") {
		config.dry_run = true;
	}
	if matches.get_flag("verbose") {
		config.log_level = "debug".to_string();
	}

	Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
	let matches = build_command().get_matches();

	let config = match config_from_matches(&matches) {
		Ok(config) => config,
		Err(e) => {
			init_tracing("info");
			error!("{}", e);
			return ExitCode::FAILURE;
		}
	};
	init_tracing(&config.log_level);

	match scheduler::run(config).await {
		Ok(summary) => {
			if summary.failed_actions > 0 {
				info!("{} action(s) failed during this run and will be retried on the next start", summary.failed_actions);
			}
			ExitCode::SUCCESS
		}
		Err(e) => {
			error!("{}", e);
			if let Some(source) = e.source() {
				debug!("Caused by: {}", source);
			}
			ExitCode::FAILURE
		}
	}
}


// vim: ts=4
