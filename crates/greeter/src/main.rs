//! Greeter demo binary.
//!
//! Starts the greeter service on the in-process runtime, drives every method
//! once with the demo client, then shuts the server down gracefully.

use std::path::PathBuf;

use clap::Parser;
use cqrpc_greeter::GreeterApp;
use cqrpc_greeter::config::Config;
use tracing::info;

// Used by the library.
use bytes as _;
use cqrpc_dispatch as _;
use cqrpc_mem as _;
use postcard as _;
use serde as _;
use thiserror as _;
use toml as _;

/// Greeter command line arguments.
#[derive(Parser, Debug)]
#[command(name = "cqrpc-greeter")]
#[command(about = "Greeter service on the completion-queue call dispatcher")]
struct Args {
	/// TOML configuration file
	#[arg(short, long, value_name = "PATH")]
	config: Option<PathBuf>,

	/// Dispatch workers (overrides the configuration file)
	#[arg(short, long, value_name = "N")]
	workers: Option<usize>,

	/// Name sent by the demo client (overrides the configuration file)
	#[arg(short, long)]
	name: Option<String>,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	setup_tracing(args.verbose);

	let mut config = match &args.config {
		Some(path) => Config::load(path)?,
		None => Config::default(),
	};
	if let Some(workers) = args.workers {
		config.server.workers = workers;
	}
	if let Some(name) = args.name {
		config.demo.name = name;
	}

	info!(workers = config.server.workers, "starting cqrpc-greeter");

	let app = GreeterApp::new(&config)?;
	let serving = app.spawn();

	let outcome = cqrpc_greeter::demo::run(&app.client(), &config.demo).await;

	app.shutdown();
	serving.await??;

	let report = outcome?;
	println!("SayHello received: {}", report.say_hello);
	println!("SayHelloFunc1 received: {}", report.func1);
	println!("SayHelloFunc2 received: {}", report.func2);
	println!("SayHello2 received: size: {}", report.stream_replies);
	println!("SayHello3 received: {}", report.client_stream);
	println!("SayHello4 received: size: {}", report.bidi_replies);

	info!(stats = ?app.server().stats(), "cqrpc-greeter stopped");
	Ok(())
}

fn setup_tracing(verbose: bool) {
	use tracing_subscriber::EnvFilter;

	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
		if verbose {
			EnvFilter::new("cqrpc=debug,info")
		} else {
			EnvFilter::new("cqrpc=info,warn")
		}
	});

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_target(true)
		.init();
}
