//! Prepare Host
//!
//! Runs the standard encryption-preparation workflow.
//!
//! By default the workflow runs against an in-memory Ubuntu 20.04 host and prints
//! every host effect it would have applied. With `--apply` it runs against this
//! machine, which needs root and will patch units, stage initramfs scripts, and stop
//! snap units.
//!
//! Run with: cargo run --example prepare_host -- [--apply] [config.json]

use cryptprep::testing::TestHost;
use cryptprep::{EncryptionConfig, EncryptionContext, EncryptionResult, EncryptionStateMachine, RunReport};
use log::{LevelFilter, Metadata, Record};
use std::path::PathBuf;
use std::sync::Arc;

/// Prints `log` records from the workflow to stdout.
struct StdoutLog;

impl log::Log for StdoutLog {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.target().starts_with("cryptprep")
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            println!("  | {}", record.args());
        }
    }

    fn flush(&self) {}
}

static STDOUT_LOG: StdoutLog = StdoutLog;

fn main() {
    let mut apply = false;
    let mut config_path = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--apply" => apply = true,
            path => config_path = Some(PathBuf::from(path)),
        }
    }

    let result = if apply {
        run_on_this_host(config_path)
    } else {
        dry_run()
    };

    match result {
        Ok(report) => print_report(&report),
        Err(err) => {
            eprintln!("\nPreparation failed: {err}");
            std::process::exit(1);
        }
    }
}

fn dry_run() -> EncryptionResult<RunReport> {
    println!("=== Dry run against an in-memory host ===\n");
    let host = TestHost::new();
    host.seed_prerequisites("[Unit]\nDescription=Azure Linux Agent\n\n[Service]\nType=simple\n");

    let mut machine = EncryptionStateMachine::standard(host.context())?;
    let report = machine.run()?;

    println!("\nHost effects:");
    for event in host.journal.events() {
        println!("  {event:?}");
    }
    Ok(report)
}

fn run_on_this_host(config_path: Option<PathBuf>) -> EncryptionResult<RunReport> {
    println!("=== Preparing this host ===\n");
    let config = match config_path {
        Some(path) => EncryptionConfig::load(&path)?,
        None => EncryptionConfig::default(),
    };

    let _ = log::set_logger(&STDOUT_LOG).map(|()| log::set_max_level(LevelFilter::Info));
    let context = EncryptionContext::system(config)?;

    let mut machine = EncryptionStateMachine::standard(Arc::new(context))?;
    machine.run()
}

fn print_report(report: &RunReport) {
    println!("\n=== Summary ===");
    println!("Completed: {:?}", report.completed);
    println!("Skipped:   {:?}", report.skipped);
    if let Some(id) = &report.resumed_from {
        println!("Resumed from checkpoint {id}");
    }
    if let Some(duration) = report.history.duration() {
        println!("Took {duration:?}");
    }
}
