// ─────────────────────────────────────────────────────────────────────
// PocKETlab Core — Bench Simulator CLI
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Runs the engine against the simulated bench.
//!
//! Commands are JSON lines (file or stdin); every outbound message is
//! printed to stdout as `{"topic": ..., "message": ...}`.

use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use lab_engine::postman::Messenger;
use lab_engine::runtime::LabRuntime;
use lab_engine::sim::SimulatedBench;
use lab_types::config::EngineConfig;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "lab-sim")]
#[command(about = "Drive the PocKETlab engine against a simulated resistive bench")]
struct Cli {
    /// Engine configuration JSON; defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON-lines command file; stdin when omitted.
    #[arg(long)]
    commands: Option<PathBuf>,

    /// How long to run the cooperative loop after the commands are read.
    #[arg(long, default_value_t = 2_000)]
    duration_ms: u64,

    /// Sleep between loop iterations.
    #[arg(long, default_value_t = 1)]
    idle_ms: u64,

    /// Standard deviation of read noise (V); 0 disables noise.
    #[arg(long, default_value_t = 0.0)]
    noise: f64,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Device under test on every channel.
    #[arg(long, default_value_t = 2.0)]
    dut_ohms: f64,

    #[arg(long, default_value_t = 1.0)]
    shunt_ohms: f64,
}

struct StdoutMessenger;

impl Messenger for StdoutMessenger {
    fn publish(&self, topic: &str, message: &Value) {
        let line = json!({"topic": topic, "message": message});
        let mut out = io::stdout().lock();
        if let Err(e) = writeln!(out, "{line}") {
            tracing::error!(error = %e, "stdout write failed");
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_writer(io::stderr)
        .try_init();
}

fn read_commands(path: Option<&PathBuf>) -> Result<Vec<String>> {
    let reader: Box<dyn BufRead> = match path {
        Some(p) => Box::new(BufReader::new(
            std::fs::File::open(p).with_context(|| format!("open command file {}", p.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };
    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line.context("read command line")?;
        if !line.trim().is_empty() {
            lines.push(line);
        }
    }
    Ok(lines)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = match &cli.config {
        Some(p) => EngineConfig::from_file(&p.to_string_lossy())
            .with_context(|| format!("load config {}", p.display()))?,
        None => EngineConfig::default(),
    };

    let mut bench = SimulatedBench::new(cli.dut_ohms, cli.shunt_ohms);
    if cli.noise > 0.0 {
        bench = bench.with_noise(cli.noise, cli.seed).context("configure read noise")?;
    }

    let commands = read_commands(cli.commands.as_ref())?;
    tracing::info!(commands = commands.len(), duration_ms = cli.duration_ms, "starting simulation");

    let mut runtime = LabRuntime::new(Arc::new(bench), Arc::new(StdoutMessenger), config);
    for command in &commands {
        runtime.submit(command);
    }
    runtime.run_for(
        Duration::from_millis(cli.duration_ms),
        Duration::from_millis(cli.idle_ms),
    );

    let stats = runtime.arbiter().control_stats();
    tracing::info!(
        iterations = runtime.iterations(),
        mode = runtime.current_mode().as_str(),
        control_ticks = stats.ticks,
        "simulation finished"
    );
    Ok(())
}
