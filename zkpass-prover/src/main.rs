// zkpass/zkpass-prover/src/main.rs

use std::{fs, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;

use zkpass_prover::{CircuitClient, CircuitInput, ProcessCircuitClient};

/// Feed a circuit input file to an external prover and store the proof.
#[derive(Parser)]
struct Args {
    #[arg(long)]
    input_json: PathBuf,
    #[arg(long)]
    output_proof: PathBuf,
    /// Prover program; receives the input on stdin, prints the proof on stdout.
    #[arg(long)]
    circuit_cmd: PathBuf,
    /// Extra arguments passed to the prover program.
    #[arg(long = "circuit-arg")]
    circuit_args: Vec<String>,
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let json = fs::read_to_string(&args.input_json)
        .with_context(|| format!("failed to read {}", args.input_json.display()))?;
    let input: CircuitInput =
        serde_json::from_str(&json).context("failed to parse circuit input json")?;

    let client = args
        .circuit_args
        .iter()
        .fold(ProcessCircuitClient::new(&args.circuit_cmd), |client, arg| {
            client.arg(arg.as_str())
        })
        .timeout(Duration::from_secs(args.timeout_secs));
    let proof = client.prove(&input).context("circuit client failed")?;

    let out = serde_json::to_string_pretty(&proof)?;
    fs::write(&args.output_proof, out)
        .with_context(|| format!("failed to write {}", args.output_proof.display()))?;
    println!("proof written to {}", args.output_proof.display());
    Ok(())
}
