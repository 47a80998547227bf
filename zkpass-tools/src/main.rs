use std::{fs, io, path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use halo2curves_axiom::bn256::Fr;
use serde::Serialize;
use serde_json::json;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zkpass_common::{
    decode_str, decrypt_fields, encode_str, encrypt_fields, fr_to_hex, nullifier, parse_fr,
    secret_hash, AdmissionProof, CriteriaOp, EventId, Groth16Proof, Organizer, FIELD_COUNT,
};
use zkpass_prover::ProcessCircuitClient;
use zkpass_registry::{
    AdmissionStatus, ErrorContext, EventDetails, EventInfo, KvStore, Registry, RegistryConfig,
    RegistryError,
};
use zkpass_verifier::{Groth16Verifier, SnarkVerifier, VerifierError, VerifyingKey};

const DEFAULT_DB_PATH: &str = "zkpass-db";

#[derive(Parser)]
#[command(name = "zkpass", about = "Operate a zkpass identity registry")]
struct Cli {
    #[command(flatten)]
    opts: GlobalOpts,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalOpts {
    /// Registry database directory (falls back to ZKPASS_REGISTRY_DB).
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Number of recent roots accepted at admission (falls back to ZKPASS_ROOT_HISTORY).
    #[arg(long, global = true)]
    root_history: Option<usize>,
    /// Groth16 verifying key JSON (falls back to ZKPASS_VK_PATH).
    #[arg(long, global = true)]
    vk: Option<PathBuf>,
    /// Print JSON instead of text.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt attributes under a secret and add the user to the registry.
    Register(RegisterArgs),
    /// Show the stored record for a user.
    User(UserArgs),
    /// Print the Merkle path of a leaf.
    TreeProof {
        #[arg(long)]
        index: u64,
    },
    /// Create an event with a single eligibility criterion.
    CreateEvent(CreateEventArgs),
    /// List all events in creation order.
    Events,
    /// Show one event and its admission count.
    Event {
        #[arg(long)]
        id: EventId,
    },
    /// Derive the nullifier a user would spend at an event.
    Nullifier {
        #[arg(long)]
        event: EventId,
        #[arg(long, value_parser = fr_arg)]
        secret: Fr,
    },
    /// Encrypt plaintext attributes without touching the registry.
    Encrypt(CipherArgs),
    /// Decrypt stored attribute ciphertexts.
    Decrypt(CipherArgs),
    /// Build the circuit input for a user and run an external prover on it.
    Prove(ProveArgs),
    /// Verify a proof file and admit its holder to an event.
    Admit {
        #[arg(long)]
        event: EventId,
        #[arg(long)]
        proof: PathBuf,
    },
    /// Check whether a nullifier has been spent at an event.
    Status {
        #[arg(long)]
        event: EventId,
        #[arg(long, value_parser = fr_arg)]
        nullifier: Fr,
    },
}

#[derive(Args)]
struct RegisterArgs {
    #[arg(long, value_parser = fr_arg)]
    secret: Fr,
    /// Attribute value: decimal, 0x-hex field element, or text up to 31 bytes.
    #[arg(long = "field", value_parser = attribute_arg, num_args = 1)]
    fields: Vec<Fr>,
}

#[derive(Args)]
struct UserArgs {
    #[arg(long, value_parser = fr_arg, conflicts_with = "secret_hash")]
    secret: Option<Fr>,
    #[arg(long, value_parser = fr_arg)]
    secret_hash: Option<Fr>,
}

#[derive(Args)]
struct CreateEventArgs {
    #[arg(long)]
    organizer: Organizer,
    #[arg(long)]
    field_index: u64,
    /// Comparison: eq, gte, lte, or the raw op code.
    #[arg(long, value_parser = op_code_arg)]
    op: u64,
    #[arg(long, value_parser = attribute_arg)]
    value: Fr,
    #[arg(long)]
    name: String,
    #[arg(long)]
    loc: Option<String>,
    #[arg(long)]
    desc: Option<String>,
    #[arg(long)]
    url: Option<String>,
}

#[derive(Args)]
struct CipherArgs {
    #[arg(long, value_parser = fr_arg)]
    secret: Fr,
    #[arg(long = "field", value_parser = attribute_arg, num_args = 1)]
    fields: Vec<Fr>,
}

#[derive(Args)]
struct ProveArgs {
    #[arg(long)]
    event: EventId,
    #[arg(long, value_parser = fr_arg)]
    secret: Fr,
    /// Prover program; reads the circuit input on stdin, prints the proof on stdout.
    #[arg(long)]
    circuit_cmd: PathBuf,
    #[arg(long = "circuit-arg")]
    circuit_args: Vec<String>,
    #[arg(long)]
    out: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,zkpass=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let json = cli.opts.json;
    let command = match cli.command {
        Commands::Encrypt(args) => return encrypt(args, json),
        Commands::Decrypt(args) => return decrypt(args, json),
        Commands::Nullifier { event, secret } => {
            let value = nullifier(&event.to_fr(), &secret);
            return output(&json!({ "event": event, "nullifier": fr_to_hex(&value) }), json);
        }
        other => other,
    };

    let config = load_config(&cli.opts);
    let registry = open_registry(&config)?;
    let result = match command {
        Commands::Register(args) => register(&registry, args, json),
        Commands::User(args) => user(&registry, args, json),
        Commands::TreeProof { index } => {
            let path = registry.get_proof(index)?;
            if json {
                output(&path, true)
            } else {
                println!("{path}");
                Ok(())
            }
        }
        Commands::CreateEvent(args) => create_event(&registry, args, json),
        Commands::Events => {
            let events = registry.get_events()?;
            if json {
                output(&events, true)
            } else {
                for event in events {
                    println!("{}  {}  {}", event.id, event.criteria, event.name);
                }
                Ok(())
            }
        }
        Commands::Event { id } => show_event(&registry, &id, json),
        Commands::Prove(args) => prove(&registry, &config, args),
        Commands::Admit { event, proof } => admit(&registry, &config, &event, &proof, json),
        Commands::Status { event, nullifier } => {
            let status = registry.admission_status(&event, &nullifier)?;
            println!("{}", render_status(&status, json)?);
            Ok(())
        }
        Commands::Encrypt(_) | Commands::Decrypt(_) | Commands::Nullifier { .. } => Ok(()),
    };
    registry.flush()?;
    result
}

fn load_config(opts: &GlobalOpts) -> RegistryConfig {
    let mut config = RegistryConfig::from_env();
    if let Some(db) = &opts.db {
        config.db_path = Some(db.clone());
    }
    if let Some(size) = opts.root_history {
        config.root_history_size = size;
    }
    if let Some(vk) = &opts.vk {
        config.verifying_key_path = Some(vk.clone());
    }
    config
}

fn open_registry(config: &RegistryConfig) -> Result<Registry> {
    let path = config
        .db_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));
    let store = KvStore::persistent(&path)
        .with_context(|| format!("failed to open registry at {}", path.display()))?;
    let verifier: Arc<dyn SnarkVerifier> = match &config.verifying_key_path {
        Some(vk_path) => {
            let vk = VerifyingKey::load(vk_path)
                .with_context(|| format!("failed to load verifying key {}", vk_path.display()))?;
            Arc::new(Groth16Verifier::new(vk)?)
        }
        None => Arc::new(NoVerifyingKey),
    };
    Ok(Registry::open(store, verifier, config.clone())?)
}

/// Stand-in used when the command never verifies proofs.
struct NoVerifyingKey;

impl SnarkVerifier for NoVerifyingKey {
    fn verify(&self, _proof: &Groth16Proof, _inputs: &[Fr]) -> Result<bool, VerifierError> {
        Err(VerifierError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            "no verifying key configured",
        )))
    }
}

fn register(registry: &Registry, args: RegisterArgs, json: bool) -> Result<()> {
    if args.fields.len() != FIELD_COUNT {
        bail!("expected {FIELD_COUNT} --field values, got {}", args.fields.len());
    }
    let encrypted = encrypt_fields(&args.secret, &args.fields);
    let registration = registry.register(secret_hash(&args.secret), encrypted)?;
    info!(index = registration.tree_index, "registered");
    if json {
        output(
            &json!({
                "treeIndex": registration.tree_index,
                "leaf": fr_to_hex(&registration.leaf),
                "root": fr_to_hex(&registration.root),
            }),
            true,
        )
    } else {
        println!("{registration}");
        Ok(())
    }
}

fn user(registry: &Registry, args: UserArgs, json: bool) -> Result<()> {
    let hash = match (args.secret, args.secret_hash) {
        (Some(secret), _) => secret_hash(&secret),
        (None, Some(hash)) => hash,
        (None, None) => bail!("pass --secret or --secret-hash"),
    };
    let record = registry.get_user(&hash)?;
    if !record.exists {
        bail!("no user with secret hash {}", fr_to_hex(&hash));
    }
    if json {
        return output(&record, true);
    }
    println!("index: {}", record.tree_index);
    println!("leaf: {}", fr_to_hex(&record.leaf));
    for (i, value) in record.encrypted_fields.iter().enumerate() {
        println!("field[{i}]: {}", fr_to_hex(value));
    }
    if let Some(secret) = args.secret {
        for (i, value) in decrypt_fields(&secret, &record.encrypted_fields).iter().enumerate() {
            println!("plain[{i}]: {}", describe_attribute(value));
        }
    }
    Ok(())
}

fn create_event(registry: &Registry, args: CreateEventArgs, json: bool) -> Result<()> {
    let info = EventInfo::from_details(&EventDetails {
        loc: args.loc,
        desc: args.desc,
        url: args.url,
    })?;
    let event = registry.create_event(
        args.organizer,
        args.field_index,
        args.op,
        args.value,
        &args.name,
        info,
    )?;
    if json {
        output(event.event(), true)
    } else {
        println!("{}", event.id());
        Ok(())
    }
}

fn show_event(registry: &Registry, id: &EventId, json: bool) -> Result<()> {
    let Some(event) = registry.event(id)? else {
        return Err(RegistryError::EventNotFound(*id).into());
    };
    let parsed = event.info();
    let admitted = event.admitted_count()?;
    if json {
        return output(
            &json!({
                "event": event.event(),
                "details": parsed.details,
                "warning": parsed.warning,
                "admitted": admitted,
            }),
            true,
        );
    }
    println!("id: {}", event.id());
    println!("name: {}", event.name());
    println!("organizer: {}", event.organizer());
    println!("criteria: {}", event.event().criteria);
    for (label, value) in [
        ("loc", &parsed.details.loc),
        ("desc", &parsed.details.desc),
        ("url", &parsed.details.url),
    ] {
        if let Some(value) = value {
            println!("{label}: {value}");
        }
    }
    if let Some(warning) = parsed.warning {
        println!("warning: {warning}");
    }
    println!("admitted: {admitted}");
    Ok(())
}

fn prove(registry: &Registry, config: &RegistryConfig, args: ProveArgs) -> Result<()> {
    let event = registry
        .event(&args.event)?
        .ok_or(RegistryError::EventNotFound(args.event))?;
    let client = args
        .circuit_args
        .iter()
        .fold(ProcessCircuitClient::new(&args.circuit_cmd), |client, arg| {
            client.arg(arg.as_str())
        })
        .timeout(config.prover_timeout());
    let proof = event
        .request_proof(&client, &args.secret)
        .map_err(report)?;
    fs::write(&args.out, serde_json::to_string_pretty(&proof)?)
        .with_context(|| format!("failed to write {}", args.out.display()))?;
    println!("proof written to {}", args.out.display());
    Ok(())
}

fn admit(
    registry: &Registry,
    config: &RegistryConfig,
    event: &EventId,
    proof_path: &PathBuf,
    json: bool,
) -> Result<()> {
    if config.verifying_key_path.is_none() {
        bail!("admission needs a verifying key: pass --vk or set ZKPASS_VK_PATH");
    }
    let raw = fs::read_to_string(proof_path)
        .with_context(|| format!("failed to read {}", proof_path.display()))?;
    let proof: AdmissionProof =
        serde_json::from_str(&raw).context("failed to parse admission proof json")?;
    let receipt = registry.verify_and_admit(event, &proof).map_err(report)?;
    if json {
        output(&receipt, true)
    } else {
        println!(
            "admitted to {} as token {} (nullifier {})",
            receipt.event_id,
            receipt.token_id,
            fr_to_hex(&receipt.nullifier)
        );
        Ok(())
    }
}

fn encrypt(args: CipherArgs, json: bool) -> Result<()> {
    let encrypted = encrypt_fields(&args.secret, &args.fields);
    let hex: Vec<String> = encrypted.iter().map(fr_to_hex).collect();
    if json {
        return output(&json!({ "secretHash": fr_to_hex(&secret_hash(&args.secret)), "fields": hex }), true);
    }
    hex.iter().for_each(|value| println!("{value}"));
    Ok(())
}

fn decrypt(args: CipherArgs, json: bool) -> Result<()> {
    let plain = decrypt_fields(&args.secret, &args.fields);
    if json {
        let hex: Vec<String> = plain.iter().map(fr_to_hex).collect();
        return output(&json!({ "fields": hex }), true);
    }
    plain.iter().for_each(|value| println!("{}", describe_attribute(value)));
    Ok(())
}

/// Log the structured error context before handing the error to anyhow.
fn report(err: RegistryError) -> anyhow::Error {
    let context = ErrorContext::from(&err);
    if let Ok(line) = serde_json::to_string(&context) {
        eprintln!("{line}");
    }
    err.into()
}

fn output<T>(value: &T, json: bool) -> Result<()>
where
    T: Serialize + ?Sized,
{
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", serde_json::to_string(value)?);
    }
    Ok(())
}

fn render_status(status: &AdmissionStatus, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(status)?);
    }
    Ok(match status {
        AdmissionStatus::NotAdmitted => "not admitted".to_string(),
        AdmissionStatus::Admitted { token_id } => format!("admitted (token {token_id})"),
    })
}

/// Printable text first; small numbers pack to control bytes and fall through.
fn describe_attribute(value: &Fr) -> String {
    match decode_str(value) {
        Ok(text) if !text.is_empty() && !text.chars().any(char::is_control) => {
            format!("{text:?}")
        }
        _ => match zkpass_common::fr_to_u64(value) {
            Ok(n) => n.to_string(),
            Err(_) => fr_to_hex(value),
        },
    }
}

fn fr_arg(value: &str) -> Result<Fr, String> {
    parse_fr(value).map_err(|err| err.to_string())
}

/// Numbers and field elements parse as such; anything else is packed as text.
fn attribute_arg(value: &str) -> Result<Fr, String> {
    if value.starts_with("0x") || (!value.is_empty() && value.chars().all(|c| c.is_ascii_digit())) {
        return fr_arg(value);
    }
    encode_str(value).map_err(|err| err.to_string())
}

fn op_code_arg(value: &str) -> Result<u64, String> {
    let op = match value.to_ascii_lowercase().as_str() {
        "eq" | "==" => CriteriaOp::Eq,
        "gte" | ">=" => CriteriaOp::Gte,
        "lte" | "<=" => CriteriaOp::Lte,
        other => return other.parse::<u64>().map_err(|_| format!("unknown op {value}")),
    };
    Ok(op.code())
}
