use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use antho_ledger::{
    auth::{self, SignedCall},
    call::{self, Operation, Response},
    config::{load_ledger, save_ledger, CliConfig},
    ledger::{Ledger, Principal},
};

#[derive(Parser)]
#[command(name = "antho", version, about = "AnthoCoin ledger tool")]
struct Cli {
    #[command(flatten)]
    config: CliConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a fresh, uninitialized ledger owned by the deployer
    Deploy {
        #[arg(long)]
        deployer: String,
        /// Overwrite an existing state file
        #[arg(long)]
        force: bool,
    },
    /// Generate an Ed25519 keypair and print its principal
    Keygen {
        #[arg(long)]
        out_dir: PathBuf,
    },
    /// Apply an operation as an unauthenticated development caller
    Call {
        #[arg(long)]
        caller: String,
        /// Operation JSON, e.g. '{"op":"burn","amount":5}'
        operation: String,
    },
    /// Sign an operation; prints the signed call JSON
    Sign {
        #[arg(long)]
        sk_hex: String,
        operation: String,
        /// Defaults to the signer's next nonce in the state file
        #[arg(long)]
        nonce: Option<u64>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Verify and apply a signed call file
    Submit { signed_call: PathBuf },
    /// Answer a read-only operation
    Query { operation: String },
    /// Print token metadata, owner and supply
    Info,
    /// Recheck supply accounting and the snapshot state root
    Verify,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.config.log_filter);
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let state = cli.config.state_path();
    match cli.command {
        Command::Deploy { deployer, force } => deploy_cmd(state, deployer, force),
        Command::Keygen { out_dir } => keygen_cmd(&out_dir),
        Command::Call { caller, operation } => {
            let op = parse_operation(&operation)?;
            apply(state, &Principal::new(caller), op)
        }
        Command::Sign {
            sk_hex,
            operation,
            nonce,
            out,
        } => sign_cmd(state, &sk_hex, &operation, nonce, out.as_deref()),
        Command::Submit { signed_call } => submit_cmd(state, &signed_call),
        Command::Query { operation } => {
            let op = parse_operation(&operation)?;
            if !op.is_read_only() {
                bail!("query only accepts read-only operations; use `call` or `submit`");
            }
            let ledger = open(state)?;
            respond(call::query(&ledger, op).into())
        }
        Command::Info => {
            let ledger = open(state)?;
            print_json(&ledger.token_info())?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Verify => {
            let ledger = open(state)?;
            ledger.check_invariants()?;
            let snapshot = ledger.snapshot();
            println!(
                "ledger ok: accounts={}, total_supply={}, state_root={}",
                snapshot.balances.len(),
                snapshot.total_supply,
                snapshot.state_root
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

//==================== commands ====================//

fn deploy_cmd(state: &Path, deployer: String, force: bool) -> Result<ExitCode> {
    if state.exists() && !force {
        bail!(
            "{} already exists; pass --force to redeploy",
            state.display()
        );
    }
    let ledger = Ledger::deploy(Principal::new(deployer));
    save_ledger(state, &ledger).with_context(|| format!("write {}", state.display()))?;
    info!(owner = %ledger.owner(), state = %state.display(), "ledger deployed");
    Ok(ExitCode::SUCCESS)
}

fn keygen_cmd(out_dir: &Path) -> Result<ExitCode> {
    fs::create_dir_all(out_dir).with_context(|| format!("mkdir {}", out_dir.display()))?;
    let sk = auth::generate_keypair();
    let principal = auth::principal_of(&sk.verifying_key());

    fs::write(out_dir.join("sk.hex"), hex::encode(sk.to_bytes()))?;
    fs::write(
        out_dir.join("pk.hex"),
        hex::encode(sk.verifying_key().as_bytes()),
    )?;
    fs::write(out_dir.join("principal.txt"), principal.as_str())?;
    println!("{principal}");
    info!(out_dir = %out_dir.display(), "keypair written");
    Ok(ExitCode::SUCCESS)
}

fn sign_cmd(
    state: &Path,
    sk_hex: &str,
    operation: &str,
    nonce: Option<u64>,
    out: Option<&Path>,
) -> Result<ExitCode> {
    let key = auth::parse_signing_key(sk_hex)?;
    let op = parse_operation(operation)?;
    let nonce = match nonce {
        Some(nonce) => nonce,
        None => open(state)?.next_nonce(&auth::principal_of(&key.verifying_key())),
    };
    let signed = SignedCall::sign(&key, nonce, op)?;
    let json = serde_json::to_string_pretty(&signed)?;
    match out {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
            info!(path = %path.display(), "signed call written");
        }
        None => println!("{json}"),
    }
    Ok(ExitCode::SUCCESS)
}

fn submit_cmd(state: &Path, signed_call: &Path) -> Result<ExitCode> {
    let bytes =
        fs::read(signed_call).with_context(|| format!("read {}", signed_call.display()))?;
    let signed: SignedCall = serde_json::from_slice(&bytes).context("parse signed call")?;
    let mut ledger = open(state)?;
    let (caller, op) = signed.admit(&mut ledger)?;
    let response = call::execute(&mut ledger, &caller, op);
    // the nonce is spent whether or not the call itself succeeded
    save_ledger(state, &ledger).with_context(|| format!("write {}", state.display()))?;
    respond(response)
}

//==================== helpers ====================//

fn open(state: &Path) -> Result<Ledger> {
    load_ledger(state).with_context(|| format!("load ledger from {}", state.display()))
}

fn parse_operation(json: &str) -> Result<Operation> {
    serde_json::from_str(json).context("parse operation JSON")
}

fn apply(state: &Path, caller: &Principal, op: Operation) -> Result<ExitCode> {
    let mut ledger = open(state)?;
    let read_only = op.is_read_only();
    let response = call::execute(&mut ledger, caller, op);
    if response.is_ok() && !read_only {
        save_ledger(state, &ledger).with_context(|| format!("write {}", state.display()))?;
    }
    respond(response)
}

fn respond(response: Response) -> Result<ExitCode> {
    print_json(&response)?;
    Ok(if response.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
