mod files;
mod json;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rand::rngs::OsRng;
use serde_bytes::ByteBuf;
use tokio::fs;
use tracing_subscriber::EnvFilter;

use sos_core::peer::gestalt_keys;
use sos_core::{
    CapabilityKind, Clock, Dictionary, Ed25519Crypto, PeerConfig, PeerCrypto, PeerDate, PeerEngine,
    PeerOptions, SystemClock,
};

use crate::files::{
    bundle_timestamp, read_gestalt, read_private_key, read_public_key, read_record, write_record,
    KeyPairPaths, PublicKeyBundle, SecretKeyBundle, KEY_BUNDLE_VERSION,
};
use crate::json::record_summary;

#[derive(Parser)]
#[command(name = "sos", version, about = "Peer identity records for secure object syncing", long_about = None)]
struct Cli {
    /// TOML file with engine settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new peer signing key.
    Keygen(KeygenArgs),
    /// Create and sign a new peer record.
    Create(CreateArgs),
    /// Print a record as JSON.
    Show(RecordArgs),
    /// Check a record's self-signature.
    Verify(RecordArgs),
    /// Turn a record into an applicant vouched for by a sponsor.
    Apply(ApplyArgs),
    /// Check an applicant against its sponsor's public key.
    #[command(name = "verify-application")]
    VerifyApplication(VerifyApplicationArgs),
    /// Mark a record as retired.
    Retire(UpdateArgs),
    /// Report whether a retirement ticket is effective.
    #[command(name = "inspect-retirement")]
    InspectRetirement(InspectRetirementArgs),
    /// Set or clear the backup key.
    #[command(name = "set-backup-key")]
    SetBackupKey(SetBackupKeyArgs),
    /// Enable or disable views.
    #[command(subcommand)]
    View(ViewCommands),
    /// Stamp a fresh ping nonce.
    Ping(UpdateArgs),
}

#[derive(Subcommand)]
enum ViewCommands {
    Enable(ViewArgs),
    Disable(ViewArgs),
}

#[derive(Args)]
struct KeygenArgs {
    #[arg(long)]
    out: PathBuf,
}

#[derive(Args)]
struct CreateArgs {
    /// Private key bundle from `sos keygen`.
    #[arg(long)]
    key: PathBuf,
    /// JSON object used as the gestalt.
    #[arg(long)]
    gestalt: Option<PathBuf>,
    /// Device name; overrides `ComputerName` from the gestalt file.
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    backup_key: Option<String>,
    #[arg(long)]
    device_id: Option<String>,
    #[arg(long)]
    transport: Option<String>,
    #[arg(long)]
    serial_number: Option<String>,
    #[arg(long)]
    prefer_ids: bool,
    #[arg(long = "view")]
    views: Vec<String>,
    #[arg(long)]
    out: PathBuf,
}

#[derive(Args)]
struct RecordArgs {
    #[arg(long)]
    record: PathBuf,
}

#[derive(Args)]
struct UpdateArgs {
    #[arg(long)]
    record: PathBuf,
    #[arg(long)]
    key: PathBuf,
    #[arg(long)]
    out: PathBuf,
}

#[derive(Args)]
struct ApplyArgs {
    #[command(flatten)]
    update: UpdateArgs,
    /// Sponsor's private key bundle.
    #[arg(long)]
    sponsor: PathBuf,
}

#[derive(Args)]
struct VerifyApplicationArgs {
    #[arg(long)]
    record: PathBuf,
    /// Sponsor's `.pub` bundle.
    #[arg(long)]
    sponsor: PathBuf,
}

#[derive(Args)]
struct InspectRetirementArgs {
    #[arg(long)]
    record: PathBuf,
    /// Evaluate at this Unix time in milliseconds instead of now.
    #[arg(long)]
    at_ms: Option<i64>,
}

#[derive(Args)]
struct SetBackupKeyArgs {
    #[command(flatten)]
    update: UpdateArgs,
    /// Hex-encoded backup public key.
    #[arg(long, conflicts_with = "clear", required_unless_present = "clear")]
    backup_key: Option<String>,
    #[arg(long)]
    clear: bool,
}

#[derive(Args)]
struct ViewArgs {
    #[command(flatten)]
    update: UpdateArgs,
    #[arg(long = "name", required = true)]
    names: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let engine = load_engine(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Keygen(args) => handle_keygen(args).await,
        Commands::Create(args) => handle_create(&engine, args).await,
        Commands::Show(args) => handle_show(&engine, args).await,
        Commands::Verify(args) => handle_verify(&engine, args).await,
        Commands::Apply(args) => handle_apply(&engine, args).await,
        Commands::VerifyApplication(args) => handle_verify_application(&engine, args).await,
        Commands::Retire(args) => handle_retire(&engine, args).await,
        Commands::InspectRetirement(args) => handle_inspect_retirement(&engine, args).await,
        Commands::SetBackupKey(args) => handle_set_backup_key(&engine, args).await,
        Commands::View(view) => match view {
            ViewCommands::Enable(args) => handle_view(&engine, args, true).await,
            ViewCommands::Disable(args) => handle_view(&engine, args, false).await,
        },
        Commands::Ping(args) => handle_ping(&engine, args).await,
    }
}

fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        );
    let _ = subscriber.try_init();
}

async fn load_engine(config_path: Option<&Path>) -> Result<PeerEngine> {
    let config = match config_path {
        Some(path) => {
            let contents = fs::read_to_string(path)
                .await
                .with_context(|| format!("reading peer configuration from {}", path.display()))?;
            PeerConfig::from_toml_str(&contents)
                .with_context(|| format!("loading peer configuration from {}", path.display()))?
        }
        None => PeerConfig::default(),
    };
    Ok(PeerEngine::new(config)?)
}

async fn handle_keygen(args: KeygenArgs) -> Result<()> {
    let paths = KeyPairPaths::for_private(args.out);
    paths.prepare().await?;

    let crypto = Ed25519Crypto;
    let private_key = Ed25519Crypto::generate(&mut OsRng);
    let public_key = crypto.derive_public_key(&private_key)?;
    let peer_id = crypto.derive_peer_id(&public_key)?;
    let created_at = bundle_timestamp()?;

    let secret_bundle = SecretKeyBundle {
        version: KEY_BUNDLE_VERSION,
        created_at,
        public_key: ByteBuf::from(public_key.as_bytes().to_vec()),
        private_key: ByteBuf::from(private_key.as_bytes().to_vec()),
    };
    let public_bundle = PublicKeyBundle {
        version: KEY_BUNDLE_VERSION,
        created_at,
        public_key: ByteBuf::from(public_key.as_bytes().to_vec()),
        peer_id: peer_id.to_string(),
    };

    paths.write(&secret_bundle, &public_bundle).await?;

    tracing::info!(
        peer_id = %peer_id,
        public_key = %hex::encode(public_key.as_bytes()),
        private = %paths.private.display(),
        public = %paths.public.display(),
        "generated peer signing key",
    );
    println!("{peer_id}");
    Ok(())
}

async fn handle_create(engine: &PeerEngine, args: CreateArgs) -> Result<()> {
    let key = read_private_key(&args.key).await?;
    let mut gestalt = match &args.gestalt {
        Some(path) => read_gestalt(path).await?,
        None => Dictionary::new(),
    };
    if let Some(name) = args.name {
        gestalt.insert(gestalt_keys::COMPUTER_NAME.into(), name.into());
    }

    let options = PeerOptions {
        backup_key: args.backup_key.as_deref().map(decode_hex_arg).transpose()?,
        device_id: args.device_id,
        transport_type: args.transport,
        prefer_ids: args.prefer_ids.then_some(true),
        serial_number: args.serial_number,
        enabled_views: args.views,
        ..PeerOptions::default()
    };

    let record = engine.create(gestalt, &options, &key)?;
    write_record(engine, &args.out, &record).await?;
    println!("{}", record.id());
    Ok(())
}

async fn handle_show(engine: &PeerEngine, args: RecordArgs) -> Result<()> {
    let record = read_record(engine, &args.record).await?;
    let summary = record_summary(engine, &record);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn handle_verify(engine: &PeerEngine, args: RecordArgs) -> Result<()> {
    let record = read_record(engine, &args.record).await?;
    engine
        .check_signature(&record)
        .with_context(|| format!("verifying {}", args.record.display()))?;
    println!("ok {}", record.id());
    Ok(())
}

async fn handle_apply(engine: &PeerEngine, args: ApplyArgs) -> Result<()> {
    let record = read_record(engine, &args.update.record).await?;
    let peer_key = read_private_key(&args.update.key).await?;
    let sponsor_key = read_private_key(&args.sponsor).await?;
    let applicant = engine.copy_as_application(&record, &sponsor_key, &peer_key)?;
    write_record(engine, &args.update.out, &applicant).await
}

async fn handle_verify_application(engine: &PeerEngine, args: VerifyApplicationArgs) -> Result<()> {
    let record = read_record(engine, &args.record).await?;
    let sponsor = read_public_key(&args.sponsor).await?;
    engine
        .application_verify(&record, &sponsor)
        .with_context(|| format!("verifying application {}", args.record.display()))?;
    println!("ok {}", record.id());
    Ok(())
}

async fn handle_retire(engine: &PeerEngine, args: UpdateArgs) -> Result<()> {
    let record = read_record(engine, &args.record).await?;
    let key = read_private_key(&args.key).await?;
    let ticket = engine.create_retirement_ticket(&record, &key)?;
    write_record(engine, &args.out, &ticket).await
}

async fn handle_inspect_retirement(engine: &PeerEngine, args: InspectRetirementArgs) -> Result<()> {
    let record = read_record(engine, &args.record).await?;
    let now = match args.at_ms {
        Some(millis) => PeerDate::from_unix_millis(millis)?,
        None => SystemClock.now(),
    };
    let peer_id = engine.inspect_retirement_ticket(&record, now)?;
    println!("retired {peer_id}");
    Ok(())
}

async fn handle_set_backup_key(engine: &PeerEngine, args: SetBackupKeyArgs) -> Result<()> {
    let record = read_record(engine, &args.update.record).await?;
    let key = read_private_key(&args.update.key).await?;
    let backup_key = match (&args.backup_key, args.clear) {
        (Some(hex_key), false) => Some(decode_hex_arg(hex_key)?),
        (None, true) => None,
        _ => bail!("pass exactly one of --backup-key or --clear"),
    };
    let updated = engine.set_backup_key(&record, backup_key.as_deref(), &key)?;
    write_record(engine, &args.update.out, &updated).await
}

async fn handle_view(engine: &PeerEngine, args: ViewArgs, enable: bool) -> Result<()> {
    let record = read_record(engine, &args.update.record).await?;
    let key = read_private_key(&args.update.key).await?;
    let names: Vec<&str> = args.names.iter().map(String::as_str).collect();
    let (enable_names, disable_names) = if enable {
        (names.as_slice(), &[][..])
    } else {
        (&[][..], names.as_slice())
    };
    let updated = engine.update_capabilities(
        &record,
        CapabilityKind::View,
        enable_names,
        disable_names,
        &key,
    )?;
    write_record(engine, &args.update.out, &updated).await
}

async fn handle_ping(engine: &PeerEngine, args: UpdateArgs) -> Result<()> {
    let record = read_record(engine, &args.record).await?;
    let key = read_private_key(&args.key).await?;
    let pinged = engine.ping(&record, &key)?;
    write_record(engine, &args.out, &pinged).await
}

fn decode_hex_arg(value: &str) -> Result<Vec<u8>> {
    hex::decode(value.trim()).with_context(|| format!("`{value}` is not valid hex"))
}
