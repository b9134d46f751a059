//! filecrypt: file encryption CLI
//!
//! Commands:
//!   keygen                         - print a fresh 128-bit key as hex
//!   encrypt <file> --key <hex>     - AES-128-CBC, writes iv || ciphertext
//!   encrypt <file> [--password]    - Argon2id + AES-256-CBC container
//!   decrypt <file> [--key|--password]
//!   inspect <file>                 - show a container's salt/iv header
//!   config show                    - display current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::{ExposeSecret, SecretString};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

use filecrypt_core::FilecryptConfig;
use filecrypt_crypto::{
    decrypt_with_password, encrypt_with_password, generate_random_key, parse_key_hex,
    ChannelRequest, Header, Operation, StreamChannel, BLOCK_SIZE, HEADER_SIZE,
};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "filecrypt",
    version,
    about = "filecrypt file encryption client",
    long_about = "filecrypt: encrypt and decrypt files with a raw AES key or a password"
)]
struct Cli {
    /// Path to filecrypt.toml configuration file
    #[arg(long, short = 'c', env = "FILECRYPT_CONFIG", default_value = "/etc/filecrypt/filecrypt.toml")]
    config: PathBuf,

    /// Log level for stderr diagnostics
    #[arg(long, env = "FILECRYPT_LOG", default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a random 128-bit key (32 hex chars)
    Keygen,

    /// Encrypt a file
    Encrypt {
        /// File to encrypt
        input: PathBuf,
        /// Output path (default: <input>.enc)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        #[command(flatten)]
        secret: SecretArgs,
    },

    /// Decrypt a file
    Decrypt {
        /// File to decrypt
        input: PathBuf,
        /// Output path (default: <input> without .enc, or <input>.dec)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        #[command(flatten)]
        secret: SecretArgs,
    },

    /// Print the salt/iv header of a password-encrypted container
    Inspect {
        file: PathBuf,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args, Debug)]
struct SecretArgs {
    /// Raw key as 32 hex chars (AES-128-CBC, iv || ciphertext)
    #[arg(long, short = 'k', env = "FILECRYPT_KEY", conflicts_with = "password")]
    key: Option<String>,
    /// Password for the salt || iv || ciphertext container (prompted if omitted)
    #[arg(long, short = 'p', env = "FILECRYPT_PASSWORD")]
    password: Option<String>,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Show the current configuration
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log);
    let config = FilecryptConfig::load(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;

    match cli.command {
        Commands::Keygen => cmd_keygen(),
        Commands::Encrypt { input, output, secret } => {
            let output = output.unwrap_or_else(|| encrypted_path(&input));
            match secret.key {
                Some(key) => cmd_key(&config, Operation::Encrypt, &input, &output, &key).await,
                None => {
                    let password = resolve_password(secret.password, true)?;
                    cmd_encrypt_password(&config, &input, &output, password).await
                }
            }
        }
        Commands::Decrypt { input, output, secret } => {
            let output = output.unwrap_or_else(|| decrypted_path(&input));
            match secret.key {
                Some(key) => cmd_key(&config, Operation::Decrypt, &input, &output, &key).await,
                None => {
                    let password = resolve_password(secret.password, false)?;
                    cmd_decrypt_password(&config, &input, &output, password).await
                }
            }
        }
        Commands::Inspect { file } => cmd_inspect(&file),
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &cli.config),
    }
}

fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

// ── Paths and secrets ─────────────────────────────────────────────────────────

fn encrypted_path(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_owned();
    name.push(".enc");
    PathBuf::from(name)
}

fn decrypted_path(input: &Path) -> PathBuf {
    if input.extension().is_some_and(|ext| ext == "enc") {
        input.with_extension("")
    } else {
        let mut name = input.as_os_str().to_owned();
        name.push(".dec");
        PathBuf::from(name)
    }
}

fn resolve_password(flag: Option<String>, confirm: bool) -> Result<SecretString> {
    if let Some(p) = flag {
        return Ok(SecretString::from(p));
    }
    let first = rpassword::prompt_password("Password: ").context("reading password")?;
    if confirm {
        let again = rpassword::prompt_password("Confirm password: ").context("reading password")?;
        if again != first {
            anyhow::bail!("passwords do not match");
        }
    }
    Ok(SecretString::from(first))
}

// ── Progress bar helpers ──────────────────────────────────────────────────────

fn make_progress_bar(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Temp file beside `dst`; dropped (and deleted) unless `commit_output` runs.
fn stage_output(dst: &Path) -> Result<NamedTempFile> {
    let dir = match dst.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    NamedTempFile::new_in(dir).with_context(|| format!("creating temp file in {}", dir.display()))
}

/// Replace `dst` with the fully written staged file.
fn commit_output(staged: NamedTempFile, dst: &Path) -> Result<()> {
    staged.as_file().sync_all()?;
    staged
        .persist(dst)
        .with_context(|| format!("writing {}", dst.display()))?;
    Ok(())
}

// ── `filecrypt keygen` ────────────────────────────────────────────────────────

fn cmd_keygen() -> Result<()> {
    let key = generate_random_key();
    println!("{}", key.to_hex());
    Ok(())
}

// ── `filecrypt encrypt|decrypt --key` ─────────────────────────────────────────

async fn cmd_key(
    config: &FilecryptConfig,
    operation: Operation,
    input: &Path,
    output: &Path,
    key_hex: &str,
) -> Result<()> {
    let key = parse_key_hex(key_hex).context("parsing --key")?;
    let data = tokio::fs::read(input)
        .await
        .with_context(|| format!("reading {}", input.display()))?;
    let file_name = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string());

    let pb = make_progress_bar(&operation.to_string());
    pb.set_message(input.display().to_string());

    let channel = StreamChannel::spawn(
        ChannelRequest {
            operation,
            file_name,
            input: data,
            key,
        },
        config.crypto.processor_options(),
    );
    let pb_progress = pb.clone();
    let result = channel
        .finish(move |pct| pb_progress.set_position(pct as u64))
        .await;

    let bytes = match result {
        Ok(bytes) => bytes,
        Err(e) => {
            pb.abandon_with_message("failed");
            anyhow::bail!("{operation} {}: {e}", input.display());
        }
    };
    let mut staged = stage_output(output)?;
    staged.write_all(&bytes)?;
    commit_output(staged, output)?;

    pb.finish_with_message("done");
    println!("  output:  {}", output.display());
    println!("  bytes:   {}", fmt_bytes(bytes.len() as u64));
    Ok(())
}

// ── `filecrypt encrypt|decrypt --password` ────────────────────────────────────

async fn cmd_encrypt_password(
    config: &FilecryptConfig,
    input: &Path,
    output: &Path,
    password: SecretString,
) -> Result<()> {
    run_password_job(config, Operation::Encrypt, input, output, password).await
}

async fn cmd_decrypt_password(
    config: &FilecryptConfig,
    input: &Path,
    output: &Path,
    password: SecretString,
) -> Result<()> {
    run_password_job(config, Operation::Decrypt, input, output, password).await
}

async fn run_password_job(
    config: &FilecryptConfig,
    operation: Operation,
    input: &Path,
    output: &Path,
    password: SecretString,
) -> Result<()> {
    if password.expose_secret().is_empty() {
        anyhow::bail!("password must not be empty");
    }

    let pb = make_progress_bar(&operation.to_string());
    pb.set_message(input.display().to_string());

    let kdf = config.crypto.kdf_params();
    let options = config.crypto.processor_options();
    let (src, dst) = (input.to_path_buf(), output.to_path_buf());
    let pb_progress = pb.clone();

    let joined = tokio::task::spawn_blocking(move || -> Result<u64> {
        let source = File::open(&src).with_context(|| format!("opening {}", src.display()))?;
        let total_len = source.metadata()?.len();
        let mut writer = BufWriter::new(stage_output(&dst)?);
        let on_progress = |pct: u8| pb_progress.set_position(pct as u64);
        let written = match operation {
            Operation::Encrypt => encrypt_with_password(
                BufReader::new(source),
                &mut writer,
                total_len,
                &password,
                &kdf,
                options,
                on_progress,
            )?,
            Operation::Decrypt => decrypt_with_password(
                BufReader::new(source),
                &mut writer,
                total_len,
                &password,
                &kdf,
                options,
                on_progress,
            )?,
        };
        let staged = writer.into_inner().map_err(|e| e.into_error())?;
        commit_output(staged, &dst)?;
        Ok(written)
    })
    .await
    .context("crypto task panicked")?;

    match joined {
        Ok(written) => {
            pb.finish_with_message("done");
            println!("  output:  {}", output.display());
            println!("  bytes:   {}", fmt_bytes(written));
            Ok(())
        }
        Err(e) => {
            pb.abandon_with_message("failed");
            Err(e.context(format!("{operation} {}", input.display())))
        }
    }
}

// ── `filecrypt inspect` ───────────────────────────────────────────────────────

fn cmd_inspect(path: &Path) -> Result<()> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let size = file.metadata()?.len();
    let header = Header::read_from(BufReader::new(file))
        .with_context(|| format!("reading header of {}", path.display()))?;
    print!("{}", describe_container(&header, size));
    Ok(())
}

fn describe_container(header: &Header, size: u64) -> String {
    let body = size.saturating_sub(HEADER_SIZE as u64);
    let mut out = String::new();
    out.push_str(&format!("salt:       {}\n", hex::encode(header.salt)));
    out.push_str(&format!("iv:         {}\n", hex::encode(header.iv)));
    out.push_str(&format!("ciphertext: {} ({body} bytes)\n", fmt_bytes(body)));
    if body == 0 || body % BLOCK_SIZE as u64 != 0 {
        out.push_str("warning:    ciphertext is not a positive multiple of 16 bytes\n");
    } else {
        out.push_str(&format!(
            "plaintext:  {}..={} bytes\n",
            body - BLOCK_SIZE as u64,
            body - 1
        ));
    }
    out
}

// ── `filecrypt config show` ───────────────────────────────────────────────────

fn cmd_config_show(config: &FilecryptConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

// ── Utilities ─────────────────────────────────────────────────────────────────

fn fmt_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;
    if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}
