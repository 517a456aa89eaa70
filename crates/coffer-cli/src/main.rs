//! coffer: attribute encryption key tooling
//!
//! Commands:
//!   generate-key                                  - random 256-bit key (hex)
//!   generate-key-pair                             - hybrid encryption/decryption keys
//!   attribute-key --table T --attribute A         - derive an attribute key from the master key
//!   encrypt|decrypt --table T --attribute A IN OUT - run a file through the attribute's box
//!   checkpoints show | reset <model>              - inspect migration checkpoints
//!   config show                                   - display current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

use coffer_core::config::CofferConfig;
use coffer_core::master_key;
use coffer_crypto::{Algorithm, Encryptor};
use coffer_record::{
    BoxBuilder, BoxConfig, CheckpointStore, JsonCheckpointStore, MemoryRecord,
};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "coffer",
    version,
    about = "Attribute-level encryption keys and boxes",
    long_about = "coffer: generate keys, derive per-attribute keys from a master key, \
                  and encrypt or decrypt values the way the coffer libraries do"
)]
struct Cli {
    /// Path to coffer.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "COFFER_CONFIG",
        default_value = "~/.config/coffer/coffer.toml"
    )]
    config: PathBuf,

    /// Log level (overrides [log].level)
    #[arg(long, global = true, env = "COFFER_LOG")]
    log: Option<String>,

    /// Log format: text or json (overrides [log].format)
    #[arg(long, global = true, env = "COFFER_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print a random 256-bit key as hex
    #[command(name = "generate-key")]
    GenerateKey,

    /// Print a hybrid key pair for encrypt-only producers
    #[command(name = "generate-key-pair")]
    GenerateKeyPair,

    /// Derive the key for one attribute from the master key
    #[command(name = "attribute-key")]
    AttributeKey {
        #[arg(long)]
        table: String,
        #[arg(long)]
        attribute: String,
        /// Write the 32 raw key bytes instead of hex
        #[arg(long)]
        raw: bool,
    },

    /// Encrypt a file with the attribute's derived key
    Encrypt {
        #[command(flatten)]
        target: BoxArgs,
        /// Write standard base64 instead of binary ciphertext
        #[arg(long)]
        base64: bool,
        /// Input path ("-" for stdin)
        input: PathBuf,
        /// Output path ("-" for stdout)
        output: PathBuf,
    },

    /// Decrypt a file with the attribute's derived key
    Decrypt {
        #[command(flatten)]
        target: BoxArgs,
        /// Input is standard base64 text
        #[arg(long)]
        base64: bool,
        input: PathBuf,
        output: PathBuf,
    },

    /// Migration checkpoint management
    Checkpoints {
        #[command(subcommand)]
        action: CheckpointAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args, Debug)]
struct BoxArgs {
    #[arg(long)]
    table: String,
    #[arg(long)]
    attribute: String,
    /// aes-gcm or xchacha20 (default: [defaults].algorithm)
    #[arg(long)]
    algorithm: Option<Algorithm>,
}

#[derive(Subcommand, Debug)]
enum CheckpointAction {
    /// Print saved checkpoints as JSON
    Show,
    /// Forget the checkpoint of one model so its next migration starts over
    Reset { model: String },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let config = load_config(&config_path)?;
    init_logging(
        cli.log.as_deref().unwrap_or(&config.log.level),
        cli.log_format.as_deref().unwrap_or(&config.log.format),
    );

    match cli.command {
        Commands::GenerateKey => {
            println!("{}", coffer_crypto::generate_key());
            Ok(())
        }
        Commands::GenerateKeyPair => cmd_generate_key_pair(),
        Commands::AttributeKey {
            table,
            attribute,
            raw,
        } => cmd_attribute_key(&config, &table, &attribute, raw),
        Commands::Encrypt {
            target,
            base64,
            input,
            output,
        } => cmd_encrypt(&config, &target, base64, &input, &output),
        Commands::Decrypt {
            target,
            base64,
            input,
            output,
        } => cmd_decrypt(&config, &target, base64, &input, &output),
        Commands::Checkpoints { action } => cmd_checkpoints(&config, action),
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &config_path),
    }
}

// ── Config + logging ──────────────────────────────────────────────────────────

fn load_config(path: &Path) -> Result<CofferConfig> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config: {}", path.display()))
    } else {
        Ok(CofferConfig::default())
    }
}

fn init_logging(level: &str, format: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries command output; logs go to stderr
    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    match s.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(home).join(rest)
        }
        None => path.to_path_buf(),
    }
}

fn init_master_key(config: &CofferConfig) -> Result<()> {
    if !master_key::init_from_config(&config.master_key)? {
        anyhow::bail!(
            "no master key\n\
             Set {} or [master_key].file in the config file",
            config.master_key.env_var
        );
    }
    Ok(())
}

// ── Key commands ──────────────────────────────────────────────────────────────

fn cmd_generate_key_pair() -> Result<()> {
    let pair = coffer_crypto::generate_key_pair();
    println!("encryption_key: {}", pair.encryption_key);
    println!("decryption_key: {}", pair.decryption_key);
    Ok(())
}

fn cmd_attribute_key(config: &CofferConfig, table: &str, attribute: &str, raw: bool) -> Result<()> {
    init_master_key(config)?;
    let key = coffer_crypto::attribute_key(table, attribute, None)?;
    if raw {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(key.as_bytes())?;
        stdout.flush()?;
    } else {
        println!("{}", key.to_hex());
    }
    Ok(())
}

// ── encrypt / decrypt ─────────────────────────────────────────────────────────

fn attribute_box(config: &CofferConfig, args: &BoxArgs) -> Result<Encryptor> {
    init_master_key(config)?;
    let builder = BoxBuilder::new().with_defaults(&config.defaults)?;
    let record = MemoryRecord::new("coffer-cli", args.table.as_str(), 0);
    let mut box_config = BoxConfig::derived();
    if let Some(algorithm) = args.algorithm {
        box_config = box_config.with_algorithm(algorithm);
    }
    Ok(builder.build_box(&record, &box_config, &args.table, &args.attribute)?)
}

fn cmd_encrypt(
    config: &CofferConfig,
    args: &BoxArgs,
    base64: bool,
    input: &Path,
    output: &Path,
) -> Result<()> {
    let encryptor = attribute_box(config, args)?;
    let plaintext = Zeroizing::new(read_input(input)?);
    let ciphertext = if base64 {
        encryptor.encrypt_base64(&plaintext)?.into_bytes()
    } else {
        encryptor.encrypt(&plaintext)?
    };
    write_output(output, &ciphertext)?;
    tracing::info!(
        table = %args.table,
        attribute = %args.attribute,
        algorithm = %encryptor.primary().algorithm(),
        bytes = ciphertext.len(),
        "encrypted"
    );
    Ok(())
}

fn cmd_decrypt(
    config: &CofferConfig,
    args: &BoxArgs,
    base64: bool,
    input: &Path,
    output: &Path,
) -> Result<()> {
    let encryptor = attribute_box(config, args)?;
    let input_bytes = read_input(input)?;
    let plaintext = Zeroizing::new(if base64 {
        let text = String::from_utf8(input_bytes).context("base64 input is not UTF-8")?;
        encryptor.decrypt_base64(text.trim())?
    } else {
        encryptor.decrypt(&input_bytes)?
    });
    write_output(output, &plaintext)?;
    tracing::info!(table = %args.table, attribute = %args.attribute, "decrypted");
    Ok(())
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut buf = Vec::new();
        std::io::stdin()
            .lock()
            .read_to_end(&mut buf)
            .context("reading stdin")?;
        Ok(buf)
    } else {
        std::fs::read(path).with_context(|| format!("reading {}", path.display()))
    }
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if path == Path::new("-") {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(bytes).context("writing stdout")?;
        stdout.flush().context("flushing stdout")
    } else {
        std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))
    }
}

// ── checkpoints / config ──────────────────────────────────────────────────────

fn cmd_checkpoints(config: &CofferConfig, action: CheckpointAction) -> Result<()> {
    let path = expand_tilde(&config.migration.checkpoint_path);
    let mut store = JsonCheckpointStore::open(&path)?;
    match action {
        CheckpointAction::Show => {
            let entries: std::collections::BTreeMap<_, _> = store.targets().collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&entries).context("serializing checkpoints")?
            );
        }
        CheckpointAction::Reset { model } => {
            if store.load(&model)?.is_none() {
                println!("no checkpoint for {model}");
                return Ok(());
            }
            store.clear(&model)?;
            println!("cleared checkpoint for {model}");
        }
    }
    Ok(())
}

fn cmd_config_show(config: &CofferConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!(
            "# Configuration: defaults (no file at {})",
            config_path.display()
        );
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
