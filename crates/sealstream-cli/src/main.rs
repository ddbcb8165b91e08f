//! sealstream: chunked stream encryption CLI
//!
//! Commands:
//!   keygen [--out PATH]                  - generate a base64 stream key
//!   encrypt [INPUT] [-o OUTPUT]          - plaintext -> chunked ciphertext
//!   decrypt [INPUT] [-o OUTPUT]          - chunked ciphertext -> plaintext
//!           [--offset N] [--length N]      (random access into file inputs)
//!   size <ENCRYPTED>                     - plaintext length of an encrypted file
//!   config show                          - display current configuration
//!
//! Omitted INPUT/OUTPUT paths mean stdin/stdout.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sealstream_core::config::{KeyConfig, LogFormat, SealstreamConfig};
use sealstream_crypto::{plaintext_len, ChunkReader, ChunkWriter, Key, Sequential, Source};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "sealstream",
    version,
    about = "Chunked AES-256-GCM stream encryption",
    long_about = "sealstream: encrypt byte streams as independently authenticated chunks, \
                  and decrypt them sequentially or from any offset"
)]
struct Cli {
    /// Path to sealstream.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "SEALSTREAM_CONFIG",
        default_value = "/etc/sealstream/config.toml"
    )]
    config: PathBuf,

    /// File holding the base64 stream key (overrides config key.file)
    #[arg(long, short = 'k', global = true)]
    key_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a new random stream key
    Keygen {
        /// Write the key to this file (mode 0600) instead of stdout
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },

    /// Encrypt a plaintext stream
    Encrypt {
        /// Plaintext input (default: stdin)
        input: Option<PathBuf>,
        /// Ciphertext output (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Decrypt an encrypted stream, optionally a byte range of it
    Decrypt {
        /// Ciphertext input (default: stdin)
        input: Option<PathBuf>,
        /// Plaintext output (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Plaintext offset to start from; negative counts from the end
        /// (requires a file input)
        #[arg(long, allow_negative_numbers = true)]
        offset: Option<i64>,
        /// Maximum number of plaintext bytes to emit
        #[arg(long)]
        length: Option<u64>,
    },

    /// Print the plaintext length of an encrypted file
    Size {
        /// Encrypted file
        encrypted: PathBuf,
        /// Human-readable units
        #[arg(long, short = 'H')]
        human: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = SealstreamConfig::load(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;
    init_logging(&config.log.level, config.log.format);

    match cli.command {
        Commands::Keygen { out } => cmd_keygen(out.as_deref()),
        Commands::Encrypt { input, output } => {
            let key = resolve_key(&config.key, cli.key_file.as_deref())?;
            cmd_encrypt(&key, input.as_deref(), output.as_deref())
        }
        Commands::Decrypt {
            input,
            output,
            offset,
            length,
        } => {
            let key = resolve_key(&config.key, cli.key_file.as_deref())?;
            cmd_decrypt(&key, input.as_deref(), output.as_deref(), offset, length)
        }
        Commands::Size { encrypted, human } => cmd_size(&encrypted, human),
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
    }
}

/// Logs go to stderr: stdout may be carrying stream data.
fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(io::stderr))
                .init();
        }
    }
}

// ── Key resolution ────────────────────────────────────────────────────────────

/// Expand `~` in path to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    match path.to_str().and_then(|s| s.strip_prefix("~/")) {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(home).join(rest)
        }
        None => path.to_path_buf(),
    }
}

/// Resolve the stream key: CLI flag > config key.file > env var named by key.env
fn resolve_key(config: &KeyConfig, key_file: Option<&Path>) -> Result<Key> {
    let path = key_file
        .map(Path::to_path_buf)
        .or_else(|| config.file.as_deref().map(expand_tilde));

    if let Some(path) = path {
        if config.mode_check {
            check_key_mode(&path);
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading key file: {}", path.display()))?;
        tracing::debug!(path = %path.display(), "key loaded from file");
        // key files usually end with a newline
        return text
            .trim()
            .parse::<Key>()
            .with_context(|| format!("decoding key file: {}", path.display()));
    }

    let text = std::env::var(&config.env).with_context(|| {
        format!(
            "no key provided; use --key-file, set key.file in config, or export {}",
            config.env
        )
    })?;
    tracing::debug!(var = %config.env, "key loaded from environment");
    text.trim()
        .parse::<Key>()
        .with_context(|| format!("decoding key from ${}", config.env))
}

#[cfg(unix)]
fn check_key_mode(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Ok(meta) = std::fs::metadata(path) {
        let mode = meta.permissions().mode() & 0o777;
        if mode & 0o077 != 0 {
            tracing::warn!(
                path = %path.display(),
                mode = %format!("{mode:o}"),
                "key file is readable by group or others"
            );
        }
    }
}

#[cfg(not(unix))]
fn check_key_mode(_path: &Path) {}

// ── I/O endpoints ─────────────────────────────────────────────────────────────

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match path {
        Some(p) => {
            let file =
                File::create(p).with_context(|| format!("creating output: {}", p.display()))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(io::stdout().lock())),
    }
}

// ── `sealstream keygen` ───────────────────────────────────────────────────────

fn cmd_keygen(out: Option<&Path>) -> Result<()> {
    let key = Key::try_generate().context("generating key")?;
    let encoded = key.to_base64();

    match out {
        Some(path) => {
            let mut file = create_private(path)
                .with_context(|| format!("creating key file: {}", path.display()))?;
            writeln!(file, "{encoded}")
                .with_context(|| format!("writing key file: {}", path.display()))?;
            tracing::info!(path = %path.display(), "key written");
        }
        None => println!("{encoded}"),
    }
    Ok(())
}

/// Create a new file readable only by its owner. Refuses to overwrite.
fn create_private(path: &Path) -> io::Result<File> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

// ── `sealstream encrypt` ──────────────────────────────────────────────────────

fn cmd_encrypt(key: &Key, input: Option<&Path>, output: Option<&Path>) -> Result<()> {
    let out = open_output(output)?;
    let bytes = match input {
        Some(p) => {
            let file = File::open(p).with_context(|| format!("opening input: {}", p.display()))?;
            encrypt_stream(key, file, out)?
        }
        None => encrypt_stream(key, io::stdin().lock(), out)?,
    };
    tracing::info!(bytes, "encrypted {}", fmt_bytes(bytes));
    Ok(())
}

fn encrypt_stream<R: Read, W: Write>(key: &Key, mut input: R, out: W) -> Result<u64> {
    let mut writer = ChunkWriter::new(out, key);
    let bytes = io::copy(&mut input, &mut writer).context("encrypting stream")?;
    writer.finish().context("closing encrypted stream")?;
    Ok(bytes)
}

// ── `sealstream decrypt` ──────────────────────────────────────────────────────

fn cmd_decrypt(
    key: &Key,
    input: Option<&Path>,
    output: Option<&Path>,
    offset: Option<i64>,
    length: Option<u64>,
) -> Result<()> {
    let out = open_output(output)?;
    let bytes = match input {
        Some(p) => {
            let file = File::open(p).with_context(|| format!("opening input: {}", p.display()))?;
            decrypt_range(ChunkReader::new(file, key), offset, length, out)?
        }
        None => {
            let stdin = Sequential(io::stdin().lock());
            decrypt_range(ChunkReader::new(stdin, key), offset, length, out)?
        }
    };
    tracing::info!(bytes, "decrypted {}", fmt_bytes(bytes));
    Ok(())
}

/// Copy plaintext from `reader` to `out`, starting at `offset` and stopping
/// after `length` bytes when given.
fn decrypt_range<R: Source, W: Write>(
    mut reader: ChunkReader<R>,
    offset: Option<i64>,
    length: Option<u64>,
    mut out: W,
) -> Result<u64> {
    if let Some(offset) = offset {
        let pos = match u64::try_from(offset) {
            Ok(start) => SeekFrom::Start(start),
            Err(_) => SeekFrom::End(offset),
        };
        let landed = reader.seek(pos).context("seeking encrypted input")?;
        tracing::debug!(offset = landed, "starting at plaintext offset");
    }

    let bytes = match length {
        Some(limit) => io::copy(&mut (&mut reader).take(limit), &mut out),
        None => io::copy(&mut reader, &mut out),
    }
    .context("decrypting stream")?;
    out.flush().context("flushing output")?;
    Ok(bytes)
}

// ── `sealstream size` ─────────────────────────────────────────────────────────

fn cmd_size(path: &Path, human: bool) -> Result<()> {
    let encrypted = std::fs::metadata(path)
        .with_context(|| format!("reading metadata: {}", path.display()))?
        .len();
    let plain = plaintext_len(encrypted)
        .with_context(|| format!("{} is not a sealstream file", path.display()))?;
    if human {
        println!("{}", fmt_bytes(plain));
    } else {
        println!("{plain}");
    }
    Ok(())
}

// ── `sealstream config show` ──────────────────────────────────────────────────

fn cmd_config_show(config: &SealstreamConfig, config_path: &Path) -> Result<()> {
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

/// Render a byte count in binary units, e.g. `1.5 MiB`.
fn fmt_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
