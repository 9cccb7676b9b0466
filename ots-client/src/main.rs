//! OpenTimestamps command line client

use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::DateTime;
use clap::{Parser, Subcommand};
use sha2::Digest as _;
use tracing::{error, info, warn};

use ots_client::cache::TimestampCache;
use ots_client::calendar::{Calendar, HttpCalendar};
use ots_client::config::{self, ClientConfig};
use ots_client::git::{extract_armored, split_signed_commit};
use ots_client::oracle::BitcoinRpcOracle;
use ots_client::stamper::{StampPolicy, Stamper};
use ots_client::upgrader::{UpgradeOptions, Upgrader};
use ots_client::verifier::{self, Outcome};
use ots_types::{DetachedTimestampFile, Op};

#[derive(Parser)]
#[command(name = "ots", about = "OpenTimestamps client", version)]
struct Cli {
    /// Be more verbose. May be repeated.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Be more quiet. May be repeated.
    #[arg(short = 'q', long = "quiet", action = clap::ArgAction::Count, global = true)]
    quiet: u8,

    /// Configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Timestamp cache directory
    #[arg(long, global = true, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Timestamp files
    Stamp {
        /// Remote calendar to submit to. May be repeated.
        #[arg(short = 'c', long = "calendar", value_name = "URL")]
        calendars: Vec<String>,

        /// Calendars that must respond before stamping succeeds
        #[arg(short = 'm', value_name = "N")]
        min_responses: Option<usize>,

        /// Poll calendars until the timestamp is complete
        #[arg(long)]
        wait: bool,

        /// Files to timestamp
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Upgrade remote calendar timestamps to be locally verifiable
    Upgrade {
        /// Override the calendars named in pending attestations. May be
        /// repeated.
        #[arg(short = 'c', long = "calendar", value_name = "URL")]
        calendars: Vec<String>,

        /// Drop the built-in calendar whitelist
        #[arg(long)]
        no_default_whitelist: bool,

        /// Additional whitelisted calendar. May be repeated.
        #[arg(long = "whitelist", value_name = "URL")]
        whitelist: Vec<String>,

        /// Poll calendars until the timestamp is complete
        #[arg(long)]
        wait: bool,

        /// Existing timestamps; the old file is moved to FILE.bak
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Verify a timestamp
    Verify {
        /// Specify the target file explicitly
        #[arg(short = 'f', value_name = "FILE")]
        target: Option<PathBuf>,

        /// Verify a hex-encoded digest rather than a file
        #[arg(short = 'd', value_name = "DIGEST", conflicts_with = "target")]
        digest: Option<String>,

        /// Bitcoin node JSON-RPC URL
        #[arg(long, value_name = "URL")]
        bitcoin_node: Option<String>,

        /// Skip block-header checking entirely
        #[arg(long)]
        no_bitcoin: bool,

        /// Timestamp file
        timestamp: PathBuf,
    },

    /// Show information on a timestamp
    Info {
        /// Timestamp file
        file: PathBuf,
    },

    /// Extract the timestamp embedded in a signed git commit object
    GitExtract {
        /// Raw signed commit object, e.g. from `git cat-file commit HEAD`
        commit: PathBuf,

        /// Output path; defaults to COMMIT.ots
        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            if err
                .chain()
                .any(|cause| cause.downcast_ref::<io::Error>().is_some())
            {
                ExitCode::from(3)
            } else {
                ExitCode::from(1)
            }
        }
    }
}

fn init_tracing(verbose: u8, quiet: u8) {
    let level = match i16::from(verbose) - i16::from(quiet) {
        i16::MIN..=-2 => "error",
        -1 => "warn",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = ClientConfig::load(cli.config.as_deref())?;
    let cache_dir = cli
        .cache_dir
        .clone()
        .or_else(|| config.cache_dir.clone())
        .or_else(config::default_cache_dir);
    let cache = match cache_dir {
        Some(dir) => match TimestampCache::open(&dir) {
            Ok(cache) => Some(cache),
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "timestamp cache unavailable");
                None
            }
        },
        None => None,
    };

    match cli.command {
        Commands::Stamp {
            calendars,
            min_responses,
            wait,
            files,
        } => stamp(&config, cache.as_ref(), calendars, min_responses, wait, files).await,
        Commands::Upgrade {
            calendars,
            no_default_whitelist,
            whitelist,
            wait,
            files,
        } => {
            upgrade(
                &config,
                cache.as_ref(),
                calendars,
                no_default_whitelist,
                whitelist,
                wait,
                files,
            )
            .await
        }
        Commands::Verify {
            target,
            digest,
            bitcoin_node,
            no_bitcoin,
            timestamp,
        } => {
            verify(
                &config,
                cache.as_ref(),
                target,
                digest,
                bitcoin_node,
                no_bitcoin,
                timestamp,
            )
            .await
        }
        Commands::Info { file } => info_command(&file, cli.verbose),
        Commands::GitExtract { commit, output } => git_extract(&commit, output),
    }
}

async fn stamp(
    config: &ClientConfig,
    cache: Option<&TimestampCache>,
    calendar_urls: Vec<String>,
    min_responses: Option<usize>,
    wait: bool,
    files: Vec<PathBuf>,
) -> Result<()> {
    let urls = if calendar_urls.is_empty() {
        config.calendars.clone()
    } else {
        calendar_urls
    };
    let per_call = Duration::from_secs(config.per_call_timeout_secs);
    let mut calendars: Vec<Arc<dyn Calendar>> = Vec::with_capacity(urls.len());
    for url in &urls {
        calendars.push(Arc::new(HttpCalendar::with_timeout(url, per_call)?));
    }

    let policy = StampPolicy {
        min_responses: min_responses.unwrap_or(config.min_responses),
        wait_timeout: Duration::from_secs(config.wait_timeout_secs),
    };
    let stamper = Stamper::new(calendars, policy);

    let mut digests = Vec::with_capacity(files.len());
    for path in &files {
        digests.push(
            hash_file(&Op::Sha256, path).with_context(|| format!("reading {}", path.display()))?,
        );
    }

    let mut stamped = stamper.stamp(Op::Sha256, digests).await?;

    if wait {
        let upgrader = Upgrader::new(
            UpgradeOptions {
                calendar_urls: Vec::new(),
                whitelist: Some(config.whitelist.clone()),
            },
            cache,
        );
        let interval = Duration::from_secs(config.poll_interval_secs);
        for detached in stamped.iter_mut() {
            poll_until_complete(&upgrader, &mut detached.timestamp, interval).await?;
        }
        info!("timestamp complete; saving");
    }

    for (path, detached) in files.iter().zip(&stamped) {
        let out_path = ots_path(path);
        write_new(&out_path, &detached.to_bytes()?)
            .with_context(|| format!("creating {}", out_path.display()))?;
        info!(path = %out_path.display(), "timestamp saved");
    }
    Ok(())
}

async fn upgrade(
    config: &ClientConfig,
    cache: Option<&TimestampCache>,
    calendar_urls: Vec<String>,
    no_default_whitelist: bool,
    extra_whitelist: Vec<String>,
    wait: bool,
    files: Vec<PathBuf>,
) -> Result<()> {
    let mut whitelist = if no_default_whitelist {
        Vec::new()
    } else {
        config.whitelist.clone()
    };
    whitelist.extend(extra_whitelist);

    let upgrader = Upgrader::new(
        UpgradeOptions {
            calendar_urls,
            whitelist: Some(whitelist),
        },
        cache,
    );
    let interval = Duration::from_secs(config.poll_interval_secs);

    let mut incomplete = 0usize;
    for path in &files {
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let mut detached = DetachedTimestampFile::from_bytes(&bytes)
            .with_context(|| format!("invalid timestamp {}", path.display()))?;

        let mut changed = upgrader.upgrade(&mut detached.timestamp).await?;
        if wait && !detached.timestamp.is_complete() {
            poll_until_complete(&upgrader, &mut detached.timestamp, interval).await?;
            changed = true;
        }

        if changed {
            let backup = bak_path(path);
            if backup.exists() {
                bail!(
                    "can't back up timestamp: {} already exists",
                    backup.display()
                );
            }
            fs::rename(path, &backup)
                .with_context(|| format!("backing up {}", path.display()))?;
            write_new(path, &detached.to_bytes()?)
                .with_context(|| format!("rewriting {}", path.display()))?;
            info!(path = %path.display(), backup = %backup.display(), "timestamp upgraded");
        }

        if detached.timestamp.is_complete() {
            info!(path = %path.display(), "success, timestamp is complete");
        } else {
            warn!(path = %path.display(), "timestamp is not complete");
            incomplete += 1;
        }
    }
    if incomplete > 0 {
        bail!("{incomplete} timestamp(s) could not be completed");
    }
    Ok(())
}

async fn verify(
    config: &ClientConfig,
    cache: Option<&TimestampCache>,
    target: Option<PathBuf>,
    hex_digest: Option<String>,
    bitcoin_node: Option<String>,
    no_bitcoin: bool,
    timestamp_path: PathBuf,
) -> Result<()> {
    let bytes =
        fs::read(&timestamp_path).with_context(|| format!("reading {}", timestamp_path.display()))?;
    let mut detached = DetachedTimestampFile::from_bytes(&bytes)
        .with_context(|| format!("invalid timestamp {}", timestamp_path.display()))?;

    if let Some(hex_digest) = hex_digest {
        let digest = hex::decode(hex_digest.trim()).context("digest must be hexadecimal")?;
        if digest != detached.file_digest() {
            bail!(
                "digest provided does not match digest in timestamp, {} ({})",
                hex::encode(detached.file_digest()),
                detached.file_hash_op.name()
            );
        }
    } else {
        let target = match target {
            Some(target) => target,
            None => {
                if timestamp_path.extension().and_then(|ext| ext.to_str()) != Some("ots") {
                    bail!("timestamp filename does not end in .ots; specify the target with -f");
                }
                let target = timestamp_path.with_extension("");
                info!(target = %target.display(), "assuming target filename");
                target
            }
        };
        let actual = hash_file(&detached.file_hash_op, &target)
            .with_context(|| format!("hashing {}", target.display()))?;
        if actual != detached.file_digest() {
            bail!("file does not match original");
        }
    }

    // chase pending attestations before looking for block headers
    let upgrader = Upgrader::new(
        UpgradeOptions {
            calendar_urls: Vec::new(),
            whitelist: Some(config.whitelist.clone()),
        },
        cache,
    );
    if let Err(err) = upgrader.upgrade(&mut detached.timestamp).await {
        warn!(error = %err, "upgrade attempt failed");
    }

    if no_bitcoin {
        bail!("block-header checking disabled; timestamp not verified");
    }
    let node_url = bitcoin_node.unwrap_or_else(|| config.bitcoin_node.clone());
    let oracle = BitcoinRpcOracle::new(&node_url)?;

    match verifier::verify_timestamp(&detached.timestamp, &oracle).await? {
        Outcome::Verified { blocks, earliest } => {
            let best = blocks
                .iter()
                .min_by_key(|block| block.time)
                .ok_or_else(|| anyhow!("verified outcome with no blocks"))?;
            println!(
                "Success! {} block {} attests existence as of {}",
                best.chain,
                best.height,
                format_time(earliest)
            );
            Ok(())
        }
        Outcome::Pending { calendars } => {
            bail!(
                "timestamp is pending confirmation by: {}",
                calendars.join(", ")
            )
        }
    }
}

fn info_command(path: &Path, verbosity: u8) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let detached = DetachedTimestampFile::from_bytes(&bytes)
        .with_context(|| format!("invalid timestamp {}", path.display()))?;

    println!(
        "File {} hash: {}",
        detached.file_hash_op.name(),
        hex::encode(detached.file_digest())
    );
    println!("Timestamp:");
    print!("{}", detached.timestamp.render_tree(u32::from(verbosity)));
    Ok(())
}

fn git_extract(commit_path: &Path, output: Option<PathBuf>) -> Result<()> {
    let raw =
        fs::read(commit_path).with_context(|| format!("reading {}", commit_path.display()))?;
    let (commit, sig) = split_signed_commit(&raw);
    let sig = sig.ok_or_else(|| anyhow!("{} is not signed", commit_path.display()))?;
    let (minor, stamp) = extract_armored(&commit, &sig)?
        .ok_or_else(|| anyhow!("{} is signed but not timestamped", commit_path.display()))?;
    info!(version = %format!("1.{minor}"), "extracted git timestamp");

    let detached = DetachedTimestampFile::new(Op::Sha256, stamp)?;
    let out_path = output.unwrap_or_else(|| ots_path(commit_path));
    write_new(&out_path, &detached.to_bytes()?)
        .with_context(|| format!("creating {}", out_path.display()))?;
    info!(path = %out_path.display(), "timestamp saved");
    Ok(())
}

async fn poll_until_complete(
    upgrader: &Upgrader<'_>,
    stamp: &mut ots_types::Timestamp,
    interval: Duration,
) -> Result<()> {
    loop {
        upgrader.upgrade(stamp).await?;
        if stamp.is_complete() {
            return Ok(());
        }
        info!(
            "timestamp not complete; waiting {} sec before trying again",
            interval.as_secs()
        );
        tokio::time::sleep(interval).await;
    }
}

/// Hash a file with the given operation, streaming rather than slurping.
fn hash_file(op: &Op, path: &Path) -> Result<Vec<u8>> {
    let mut file = fs::File::open(path)?;
    let digest = match op {
        Op::Sha1 => {
            let mut hasher = sha1::Sha1::new();
            io::copy(&mut file, &mut hasher)?;
            hasher.finalize().to_vec()
        }
        Op::Ripemd160 => {
            let mut hasher = ripemd::Ripemd160::new();
            io::copy(&mut file, &mut hasher)?;
            hasher.finalize().to_vec()
        }
        Op::Sha256 => {
            let mut hasher = sha2::Sha256::new();
            io::copy(&mut file, &mut hasher)?;
            hasher.finalize().to_vec()
        }
        Op::Keccak256 => {
            let mut hasher = sha3::Keccak256::new();
            io::copy(&mut file, &mut hasher)?;
            hasher.finalize().to_vec()
        }
        other => bail!("{other} cannot hash files"),
    };
    Ok(digest)
}

fn ots_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".ots");
    PathBuf::from(name)
}

fn bak_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

/// Create a file that must not already exist.
fn write_new(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(bytes)
}

fn format_time(time: u32) -> String {
    DateTime::from_timestamp(i64::from(time), 0)
        .map(|datetime| datetime.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| time.to_string())
}
