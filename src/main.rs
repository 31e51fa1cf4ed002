//! # charset-encoder CLI
//!
//! Command-line front end for converting text into a named encoding and for
//! inspecting how encoding names resolve.

#[cfg(feature = "cli")]
use std::fs;
#[cfg(feature = "cli")]
use std::io::{self, Read, Write};
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
use anyhow::{Context, Result};
#[cfg(feature = "cli")]
use clap::{Args, Parser, Subcommand, ValueEnum};
#[cfg(feature = "cli")]
use log::{LevelFilter, debug, info};
#[cfg(feature = "cli")]
use serde::Serialize;

#[cfg(feature = "cli")]
use charset_encoder::alias::aliases_of;
#[cfg(feature = "cli")]
use charset_encoder::{Builtin, Config, Registry, StreamingEncoder, Tier};

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI features disabled. Enable with --features cli");
    std::process::exit(1);
}

/// charset-encoder: incremental character-to-byte converter
#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "charset-encoder")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// JSON configuration file (environment is used otherwise)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding persisted converters
    #[arg(long, global = true)]
    resource_dir: Option<PathBuf>,

    /// Encoding used when no target is named
    #[arg(long, global = true)]
    default_encoding: Option<String>,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Commands {
    /// Convert UTF-8 text into a target encoding
    Convert(ConvertArgs),

    /// Show how encoding names resolve
    Resolve(ResolveArgs),

    /// List built-in encodings and their aliases
    List(ListArgs),
}

#[cfg(feature = "cli")]
#[derive(Args)]
struct ConvertArgs {
    /// Target encoding (the default encoding if not specified)
    #[arg(short = 't', long = "to")]
    to: Option<String>,

    /// Input file (stdin if not specified)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output file (stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// UTF-16 code units fed to the converter per call
    #[arg(long, default_value = "4096", value_parser = clap::value_parser!(u64).range(1..))]
    chunk_size: u64,
}

#[cfg(feature = "cli")]
#[derive(Args)]
struct ResolveArgs {
    /// Encoding names to resolve
    #[arg(required = true)]
    names: Vec<String>,
}

#[cfg(feature = "cli")]
#[derive(Args)]
struct ListArgs {
    /// Show only multibyte encodings
    #[arg(long)]
    multibyte: bool,

    /// Show aliases and byte order marks
    #[arg(long)]
    details: bool,
}

#[cfg(feature = "cli")]
#[derive(Clone, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[cfg(feature = "cli")]
#[derive(Serialize)]
struct ConversionResult {
    encoding: String,
    units_read: usize,
    bytes_written: usize,
    chunks: usize,
    processing_time_ms: u64,
}

#[cfg(feature = "cli")]
#[derive(Serialize)]
struct ResolveResult {
    name: String,
    canonical: String,
    tier: Option<Tier>,
    error: Option<String>,
}

#[cfg(feature = "cli")]
#[derive(Serialize)]
struct EncodingInfo {
    name: &'static str,
    aliases: &'static [&'static str],
    multibyte: bool,
    bom: Option<&'static [u8]>,
}

#[cfg(feature = "cli")]
fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let registry = build_registry(&cli)?;
    debug!("{:?}", registry);

    match cli.command {
        Commands::Convert(ref args) => convert_command(args, &cli, &registry)?,
        Commands::Resolve(ref args) => resolve_command(args, &cli, &registry)?,
        Commands::List(ref args) => list_command(args, &cli)?,
    }

    Ok(())
}

#[cfg(feature = "cli")]
fn init_logging(verbose: bool) {
    let mut builder = env_logger::Builder::from_default_env();
    if verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.format(|buf, record| {
        writeln!(buf, "[{}] {}", record.level(), record.args())
    });
    if let Err(e) = builder.try_init() {
        eprintln!("Logging disabled: {}", e);
    }
}

/// Milliseconds in `elapsed`, saturating at `u64::MAX`.
#[cfg(feature = "cli")]
fn elapsed_ms(elapsed: std::time::Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(feature = "cli")]
fn build_registry(cli: &Cli) -> Result<Registry> {
    let mut config = match cli.config {
        Some(ref path) => Config::from_json_file(path)
            .with_context(|| format!("Failed to load configuration: {}", path.display()))?,
        None => Config::from_env(),
    };
    if let Some(ref dir) = cli.resource_dir {
        config.resource_dir = Some(dir.clone());
    }
    if let Some(ref name) = cli.default_encoding {
        config.default_encoding = name.clone();
    }
    info!(
        "default encoding {}, resources {}",
        config.default_encoding,
        config
            .resource_dir
            .as_ref()
            .map_or_else(|| "none".to_owned(), |d| d.display().to_string())
    );
    Ok(Registry::from_config(&config))
}

#[cfg(feature = "cli")]
fn convert_command(args: &ConvertArgs, cli: &Cli, registry: &Registry) -> Result<()> {
    let start_time = std::time::Instant::now();

    let converter = match args.to {
        Some(ref name) => registry
            .resolve(name)
            .with_context(|| format!("No converter for {}", name))?,
        None => registry.get_default(),
    };
    let mut stream = StreamingEncoder::new(converter);
    debug!("Converting to {}", stream.encoding());

    let text = if let Some(ref input_path) = args.input {
        fs::read_to_string(input_path)
            .with_context(|| format!("Failed to read input file: {}", input_path.display()))?
    } else {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;
        buffer
    };
    let units: Vec<u16> = text.encode_utf16().collect();

    let chunk_size = usize::try_from(args.chunk_size).unwrap_or(usize::MAX);
    let mut output_data = Vec::with_capacity(units.len());
    let mut chunks = 0;
    for chunk in units.chunks(chunk_size) {
        let bytes = stream
            .process_chunk(chunk)
            .with_context(|| format!("Conversion failed after {} units", stream.units_in()))?;
        output_data.extend(bytes);
        chunks += 1;
    }
    let units_read = stream.units_in();
    let (tail, converter) = stream.finish().context("Flush failed")?;
    output_data.extend(tail);
    let encoding = converter.encoding().to_owned();

    if let Some(ref output_path) = args.output {
        fs::write(output_path, &output_data)
            .with_context(|| format!("Failed to write output file: {}", output_path.display()))?;
        debug!("Wrote to: {}", output_path.display());
    } else {
        io::stdout()
            .write_all(&output_data)
            .context("Failed to write to stdout")?;
    }

    let processing_time = start_time.elapsed();
    let result = ConversionResult {
        encoding,
        units_read,
        bytes_written: output_data.len(),
        chunks,
        processing_time_ms: elapsed_ms(processing_time),
    };

    match cli.format {
        OutputFormat::Json => {
            eprintln!("{}", serde_json::to_string_pretty(&result)?);
        }
        OutputFormat::Text => {
            if cli.verbose {
                eprintln!(
                    "Converted {} units -> {} bytes of {} in {:?}",
                    result.units_read, result.bytes_written, result.encoding, processing_time
                );
            }
        }
    }

    Ok(())
}

#[cfg(feature = "cli")]
fn resolve_command(args: &ResolveArgs, cli: &Cli, registry: &Registry) -> Result<()> {
    let results: Vec<ResolveResult> = args
        .names
        .iter()
        .map(|name| {
            let canonical = registry.canonical_name(name);
            match registry.resolve_with_tier(name) {
                Ok((_, tier)) => ResolveResult {
                    name: name.clone(),
                    canonical,
                    tier: Some(tier),
                    error: None,
                },
                Err(e) => ResolveResult {
                    name: name.clone(),
                    canonical,
                    tier: None,
                    error: Some(e.to_string()),
                },
            }
        })
        .collect();

    match cli.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        OutputFormat::Text => {
            for result in &results {
                match result.tier {
                    Some(tier) => {
                        println!("{:20} {:24} [{}]", result.name, result.canonical, tier)
                    }
                    None => println!("{:20} {:24} unsupported", result.name, result.canonical),
                }
            }
        }
    }

    if results.iter().any(|r| r.tier.is_none()) {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn list_command(args: &ListArgs, cli: &Cli) -> Result<()> {
    let encodings: Vec<EncodingInfo> = Builtin::ALL
        .into_iter()
        .filter(|builtin| !args.multibyte || builtin.is_multibyte())
        .map(|builtin| EncodingInfo {
            name: builtin.name(),
            aliases: aliases_of(builtin.name()),
            multibyte: builtin.is_multibyte(),
            bom: builtin.bom(),
        })
        .collect();

    match cli.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&encodings)?);
        }
        OutputFormat::Text => {
            println!("Built-in Encodings ({} total):", encodings.len());
            println!();

            for encoding in &encodings {
                println!("{}", encoding.name);

                if args.details {
                    if !encoding.aliases.is_empty() {
                        println!("    Aliases: {}", encoding.aliases.join(", "));
                    }
                    println!(
                        "    Multibyte: {}",
                        if encoding.multibyte { "Yes" } else { "No" }
                    );
                    if let Some(bom) = encoding.bom {
                        println!("    BOM: {:02X?}", bom);
                    }
                    println!();
                }
            }
        }
    }

    Ok(())
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_init_logging_twice_does_not_panic() {
        init_logging(false);
        init_logging(true);
    }

    #[test]
    fn test_elapsed_ms_saturates() {
        assert_eq!(elapsed_ms(Duration::from_millis(1500)), 1500);
        assert_eq!(elapsed_ms(Duration::MAX), u64::MAX);
    }
}
