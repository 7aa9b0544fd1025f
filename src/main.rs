use anyhow::{Context, Error, Result};
use camino::Utf8PathBuf;
use clap::Parser;
use prometheus::{Encoder, Registry, TextEncoder};
use ripline::{
    line_buffer::{LineBufferBuilder, LineBufferReader},
    lines::LineIter,
};
use std::io::{self, Write};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use geoipenrich::input::FileOrStdin;
use geoipenrich::{
    DatabaseVendorType, EnrichmentEngine, Message, ResolverConfig, VendorResolverFactory,
};

/// Check if the error chain contains a broken pipe error.
#[inline(always)]
fn is_broken_pipe(err: &Error) -> bool {
    // Look for a broken pipe error in the error chain
    for cause in err.chain() {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::BrokenPipe {
                return true;
            }
        }
    }
    false
}

/// Enrich JSON-lines log records with geolocation and ASN fields for their
/// source_ip, host_ip and destination_ip fields
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Database vendor whose MMDB layout to read [default: maxmind]
    #[clap(long, value_enum)]
    vendor: Option<DatabaseVendorType>,

    /// Specify directory containing the MMDB database files
    #[clap(
        short = 'I',
        value_name = "DIR",
        value_hint = clap::ValueHint::DirPath,
        env = "GEOIP_MMDB_DIR"
    )]
    include: Option<Utf8PathBuf>,

    /// Path of the location (city) database, overrides -I for this file
    #[clap(long, value_name = "PATH", value_hint = clap::ValueHint::FilePath)]
    city_db: Option<Utf8PathBuf>,

    /// Path of the ASN database, overrides -I for this file
    #[clap(long, value_name = "PATH", value_hint = clap::ValueHint::FilePath)]
    asn_db: Option<Utf8PathBuf>,

    /// JSON resolver configuration file. Command line options take precedence
    #[clap(short, long, value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    config: Option<Utf8PathBuf>,

    /// Turn off all lookups and copy records through unchanged
    #[clap(long)]
    disable: bool,

    /// Write resolver metrics in Prometheus text format to stderr when done
    #[clap(long)]
    metrics: bool,

    /// Input file(s) to process. Leave empty or use "-" to read from stdin
    #[clap(value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    input: Vec<Utf8PathBuf>,
}

fn main() -> ExitCode {
    init_logging();

    // Use a separate run function to handle the actual work
    let err = match run_main() {
        Ok(code) => return code,
        Err(err) => err,
    };

    // Handle broken pipe errors gracefully
    if is_broken_pipe(&err) {
        return ExitCode::SUCCESS;
    }

    // Print detailed error information based on environment variables
    if std::env::var("RUST_BACKTRACE").is_ok_and(|v| v == "1")
        && std::env::var("RUST_LIB_BACKTRACE").map_or(true, |v| v == "1")
    {
        let _ = writeln!(&mut std::io::stderr(), "{:?}", err);
    } else {
        let _ = writeln!(&mut std::io::stderr(), "{:#}", err);
    }

    ExitCode::FAILURE
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run_main() -> Result<ExitCode> {
    let mut args = Args::parse();

    // if no files specified, add stdin
    if args.input.is_empty() {
        args.input.push(Utf8PathBuf::from("-"));
    }

    let config = resolver_config(&args)?;
    let registry = Registry::new();
    let engine = EnrichmentEngine::new(&VendorResolverFactory, &config, &registry);

    run(&args, &engine)?;

    if args.metrics {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buf)
            .context("failed to encode metrics")?;
        io::stderr().write_all(&buf)?;
    }

    Ok(ExitCode::SUCCESS)
}

/// Layers the command line over the configuration file, then fills the
/// remaining database paths from the database directory.
fn resolver_config(args: &Args) -> Result<ResolverConfig> {
    let mut config = match &args.config {
        Some(path) => ResolverConfig::from_path(path)
            .with_context(|| format!("failed to load configuration {}", path))?,
        None => ResolverConfig::default(),
    };

    if let Some(vendor) = args.vendor {
        config.vendor = vendor;
    }
    if args.city_db.is_some() {
        config.city_db_path.clone_from(&args.city_db);
    }
    if args.asn_db.is_some() {
        config.asn_db_path.clone_from(&args.asn_db);
    }
    if args.disable {
        config.enabled = false;
    }

    let dir = args
        .include
        .clone()
        .unwrap_or_else(|| config.vendor.default_dir());
    Ok(config.with_database_dir(&dir))
}

#[inline(always)]
fn run(args: &Args, engine: &EnrichmentEngine) -> Result<()> {
    let mut out = io::BufWriter::with_capacity(65536, io::stdout().lock());
    let mut line_buffer = LineBufferBuilder::new().capacity(65536).build();

    for path in &args.input {
        let file = FileOrStdin::from_path(path.clone());
        let reader = file.reader()?;
        let mut lb_reader = LineBufferReader::new(reader, &mut line_buffer);

        while lb_reader
            .fill()
            .with_context(|| format!("failed to read {}", file))?
        {
            let buffer = lb_reader.buffer();
            let lines = LineIter::new(b'\n', buffer);

            for line in lines {
                enrich_line(engine, line, &mut out)?;
            }
            lb_reader.consume_all();
        }
        out.flush()?;
    }

    Ok(())
}

/// Writes one output line for one input line. Anything that is not enriched
/// is copied through byte for byte.
#[inline]
fn enrich_line<W: Write>(engine: &EnrichmentEngine, line: &[u8], out: &mut W) -> Result<()> {
    if !engine.is_enabled() {
        out.write_all(line)?;
        return Ok(());
    }

    let content = line.strip_suffix(b"\n").unwrap_or(line);
    let content = content.strip_suffix(b"\r").unwrap_or(content);
    if content.iter().all(u8::is_ascii_whitespace) {
        out.write_all(line)?;
        return Ok(());
    }

    let mut message: Message = match serde_json::from_slice(content) {
        Ok(message) => message,
        Err(err) => {
            tracing::warn!("passing through line that is not a JSON object: {}", err);
            out.write_all(line)?;
            return Ok(());
        }
    };

    if engine.enrich(&mut message) {
        serde_json::to_writer(&mut *out, &message)?;
        // keep whatever terminator the input line had, possibly none
        out.write_all(&line[content.len()..])?;
    } else {
        out.write_all(line)?;
    }

    Ok(())
}
