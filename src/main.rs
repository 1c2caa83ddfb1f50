use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use pp1_lib::PP1;
use pp1_lib::codec::encode;
use pp1_lib::config::SessionConfig;
use pp1_lib::pen::{PenSummary, decode_pen};
use pp1_lib::sim::{MachineIdentity, SimulatedMachine};
use pp1_lib::stitch::{Design, color_blocks, thread_color};
use pp1_lib::timing::{pattern_time, stitches_to_minutes};

/// Encode embroidery designs for the Brother PP1 and exercise the upload protocol.
#[derive(Parser, Debug)]
#[command(name = "pp1", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Session configuration (JSON). Defaults are used when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Optional path to a file to write logs to, in addition to the console.
    #[arg(short, long, global = true)]
    log_file: Option<PathBuf>,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode a design into PEN data and report its layout.
    Encode {
        /// Design JSON with `stitches` and optional `threads`
        design: PathBuf,
        /// Where to write the PEN bytes
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Hoop size in 0.1 mm, e.g. `1000x1000`
        #[arg(long, value_parser = parse_hoop)]
        hoop: Option<(u16, u16)>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Decode a PEN file and summarise its records.
    Inspect {
        file: PathBuf,
        /// List every record with its raw bytes
        #[arg(short, long)]
        records: bool,
    },
    /// Encode a design and upload it to a simulated machine.
    UploadDryRun { design: PathBuf },
}

fn parse_hoop(s: &str) -> Result<(u16, u16), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let parse = |v: &str| v.trim().parse::<u16>().map_err(|e| format!("invalid hoop size '{v}': {e}"));
    Ok((parse(w)?, parse(h)?))
}

fn setup_logging(log_file_path: Option<PathBuf>, verbosity: &Verbosity<InfoLevel>) -> Result<Option<WorkerGuard>> {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time();

    let (file_layer, guard) = if let Some(ref path) = log_file_path {
        let log_file = File::create(path).with_context(|| format!("Failed to create log file at: {:?}", path))?;
        let (non_blocking_writer, guard) = tracing_appender::non_blocking(log_file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_ansi(false)
            .with_target(false);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    // INFO by default, DEBUG with -v, TRACE with -vv; RUST_LOG overrides.
    let filter = EnvFilter::builder()
        .with_default_directive(verbosity.tracing_level_filter().into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if let Some(path) = log_file_path {
        info!("Logging to file: {:?}", path);
    }

    Ok(guard)
}

fn load_config(path: Option<&Path>) -> Result<SessionConfig> {
    match path {
        Some(path) => {
            let config = SessionConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config from {:?}", path))?;
            debug!(?config, "Loaded session config");
            Ok(config)
        }
        None => Ok(SessionConfig::default()),
    }
}

fn load_design(path: &Path) -> Result<Design> {
    let json = fs::read_to_string(path).with_context(|| format!("Failed to read design {:?}", path))?;
    let design = Design::from_json(&json).with_context(|| format!("Failed to parse design {:?}", path))?;
    info!(stitches = design.stitches.len(), threads = design.threads.len(), "Loaded design");
    Ok(design)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = setup_logging(cli.log_file, &cli.verbose)?;
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Encode {
            design,
            output,
            hoop,
            json,
        } => run_encode(&design, output.as_deref(), hoop, json, &config),
        Command::Inspect { file, records } => run_inspect(&file, records),
        Command::UploadDryRun { design } => run_upload_dry_run(&design, config).await,
    }
}

fn run_encode(
    design_path: &Path,
    output: Option<&Path>,
    hoop: Option<(u16, u16)>,
    json: bool,
    config: &SessionConfig,
) -> Result<()> {
    let design = load_design(design_path)?;
    let encoded = encode(&design.stitches).context("Failed to encode design")?;
    let blocks = color_blocks(&design.stitches);
    let time = pattern_time(&blocks, 0);

    if let Some((width, height)) = hoop {
        if let Err(reason) = encoded.bounds.fits_hoop(width, height) {
            bail!("{reason}");
        }
    }

    if let Some(path) = output {
        fs::write(path, &encoded.bytes).with_context(|| format!("Failed to write PEN data to {:?}", path))?;
        info!(bytes = encoded.bytes.len(), "Wrote {:?}", path);
    }

    if json {
        let report = serde_json::json!({
            "bytes": encoded.bytes.len(),
            "records": encoded.record_count(),
            "bounds": encoded.bounds,
            "blocks": blocks
                .iter()
                .map(|b| serde_json::json!({
                    "color": thread_color(&design.threads, b.color_index, &config.palette),
                    "start": b.start,
                    "end": b.end,
                    "minutes": stitches_to_minutes(b.stitch_count()),
                }))
                .collect::<Vec<_>>(),
            "total_minutes": time.total_minutes,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Records: {} ({} bytes)", encoded.record_count(), encoded.bytes.len());
    println!("Bounds:  {}", encoded.bounds);
    println!("Colors:");
    for (i, block) in blocks.iter().enumerate() {
        println!(
            "  {:2}. {} stitches {:>6}..{:<6} ~{} min",
            i + 1,
            thread_color(&design.threads, block.color_index, &config.palette),
            block.start,
            block.end,
            stitches_to_minutes(block.stitch_count())
        );
    }
    println!("Estimated time: {} min", time.total_minutes);
    Ok(())
}

fn run_inspect(path: &Path, list_records: bool) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    let records = decode_pen(&bytes).with_context(|| format!("{:?} is not PEN data", path))?;

    if list_records {
        for (i, record) in records.iter().enumerate() {
            println!("{:6}  {}  {}", i, hex::encode(record.into_bytes()), record);
        }
    }

    let summary = PenSummary::of(&records);
    println!("{summary}");
    match records.last() {
        Some(last) if last.x_flag() == pp1_lib::pen::XFlag::DataEnd => {}
        Some(_) => warn!("Last record does not carry DATA_END"),
        None => warn!("File contains no records"),
    }
    Ok(())
}

async fn run_upload_dry_run(design_path: &Path, config: SessionConfig) -> Result<()> {
    let design = load_design(design_path)?;
    let encoded = encode(&design.stitches).context("Failed to encode design")?;

    let machine = SimulatedMachine::new(MachineIdentity::default());
    let pp1 = PP1::new(config);
    pp1.connect(machine.clone());

    let info = pp1.get_machine_info().await.context("Failed to read machine info")?;
    println!("Machine: {info}");
    if let Err(reason) = encoded.bounds.fits_hoop(info.max_width, info.max_height) {
        bail!("{reason}");
    }

    let state = pp1.get_machine_state().await.context("Failed to read machine state")?;
    if !state.status.can_upload_pattern() {
        bail!("Machine cannot accept a pattern while {}", state.status);
    }

    let mut rng = rand::thread_rng();
    let mut last_reported = 0.0;
    let uuid = pp1
        .upload(&encoded.bytes, &mut rng, |percent| {
            if percent - last_reported >= 10.0 || percent >= 100.0 {
                println!("  {percent:5.1}%");
                last_reported = percent;
            }
        })
        .await
        .context("Upload failed")?;

    let stored = pp1.get_pattern_uuid().await?;
    let pattern = pp1.get_pattern_info().await?;
    let state = pp1.get_machine_state().await?;
    println!("Uploaded as {uuid}");
    println!(
        "Machine reports {} stitches, ~{} min, id {}, status {}",
        pattern.total_stitches,
        pattern.total_time,
        stored.map_or_else(|| "none".to_string(), |id| id.to_string()),
        state.status
    );
    debug!(frames = machine.writes().len(), "Dry run finished");

    pp1.disconnect();
    Ok(())
}
