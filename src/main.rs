use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use sml_node::constants::MAX_SLOTS;
use sml_node::node::SerialConfig;
use sml_node::util::hex::decode_hex;
use sml_node::{
    decode_messages, init_logger_with_default, log_info, Credentials, CycleScheduler, HostPower,
    LogSignal, LoggingRadio, MeterSource, NodeConfig, ReplaySource, SerialMeterSource,
    SimulatedMeter,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "sml-node")]
#[command(about = "SML smart meter reader with LoRaWAN uplink")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the duty cycle against a meter source
    Run(RunArgs),
    /// Decode a captured meter dump and print every message's values
    Decode {
        file: PathBuf,
        /// The file holds hex text instead of raw bytes
        #[arg(long)]
        hex: bool,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Serial device of the optical reading head
    #[arg(short, long, conflicts_with_all = ["replay", "simulate"])]
    port: Option<String>,
    /// Replay a captured dump instead of reading a serial port
    #[arg(long, conflicts_with = "simulate")]
    replay: Option<PathBuf>,
    /// The replay file holds hex text
    #[arg(long, requires = "replay")]
    hex: bool,
    /// Use a simulated meter
    #[arg(long)]
    simulate: bool,
    /// Stop after this many cycles
    #[arg(short, long)]
    cycles: Option<u64>,
    /// Override the sleep interval
    #[arg(long)]
    sleep_ms: Option<u64>,
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Use ABP instead of OTAA activation
    #[arg(long)]
    abp: bool,
}

fn read_dump(path: &Path, hex: bool) -> anyhow::Result<Vec<u8>> {
    if hex {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Ok(decode_hex(&text)?)
    } else {
        std::fs::read(path).with_context(|| format!("reading {}", path.display()))
    }
}

async fn run_node<S: MeterSource>(
    config: NodeConfig,
    credentials: Credentials,
    source: S,
    cycles: Option<u64>,
) -> anyhow::Result<()> {
    let power = HostPower::new();
    let wake = power.wake_handle();
    // Enter on stdin stands in for the wake button
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(_)) = lines.next_line().await {
            wake.trigger();
        }
    });

    let mut scheduler = CycleScheduler::new(
        config,
        credentials,
        source,
        LoggingRadio::new(),
        power,
        LogSignal::new(),
    )?;
    scheduler.boot().await?;
    let done = scheduler.run(cycles).await;
    log_info(&format!(
        "{done} cycles, {} uplinks, last values {:?}",
        scheduler.radio().uplinks().len(),
        scheduler.session().values()
    ));
    Ok(())
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => NodeConfig::from_json_file(path)?,
        None => NodeConfig::default(),
    };
    if let Some(sleep_ms) = args.sleep_ms {
        config.sleep_interval_ms = sleep_ms;
    }
    if let Some(port) = &args.port {
        config.serial_port = Some(port.clone());
    }
    let credentials = if args.abp {
        Credentials::abp_placeholder()
    } else {
        Credentials::otaa_placeholder()
    };

    if let Some(path) = &args.replay {
        let source = ReplaySource::new(read_dump(path, args.hex)?).repeating();
        run_node(config, credentials, source, args.cycles).await
    } else if args.simulate {
        let source = SimulatedMeter::new(Duration::from_secs(2), 1_234.5);
        run_node(config, credentials, source, args.cycles).await
    } else {
        let port = config
            .serial_port
            .clone()
            .context("no meter source: pass --port, --replay or --simulate")?;
        let source = SerialMeterSource::open(
            &port,
            SerialConfig {
                baudrate: config.baud_rate,
                ..SerialConfig::default()
            },
        )?;
        run_node(config, credentials, source, args.cycles).await
    }
}

fn decode(file: &Path, hex: bool) -> anyhow::Result<()> {
    let data = read_dump(file, hex)?;
    let messages = decode_messages(&data, sml_node::FieldTable::default_table());
    if messages.is_empty() {
        println!("no complete SML message in {} bytes", data.len());
    }
    for (i, message) in messages.iter().enumerate() {
        let values: Vec<String> = (0..MAX_SLOTS)
            .map(|slot| format!("{:>10.3}", message.values[slot]))
            .collect();
        println!(
            "#{:<3} {:?} ({} bytes): {}",
            i + 1,
            message.state,
            message.bytes,
            values.join(" ")
        );
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_logger_with_default("info");

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Decode { file, hex } => decode(&file, hex),
    }
}
