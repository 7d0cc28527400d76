use anyhow::{Context, Result, bail};
use fall_sentinel::{
    ClipSource, DetectorConfig, EventBus, EventClock, MonitorService, PoseSource, Profile,
    SubjectRouter, TracingSink, VecSource, read_clip,
};
use std::env;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracing::{info, warn};

const USAGE: &str =
    "Usage: clip_replayer <clip.jsonl> [--profile <default|sensitive>] [--config <file.toml>] [--strict]";

struct Args {
    clip: PathBuf,
    profile: Profile,
    config: Option<PathBuf>,
    strict: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = env::args().skip(1);
    let mut clip = None;
    let mut profile = Profile::Default;
    let mut config = None;
    let mut strict = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--profile" => {
                let name = args.next().context("--profile needs a value")?;
                profile = name.parse()?;
            }
            "--config" => {
                config = Some(PathBuf::from(args.next().context("--config needs a path")?));
            }
            "--strict" => strict = true,
            "-h" | "--help" => bail!(USAGE),
            other if other.starts_with("--") => bail!("unknown option `{other}`\n{USAGE}"),
            other => {
                if clip.replace(PathBuf::from(other)).is_some() {
                    bail!("only one clip may be given\n{USAGE}");
                }
            }
        }
    }

    Ok(Args {
        clip: clip.context(USAGE)?,
        profile,
        config,
        strict,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Logging & Arguments ---
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args()?;

    // --- 2. Configuration ---
    let config = match &args.config {
        Some(path) => DetectorConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => DetectorConfig::profile(args.profile),
    };
    if args.config.is_some() && args.profile != Profile::Default {
        warn!("--config given; its own `profile` key decides the base, --profile is ignored");
    }

    // --- 3. Clip Source ---
    let file = File::open(&args.clip)
        .with_context(|| format!("opening clip {}", args.clip.display()))?;
    let reader = BufReader::new(file);
    let mut source: Box<dyn PoseSource> = if args.strict {
        let ticks = read_clip(reader).with_context(|| format!("reading clip {}", args.clip.display()))?;
        Box::new(VecSource::new(ticks))
    } else {
        Box::new(ClipSource::new(reader))
    };

    // --- 4. Replay ---
    let bus = EventBus::default();
    let mut events = bus.subscribe();
    let mut router = SubjectRouter::new(config, EventClock::starting_now(0));
    router.add_sink(Box::new(TracingSink));
    let monitor = MonitorService::spawn(router, bus);
    info!(clip = %args.clip.display(), "replaying clip");

    let printer = tokio::spawn(async move {
        let mut printed = 0u64;
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => {
                        println!("{line}");
                        printed += 1;
                    }
                    Err(err) => warn!(error = %err, "could not encode event"),
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "event printer lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
        printed
    });

    while let Some(tick) = source.next_tick() {
        monitor.process(tick).await?;
    }

    // --- 5. Summary ---
    let stats = monitor.shutdown().await?;
    let printed = printer.await?;
    eprintln!("{}", serde_json::to_string(&stats)?);
    info!(events = printed, "replay finished");
    Ok(())
}
