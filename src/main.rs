use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use domreel::config::EXAMPLE_CONFIG;
use domreel::payload::EventKind;
use domreel::{
    Config, HeadlessSurface, PlayOptions, PlaybackOutcome, Replayer, ScriptMode,
    SessionPayload,
};

#[derive(Parser)]
#[command(
    name = "domreel",
    version,
    about = "Inspect and replay privacy-scrubbed DOM session recordings"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Summarize a recorded session payload
    Inspect {
        file: PathBuf,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Play a recorded session into a headless surface
    Replay {
        file: PathBuf,
        /// Playback rate (minimum 0.1)
        #[arg(long, default_value_t = 1.0)]
        speed: f64,
        /// Skip recorded DOM mutations
        #[arg(long)]
        no_mutations: bool,
        /// Allow page scripts inside the replay sandbox
        #[arg(long)]
        scripts: bool,
        /// JSON or TOML configuration patch
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the effective configuration as TOML
    Config {
        /// Print the annotated example configuration instead
        #[arg(long)]
        example: bool,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Inspect { file, json } => inspect(&file, json),
        Command::Replay {
            file,
            speed,
            no_mutations,
            scripts,
            config,
        } => replay(&file, speed, !no_mutations, scripts, config.as_deref()).await,
        Command::Config { example, config } => print_config(example, config.as_deref()),
    }
}

fn read_payload(path: &Path) -> Result<SessionPayload> {
    SessionPayload::read_from_path(path)
        .with_context(|| format!("Failed to read session payload {}", path.display()))
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    Config::load(path).with_context(|| match path {
        Some(path) => format!("Failed to load config {}", path.display()),
        None => "Failed to load default config".to_string(),
    })
}

fn inspect(path: &Path, json: bool) -> Result<()> {
    let payload = read_payload(path)?;

    let mut kinds: BTreeMap<&'static str, usize> = BTreeMap::new();
    for event in &payload.events {
        let name = match event.kind() {
            EventKind::Snapshot => "snapshot",
            EventKind::Meta => "meta",
            EventKind::Mutation => "mutation",
            EventKind::Interaction => "event",
        };
        *kinds.entry(name).or_default() += 1;
    }
    let duration_ms = payload
        .events
        .iter()
        .map(|e| e.time_offset_ms)
        .fold(0.0_f64, f64::max);

    if json {
        let summary = serde_json::json!({
            "version": payload.version,
            "sessionId": payload.session_id,
            "page": payload.page,
            "durationMs": duration_ms,
            "eventCount": payload.events.len(),
            "events": kinds,
            "droppedEventCount": payload.dropped_event_count,
            "redactionStats": payload.redaction_stats,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("page:      {}", payload.page.href);
    if let Some(session_id) = payload.session_id {
        println!("session:   {session_id}");
    }
    println!("duration:  {duration_ms:.0} ms");
    println!("events:    {}", payload.events.len());
    for (kind, count) in &kinds {
        println!("  {kind:<10}{count}");
    }
    println!("dropped:   {}", payload.dropped_event_count);
    println!("redacted:  {}", payload.redaction_stats.total());
    Ok(())
}

async fn replay(
    path: &Path,
    speed: f64,
    mutations: bool,
    scripts: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    let payload = read_payload(path)?;
    let mut config = load_config(config_path)?;
    if scripts {
        config.replay.script_mode = ScriptMode::On;
    }

    let mut replayer = Replayer::new(HeadlessSurface::new(), config);
    replayer.set_apply_mutations(mutations);
    replayer.load(payload)?;
    replayer.play(PlayOptions::at_speed(speed)).await?;
    let status = replayer.wait_until_idle().await;

    let surface = replayer.surface();
    let surface = surface.lock();
    match status.last_outcome {
        Some(PlaybackOutcome::Completed(report)) => {
            println!("applied:    {}", report.applied.len());
            println!("scheduled:  {} ms", report.scheduled_delay.as_millis());
        }
        Some(PlaybackOutcome::Failed(reason)) => anyhow::bail!("Replay failed: {reason}"),
        Some(PlaybackOutcome::Stopped) => println!("stopped"),
        None => println!("applied:    0"),
    }
    println!("renders:    {}", surface.render_count());
    println!("dispatched: {}", surface.dispatched().len());
    println!("frames:     {}", surface.frame_loads().len());
    Ok(())
}

fn print_config(example: bool, path: Option<&Path>) -> Result<()> {
    if example {
        print!("{EXAMPLE_CONFIG}");
        return Ok(());
    }
    let config = load_config(path)?;
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

