use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use glam::Vec3;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use worldspace_assets::{classify, read_mod_file};
use worldspace_runtime::{HeadlessHost, InboundEvent, RuntimeConfig, WorldRuntime};

#[derive(Parser)]
#[command(name = "worldspace-cli", about = "Headless driver for the worldspace mod runtime")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print engine version and crate info
    Info,
    /// Print the declared type a dropped file would get
    Classify {
        files: Vec<PathBuf>,
    },
    /// Ingest mods into a headless world and run it for a number of frames
    Run {
        /// Mod files, ingested before the first frame
        mods: Vec<PathBuf>,
        /// Number of frames to simulate
        #[arg(short, long, default_value = "120")]
        frames: u64,
        /// Simulated frame rate
        #[arg(long, default_value = "60")]
        fps: f64,
        /// Runtime config file (YAML or JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// JSON-lines file of inbound events, applied after the mod files
        #[arg(short, long)]
        events: Option<PathBuf>,
        /// Where file mods manifest, as x,y,z
        #[arg(long, value_delimiter = ',', default_values_t = [0.0, 5.0, 0.0])]
        at: Vec<f32>,
        /// Print the last rendered frame with one line per entity
        #[arg(long)]
        dump: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match cli.command {
        Commands::Info => {
            println!("worldspace-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("quality: {}", worldspace_quality::crate_info());
            println!("render: {}", worldspace_render::crate_info());
            println!("assets: {}", worldspace_assets::crate_info());
            println!("sandbox: {}", worldspace_sandbox::crate_info());
            println!("runtime: {}", worldspace_runtime::crate_info());
            println!("script bindings: {}", worldspace_sandbox::binding_names().join(", "));
        }
        Commands::Classify { files } => {
            for path in files {
                let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
                println!("{:<8} {}", classify(name).as_str(), path.display());
            }
        }
        Commands::Run {
            mods,
            frames,
            fps,
            config,
            events,
            at,
            dump,
        } => {
            let [x, y, z] = at[..] else {
                bail!("--at takes exactly three numbers, got {}", at.len());
            };
            if !(fps.is_finite() && fps > 0.0) {
                bail!("--fps must be positive");
            }
            let config = match config {
                Some(path) => RuntimeConfig::load(&path)?,
                None => RuntimeConfig::default(),
            };
            run(
                config,
                &mods,
                events.as_deref(),
                Vec3::new(x, y, z),
                frames,
                fps,
                dump,
            )?;
        }
    }

    Ok(())
}

fn run(
    config: RuntimeConfig,
    mods: &[PathBuf],
    events: Option<&Path>,
    target: Vec3,
    frames: u64,
    fps: f64,
    dump: bool,
) -> anyhow::Result<()> {
    let mut runtime = WorldRuntime::new(HeadlessHost::default().verbose(), config);
    runtime.initialize()?;
    while let Some(delay) = runtime.host_mut().take_retry() {
        tracing::debug!(?delay, "initialization retry");
        runtime.on_retry()?;
    }

    for path in mods {
        let m = read_mod_file(path)
            .with_context(|| format!("reading {}", path.display()))?
            .at(target);
        if let Err(err) = runtime.add_mod(m) {
            tracing::warn!(file = %path.display(), error = %err, "mod not loaded");
        }
    }

    if let Some(path) = events {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        for (n, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let event = InboundEvent::from_json(line)
                .with_context(|| format!("{}:{}: bad event", path.display(), n + 1))?;
            if let Err(err) = runtime.handle_event(event) {
                tracing::warn!(line = n + 1, error = %err, "event failed");
            }
        }
    }
    print_notifications(&mut runtime);

    let step = 1.0 / fps;
    for frame in 0..frames {
        runtime.on_frame(Duration::from_secs_f64(frame as f64 * step));
        print_notifications(&mut runtime);
    }

    println!("{}", runtime.summary());
    if dump {
        if let Some(frame) = runtime.host().last_frame() {
            print!("{frame}");
        }
    }
    runtime.teardown();
    Ok(())
}

fn print_notifications(runtime: &mut WorldRuntime<HeadlessHost>) {
    for note in runtime.drain_notifications() {
        println!("{note}");
    }
}
