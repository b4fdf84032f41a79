//! fishscope - detect, count and record fish in images and video streams

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fishscope::{
    AppConfig, ConfigStore, CountSummary, DisplaySink, Frame, Session, TickOutcome,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Configuration file (default: fishscope.json).
    #[arg(long, env = "FISHSCOPE_CONFIG", global = true)]
    config: Option<PathBuf>,
    /// UI mode for stderr progress.
    #[arg(long, value_enum, default_value_t = ui::UiMode::Auto, global = true)]
    ui: ui::UiMode,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect on a single image and save the annotated result.
    Image(ImageArgs),
    /// Play a video file, image directory, camera or stub:// stream.
    Video(VideoArgs),
    /// Show or change the stored configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args, Debug)]
struct DetectOverrides {
    /// Detector weights; overrides the configured model path.
    #[arg(long)]
    model: Option<String>,
    /// Confidence threshold in 0..=1; overrides the configured value.
    #[arg(long)]
    threshold: Option<f32>,
}

#[derive(Args, Debug)]
struct ImageArgs {
    /// Image to process (PNG, JPEG or BMP).
    path: PathBuf,
    /// Where to write the annotated image (default: result_<timestamp>.png).
    #[arg(long, short)]
    output: Option<PathBuf>,
    #[command(flatten)]
    detect: DetectOverrides,
}

#[derive(Args, Debug)]
struct VideoArgs {
    /// Video file, .mjpeg recording, image directory, /dev/videoN or stub:// URL.
    source: String,
    /// Record the annotated stream into this directory.
    #[arg(long)]
    record_dir: Option<PathBuf>,
    /// Frames to play before recording starts.
    #[arg(long, default_value_t = 0)]
    record_after: u64,
    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
    /// Process frames as fast as possible instead of at the source rate.
    #[arg(long)]
    no_pace: bool,
    #[command(flatten)]
    detect: DetectOverrides,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration.
    Show,
    /// Update stored values; unspecified values are kept.
    Set {
        #[arg(long)]
        model_path: Option<String>,
        /// Box color as r,g,b.
        #[arg(long, value_parser = parse_color)]
        box_color: Option<[u8; 3]>,
        #[arg(long)]
        box_thickness: Option<u32>,
        #[arg(long)]
        font_scale: Option<f32>,
        #[arg(long)]
        threshold: Option<f32>,
    },
}

/// Reports published frames on the console playback line.
#[derive(Default)]
struct ConsoleDisplay {
    line: Option<ui::PlaybackLine>,
    recording: bool,
}

impl DisplaySink for ConsoleDisplay {
    fn show(&mut self, frame: &Frame, counts: &CountSummary) {
        log::debug!("frame {}: {}", frame.index, counts);
        if let Some(line) = self.line.as_mut() {
            line.update(frame.index, &counts.render(), self.recording);
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::new(cli.ui, is_tty, !stdout_is_tty);
    let store = match &cli.config {
        Some(path) => ConfigStore::new(path),
        None => ConfigStore::from_env(),
    };

    match cli.command {
        Command::Image(args) => run_image(&ui, &store, args),
        Command::Video(args) => run_video(&ui, &store, args),
        Command::Config { action } => run_config(&store, action),
    }
}

fn run_image(ui: &ui::Ui, store: &ConfigStore, args: ImageArgs) -> Result<()> {
    let config = effective_config(ui, store, &args.detect)?;
    let mut session = open_session(ui, &config);
    {
        let _stage = ui.stage("Detect");
        session.load_image(&args.path)?;
    }
    println!("{}", session.counts());
    let saved = {
        let _stage = ui.stage("Save annotated image");
        session.save_current(args.output.as_deref())?
    };
    println!("annotated image written to {}", saved.display());
    Ok(())
}

fn run_video(ui: &ui::Ui, store: &ConfigStore, args: VideoArgs) -> Result<()> {
    let config = effective_config(ui, store, &args.detect)?;
    let mut session = open_session(ui, &config);

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
            .context("install Ctrl-C handler")?;
    }

    {
        let _stage = ui.stage("Open source");
        session.load_video(&args.source)?;
    }
    session.display_mut().line = Some(ui.playback(&args.source));
    let frame_interval =
        (!args.no_pace).then(|| Duration::from_secs_f64(1.0 / session.playback_fps().max(1.0)));

    let mut record_dir = args.record_dir.clone();
    let mut processed = 0u64;
    let outcome = loop {
        if stop.load(Ordering::SeqCst) {
            log::info!("interrupted, finalizing");
            break "interrupted";
        }
        if args.max_frames.is_some_and(|max| processed >= max) {
            break "frame limit reached";
        }
        if processed == args.record_after && record_dir.is_some() {
            // Recording starts on resume, so go through a pause.
            session.pause()?;
            let report = session.resume(&mut || record_dir.take())?;
            if let Some(warning) = report.warning {
                eprintln!("warning: {}", warning);
            }
            session.display_mut().recording = session.is_recording();
        }

        let started = Instant::now();
        match session.tick() {
            TickOutcome::Processed { warning, .. } => {
                processed += 1;
                if let Some(warning) = warning {
                    eprintln!("warning: {}", warning);
                    session.display_mut().recording = false;
                }
            }
            TickOutcome::EndOfStream { .. } => break "end of stream",
            TickOutcome::NotPlaying => break "stopped",
        }
        if let Some(rest) = frame_interval.and_then(|i| i.checked_sub(started.elapsed())) {
            std::thread::sleep(rest);
        }
    };

    let last_counts = session.counts().render();
    let recording = session
        .has_saved_output()
        .then(|| session.recording_path().map(Path::to_path_buf))
        .flatten();
    if let Some(line) = &session.display().line {
        line.finish(outcome);
    }
    session.clear();

    println!("last frame counts: {}", last_counts);
    if let Some(path) = recording {
        println!("recording written to {}", path.display());
    }
    Ok(())
}

fn run_config(store: &ConfigStore, action: ConfigAction) -> Result<()> {
    let loaded = store.load();
    let mut config = loaded.config;
    match action {
        ConfigAction::Show => {
            for warning in &loaded.warnings {
                eprintln!("warning: {}", warning);
            }
            print_config(store, &config);
        }
        ConfigAction::Set {
            model_path,
            box_color,
            box_thickness,
            font_scale,
            threshold,
        } => {
            if let Some(path) = model_path {
                config.model_path = path;
            }
            if let Some(color) = box_color {
                config.render.set_box_color(color);
            }
            if let Some(thickness) = box_thickness {
                config.render.set_box_thickness(thickness)?;
            }
            if let Some(scale) = font_scale {
                config.render.set_font_scale(scale)?;
            }
            if let Some(threshold) = threshold {
                config.render.set_confidence_threshold(threshold)?;
            }
            store.save(&config)?;
            print_config(store, &config);
        }
    }
    Ok(())
}

fn effective_config(ui: &ui::Ui, store: &ConfigStore, overrides: &DetectOverrides) -> Result<AppConfig> {
    let mut config = {
        let _stage = ui.stage("Load config");
        store.load().config
    };
    if let Some(model) = &overrides.model {
        config.model_path = model.clone();
    }
    if let Some(threshold) = overrides.threshold {
        config.render.set_confidence_threshold(threshold)?;
    }
    Ok(config)
}

fn open_session(ui: &ui::Ui, config: &AppConfig) -> Session<ConsoleDisplay> {
    let session = {
        let _stage = ui.stage("Load detector");
        Session::new(config, ConsoleDisplay::default())
    };
    if session.detector_warning().is_some() {
        eprintln!("{}; frames will show no detections", session.detector_status());
    }
    session
}

fn print_config(store: &ConfigStore, config: &AppConfig) {
    let [r, g, b] = config.render.box_color();
    println!("config: {}", store.path().display());
    println!("model_path: {}", config.model_path);
    println!("box_color: {},{},{}", r, g, b);
    println!("box_thickness: {}", config.render.box_thickness());
    println!("font_scale: {}", config.render.font_scale());
    println!("confidence_threshold: {}", config.render.confidence_threshold());
}

fn parse_color(raw: &str) -> Result<[u8; 3]> {
    let parts = raw
        .split(',')
        .map(|p| p.trim().parse::<u8>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| anyhow!("invalid color '{}': {}", raw, e))?;
    match parts.as_slice() {
        [r, g, b] => Ok([*r, *g, *b]),
        _ => Err(anyhow!("color must be r,g,b, got '{}'", raw)),
    }
}
