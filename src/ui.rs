use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

const PLAIN_REPORT_EVERY: u64 = 25;

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

/// Stage and playback reporting on stderr: spinners on a terminal, plain lines otherwise.
#[derive(Clone, Debug)]
pub struct Ui {
    pretty: bool,
}

impl Ui {
    /// `disable_pretty` keeps `Auto` plain, e.g. when stdout is piped.
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        let pretty = is_tty
            && match mode {
                UiMode::Pretty => true,
                UiMode::Auto => !disable_pretty,
                UiMode::Plain => false,
            };
        Self { pretty }
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        let spinner = self.spinner(format!("{name}…"));
        if spinner.is_none() {
            eprintln!("==> {}", name);
        }
        StageGuard {
            name: name.to_string(),
            start: Instant::now(),
            spinner,
        }
    }

    /// Live status line for a playing video.
    pub fn playback(&self, source: &str) -> PlaybackLine {
        let spinner = self.spinner(format!("{source}: waiting for first frame"));
        if spinner.is_none() {
            eprintln!("==> Play {}", source);
        }
        PlaybackLine {
            source: source.to_string(),
            start: Instant::now(),
            frames: 0,
            spinner,
        }
    }

    fn spinner(&self, message: String) -> Option<ProgressBar> {
        if !self.pretty {
            return None;
        }
        let spinner = ProgressBar::new_spinner();
        spinner.set_draw_target(ProgressDrawTarget::stderr());
        spinner.enable_steady_tick(Duration::from_millis(120));
        let style = ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.set_message(message);
        Some(spinner)
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let message = format!("✔ {} ({})", self.name, format_duration(self.start.elapsed()));
        match &self.spinner {
            Some(spinner) => spinner.finish_with_message(message),
            None => eprintln!("{message}"),
        }
    }
}

pub struct PlaybackLine {
    source: String,
    start: Instant,
    frames: u64,
    spinner: Option<ProgressBar>,
}

impl PlaybackLine {
    pub fn update(&mut self, index: u64, counts: &str, recording: bool) {
        self.frames += 1;
        let rec = if recording { " [REC]" } else { "" };
        match &self.spinner {
            Some(spinner) => spinner.set_message(format!(
                "{}: frame {}{} | counts {}",
                self.source, index, rec, counts
            )),
            None if self.frames % PLAIN_REPORT_EVERY == 1 => {
                eprintln!("    frame {}{} | counts {}", index, rec, counts)
            }
            None => {}
        }
    }

    pub fn finish(&self, outcome: &str) {
        let message = format!(
            "✔ {}: {} frames, {} ({})",
            self.source,
            self.frames,
            outcome,
            format_duration(self.start.elapsed())
        );
        match &self.spinner {
            Some(spinner) => spinner.finish_with_message(message),
            None => eprintln!("{message}"),
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
