//! Stage progress on stderr: an indicatif spinner on a terminal, plain
//! `==>` lines otherwise.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::str::FromStr;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UiMode {
    #[default]
    Auto,
    Plain,
    Pretty,
}

impl FromStr for UiMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(UiMode::Auto),
            "plain" => Ok(UiMode::Plain),
            "pretty" => Ok(UiMode::Pretty),
            other => Err(format!("unknown ui mode '{}' (expected auto, plain or pretty)", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    disable_pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        Self {
            mode,
            is_tty,
            disable_pretty,
        }
    }

    /// Plain output regardless of the terminal.
    pub fn plain() -> Self {
        Self::new(UiMode::Plain, false, true)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty => true,
                UiMode::Auto => !self.disable_pretty,
                UiMode::Plain => false,
            }
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
    outcome: Option<String>,
    failed: bool,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
            outcome: None,
            failed: false,
        }
    }

    /// Short result shown when the stage ends, e.g. "2 segments".
    pub fn finish_with(&mut self, outcome: impl Into<String>) {
        self.outcome = Some(outcome.into());
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.outcome = Some(reason.into());
        self.failed = true;
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let mark = if self.failed { "✘" } else { "✔" };
        let message = match &self.outcome {
            Some(outcome) => format!(
                "{} {}: {} ({})",
                mark,
                self.name,
                outcome,
                format_duration(elapsed)
            ),
            None => format!("{} {} ({})", mark, self.name, format_duration(elapsed)),
        };
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
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
