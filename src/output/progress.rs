use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::styling::{heading, phase, Tone};

/// Spinner for the two wait phases, drawn on stderr.
pub struct WaitProgress {
    pb: ProgressBar,
}

impl WaitProgress {
    /// Starts phase 1. A hidden progress never draws anything.
    pub fn start_search(sha: &str, visible: bool) -> Self {
        if !visible {
            return Self {
                pb: ProgressBar::hidden(),
            };
        }
        eprintln!("{}", heading("⚙️  Phases"));
        let pb = create_spinner(phase(
            Tone::Active,
            format!("Phase 1/2: Searching pipeline for {sha}"),
        ));
        Self { pb }
    }

    pub fn finish_search_start_polling(self, pipeline_number: u64) -> Self {
        if self.pb.is_hidden() {
            return self;
        }
        self.pb.finish_with_message(phase(
            Tone::Done,
            format!("Phase 1/2: Found pipeline #{pipeline_number} ✓"),
        ));
        let pb = create_spinner(phase(Tone::Active, "Phase 2/2: Waiting for workflows"));
        Self { pb }
    }

    pub fn update_round(&self, round: u32, pending: &str) {
        self.pb.set_message(phase(
            Tone::Active,
            format!("Phase 2/2: Waiting for workflows (round {round}, {pending})"),
        ));
    }

    pub fn finish_success(self) {
        if self.pb.is_hidden() {
            return;
        }
        self.pb
            .finish_with_message(phase(Tone::Done, "Phase 2/2: All workflows succeeded ✓"));
        eprintln!();
    }

    pub fn abandon(self, reason: &str) {
        if self.pb.is_hidden() {
            return;
        }
        self.pb
            .abandon_with_message(phase(Tone::Stopped, format!("Stopped: {reason} ✗")));
        eprintln!();
    }
}

fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    if let Ok(style) = ProgressStyle::default_spinner().template("  {msg} {spinner}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
