use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::time::Duration;

use crate::service::{Completion, Outcome, ServiceState};

pub struct ProgressManager {
    multi_progress: MultiProgress,
}

impl ProgressManager {
    /// A hidden manager draws nothing but still hands out working bars
    pub fn new(hidden: bool) -> Self {
        let multi_progress = if hidden {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        } else {
            MultiProgress::new()
        };
        ProgressManager { multi_progress }
    }

    /// One spinner per source, keyed by the source display name
    pub fn create_source_bars(&self, source_names: &[String]) -> SourceBars {
        let style = ProgressStyle::with_template(
            "{prefix:.bold.dim} {spinner:.green} {pos:>5} requests {wide_msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✔"]);

        let bars = source_names
            .iter()
            .map(|name| {
                let bar = self.multi_progress.add(ProgressBar::new_spinner());
                bar.set_style(style.clone());
                bar.set_prefix(format!("{:<15}", name));
                bar.enable_steady_tick(Duration::from_millis(100));
                (name.clone(), SourceBar::new(bar))
            })
            .collect();

        SourceBars { bars }
    }

    /// Runs `f` with the bars cleared so stdout lines are not torn
    pub fn suspend<F: FnOnce() -> R, R>(&self, f: F) -> R {
        self.multi_progress.suspend(f)
    }
}

struct SourceBar {
    bar: ProgressBar,
    names: usize,
    failures: usize,
    state: ServiceState,
}

impl SourceBar {
    fn new(bar: ProgressBar) -> Self {
        SourceBar {
            bar,
            names: 0,
            failures: 0,
            state: ServiceState::Idle,
        }
    }

    fn message(&self) -> String {
        let mut message = format!("{} names", self.names);
        if self.failures > 0 {
            message.push_str(&format!(", {} failed", self.failures));
        }
        if self.state != ServiceState::Idle {
            message.push_str(&format!(" ({})", self.state.label()));
        }
        message
    }

    fn refresh(&self) {
        self.bar.set_message(self.message());
    }
}

/// Per-source request counters shown while a run is in progress
pub struct SourceBars {
    bars: HashMap<String, SourceBar>,
}

impl SourceBars {
    pub fn record(&mut self, completion: &Completion) {
        let Some(entry) = self.bars.get_mut(&completion.source) else {
            return;
        };

        match completion.outcome {
            Outcome::Filtered => return,
            Outcome::Published(n) => entry.names += n,
            Outcome::Failed | Outcome::Cancelled => entry.failures += 1,
        }
        entry.bar.inc(1);
        entry.refresh();
    }

    /// Shows what a source is doing right now; redraws only on change
    pub fn show_state(&mut self, source: &str, state: ServiceState) {
        let Some(entry) = self.bars.get_mut(source) else {
            return;
        };
        if entry.state != state {
            entry.state = state;
            entry.refresh();
        }
    }

    pub fn finish(&mut self) {
        for entry in self.bars.values_mut() {
            entry.state = ServiceState::Idle;
            entry.refresh();
            entry.bar.finish();
        }
    }
}
