use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use repolens::{FetchEvent, FetchPhase};

/// Interactive progress reporter using an indicatif spinner.
///
/// One spinner lives from `Start` to `Done`/`Failed`; it is cleared rather
/// than left behind so rendered output starts on a clean line.
pub struct InteractiveReporter {
    bar: Mutex<Option<ProgressBar>>,
    draw_target: fn() -> ProgressDrawTarget,
}

impl InteractiveReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
            draw_target: ProgressDrawTarget::stderr,
        }
    }

    /// Reporter that draws nowhere, for tests.
    #[cfg(test)]
    pub fn new_hidden() -> Self {
        Self {
            bar: Mutex::new(None),
            draw_target: ProgressDrawTarget::hidden,
        }
    }

    /// True when no spinner is active.
    #[cfg(test)]
    pub fn is_idle(&self) -> bool {
        self.bar.lock().unwrap_or_else(|e| e.into_inner()).is_none()
    }

    pub fn handle(&self, event: FetchEvent) {
        let mut slot = self.bar.lock().unwrap_or_else(|e| e.into_inner());

        match event {
            FetchEvent::Phase {
                phase: FetchPhase::Start,
                subject,
            } => {
                if let Some(old) = slot.take() {
                    old.finish_and_clear();
                }
                let bar = ProgressBar::with_draw_target(None, (self.draw_target)());
                bar.set_style(Self::spinner_style());
                bar.set_prefix(subject);
                bar.set_message("Starting...");
                bar.enable_steady_tick(Duration::from_millis(100));
                *slot = Some(bar);
            }

            FetchEvent::Phase { phase, .. } => {
                let Some(bar) = slot.as_ref() else {
                    return;
                };
                match phase {
                    FetchPhase::CacheLookup => bar.set_message("Checking cache..."),
                    FetchPhase::CacheHit => bar.set_message("Loaded from cache"),
                    FetchPhase::CacheMiss | FetchPhase::Fetching => {
                        bar.set_message("Fetching repositories...")
                    }
                    FetchPhase::Validating => bar.set_message("Validating records..."),
                    FetchPhase::Persisting => bar.set_message("Saving to cache..."),
                    FetchPhase::Done | FetchPhase::Failed | FetchPhase::Start => {}
                }
                if phase.is_terminal()
                    && let Some(bar) = slot.take()
                {
                    bar.finish_and_clear();
                }
            }

            FetchEvent::FetchingPage { page, last_page } => {
                if let Some(bar) = slot.as_ref() {
                    let msg = match last_page {
                        Some(last) => format!("Fetching page {page}/{last}..."),
                        None => format!("Fetching page {page}..."),
                    };
                    bar.set_message(msg);
                }
            }

            FetchEvent::FetchedPage {
                page, total_so_far, ..
            } => {
                if let Some(bar) = slot.as_ref() {
                    bar.set_message(format!("{total_so_far} repositories after page {page}"));
                }
            }

            FetchEvent::RetryBackoff {
                page,
                attempt,
                delay_ms,
                kind,
                ..
            } => {
                if let Some(bar) = slot.as_ref() {
                    bar.set_message(format!(
                        "{kind} on page {page}, retrying in {:.1}s (attempt {attempt})",
                        delay_ms as f64 / 1000.0
                    ));
                }
            }

            FetchEvent::Warning { message } => match slot.as_ref() {
                Some(bar) => bar.suspend(|| eprintln!("warning: {message}")),
                None => eprintln!("warning: {message}"),
            },

            _ => {}
        }
    }

    pub fn finish(&self) {
        let mut slot = self.bar.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(bar) = slot.take() {
            bar.finish_and_clear();
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}
