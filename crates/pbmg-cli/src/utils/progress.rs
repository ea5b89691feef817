use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use pbmg::engine::progress::{Progress, ProgressCallback};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

const SPINNER_TICK_MS: u64 = 100;
const PHASE_TEMPLATE: &str = "{spinner:.green} {prefix:.bold} {msg}";
const CYCLE_TEMPLATE: &str = "{prefix:.bold} {msg:<10} [{bar:30.cyan/blue}] cycle {pos}/{len}";
const SEQUENCE_TEMPLATE: &str = "{prefix:.bold} [{bar:30.green/white}] {pos}/{len} calculations";

/// What the engine is doing right now, as far as the event stream tells.
struct RenderState {
    bar: ProgressBar,
    /// Label of the running calculation, from `Calculation i of n` messages.
    calculation: Option<String>,
    /// Phase of the running calculation; a task inside a phase counts solver cycles.
    phase: Option<&'static str>,
}

impl RenderState {
    fn prefix(&self) -> String {
        self.calculation
            .as_ref()
            .map(|c| format!("[{}]", c))
            .unwrap_or_default()
    }

    fn apply(&mut self, event: Progress) {
        match event {
            Progress::Message(text) => {
                if text.starts_with("Calculation ") {
                    self.calculation = Some(text);
                    self.bar.set_prefix(self.prefix());
                } else {
                    self.bar.println(format!("  {}", text));
                }
            }
            Progress::PhaseStart { name } => {
                self.phase = Some(name);
                self.bar.reset();
                self.bar.set_length(0);
                self.bar.set_style(style(PHASE_TEMPLATE, ProgressStyle::default_spinner));
                self.bar.set_prefix(self.prefix());
                self.bar.set_message(name);
                self.bar.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
            }
            Progress::PhaseFinish => {
                self.bar.disable_steady_tick();
                if let Some(phase) = self.phase.take() {
                    self.bar.set_message(format!("{} ✓", phase));
                }
                self.bar.finish();
            }
            Progress::TaskStart { total_steps } => {
                self.bar.disable_steady_tick();
                self.bar.reset();
                self.bar.set_length(total_steps);
                let template = if self.phase.is_some() {
                    CYCLE_TEMPLATE
                } else {
                    SEQUENCE_TEMPLATE
                };
                self.bar.set_style(style(template, ProgressStyle::default_bar));
                self.bar.set_prefix(self.prefix());
                if let Some(phase) = self.phase {
                    self.bar.set_message(phase);
                }
            }
            Progress::TaskIncrement => self.bar.inc(1),
            Progress::TaskFinish => match self.phase {
                // The solver stops at convergence; the bar keeps the cycle count it reached.
                Some(phase) => {
                    let cycles = self.bar.position();
                    self.bar.set_length(cycles);
                    self.bar.set_message(format!("{} ({} cycles)", phase, cycles));
                }
                None => self.bar.finish(),
            },
        }
    }
}

fn style(template: &str, fallback: fn() -> ProgressStyle) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .map(|s| s.progress_chars("=> "))
        .unwrap_or_else(|_| fallback())
}

/// Renders calculation phases and solver cycles of a `pbmg run` on stderr.
#[derive(Clone)]
pub struct CliProgressHandler {
    state: Arc<Mutex<RenderState>>,
}

impl CliProgressHandler {
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    /// A handler that tracks state without drawing, for `--quiet` runs.
    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), target);
        Self {
            state: Arc::new(Mutex::new(RenderState {
                bar,
                calculation: None,
                phase: None,
            })),
        }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let state = Arc::clone(&self.state);
        Box::new(move |event: Progress| match state.lock() {
            Ok(mut guard) => guard.apply(event),
            Err(_) => warn!("Progress state mutex was poisoned; dropping progress event."),
        })
    }

    /// Clears the display once the sequence is over.
    pub fn finish(&self) {
        if let Ok(guard) = self.state.lock() {
            guard.bar.finish_and_clear();
        }
    }
}

impl Default for CliProgressHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn snapshot(handler: &CliProgressHandler) -> (String, String, Option<u64>, u64) {
        let guard = handler.state.lock().unwrap();
        (
            guard.bar.prefix(),
            guard.bar.message(),
            guard.bar.length(),
            guard.bar.position(),
        )
    }

    #[test]
    fn calculation_messages_label_the_phases_that_follow() {
        let handler = CliProgressHandler::hidden();
        let callback = handler.get_callback();
        callback(Progress::Message("Calculation 2 of 3".to_string()));
        callback(Progress::PhaseStart { name: "Mapping" });
        let (prefix, message, _, _) = snapshot(&handler);
        assert_eq!(prefix, "[Calculation 2 of 3]");
        assert_eq!(message, "Mapping");

        callback(Progress::PhaseFinish);
        assert_eq!(snapshot(&handler).1, "Mapping ✓");
    }

    #[test]
    fn solver_cycles_stop_at_convergence() {
        let handler = CliProgressHandler::hidden();
        let callback = handler.get_callback();
        callback(Progress::PhaseStart { name: "Solving" });
        callback(Progress::TaskStart { total_steps: 200 });
        for _ in 0..7 {
            callback(Progress::TaskIncrement);
        }
        callback(Progress::TaskFinish);
        let (_, message, length, position) = snapshot(&handler);
        assert_eq!(message, "Solving (7 cycles)");
        assert_eq!(length, Some(7));
        assert_eq!(position, 7);

        callback(Progress::PhaseFinish);
        assert_eq!(snapshot(&handler).1, "Solving ✓");
    }

    #[test]
    fn tasks_outside_a_phase_count_calculations() {
        let handler = CliProgressHandler::hidden();
        let callback = handler.get_callback();
        callback(Progress::TaskStart { total_steps: 3 });
        callback(Progress::TaskIncrement);
        callback(Progress::TaskIncrement);
        let (_, _, length, position) = snapshot(&handler);
        assert_eq!((length, position), (Some(3), 2));
        callback(Progress::TaskFinish);
        assert!(handler.state.lock().unwrap().bar.is_finished());
    }

    #[test]
    fn callback_is_usable_from_worker_threads() {
        let handler = CliProgressHandler::hidden();
        let callback = handler.get_callback();
        thread::spawn(move || {
            callback(Progress::Message("Calculation 1 of 1".to_string()));
            callback(Progress::PhaseStart { name: "Forces" });
            callback(Progress::PhaseFinish);
        })
        .join()
        .unwrap();
        handler.finish();
        let (prefix, message, _, _) = snapshot(&handler);
        assert_eq!(prefix, "[Calculation 1 of 1]");
        assert_eq!(message, "Forces ✓");
    }
}
