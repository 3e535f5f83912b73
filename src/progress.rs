use indicatif::{ProgressBar, ProgressStyle};
use photoquery::{ProgressReporter, ScanPhase, ScanProgress, ScanStatus};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Terminal progress for background scans: one bar per phase.
pub struct CliReporter {
    bar: Mutex<Option<(ScanPhase, ProgressBar)>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn new_bar(phase: ScanPhase, len: usize) -> ProgressBar {
        let label = match phase {
            ScanPhase::Signing => "Loading",
            ScanPhase::Comparing => "Comparing",
            ScanPhase::Sorting => "Sorting",
        };
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "  {spinner:.cyan} {prefix:>9} [{bar:30.cyan/dim}] {pos}/{len} ({eta} remaining)",
        ) {
            pb.set_style(style.progress_chars("━╸─"));
        }
        pb.set_prefix(label);
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }
}

impl ProgressReporter for CliReporter {
    fn on_progress(&self, progress: ScanProgress) {
        let mut guard = self.bar.lock().unwrap_or_else(PoisonError::into_inner);
        let same_phase = matches!(guard.as_ref(), Some((phase, _)) if *phase == progress.phase);
        if !same_phase {
            if let Some((_, old)) = guard.take() {
                old.finish();
            }
            *guard = Some((progress.phase, Self::new_bar(progress.phase, progress.max)));
        }
        if let Some((_, pb)) = guard.as_ref() {
            pb.set_position(progress.value as u64);
        }
    }

    fn on_finished(&self, status: &ScanStatus) {
        let mut guard = self.bar.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((_, pb)) = guard.take() {
            match status {
                ScanStatus::Completed => pb.finish(),
                _ => pb.abandon(),
            }
        }
        match status {
            ScanStatus::Completed => {}
            ScanStatus::Cancelled => eprintln!("⚠️  Scan cancelled; results are partial"),
            ScanStatus::Failed { processed, message } => {
                eprintln!("❌ Scan failed after {} files: {}", processed, message)
            }
        }
    }
}
