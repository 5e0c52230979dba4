//! Console rendering of installation events.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::install::{EventSink, InstallEvent};

/// Renders installation events as styled console output with a live
/// progress bar during monitored stages. Presentation only; the run does
/// not depend on anything here.
pub struct ConsoleSink {
    bar: Option<ProgressBar>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self { bar: None }
    }

    fn finish_bar(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for ConsoleSink {
    fn emit(&mut self, event: InstallEvent) {
        match event {
            InstallEvent::RunStarted { run_id } => {
                println!(
                    "{} installation run {}",
                    style("courier").cyan().bold(),
                    style(run_id).dim()
                );
            }
            InstallEvent::StageStarted { stage } => {
                self.finish_bar();
                println!("{} {}", style("==>").bold(), stage.describe());
            }
            InstallEvent::StageProgress {
                percent, detail, ..
            } => {
                let bar = self.bar.get_or_insert_with(|| {
                    let bar = ProgressBar::new(100);
                    bar.set_style(
                        ProgressStyle::with_template("  {bar:32.cyan/blue} {pos:>3}% {msg}")
                            .unwrap_or_else(|_| ProgressStyle::default_bar()),
                    );
                    bar
                });
                bar.set_position(u64::from(percent.min(100)));
                if !detail.is_empty() {
                    bar.set_message(detail);
                }
            }
            InstallEvent::StageCompleted { detail, .. } => {
                self.finish_bar();
                if detail.is_empty() {
                    println!("    {}", style("done").green());
                } else {
                    println!("    {} {}", style("done").green(), style(detail).dim());
                }
            }
            InstallEvent::RunCompleted => {
                self.finish_bar();
                println!();
                println!("{} installation completed", style("ok").green().bold());
            }
            InstallEvent::RunFailed { stage, reason } => {
                self.finish_bar();
                eprintln!();
                eprintln!(
                    "{} {} failed: {}",
                    style("error").red().bold(),
                    stage,
                    reason
                );
            }
        }
    }
}
