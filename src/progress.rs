use std::sync::Mutex;

use crossbeam_channel::Sender;
use indicatif::{ProgressBar, ProgressStyle};

/// One entry in the ordered progress stream a controller observes: a stage
/// announcement carrying the item total, then one `Advanced` per item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    StageStarted { label: String, total: u64 },
    Advanced,
}

/// Injected observer for job progress. Called synchronously from the
/// worker; marshalling onto a UI thread is the controller's business.
pub trait ProgressSink {
    fn begin_stage(&self, label: &str, total: u64);
    fn advance(&self);
}

/// Discards all progress.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn begin_stage(&self, _label: &str, _total: u64) {}
    fn advance(&self) {}
}

/// Forwards progress events over a channel to an external controller.
/// Sends are fire-and-forget: a controller that dropped its receiver does
/// not stall or fail the job.
pub struct ChannelSink {
    sender: Sender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new(sender: Sender<ProgressEvent>) -> Self {
        ChannelSink { sender }
    }
}

impl ProgressSink for ChannelSink {
    fn begin_stage(&self, label: &str, total: u64) {
        let _ = self.sender.send(ProgressEvent::StageStarted {
            label: label.to_string(),
            total,
        });
    }

    fn advance(&self) {
        let _ = self.sender.send(ProgressEvent::Advanced);
    }
}

/// Terminal progress bar for the CLI. Each stage gets a fresh bar so the
/// total resets between the enumeration and rendering phases.
pub struct BarSink {
    bar: Mutex<ProgressBar>,
    hidden: bool,
}

impl BarSink {
    pub fn new(hidden: bool) -> Self {
        BarSink {
            bar: Mutex::new(ProgressBar::hidden()),
            hidden,
        }
    }

    pub fn finish(&self) {
        self.bar.lock().unwrap().finish_and_clear();
    }
}

impl ProgressSink for BarSink {
    fn begin_stage(&self, label: &str, total: u64) {
        let mut slot = self.bar.lock().unwrap();
        slot.finish_and_clear();
        if self.hidden {
            return;
        }
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::with_template(
                "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}",
            )
            .unwrap()
            .progress_chars("=>-"),
        );
        bar.set_message(label.to_string());
        *slot = bar;
    }

    fn advance(&self) {
        self.bar.lock().unwrap().inc(1);
    }
}
