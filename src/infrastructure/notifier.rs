//! User-facing notices.

use colored::Colorize;

use crate::domain::Notice;

/// Presents notices to the user.
pub trait Notifier {
    fn notify(&self, notice: &Notice);
}

impl<T: Notifier + ?Sized> Notifier for &T {
    fn notify(&self, notice: &Notice) {
        (**self).notify(notice);
    }
}

/// Prints notices to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: &Notice) {
        let message = notice.message();
        if notice.is_warning() {
            println!("{} {}", "⚠".yellow().bold(), message.yellow());
        } else if matches!(notice, Notice::Injected { .. }) {
            println!("{} {}", "✓".green().bold(), message);
        } else {
            println!("{} {}", "ℹ".blue().bold(), message);
        }

        if notice.offers_reload() {
            println!(
                "  {} Reload Now: run \"Developer: Reload Window\" in the editor",
                "↻".cyan()
            );
        }
    }
}

/// Collects notices for assertions.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingNotifier {
    notices: std::sync::Mutex<Vec<Notice>>,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl Notifier for RecordingNotifier {
    fn notify(&self, notice: &Notice) {
        self.notices.lock().unwrap().push(notice.clone());
    }
}
