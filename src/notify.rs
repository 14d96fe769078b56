use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Success,
    Error,
}

/// User-visible notifications (the toast/snackbar channel).
pub trait Notifier: Send + Sync {
    fn notify(&self, level: Level, message: &str);

    fn error(&self, message: &str) {
        self.notify(Level::Error, message);
    }

    fn success(&self, message: &str) {
        self.notify(Level::Success, message);
    }
}

pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, level: Level, message: &str) {
        match level {
            Level::Success => println!("✓ {}", message),
            Level::Error => eprintln!("❌ {}", message),
        }
    }
}

/// Keeps every notification in memory. Useful wherever output must be
/// inspected instead of shown.
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(Level, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(Level, String)> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn errors(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|(level, _)| *level == Level::Error)
            .map(|(_, message)| message)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, level: Level, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push((level, message.to_string()));
        }
    }
}
