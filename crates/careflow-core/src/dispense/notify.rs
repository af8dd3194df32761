//! User-facing notification seam.

use std::sync::Mutex;

/// Visual weight of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// Receives short user-facing messages. The host application decides
/// how to show them (toast, status bar, console).
pub trait Notifier {
    fn notify(&self, severity: Severity, message: &str);
}

/// Notifier that holds messages until the UI collects them.
#[derive(Debug, Default)]
pub struct BufferedNotifier {
    messages: Mutex<Vec<(Severity, String)>>,
}

impl BufferedNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take all pending messages, oldest first.
    pub fn drain(&self) -> Vec<(Severity, String)> {
        match self.messages.lock() {
            Ok(mut messages) => std::mem::take(&mut *messages),
            Err(_) => Vec::new(),
        }
    }
}

impl Notifier for BufferedNotifier {
    fn notify(&self, severity: Severity, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push((severity, message.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffered_notifier_drains_in_order() {
        let notifier = BufferedNotifier::new();
        notifier.notify(Severity::Info, "first");
        notifier.notify(Severity::Error, "second");

        let messages = notifier.drain();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], (Severity::Info, "first".into()));
        assert_eq!(messages[1], (Severity::Error, "second".into()));

        assert!(notifier.drain().is_empty());
    }
}
