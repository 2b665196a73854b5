//! Diagnostic side channel
//! Operator-facing status messages emitted while a port is being opened

/// Receives one human-readable status line per configuration step.
///
/// Any `Fn(&str)` closure is a notifier, so a speech or announcement
/// function can be passed in directly.
pub trait Notify {
    fn notify(&self, message: &str);
}

impl<F: Fn(&str)> Notify for F {
    fn notify(&self, message: &str) {
        self(message)
    }
}

/// Discards every message
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notify for NoopNotifier {
    fn notify(&self, _message: &str) {}
}

/// Forwards messages to the `log` facade at info level
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notify for LogNotifier {
    fn notify(&self, message: &str) {
        log::info!(target: "comlink::status", "{}", message);
    }
}

/// Sends every message to both sinks, first `A` then `B`
#[derive(Debug, Clone, Copy, Default)]
pub struct Tee<A, B>(pub A, pub B);

impl<A: Notify, B: Notify> Notify for Tee<A, B> {
    fn notify(&self, message: &str) {
        self.0.notify(message);
        self.1.notify(message);
    }
}
