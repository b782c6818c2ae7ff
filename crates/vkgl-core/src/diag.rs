//! Out-of-band diagnostics channel.
//!
//! Recording never fails synchronously: a call the backend cannot honor is
//! dropped and reported here. Consumers poll the receiver; everything is
//! also mirrored to the log.

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticSeverity {
    Warning,
    Error,
}

/// One dropped or degraded operation.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    /// Name of the recording operation that was dropped
    pub origin: &'static str,
    pub message: String,
}

/// Producer side of the diagnostics channel. Cloned into every command
/// buffer recording against the device.
#[derive(Clone)]
pub struct DiagnosticSink {
    tx: Sender<Diagnostic>,
    log_dropped: bool,
}

impl DiagnosticSink {
    pub fn new(log_dropped: bool) -> (Self, Receiver<Diagnostic>) {
        let (tx, rx) = unbounded();
        (Self { tx, log_dropped }, rx)
    }

    pub fn report(&self, severity: DiagnosticSeverity, origin: &'static str, message: String) {
        if self.log_dropped {
            warn!(origin, "{}", message);
        }
        // A disconnected receiver just means nobody is listening.
        let _ = self.tx.send(Diagnostic {
            severity,
            origin,
            message,
        });
    }

    /// Report a command dropped because the backend lacks a capability.
    pub fn unsupported(&self, origin: &'static str, what: &str) {
        self.report(
            DiagnosticSeverity::Warning,
            origin,
            format!("dropped: backend does not support {}", what),
        );
    }

    /// Report a command dropped because its arguments were invalid.
    pub fn invalid(&self, origin: &'static str, message: String) {
        self.report(DiagnosticSeverity::Error, origin, message);
    }
}
