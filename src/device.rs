//! Device seam
//! Everything `SerialPort` needs from the OS, so backends can be swapped

use std::fmt;
use std::io;

use crate::config::{LineSettings, QueueSizes, Timeouts};

/// One open, exclusively owned serial handle.
///
/// Reads and writes honour the timeouts last applied with
/// [`Device::apply_timeouts`]. A read that sees no data within the timeout
/// returns `Ok(0)` or an error of kind `TimedOut`/`WouldBlock`; both count
/// as an empty poll. Dropping the device releases the handle.
pub trait Device: io::Read + io::Write {
    fn set_queue_sizes(&mut self, sizes: QueueSizes) -> io::Result<()>;

    /// Discard pending data in both directions and abort in-flight transfers
    fn purge(&mut self) -> io::Result<()>;

    fn line_settings(&self) -> io::Result<LineSettings>;
    fn apply_line_settings(&mut self, settings: &LineSettings) -> io::Result<()>;

    fn timeouts(&self) -> io::Result<Timeouts>;
    fn apply_timeouts(&mut self, timeouts: &Timeouts) -> io::Result<()>;
}

/// Acquires a [`Device`] by name with exclusive read/write access
pub trait Connector {
    type Device: Device;

    fn connect(&self, port_name: &str) -> io::Result<Self::Device>;
}

/// The configuration sequence run by `SerialPort::open`, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenStep {
    Acquire,
    QueueSizes,
    Purge,
    LineSettings,
    Timeouts,
}

impl OpenStep {
    pub const ALL: [OpenStep; 5] = [
        OpenStep::Acquire,
        OpenStep::QueueSizes,
        OpenStep::Purge,
        OpenStep::LineSettings,
        OpenStep::Timeouts,
    ];

    /// Operator-facing status line for a successful step
    pub fn success_message(self) -> &'static str {
        match self {
            OpenStep::Acquire => "Serial port opened.",
            OpenStep::QueueSizes => "Transmit and receive buffers configured.",
            OpenStep::Purge => "Transmit and receive buffers cleared.",
            OpenStep::LineSettings => "Port configuration updated.",
            OpenStep::Timeouts => "Timeouts configured.",
        }
    }

    /// Operator-facing status line for a failed step
    pub fn failure_message(self) -> &'static str {
        match self {
            OpenStep::Acquire => "Cannot open serial port.",
            OpenStep::QueueSizes => "Cannot configure transmit and receive buffers.",
            OpenStep::Purge => "Cannot clear transmit and receive buffers.",
            OpenStep::LineSettings => "Failed to update port configuration.",
            OpenStep::Timeouts => "Failed to configure timeouts.",
        }
    }
}

impl fmt::Display for OpenStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpenStep::Acquire => "acquire",
            OpenStep::QueueSizes => "queue sizes",
            OpenStep::Purge => "purge",
            OpenStep::LineSettings => "line settings",
            OpenStep::Timeouts => "timeouts",
        };
        f.write_str(name)
    }
}

/// Empty-poll outcomes: nothing arrived within the timeout
pub(crate) fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_step_messages_are_distinct() {
        let success: HashSet<_> = OpenStep::ALL.iter().map(|s| s.success_message()).collect();
        let failure: HashSet<_> = OpenStep::ALL.iter().map(|s| s.failure_message()).collect();
        assert_eq!(success.len(), OpenStep::ALL.len());
        assert_eq!(failure.len(), OpenStep::ALL.len());
        assert!(success.is_disjoint(&failure));
    }

    #[test]
    fn test_is_timeout() {
        assert!(is_timeout(&io::Error::from(io::ErrorKind::TimedOut)));
        assert!(is_timeout(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(!is_timeout(&io::Error::from(io::ErrorKind::BrokenPipe)));
    }
}
