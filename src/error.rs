//! Error types for open, write and read

use std::io;

use thiserror::Error;

use crate::device::OpenStep;

/// A failed `SerialPort::open`. The handle, if acquired, has been released.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("{port}: device unavailable")]
    DeviceUnavailable {
        port: String,
        #[source]
        source: io::Error,
    },

    #[error("{port}: queue size configuration rejected")]
    BufferConfigFailed {
        port: String,
        #[source]
        source: io::Error,
    },

    #[error("{port}: purge failed")]
    PurgeFailed {
        port: String,
        #[source]
        source: io::Error,
    },

    #[error("{port}: line configuration rejected")]
    ConfigFailed {
        port: String,
        #[source]
        source: io::Error,
    },

    #[error("{port}: timeout configuration rejected")]
    TimeoutConfigFailed {
        port: String,
        #[source]
        source: io::Error,
    },
}

impl OpenError {
    pub(crate) fn at(step: OpenStep, port: &str, source: io::Error) -> Self {
        let port = port.to_owned();
        match step {
            OpenStep::Acquire => OpenError::DeviceUnavailable { port, source },
            OpenStep::QueueSizes => OpenError::BufferConfigFailed { port, source },
            OpenStep::Purge => OpenError::PurgeFailed { port, source },
            OpenStep::LineSettings => OpenError::ConfigFailed { port, source },
            OpenStep::Timeouts => OpenError::TimeoutConfigFailed { port, source },
        }
    }

    /// Which configuration step failed
    pub fn step(&self) -> OpenStep {
        match self {
            OpenError::DeviceUnavailable { .. } => OpenStep::Acquire,
            OpenError::BufferConfigFailed { .. } => OpenStep::QueueSizes,
            OpenError::PurgeFailed { .. } => OpenStep::Purge,
            OpenError::ConfigFailed { .. } => OpenStep::LineSettings,
            OpenError::TimeoutConfigFailed { .. } => OpenStep::Timeouts,
        }
    }

    pub fn port(&self) -> &str {
        match self {
            OpenError::DeviceUnavailable { port, .. }
            | OpenError::BufferConfigFailed { port, .. }
            | OpenError::PurgeFailed { port, .. }
            | OpenError::ConfigFailed { port, .. }
            | OpenError::TimeoutConfigFailed { port, .. } => port,
        }
    }
}

#[derive(Debug, Error)]
pub enum WriteError {
    /// The write timeout expired before every byte was accepted
    #[error("incomplete write: {written} of {expected} bytes")]
    Incomplete { written: usize, expected: usize },

    #[error("write failed")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum ReadError {
    /// Caller-supplied patience ran out
    #[error("no data before the read deadline")]
    Timeout,

    #[error("read cancelled")]
    Cancelled,

    #[error("read failed")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_round_trips_through_error() {
        for step in OpenStep::ALL {
            let err = OpenError::at(step, "COM3", io::Error::other("boom"));
            assert_eq!(err.step(), step);
            assert_eq!(err.port(), "COM3");
        }
    }

    #[test]
    fn test_open_error_display_names_port() {
        let err = OpenError::at(
            OpenStep::Acquire,
            "/dev/ttyUSB0",
            io::Error::from(io::ErrorKind::NotFound),
        );
        let text = err.to_string();
        assert!(text.starts_with("/dev/ttyUSB0: device unavailable"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_cause_is_left_to_the_chain() {
        let cause = "permission denied by driver";
        let errors: Vec<Box<dyn std::error::Error>> = vec![
            Box::new(OpenError::at(OpenStep::Purge, "COM3", io::Error::other(cause))),
            Box::new(WriteError::from(io::Error::other(cause))),
            Box::new(ReadError::from(io::Error::other(cause))),
        ];
        for err in errors {
            assert!(!err.to_string().contains(cause), "{err}");
            let source = err.source().unwrap();
            assert_eq!(source.to_string(), cause);
        }
    }

    #[test]
    fn test_incomplete_display() {
        let err = WriteError::Incomplete {
            written: 1,
            expected: 4,
        };
        assert_eq!(err.to_string(), "incomplete write: 1 of 4 bytes");
    }
}
