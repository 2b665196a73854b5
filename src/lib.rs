//! Synchronous serial-port transport: open a named port, apply a fixed
//! 8-N-1 policy, and exchange bytes, lines and `f32` values over it.

pub mod cancel;
pub mod config;
pub mod device;
pub mod error;
pub mod line;
pub mod notify;
pub mod port;
pub mod system;

// In-memory ports for tests; downstream crates opt in with the `mock` feature
#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use cancel::CancelToken;
pub use config::{LineSettings, QueueSizes, SpecialChars, Timeouts};
pub use device::{Connector, Device, OpenStep};
pub use error::{OpenError, ReadError, WriteError};
pub use line::Line;
pub use notify::{LogNotifier, NoopNotifier, Notify, Tee};
pub use port::SerialPort;
pub use system::{SystemConnector, SystemDevice};
