//! OS serial backend
//! `Device` and `Connector` on top of the `serialport` crate

use std::io;
use std::time::Duration;

use log::{debug, warn};
use serialport::ClearBuffer;

use crate::config::{LineSettings, QueueSizes, Timeouts, TOTAL_TIMEOUT};
use crate::device::{Connector, Device};

/// Baud used only to get the handle open; step 4 of `open` replaces it
const ACQUIRE_BAUD: u32 = 9600;

/// Opens devices by OS name (`COM3`, `/dev/ttyUSB0`, ...).
///
/// `serialport` opens unix ttys with `TIOCEXCL` and Windows handles with no
/// sharing, so a second open of a claimed port fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemConnector;

impl Connector for SystemConnector {
    type Device = SystemDevice;

    fn connect(&self, port_name: &str) -> io::Result<SystemDevice> {
        let port = serialport::new(port_name, ACQUIRE_BAUD)
            .timeout(TOTAL_TIMEOUT)
            .open()?;
        Ok(SystemDevice::from_port(port))
    }
}

pub struct SystemDevice {
    port: Box<dyn serialport::SerialPort>,
    queue_sizes: Option<QueueSizes>,
    // Driver-level fields serialport cannot read back
    applied: Option<LineSettings>,
    read_interval: Option<Duration>,
}

impl SystemDevice {
    /// Wrap a handle opened elsewhere, e.g. one side of a pseudo-terminal pair
    pub fn from_port(port: Box<dyn serialport::SerialPort>) -> Self {
        SystemDevice {
            port,
            queue_sizes: None,
            applied: None,
            read_interval: None,
        }
    }

    pub fn name(&self) -> Option<String> {
        self.port.name()
    }

    pub fn queue_sizes(&self) -> Option<QueueSizes> {
        self.queue_sizes
    }

    pub fn inner(&self) -> &dyn serialport::SerialPort {
        self.port.as_ref()
    }

    pub fn inner_mut(&mut self) -> &mut dyn serialport::SerialPort {
        self.port.as_mut()
    }
}

impl io::Read for SystemDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl io::Write for SystemDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl Device for SystemDevice {
    fn set_queue_sizes(&mut self, sizes: QueueSizes) -> io::Result<()> {
        if sizes.rx == 0 || sizes.tx == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "queue sizes must be non-zero",
            ));
        }
        // serialport exposes no queue sizing; the driver keeps its own buffers
        debug!(
            "[OPEN] queue sizes rx={} tx={} left to the driver",
            sizes.rx, sizes.tx
        );
        self.queue_sizes = Some(sizes);
        Ok(())
    }

    fn purge(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::All)?;
        Ok(())
    }

    fn line_settings(&self) -> io::Result<LineSettings> {
        let base = self.applied.clone().unwrap_or_default();
        Ok(LineSettings {
            baud_rate: self.port.baud_rate()?,
            data_bits: self.port.data_bits()?,
            parity: self.port.parity()?,
            stop_bits: self.port.stop_bits()?,
            flow_control: self.port.flow_control()?,
            ..base
        })
    }

    fn apply_line_settings(&mut self, settings: &LineSettings) -> io::Result<()> {
        self.port.set_baud_rate(settings.baud_rate)?;
        self.port.set_data_bits(settings.data_bits)?;
        self.port.set_parity(settings.parity)?;
        self.port.set_stop_bits(settings.stop_bits)?;
        self.port.set_flow_control(settings.flow_control)?;

        // Modem-control lines are missing on some drivers (pseudo-terminals,
        // several USB bridges); framing is what matters
        if let Err(e) = self.port.write_data_terminal_ready(settings.dtr) {
            warn!("[OPEN] cannot set DTR={}: {}", settings.dtr, e);
        }
        if let Err(e) = self.port.write_request_to_send(settings.rts) {
            warn!("[OPEN] cannot set RTS={}: {}", settings.rts, e);
        }

        self.applied = Some(settings.clone());
        Ok(())
    }

    fn timeouts(&self) -> io::Result<Timeouts> {
        let timeout = self.port.timeout();
        Ok(Timeouts {
            read_interval: self.read_interval,
            read_multiplier: Duration::ZERO,
            read_constant: timeout,
            write_multiplier: Duration::ZERO,
            write_constant: timeout,
        })
    }

    fn apply_timeouts(&mut self, timeouts: &Timeouts) -> io::Result<()> {
        // serialport has one timeout per call, shared by reads and writes
        if !timeouts.read_multiplier.is_zero() || !timeouts.write_multiplier.is_zero() {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "per-byte timeout multipliers are not supported",
            ));
        }
        if timeouts.read_constant != timeouts.write_constant {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "read and write timeouts must be equal",
            ));
        }
        self.port.set_timeout(timeouts.read_constant)?;
        self.read_interval = timeouts.read_interval;
        Ok(())
    }
}

impl Drop for SystemDevice {
    fn drop(&mut self) {
        debug!(
            "[CLOSE] releasing {}",
            self.port.name().as_deref().unwrap_or("<unnamed>")
        );
    }
}
