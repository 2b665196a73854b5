//! Serial Port Handle
//! Opens and configures one port, then moves bytes, lines and floats over it

use std::io;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::config::{LineSettings, QueueSizes, Timeouts, POLL_INTERVAL};
use crate::device::{is_timeout, Connector, Device, OpenStep};
use crate::error::{OpenError, ReadError, WriteError};
use crate::line::{Line, LineAssembler};
use crate::notify::{NoopNotifier, Notify};
use crate::system::{SystemConnector, SystemDevice};

/// An open, configured serial port.
///
/// The handle is owned exclusively and released when the value is dropped.
/// All I/O takes `&mut self`, so one port cannot be driven from two threads
/// without the caller adding its own synchronisation.
pub struct SerialPort<D: Device = SystemDevice> {
    name: String,
    device: D,
    settings: LineSettings,
    timeouts: Timeouts,
    cancel: Option<CancelToken>,
}

impl SerialPort<SystemDevice> {
    /// Open an OS serial device at `baud_rate` with 8-N-1 framing, no flow
    /// control and a 1 s read/write timeout.
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self, OpenError> {
        Self::open_with(&SystemConnector, port_name, baud_rate, &NoopNotifier)
    }
}

impl<D: Device> SerialPort<D> {
    /// Acquire `port_name` through `connector` and configure it, reporting
    /// each step to `notifier`.
    pub fn open_with<C, N>(
        connector: &C,
        port_name: &str,
        baud_rate: u32,
        notifier: &N,
    ) -> Result<Self, OpenError>
    where
        C: Connector<Device = D>,
        N: Notify + ?Sized,
    {
        let device = run_step(OpenStep::Acquire, port_name, notifier, || {
            connector.connect(port_name)
        })?;
        Self::configure(port_name, device, baud_rate, notifier)
    }

    /// Configure an already acquired device: queue sizes, purge, line
    /// settings, timeouts. On error `device` is dropped, which releases it.
    pub fn configure<N>(
        port_name: &str,
        mut device: D,
        baud_rate: u32,
        notifier: &N,
    ) -> Result<Self, OpenError>
    where
        N: Notify + ?Sized,
    {
        run_step(OpenStep::QueueSizes, port_name, notifier, || {
            device.set_queue_sizes(QueueSizes::policy())
        })?;

        run_step(OpenStep::Purge, port_name, notifier, || device.purge())?;

        let settings = run_step(OpenStep::LineSettings, port_name, notifier, || {
            let current = device.line_settings()?;
            debug!("[OPEN] {}: current line settings {:?}", port_name, current);
            let settings = current.with_policy(baud_rate);
            device.apply_line_settings(&settings)?;
            Ok(settings)
        })?;

        let timeouts = run_step(OpenStep::Timeouts, port_name, notifier, || {
            let timeouts = device.timeouts()?.with_policy();
            device.apply_timeouts(&timeouts)?;
            Ok(timeouts)
        })?;

        info!("[OPEN] {} ready at {} baud 8N1", port_name, baud_rate);
        Ok(SerialPort {
            name: port_name.to_owned(),
            device,
            settings,
            timeouts,
            cancel: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn baud_rate(&self) -> u32 {
        self.settings.baud_rate
    }

    pub fn settings(&self) -> &LineSettings {
        &self.settings
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Attach (or detach with `None`) a token that aborts blocking reads
    pub fn set_cancel_token(&mut self, token: Option<CancelToken>) {
        self.cancel = token;
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Release the handle now instead of at end of scope
    pub fn close(self) {
        info!("[CLOSE] {}", self.name);
    }

    // =======================================================================
    // Transmit
    // =======================================================================

    pub fn write_byte(&mut self, byte: u8) -> Result<(), WriteError> {
        self.write_bytes(&[byte])
    }

    /// Send the raw bytes of `text`; no terminator is added
    pub fn write_line(&mut self, text: &str) -> Result<(), WriteError> {
        self.write_bytes(text.as_bytes())
    }

    /// Send the in-memory bytes of `value`, host byte order
    pub fn write_float(&mut self, value: f32) -> Result<(), WriteError> {
        self.write_bytes(&value.to_ne_bytes())
    }

    /// One transfer bounded by the write timeout. The driver may take the
    /// data in several pieces; whatever is left when the window closes makes
    /// the call fail with `Incomplete`.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), WriteError> {
        let expected = bytes.len();
        // A budget too large to represent means the window never closes
        let deadline = Instant::now().checked_add(self.timeouts.write_budget(expected));
        let mut written = 0;

        while written < expected {
            match self.device.write(&bytes[written..]) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_timeout(&e) => break,
                Err(e) => {
                    warn!("[TX] {}: {}", self.name, e);
                    return Err(WriteError::Io(e));
                }
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break;
            }
        }

        if written < expected {
            warn!(
                "[TX] {}: timed out after {} of {} bytes",
                self.name, written, expected
            );
            return Err(WriteError::Incomplete { written, expected });
        }
        debug!("[TX] {}: {} bytes", self.name, expected);
        Ok(())
    }

    // =======================================================================
    // Receive
    // =======================================================================

    /// Block until one byte arrives, polling every 10 ms with no upper bound.
    ///
    /// Returns early only if the cancel token fires or the device reports a
    /// fault other than a timeout.
    pub fn read_byte(&mut self) -> Result<u8, ReadError> {
        self.poll_byte(None)
    }

    /// Like [`read_byte`](Self::read_byte), giving up with
    /// [`ReadError::Timeout`] once `patience` has passed. Expiry is checked
    /// between polls, so the wait can overrun by up to one read timeout.
    pub fn read_byte_within(&mut self, patience: Duration) -> Result<u8, ReadError> {
        self.poll_byte(Instant::now().checked_add(patience))
    }

    /// Read up to and including `\n`, or at most 256 bytes.
    ///
    /// A line that hits the cap comes back as [`Line::Truncated`]; the rest of
    /// it stays on the port for the next call.
    pub fn read_line(&mut self) -> Result<Line, ReadError> {
        self.collect_line(None)
    }

    /// [`read_line`](Self::read_line) with a deadline for the whole line.
    /// Bytes gathered before the deadline are dropped with the error.
    pub fn read_line_within(&mut self, patience: Duration) -> Result<Line, ReadError> {
        self.collect_line(Instant::now().checked_add(patience))
    }

    /// Four bytes reassembled in host byte order
    pub fn read_float(&mut self) -> Result<f32, ReadError> {
        self.collect_float(None)
    }

    /// [`read_float`](Self::read_float) with one deadline for all four bytes
    pub fn read_float_within(&mut self, patience: Duration) -> Result<f32, ReadError> {
        self.collect_float(Instant::now().checked_add(patience))
    }

    fn collect_float(&mut self, deadline: Option<Instant>) -> Result<f32, ReadError> {
        let mut raw = [0u8; 4];
        for slot in raw.iter_mut() {
            *slot = self.poll_byte(deadline)?;
        }
        Ok(f32::from_ne_bytes(raw))
    }

    fn collect_line(&mut self, deadline: Option<Instant>) -> Result<Line, ReadError> {
        let mut assembler = LineAssembler::new();
        loop {
            let byte = self.poll_byte(deadline)?;
            if let Some(line) = assembler.push(byte) {
                if line.is_truncated() {
                    warn!(
                        "[RX] {}: line exceeded {} bytes without a terminator",
                        self.name,
                        line.len()
                    );
                }
                return Ok(line);
            }
        }
    }

    fn poll_byte(&mut self, deadline: Option<Instant>) -> Result<u8, ReadError> {
        let mut buf = [0u8; 1];
        loop {
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                debug!("[RX] {}: read cancelled", self.name);
                return Err(ReadError::Cancelled);
            }

            match self.device.read(&mut buf) {
                Ok(1) => return Ok(buf[0]),
                Ok(_) => {}
                Err(e) if is_timeout(&e) || e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!("[RX] {}: {}", self.name, e);
                    return Err(ReadError::Io(e));
                }
            }

            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(ReadError::Timeout);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Run one configuration step, reporting the outcome to the notifier and log
fn run_step<T, N>(
    step: OpenStep,
    port_name: &str,
    notifier: &N,
    f: impl FnOnce() -> io::Result<T>,
) -> Result<T, OpenError>
where
    N: Notify + ?Sized,
{
    match f() {
        Ok(value) => {
            debug!("[OPEN] {}: {} ok", port_name, step);
            notifier.notify(step.success_message());
            Ok(value)
        }
        Err(e) => {
            warn!("[OPEN] {}: {} failed: {}", port_name, step, e);
            notifier.notify(step.failure_message());
            Err(OpenError::at(step, port_name, e))
        }
    }
}
