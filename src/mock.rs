//! In-memory serial backend
//! Named ports on a shared bus, wired as loopbacks or crossover pairs, with
//! per-step fault injection and a record of everything applied

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crate::config::{LineSettings, QueueSizes, Timeouts};
use crate::device::{Connector, Device, OpenStep};

#[derive(Default)]
struct PortState {
    claimed: bool,
    /// Where transmitted bytes land; `None` keeps them only in `sent`
    peer: Option<String>,
    rx: VecDeque<u8>,
    sent: Vec<u8>,
    fail_at: Option<OpenStep>,
    /// Bytes still accepted before writes stall; `None` is unlimited
    write_capacity: Option<usize>,
    /// Slow line: each write call waits this long, then takes at most `write_chunk`
    write_delay: Duration,
    write_chunk: Option<usize>,
    settings: LineSettings,
    timeouts: Timeouts,
    applied_settings: Vec<LineSettings>,
    applied_timeouts: Vec<Timeouts>,
    queue_sizes: Option<QueueSizes>,
    purges: usize,
    acquisitions: usize,
    releases: usize,
    empty_polls: usize,
}

/// What a test can observe about one mock port
#[derive(Debug, Clone, PartialEq)]
pub struct PortSnapshot {
    pub claimed: bool,
    pub applied_settings: Vec<LineSettings>,
    pub applied_timeouts: Vec<Timeouts>,
    pub queue_sizes: Option<QueueSizes>,
    pub purges: usize,
    pub acquisitions: usize,
    pub releases: usize,
    pub empty_polls: usize,
    pub pending_rx: usize,
}

#[derive(Default)]
struct BusState {
    ports: HashMap<String, PortState>,
}

impl BusState {
    fn port(&mut self, name: &str) -> io::Result<&mut PortState> {
        self.ports
            .get_mut(name)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no such port {name}")))
    }
}

/// A set of named mock ports. Cloning shares the bus.
#[derive(Clone, Default)]
pub struct MockBus {
    state: Arc<Mutex<BusState>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        // A panicking test thread must not hide the state from the others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_port<T>(&self, name: &str, f: impl FnOnce(&mut PortState) -> T) -> T {
        let mut bus = self.lock();
        let port = bus
            .ports
            .get_mut(name)
            .unwrap_or_else(|| panic!("mock port {name} was never added"));
        f(port)
    }

    /// Add a port whose transmitted bytes go nowhere
    pub fn add_port(&self, name: &str) -> &Self {
        self.lock().ports.insert(name.to_owned(), PortState::default());
        self
    }

    /// Add a port with TX wired to its own RX
    pub fn add_loopback(&self, name: &str) -> &Self {
        self.add_port(name);
        self.with_port(name, |p| p.peer = Some(name.to_owned()));
        self
    }

    /// Add two ports with crossed TX/RX lines
    pub fn add_pair(&self, a: &str, b: &str) -> &Self {
        self.add_port(a);
        self.add_port(b);
        self.with_port(a, |p| p.peer = Some(b.to_owned()));
        self.with_port(b, |p| p.peer = Some(a.to_owned()));
        self
    }

    /// Make `step` fail the next time it runs on `name`
    pub fn fail_at(&self, name: &str, step: OpenStep) -> &Self {
        self.with_port(name, |p| p.fail_at = Some(step));
        self
    }

    /// Accept only `capacity` more bytes, then stall like an unresponsive line
    pub fn limit_writes(&self, name: &str, capacity: usize) -> &Self {
        self.with_port(name, |p| p.write_capacity = Some(capacity));
        self
    }

    /// Make every write call on `name` take `delay` and accept at most
    /// `bytes_per_call` bytes, like a line draining slower than it is fed
    pub fn throttle_writes(&self, name: &str, delay: Duration, bytes_per_call: usize) -> &Self {
        self.with_port(name, |p| {
            p.write_delay = delay;
            p.write_chunk = Some(bytes_per_call);
        });
        self
    }

    /// Queue bytes on the receive side of `name`
    pub fn inject(&self, name: &str, bytes: &[u8]) {
        self.with_port(name, |p| p.rx.extend(bytes.iter().copied()));
    }

    /// Everything `name` has transmitted
    pub fn sent(&self, name: &str) -> Vec<u8> {
        self.with_port(name, |p| p.sent.clone())
    }

    pub fn snapshot(&self, name: &str) -> PortSnapshot {
        self.with_port(name, |p| PortSnapshot {
            claimed: p.claimed,
            applied_settings: p.applied_settings.clone(),
            applied_timeouts: p.applied_timeouts.clone(),
            queue_sizes: p.queue_sizes,
            purges: p.purges,
            acquisitions: p.acquisitions,
            releases: p.releases,
            empty_polls: p.empty_polls,
            pending_rx: p.rx.len(),
        })
    }
}

impl Connector for MockBus {
    type Device = MockDevice;

    fn connect(&self, port_name: &str) -> io::Result<MockDevice> {
        let mut bus = self.lock();
        let port = bus.port(port_name)?;
        if port.fail_at == Some(OpenStep::Acquire) {
            port.fail_at = None;
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "access denied",
            ));
        }
        if port.claimed {
            return Err(io::Error::other(format!("{port_name} is already open")));
        }
        port.claimed = true;
        port.acquisitions += 1;
        Ok(MockDevice {
            name: port_name.to_owned(),
            bus: self.clone(),
        })
    }
}

/// One claimed mock port; dropping it releases the claim
pub struct MockDevice {
    name: String,
    bus: MockBus,
}

impl MockDevice {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn step<T>(&self, step: OpenStep, f: impl FnOnce(&mut PortState) -> T) -> io::Result<T> {
        self.bus.with_port(&self.name, |p| {
            if p.fail_at == Some(step) {
                p.fail_at = None;
                return Err(io::Error::other(format!("injected {step} failure")));
            }
            Ok(f(p))
        })
    }
}

impl io::Read for MockDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.bus.with_port(&self.name, |p| {
            if p.rx.is_empty() {
                p.empty_polls += 1;
                return Err(io::Error::from(io::ErrorKind::TimedOut));
            }
            let mut n = 0;
            while n < buf.len() {
                match p.rx.pop_front() {
                    Some(b) => {
                        buf[n] = b;
                        n += 1;
                    }
                    None => break,
                }
            }
            Ok(n)
        })
    }
}

impl io::Write for MockDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // Sleep without holding the bus so readers on other threads progress
        let delay = self.bus.with_port(&self.name, |p| p.write_delay);
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let mut bus = self.bus.lock();
        let port = bus.port(&self.name)?;

        let mut accepted = match port.write_capacity {
            Some(0) => return Err(io::Error::from(io::ErrorKind::TimedOut)),
            Some(cap) => buf.len().min(cap),
            None => buf.len(),
        };
        if let Some(chunk) = port.write_chunk {
            accepted = accepted.min(chunk);
        }
        if let Some(cap) = port.write_capacity.as_mut() {
            *cap -= accepted;
        }
        let data = &buf[..accepted];
        port.sent.extend_from_slice(data);

        if let Some(peer) = port.peer.clone() {
            bus.port(&peer)?.rx.extend(data.iter().copied());
        }
        Ok(accepted)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Device for MockDevice {
    fn set_queue_sizes(&mut self, sizes: QueueSizes) -> io::Result<()> {
        self.step(OpenStep::QueueSizes, |p| p.queue_sizes = Some(sizes))
    }

    fn purge(&mut self) -> io::Result<()> {
        self.step(OpenStep::Purge, |p| {
            p.rx.clear();
            p.purges += 1;
        })
    }

    fn line_settings(&self) -> io::Result<LineSettings> {
        Ok(self.bus.with_port(&self.name, |p| p.settings.clone()))
    }

    fn apply_line_settings(&mut self, settings: &LineSettings) -> io::Result<()> {
        self.step(OpenStep::LineSettings, |p| {
            p.settings = settings.clone();
            p.applied_settings.push(settings.clone());
        })
    }

    fn timeouts(&self) -> io::Result<Timeouts> {
        Ok(self.bus.with_port(&self.name, |p| p.timeouts))
    }

    fn apply_timeouts(&mut self, timeouts: &Timeouts) -> io::Result<()> {
        self.step(OpenStep::Timeouts, |p| {
            p.timeouts = *timeouts;
            p.applied_timeouts.push(*timeouts);
        })
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.bus.with_port(&self.name, |p| {
            p.claimed = false;
            p.releases += 1;
        });
    }
}
