//! Port policy
//! Fixed line, timeout and queue settings applied by `SerialPort::open`

use std::time::Duration;

pub use serialport::{DataBits, FlowControl, Parity, StopBits};

/// Driver transmit/receive queue size requested at open
pub const QUEUE_SIZE: usize = 1024;

/// Total read/write timeout, independent of transfer length
pub const TOTAL_TIMEOUT: Duration = Duration::from_millis(1000);

/// Sleep between empty read polls
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Longest line `read_line` accumulates before giving up on a terminator
pub const MAX_LINE_LEN: usize = 256;

pub const XON_CHAR: u8 = 0x11;
pub const XOFF_CHAR: u8 = 0x13;
pub const EOF_CHAR: u8 = 0x03;
pub const EVENT_CHAR: u8 = 0x02;
pub const XON_LIMIT: u16 = 512;
pub const XOFF_LIMIT: u16 = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSizes {
    pub rx: usize,
    pub tx: usize,
}

impl QueueSizes {
    pub const fn policy() -> Self {
        QueueSizes {
            rx: QUEUE_SIZE,
            tx: QUEUE_SIZE,
        }
    }
}

/// Driver-level special characters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpecialChars {
    pub xon: u8,
    pub xoff: u8,
    /// Replacement for bytes received with a parity error; `None` disables it
    pub error: Option<u8>,
    pub eof: u8,
    pub event: u8,
}

/// Line-control block: framing, flow control and driver behaviour flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineSettings {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    pub dtr: bool,
    pub rts: bool,
    pub binary: bool,
    pub xon_limit: u16,
    pub xoff_limit: u16,
    pub tx_continue_on_xoff: bool,
    pub discard_null: bool,
    pub abort_on_error: bool,
    pub chars: SpecialChars,
}

impl Default for LineSettings {
    fn default() -> Self {
        LineSettings {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            dtr: true,
            rts: true,
            binary: true,
            xon_limit: 0,
            xoff_limit: 0,
            tx_continue_on_xoff: false,
            discard_null: false,
            abort_on_error: false,
            chars: SpecialChars::default(),
        }
    }
}

impl LineSettings {
    /// Overwrite every policy field, keeping nothing from the current block
    /// except what the policy does not mention.
    pub fn with_policy(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self.data_bits = DataBits::Eight;
        self.parity = Parity::None;
        self.stop_bits = StopBits::One;
        self.flow_control = FlowControl::None;
        self.dtr = false;
        self.rts = false;
        self.binary = true;
        self.xon_limit = XON_LIMIT;
        self.xoff_limit = XOFF_LIMIT;
        self.tx_continue_on_xoff = true;
        self.discard_null = true;
        self.abort_on_error = true;
        self.chars = SpecialChars {
            xon: XON_CHAR,
            xoff: XOFF_CHAR,
            error: None,
            eof: EOF_CHAR,
            event: EVENT_CHAR,
        };
        self
    }

    /// 8-N-1 with no flow control
    pub fn is_8n1(&self) -> bool {
        self.data_bits == DataBits::Eight
            && self.parity == Parity::None
            && self.stop_bits == StopBits::One
            && self.flow_control == FlowControl::None
    }
}

/// Timeout block. A total timeout is `constant + multiplier * len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timeouts {
    /// Maximum gap between two received bytes; left as the driver reports it
    pub read_interval: Option<Duration>,
    pub read_multiplier: Duration,
    pub read_constant: Duration,
    pub write_multiplier: Duration,
    pub write_constant: Duration,
}

impl Timeouts {
    pub fn with_policy(mut self) -> Self {
        self.read_multiplier = Duration::ZERO;
        self.read_constant = TOTAL_TIMEOUT;
        self.write_multiplier = Duration::ZERO;
        self.write_constant = TOTAL_TIMEOUT;
        self
    }

    /// Saturates at `Duration::MAX` instead of overflowing
    pub fn write_budget(&self, len: usize) -> Duration {
        let len = u32::try_from(len).unwrap_or(u32::MAX);
        let scaled = self
            .write_multiplier
            .checked_mul(len)
            .unwrap_or(Duration::MAX);
        self.write_constant.saturating_add(scaled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_overwrites_current_block() {
        let current = LineSettings {
            baud_rate: 300,
            data_bits: DataBits::Seven,
            parity: Parity::Even,
            stop_bits: StopBits::Two,
            flow_control: FlowControl::Hardware,
            dtr: true,
            rts: true,
            ..LineSettings::default()
        };

        let applied = current.with_policy(115_200);
        assert_eq!(applied.baud_rate, 115_200);
        assert!(applied.is_8n1());
        assert!(!applied.dtr);
        assert!(!applied.rts);
        assert_eq!(applied.chars.xon, 0x11);
        assert_eq!(applied.chars.xoff, 0x13);
        assert_eq!(applied.chars.error, None);
        assert_eq!(applied.chars.eof, 0x03);
        assert_eq!(applied.chars.event, 0x02);
        assert_eq!(applied.xon_limit, 512);
        assert_eq!(applied.xoff_limit, 512);
    }

    #[test]
    fn test_timeout_policy_keeps_read_interval() {
        let current = Timeouts {
            read_interval: Some(Duration::from_millis(50)),
            read_multiplier: Duration::from_millis(10),
            read_constant: Duration::from_millis(5),
            write_multiplier: Duration::from_millis(10),
            write_constant: Duration::ZERO,
        };

        let applied = current.with_policy();
        assert_eq!(applied.read_interval, Some(Duration::from_millis(50)));
        assert_eq!(applied.read_multiplier, Duration::ZERO);
        assert_eq!(applied.write_multiplier, Duration::ZERO);
        assert_eq!(applied.read_constant, TOTAL_TIMEOUT);
        assert_eq!(applied.write_constant, TOTAL_TIMEOUT);
    }

    #[test]
    fn test_budget_does_not_scale_with_length() {
        let t = Timeouts::default().with_policy();
        assert_eq!(t.write_budget(1), t.write_budget(4096));
        assert_eq!(t.write_budget(0), Duration::from_millis(1000));
    }

    #[test]
    fn test_budget_with_multiplier() {
        let t = Timeouts {
            write_multiplier: Duration::from_millis(2),
            write_constant: Duration::from_millis(100),
            ..Timeouts::default()
        };
        assert_eq!(t.write_budget(10), Duration::from_millis(120));
    }

    #[test]
    fn test_budget_saturates() {
        let t = Timeouts {
            write_multiplier: Duration::from_secs(u64::MAX / 2),
            write_constant: Duration::from_secs(1),
            ..Timeouts::default()
        };
        assert_eq!(t.write_budget(usize::MAX), Duration::MAX);
        assert_eq!(t.write_budget(3), Duration::MAX);
    }
}
