//! comlink: operator CLI over the serial transport

use std::io::Write as _;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{debug, info};

use comlink::{
    CancelToken, Line, LogNotifier, ReadError, SerialPort, SystemConnector, SystemDevice, Tee,
};

#[derive(Parser, Debug)]
#[command(name = "comlink", version, about = "Talk to a serial device: bytes, lines and floats")]
struct Args {
    /// Serial device name, e.g. COM3 or /dev/ttyUSB0
    #[arg(short, long)]
    port: String,

    #[arg(short, long, default_value_t = 115_200)]
    baud: u32,

    /// Also print configuration status lines to stdout
    #[arg(long)]
    announce: bool,

    /// Give up on reads after this many milliseconds (default: wait until Ctrl-C)
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one byte (decimal, or hex with 0x prefix)
    SendByte {
        #[arg(value_parser = parse_byte)]
        value: u8,
    },
    /// Send text as raw bytes
    SendLine {
        text: String,
        /// Append a line feed
        #[arg(short, long)]
        newline: bool,
    },
    /// Send an f32 in host byte order
    SendFloat {
        #[arg(allow_hyphen_values = true)]
        value: f32,
    },
    /// Wait for one byte and print it as hex
    ReadByte,
    /// Wait for one line and print it
    ReadLine,
    /// Wait for four bytes and print them as an f32
    ReadFloat,
    /// Print lines until Ctrl-C
    Monitor,
}

fn parse_byte(s: &str) -> std::result::Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse::<u8>(),
    };
    parsed.map_err(|e| format!("invalid byte '{s}': {e}"))
}

fn announce(message: &str) {
    println!("[STATUS] {message}");
}

fn open(args: &Args) -> Result<SerialPort<SystemDevice>> {
    let port = if args.announce {
        SerialPort::open_with(
            &SystemConnector,
            &args.port,
            args.baud,
            &Tee(LogNotifier, announce),
        )
    } else {
        SerialPort::open_with(&SystemConnector, &args.port, args.baud, &LogNotifier)
    };
    port.with_context(|| format!("failed to open {}", args.port))
}

fn print_line(line: &Line) {
    print!("{}", line.to_string_lossy());
    if line.is_truncated() {
        println!();
        eprintln!("[WARN] line truncated at {} bytes", line.len());
    }
    let _ = std::io::stdout().flush();
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    debug!("{:?}", args);

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || cancel.cancel()).context("failed to install Ctrl-C handler")?;
    }

    let mut port = open(&args)?.with_cancel_token(cancel);
    let patience = args.timeout_ms.map(Duration::from_millis);

    match args.command {
        Command::SendByte { value } => {
            port.write_byte(value).context("send failed")?;
            info!("sent 0x{:02X}", value);
        }
        Command::SendLine { ref text, newline } => {
            let mut text = text.clone();
            if newline {
                text.push('\n');
            }
            port.write_line(&text).context("send failed")?;
            info!("sent {} bytes", text.len());
        }
        Command::SendFloat { value } => {
            port.write_float(value).context("send failed")?;
            info!("sent {}", value);
        }
        Command::ReadByte => {
            let byte = match patience {
                Some(p) => port.read_byte_within(p),
                None => port.read_byte(),
            }
            .context("read failed")?;
            println!("0x{:02X}", byte);
        }
        Command::ReadLine => {
            let line = match patience {
                Some(p) => port.read_line_within(p),
                None => port.read_line(),
            }
            .context("read failed")?;
            print_line(&line);
        }
        Command::ReadFloat => {
            let value = match patience {
                Some(p) => port.read_float_within(p),
                None => port.read_float(),
            }
            .context("read failed")?;
            println!("{}", value);
        }
        Command::Monitor => loop {
            let next = match patience {
                Some(p) => port.read_line_within(p),
                None => port.read_line(),
            };
            match next {
                Ok(line) => print_line(&line),
                Err(ReadError::Cancelled) => {
                    info!("monitor stopped");
                    break;
                }
                Err(e) => return Err(e).context("read failed"),
            }
        },
    }

    port.close();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_byte() {
        assert_eq!(parse_byte("0x1F"), Ok(0x1f));
        assert_eq!(parse_byte("255"), Ok(255));
        assert!(parse_byte("256").is_err());
        assert!(parse_byte("0xZZ").is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "comlink", "--port", "COM3", "send-line", "--newline", "hello",
        ])
        .unwrap();
        assert_eq!(args.port, "COM3");
        assert_eq!(args.baud, 115_200);
        assert!(matches!(
            args.command,
            Command::SendLine { ref text, newline: true } if text == "hello"
        ));
    }

    #[test]
    fn test_negative_float_arg() {
        let args =
            Args::try_parse_from(["comlink", "-p", "/dev/ttyS0", "send-float", "-3.5"]).unwrap();
        assert!(matches!(args.command, Command::SendFloat { value } if value == -3.5));
    }

    #[test]
    fn test_read_float_takes_timeout() {
        let args = Args::try_parse_from([
            "comlink", "-p", "COM3", "--timeout-ms", "250", "read-float",
        ])
        .unwrap();
        assert_eq!(args.timeout_ms, Some(250));
        assert!(matches!(args.command, Command::ReadFloat));
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
