//! Serial port transport
//!
//! [`TransportLink`] over a host serial port. The firmware does not
//! terminate its reply lines, so a read normally ends at the timeout; a
//! `\n`, if one arrives, ends it early.

use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use fxchain_hal::{DataBits, LinkConfig, Parity, StopBits, TransportError, TransportLink};
use log::{debug, error};
use serialport::SerialPort;

/// A serial device path plus its line settings; opened on demand
pub struct SerialLink {
    path: String,
    config: LinkConfig,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialLink {
    pub fn new(path: impl Into<String>, config: LinkConfig) -> Self {
        Self {
            path: path.into(),
            config,
            port: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, TransportError> {
        self.port.as_mut().ok_or(TransportError::NotOpen)
    }
}

impl TransportLink for SerialLink {
    fn open(&mut self) -> Result<(), TransportError> {
        let port = serialport::new(&self.path, self.config.baudrate)
            .data_bits(data_bits(self.config.data_bits))
            .parity(parity(self.config.parity))
            .stop_bits(stop_bits(self.config.stop_bits))
            .timeout(self.config.read_timeout())
            .open()
            .map_err(|e| {
                error!("failed to open serial port {}: {}", self.path, e);
                TransportError::Open
            })?;

        debug!("opened {} at {} baud", self.path, self.config.baudrate);
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        // Dropping the handle closes the port
        if self.port.take().is_some() {
            debug!("closed {}", self.path);
        }
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.port()?.write_all(data).map_err(|e| {
            error!("serial write failed: {}", e);
            TransportError::Write
        })
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        Write::flush(self.port()?).map_err(|e| {
            error!("serial flush failed: {}", e);
            TransportError::Write
        })
    }

    fn read_line(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        let port = self.port()?;
        let deadline = Instant::now() + timeout;
        let mut len = 0;

        while len < buf.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            port.set_timeout(remaining).map_err(|e| {
                error!("serial timeout setup failed: {}", e);
                TransportError::Read
            })?;

            let mut byte = [0u8; 1];
            match port.read(&mut byte) {
                Ok(0) => continue,
                Ok(_) if byte[0] == b'\n' => break,
                Ok(_) => {
                    buf[len] = byte[0];
                    len += 1;
                }
                Err(e) if e.kind() == ErrorKind::TimedOut => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("serial read failed: {}", e);
                    return Err(TransportError::Read);
                }
            }
        }
        Ok(len)
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn config(&self) -> &LinkConfig {
        &self.config
    }
}

fn data_bits(bits: DataBits) -> serialport::DataBits {
    match bits {
        DataBits::Seven => serialport::DataBits::Seven,
        DataBits::Eight => serialport::DataBits::Eight,
    }
}

fn parity(parity: Parity) -> serialport::Parity {
    match parity {
        Parity::None => serialport::Parity::None,
        Parity::Even => serialport::Parity::Even,
        Parity::Odd => serialport::Parity::Odd,
    }
}

fn stop_bits(bits: StopBits) -> serialport::StopBits {
    match bits {
        StopBits::One => serialport::StopBits::One,
        StopBits::Two => serialport::StopBits::Two,
    }
}

/// Names of the serial ports present on this host
pub fn available_ports() -> anyhow::Result<Vec<String>> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(|p| p.port_name)
        .collect())
}
