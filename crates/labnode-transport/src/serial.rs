use std::fmt;

use tokio_serial::SerialPortBuilderExt;
use tracing::info;

use crate::error::{Result, TransportError};
use crate::stream::LinkStream;

/// Parity checking mode of a serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

/// Number of stop bits of a serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopBits {
    #[default]
    One,
    Two,
}

/// Flow control of a serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowControl {
    #[default]
    None,
    /// XON/XOFF in-band flow control.
    Software,
    /// RTS/CTS flow control.
    Hardware,
}

/// Line settings of a serial link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtyOptions {
    /// Baud rate. Default: 115200.
    pub baud_rate: u32,
    /// Data bits per character, 5 to 8. Default: 8.
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
}

impl Default for TtyOptions {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
        }
    }
}

/// Serial link to a USB or UART attached Labnode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialEndpoint {
    /// Device path like `/dev/ttyACM0` or `COM3`.
    pub path: String,
    pub options: TtyOptions,
}

impl SerialEndpoint {
    /// Create an endpoint with default line settings.
    pub fn new(path: impl Into<String>) -> Self {
        Self::with_options(path, TtyOptions::default())
    }

    /// Create an endpoint with explicit line settings.
    pub fn with_options(path: impl Into<String>, options: TtyOptions) -> Self {
        Self {
            path: path.into(),
            options,
        }
    }

    /// Open and configure the serial device.
    pub async fn open(&self) -> Result<LinkStream> {
        let data_bits = match self.options.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            8 => tokio_serial::DataBits::Eight,
            other => {
                return Err(TransportError::Serial {
                    path: self.path.clone(),
                    message: format!("unsupported data bits: {other}"),
                })
            }
        };
        let parity = match self.options.parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Even => tokio_serial::Parity::Even,
        };
        let stop_bits = match self.options.stop_bits {
            StopBits::One => tokio_serial::StopBits::One,
            StopBits::Two => tokio_serial::StopBits::Two,
        };
        let flow_control = match self.options.flow_control {
            FlowControl::None => tokio_serial::FlowControl::None,
            FlowControl::Software => tokio_serial::FlowControl::Software,
            FlowControl::Hardware => tokio_serial::FlowControl::Hardware,
        };

        let stream = tokio_serial::new(&self.path, self.options.baud_rate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .flow_control(flow_control)
            .open_native_async()
            .map_err(|err| self.open_error(err))?;

        info!(
            path = %self.path,
            baud = self.options.baud_rate,
            "connected to labnode over serial"
        );
        Ok(LinkStream::from_serial(stream, self.to_string()))
    }

    fn open_error(&self, err: tokio_serial::Error) -> TransportError {
        let missing = match err.kind() {
            tokio_serial::ErrorKind::NoDevice => true,
            tokio_serial::ErrorKind::Io(kind) => kind == std::io::ErrorKind::NotFound,
            _ => false,
        };
        if missing {
            TransportError::DeviceNotFound {
                path: self.path.clone(),
                message: err.description,
            }
        } else {
            TransportError::Serial {
                path: self.path.clone(),
                message: err.description,
            }
        }
    }
}

impl fmt::Display for SerialEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "serial://{}", self.path)
    }
}
