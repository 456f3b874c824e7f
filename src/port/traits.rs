//! Core abstraction for the serial link.
//!
//! `SerialLink` hides the difference between real hardware ports and the
//! in-memory mock used by the engine tests. The engine opens one link and
//! immediately splits it with [`SerialLink::try_clone_link`]: the reader task
//! owns one half exclusively, the sync controller writes through the other
//! under the send mutex.

use super::error::PortError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Line parameters applied when opening a port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortSettings {
    /// Baud rate (bits per second).
    pub baud_rate: u32,

    /// Number of data bits per character.
    pub data_bits: DataBits,

    /// Parity checking mode.
    pub parity: Parity,

    /// Number of stop bits.
    pub stop_bits: StopBits,

    /// Flow control mode.
    pub flow_control: FlowControl,

    /// Blocking-read window. Kept short so the reader can poll the mode
    /// gate and shutdown signal responsively.
    pub read_timeout: Duration,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            read_timeout: Duration::from_millis(20),
        }
    }
}

impl PortSettings {
    /// 8/N/1 at the given baud rate with the default read window.
    pub fn eight_n_one(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopBits {
    One,
    Two,
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowControl {
    None,
    Software,
    Hardware,
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Software => serialport::FlowControl::Software,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
        }
    }
}

/// Byte-level access to an open serial device.
pub trait SerialLink: Send + std::fmt::Debug {
    /// Read whatever is available, up to `buffer.len()` bytes, waiting at
    /// most the configured read window. A transient timeout surfaces as a
    /// [`PortError`] for which [`PortError::is_transient`] is true.
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError>;

    /// Write a slice, returning the number of bytes accepted. Callers that
    /// need the whole buffer on the wire loop until it is gone.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Push any buffered output to the device.
    fn flush(&mut self) -> Result<(), PortError>;

    /// Clone this link into a second handle on the same device, so reads
    /// and writes can proceed from different threads.
    fn try_clone_link(&self) -> Result<Box<dyn SerialLink>, PortError>;

    /// The system name/path of this port.
    fn name(&self) -> &str;
}
