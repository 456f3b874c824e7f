//! Serial Bridge Library
//!
//! Core functionality for the serial-bridge MCP server: a protocol-agnostic
//! serial-port I/O engine that demultiplexes a raw byte stream into
//! synchronous command responses and unsolicited device messages.
//!
//! # Modules
//!
//! - `engine`: the driver engine (reader task, mode gate, packetizer,
//!   async store, wait policies)
//! - `codec`: UTF-8/hex encoding adapter
//! - `port`: serial link abstraction (hardware + mock)
//! - `config`: TOML configuration with environment overrides
//! - `error`: unified error taxonomy and wire codes
//! - `mcp`: MCP tool surface

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod mcp;
pub mod port;

// Re-export commonly used types for convenience
pub use codec::PayloadEncoding;
pub use engine::{
    AsyncPacket, Engine, EngineStatus, LinkParams, Mode, SendOutcome, SendRequest, WaitPolicy,
};
pub use error::{EngineError, EngineResult};
pub use port::{MockPort, PortError, PortSettings, SerialLink, SystemPort};
