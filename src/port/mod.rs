//! Serial link abstraction.
//!
//! One trait, two implementations: the hardware port and the test mock.

pub mod error;
pub mod mock;
pub mod sync_port;
pub mod traits;

pub use error::PortError;
pub use mock::MockPort;
pub use sync_port::SystemPort;
pub use traits::{DataBits, FlowControl, Parity, PortSettings, SerialLink, StopBits};
