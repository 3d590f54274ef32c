//! ADMS Core Types
//!
//! Domain types and the text wire protocol for push-protocol biometric
//! terminals (ZK/ADMS family).

mod command;
mod device;
mod enrollment;
mod protocol;
mod punch;
mod session;
mod timebase;

pub use command::*;
pub use device::*;
pub use enrollment::*;
pub use protocol::*;
pub use punch::*;
pub use session::*;
pub use timebase::*;
