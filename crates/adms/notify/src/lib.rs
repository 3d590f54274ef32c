//! ADMS Notifications
//!
//! Delivery of attendance session changes to guardians and other
//! downstream consumers. Delivery is always fire-and-forget.

mod dispatch;
mod traits;
mod webhook;

pub use dispatch::*;
pub use traits::*;
pub use webhook::*;
