//! ADMS Service Layer
//!
//! Device registry, punch ingestion, attendance sessions and the command
//! queue, composed into [`Adms`].

mod adms;
mod alias;
mod attendance;
mod error;
mod handshake;
mod ingest;
mod provisioning;
mod queue;
mod registry;
mod settings;
mod sweep;
mod traits;


pub use adms::Adms;
pub use alias::*;
pub use attendance::*;
pub use error::*;
pub use ingest::*;
pub use provisioning::*;
pub use queue::*;
pub use registry::*;
pub use settings::*;
pub use sweep::*;
pub use traits::*;
