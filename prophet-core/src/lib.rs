//! Prophet DTN routing engine.
//! Host-driven: no I/O; the host daemon implements [`BundleCore`] and feeds
//! link, bundle and alarm events to a [`Controller`].

pub mod ack;
pub mod bundle;
pub mod controller;
pub mod dictionary;
pub mod encounter;
pub mod error;
pub mod facade;
pub mod heap;
pub mod node;
pub mod offer;
pub mod params;
pub mod queue_policy;
pub mod repository;
pub mod stats;
pub mod strategy;
pub mod table;
pub mod tlv;

#[cfg(test)]
mod testing;

pub use ack::{Ack, AckList};
pub use bundle::{Bundle, BundleKey, Link};
pub use controller::Controller;
pub use dictionary::{Dictionary, Sid};
pub use encounter::{Encounter, EncounterState};
pub use error::{DecodeError, DictionaryError, EncodeError, ParamsError, PolicyError, RepositoryError};
pub use facade::{AlarmId, AlarmTarget, BundleCore};
pub use node::{Node, NodeParams};
pub use params::ProphetParams;
pub use queue_policy::QueuePolicy;
pub use repository::Repository;
pub use stats::Stats;
pub use strategy::ForwardStrategy;
pub use table::Table;
pub use tlv::{ProphetTlv, Tlv, PROPHET_VERSION};
