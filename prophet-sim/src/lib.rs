//! Contact-schedule simulator for the Prophet router: an in-memory host
//! per node, driven by a virtual clock.

pub mod config;
pub mod host;
pub mod logging;
pub mod sim;

pub use config::Config;
pub use host::SimCore;
pub use sim::{Report, Simulation};
