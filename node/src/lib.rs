//! Device-side acquisition and delivery for an environmental telemetry node.
//!
//! One loop samples a distance ranger and an environmental sensor on a fixed
//! cadence, stamps each reading with network time, and makes a single upload
//! attempt per cycle. A watchdog bounds every cycle; hangs end the process
//! and the supervisor starts a fresh one.

pub mod acquisition;
pub mod clock;
pub mod config;
pub mod connectivity;
pub mod errors;
pub mod indicator;
pub mod median;
pub mod metrics;
pub mod sampler;
pub mod sim;
pub mod supervisor;
pub mod telemetry;
pub mod upload;
pub mod watchdog;
