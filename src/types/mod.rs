//! Shared data structures for the line monitor
//!
//! - `sensor`: static sensor table, readings and per-sensor state
//! - `machine`: machine state and list summaries
//! - `alert`: operator alerts and the active-alert filter
//! - `analysis`: analysis snapshot and trend summary
//! - `events`: hub event payloads and outbound notifications

mod alert;
mod analysis;
mod events;
mod machine;
mod sensor;

pub use alert::*;
pub use analysis::*;
pub use events::*;
pub use machine::*;
pub use sensor::*;
