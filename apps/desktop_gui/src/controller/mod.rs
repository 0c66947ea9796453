//! Controller layer: UI events, command orchestration and load bookkeeping.

pub mod events;
pub mod orchestration;
pub mod selection;
