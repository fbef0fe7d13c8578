//! Render client side of the ticker protocol.

pub mod controller;
pub mod state;

pub use controller::{FrameSink, OverlayChange, RenderClient};
pub use state::{band, Band, TickerState, TickerStatus};
