//! Interactive image cropping and resizing.
//!
//! The crate is split so that the actual logic is independent of the UI:
//! [`geometry`] maps on-screen selections into the bitmap's own pixel grid,
//! [`export`] renders and encodes the final output, [`selection`] holds the
//! drag-to-select rectangle state, and [`app`] wires everything into an
//! eframe window.

pub mod app;
pub mod export;
pub mod geometry;
pub mod selection;
