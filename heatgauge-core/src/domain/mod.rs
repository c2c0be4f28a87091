//! Domain types shared by every pipeline stage.

pub mod bar;

pub use bar::{closes, Bar, Timeframe};
