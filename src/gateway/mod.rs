//! Client composition

mod builder;

pub use builder::{Trackcheck, TrackcheckBuilder};
