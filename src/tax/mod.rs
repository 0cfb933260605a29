//! Tax rule engine

pub mod gst;

pub use gst::*;
