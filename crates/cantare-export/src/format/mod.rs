//! File formats.

pub mod wav;
