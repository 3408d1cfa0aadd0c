//! Signal processing applied to rendered audio.

pub mod resample;
