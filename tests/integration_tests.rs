//! Integration tests for the cantare render pipeline
//!
//! Test categories:
//! - engine: render passes, mixes, cache reuse, cancellation, failures
//! - playback: playback state machine, play position, faders, export
//!
//! Run with:
//! ```bash
//! cargo test -p cantare --test integration_tests
//! ```

mod helpers;
mod integration;
