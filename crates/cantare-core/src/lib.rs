//! Phrase model, curve sampling, renderer capability traits and the pull-based
//! signal chain for the cantare singing renderer.
//!
//! # Primary API
//!
//! - [`RenderPhrase`]: immutable, content-hashed unit of synthesis
//! - [`sample_curve`] / [`FrameGrid`]: sparse curve to per-frame resampling
//! - [`Renderer`] / [`RendererRegistry`]: capability interface selected per voice
//! - [`CancellationToken`], [`Progress`], [`NotificationSink`]: job plumbing
//! - [`signal`]: wave sources, faders, master and export adapters
//!
//! # Example
//!
//! ```ignore
//! use cantare_core::{sample_curve, Curve, FrameGrid};
//!
//! let grid = FrameGrid::new(10.0, 60, 5, 5);
//! let pitch = Curve::from_points([(0.0, 6000.0), (500.0, 6200.0)]);
//! let f0 = sample_curve(Some(&pitch), 6000.0, &grid, |cents| cents * 0.01);
//! assert_eq!(f0.len(), 60);
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod config;
pub use config::RenderSettings;

pub(crate) mod lockfree;
pub use lockfree::{AtomicFlag, AtomicFloat};

mod cancel;
pub use cancel::CancellationToken;

pub mod curve;
pub use curve::{sample_curve, Curve, FrameGrid};

pub mod music;

mod phrase;
pub use phrase::{Note, Phone, RenderPhrase};

mod time_axis;
pub use time_axis::TimeAxis;

mod progress;
pub use progress::{ChannelSink, Notification, NotificationSink, NullSink, Progress};

pub mod expr;
pub use expr::ExpressionDescriptor;

mod renderer;
pub use renderer::{RenderLayout, RenderResult, Renderer, RendererRegistry, Singer};

pub mod signal;
