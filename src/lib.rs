//! A gesture-driven **3D mesh interaction engine**: tracked hand positions
//! drive real-time brush deformation, freehand extrusion, primitive
//! placement, and segment selection on a live mesh, while a hull + PCA +
//! trimmed-ICP [registration] stage aligns freshly generated geometry onto
//! the silhouette of an existing mesh so it can replace it seamlessly.
//!
//! The engine is deliberately host-agnostic: it owns mesh state, velocities,
//! undo history, and every gesture state machine, but requests boolean and
//! remesh operations from a host-provided [`host::GeometryKernel`] and never
//! touches a renderer. Drive it from an external fixed-rate timer via
//! [`dispatch::Engine::tick`].
//!
//! # Features
//! - **f64** (default): use f64 as Real
//! - **f32**: use f32 as Real, this conflicts with f64
//! - **parallel**: use rayon to parallelize per-vertex brush forces

#![forbid(unsafe_code)]
#![deny(unused)]
#![warn(clippy::missing_const_for_fn, clippy::approx_constant, clippy::all)]

pub mod camera;
pub mod config;
pub mod create;
pub mod deform;
pub mod dispatch;
pub mod errors;
pub mod float_types;
pub mod frame;
pub mod host;
pub mod mesh;
pub mod registration;
pub mod select;
pub mod spatial;
pub mod stroke;

#[cfg(any(all(feature = "f64", feature = "f32"), not(any(feature = "f64", feature = "f32"))))]
compile_error!("Either 'f64' or 'f32' feature must be specified, but not both");

pub use dispatch::Engine;
pub use mesh::{Mesh, Vertex};
