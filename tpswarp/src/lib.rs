//! `tpswarp` is a library for warping 3D geometry with thin-plate splines.
//!
//! A **thin-plate spline** (TPS) is a smooth function `f: R³ → R³` that maps a
//! set of **source landmarks** exactly onto a set of **destination
//! landmarks**, while bending the space in between as little as possible.
//! Once solved, the same function can be applied to anything that lives in the
//! source space: mesh vertices, body frames, or single points.
//!
//! # Landmarks and documents
//! Landmarks are edited in a [`WarpDocument`](crate::document::WarpDocument),
//! which pairs them up by identity (and, when loaded from files, by name).
//! Only complete pairs take part in the warp.
//!
//! ```
//! use tpswarp::{document::WarpDocument, landmark::Input};
//! use nalgebra::{Point3, Vector3};
//!
//! let mut doc = WarpDocument::new();
//! for p in [
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//!     Point3::new(0.0, 0.0, 1.0),
//! ] {
//!     doc.add_landmark_to_input(Input::Source, p, None);
//!     doc.add_landmark_to_input(Input::Destination, p + Vector3::z(), None);
//! }
//! let warp = doc.solve()?;
//! let q = warp.warp_point(Point3::new(0.5, 0.5, 0.5));
//! assert!((q - Point3::new(0.5, 0.5, 1.5)).norm() < 1e-9);
//! # Ok::<(), tpswarp::Error>(())
//! ```
//!
//! # Validation
//! Documents report a checklist through the
//! [`ValidationCheckable`](crate::validate::ValidationCheckable) trait.  A
//! check in the error state (e.g. fewer than four complete pairs) blocks
//! warping; warnings are logged and otherwise ignored.
//!
//! # Model warping
//! A [`ModelWarpDocument`](crate::warper::ModelWarpDocument) applies one or
//! more warp groups to the components of a [`Model`](crate::model::Model).
//! [`CachedModelWarper`](crate::cache::CachedModelWarper) runs those warps and
//! keeps the latest result per document, so asking again for an unchanged
//! document is free.
#![warn(missing_docs)]

mod error;
pub use error::Error;

pub mod cache;
pub mod document;
pub mod eval;
pub mod landmark;
pub mod mesh;
pub mod model;
pub mod solver;
pub mod types;
pub mod validate;
pub mod warper;

pub use cache::{CachedModelWarper, WarpedModelHandle};
pub use document::WarpDocument;
pub use warper::ModelWarpDocument;
