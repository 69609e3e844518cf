//! Small value types shared across the crate
use serde::{Deserialize, Serialize};

/// Scalar clamped to the `[0, 1]` range
///
/// Used for the blending factor, where `0` leaves geometry untouched and `1`
/// applies the full warp.  `NaN` is mapped to `0`.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Normalized(f64);

impl Normalized {
    /// No blending: geometry is left untouched
    pub const ZERO: Self = Self(0.0);

    /// Full blending: geometry is completely warped
    pub const ONE: Self = Self(1.0);

    /// Builds a new value, clamping into `[0, 1]`
    pub fn new(v: f64) -> Self {
        if v.is_nan() {
            Self::ZERO
        } else {
            Self(v.clamp(0.0, 1.0))
        }
    }

    /// Returns the inner value
    pub fn get(&self) -> f64 {
        self.0
    }
}

impl Default for Normalized {
    fn default() -> Self {
        Self::ONE
    }
}

impl From<f64> for Normalized {
    fn from(v: f64) -> Self {
        Self::new(v)
    }
}

/// Opaque identifier that changes whenever the data it represents changes
///
/// Like [`LandmarkId`], a new version is a random 64-bit value; the odds of
/// two versions of the same data colliding are negligible.
#[derive(
    Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct VersionId(u64);

impl VersionId {
    /// Returns a fresh version
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(rand::random())
    }
}

/// Stable identity of a landmark, kept across edits and re-ordering
#[derive(
    Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct LandmarkId(u64);

impl LandmarkId {
    /// Returns a new identifier, with a random 64-bit value
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(rand::random())
    }
}

impl std::fmt::Display for LandmarkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L({:x})", self.0)
    }
}

/// Identity of a model warp document, used to key the result cache
#[derive(
    Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct DocumentId(u64);

impl DocumentId {
    /// Returns a new identifier, with a random 64-bit value
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(rand::random())
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "D({:x})", self.0)
    }
}
