//! Module containing the universal error type
use crate::validate::ValidationCheck;
use thiserror::Error;

/// Universal error type for warping
#[derive(Error, Debug)]
pub enum Error {
    /// An element with this identifier already exists
    #[error("identifier {0} is already present in this document")]
    DuplicateIdentifier(String),

    /// No element has this identifier
    #[error("identifier {0} is not present in this document")]
    UnknownIdentifier(String),

    /// The thin-plate spline system cannot be solved
    #[error("could not solve the thin-plate spline system: {0}")]
    SingularSystem(&'static str),

    /// Two control points are at exactly the same location
    #[error("control points {0} and {1} are at the same location")]
    DuplicateControlPoint(usize, usize),

    /// At least one validation check reported an error
    #[error("validation failed ({} failing checks)", .0.len())]
    ValidationFailed(Vec<ValidationCheck>),

    /// A component was configured for warping but has no warper
    #[error("component `{name}` ({kind}) cannot be warped")]
    UnsupportedEntityType {
        /// Name of the component within the model
        name: String,
        /// Kind of the component
        kind: &'static str,
    },

    /// A landmark CSV row could not be parsed
    #[error("bad landmark row at line {line}: {reason}")]
    BadCsvRow {
        /// One-based line number
        line: usize,
        /// What was wrong with the row
        reason: String,
    },

    /// An OBJ record could not be parsed
    #[error("bad OBJ record at line {line}: {reason}")]
    BadObjRecord {
        /// One-based line number
        line: usize,
        /// What was wrong with the record
        reason: String,
    },

    /// A mesh triangle refers to a vertex that doesn't exist
    #[error("triangle {triangle} refers to vertex {vertex}, but there are only {count} vertices")]
    BadTriangle {
        /// Index of the triangle
        triangle: usize,
        /// Out-of-range vertex index
        vertex: usize,
        /// Number of vertices in the mesh
        count: usize,
    },

    /// IO error; see inner code for details
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
