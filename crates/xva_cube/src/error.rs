//! Cube error types.

use std::fmt;

use thiserror::Error;

/// Axis of a cube or scenario data store, used in index errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CubeAxis {
    /// Entity (trade or netting set) axis.
    Id,
    /// Valuation date axis.
    Date,
    /// Monte Carlo sample axis.
    Sample,
    /// Depth axis.
    Depth,
}

impl fmt::Display for CubeAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CubeAxis::Id => "id",
            CubeAxis::Date => "date",
            CubeAxis::Sample => "sample",
            CubeAxis::Depth => "depth",
        };
        write!(f, "{}", name)
    }
}

/// Errors raised by cube and scenario data access.
///
/// Index errors signal a broken internal invariant and are never recovered.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum CubeError {
    /// Coordinate outside the allocated range.
    #[error("Cube {axis} index {index} out of range (size {size})")]
    IndexOutOfRange {
        /// Offending axis.
        axis: CubeAxis,
        /// Requested index.
        index: usize,
        /// Allocated size of the axis.
        size: usize,
    },

    /// Entity id not present in the cube.
    #[error("Unknown cube id: {0}")]
    UnknownId(String),

    /// Entity id supplied twice at allocation.
    #[error("Duplicate cube id: {0}")]
    DuplicateId(String),

    /// Dimensions rejected at allocation.
    #[error("Invalid cube dimensions: {0}")]
    InvalidDimensions(String),

    /// Scenario data key not allocated.
    #[error("Unknown scenario data key: {0}")]
    UnknownScenarioKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_error_display() {
        let err = CubeError::IndexOutOfRange {
            axis: CubeAxis::Sample,
            index: 100,
            size: 100,
        };
        assert_eq!(
            format!("{}", err),
            "Cube sample index 100 out of range (size 100)"
        );
    }

    #[test]
    fn test_unknown_id_display() {
        let err = CubeError::UnknownId("T999".to_string());
        assert_eq!(format!("{}", err), "Unknown cube id: T999");
    }
}
