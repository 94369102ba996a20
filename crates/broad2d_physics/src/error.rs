//! Broadphase error types

use broad2d_math::Vec2;

/// Errors raised by the dynamic tree and the broadphase
///
/// `InvalidBounds` and `DegenerateShape` are data errors: the broadphase recovers
/// from them by disabling the offending fixture. `UnknownProxy` and `CorruptTree`
/// mean the broadphase and its tree disagree, which is never recoverable.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BroadphaseError {
    /// An AABB with a NaN/infinite component or `lower > upper` on some axis
    #[error("invalid bounds: lower ({}, {}), upper ({}, {})", .lower.x, .lower.y, .upper.x, .upper.y)]
    InvalidBounds { lower: Vec2, upper: Vec2 },
    /// A handle that is not a live leaf of this tree
    #[error("proxy is not a live leaf of this tree")]
    UnknownProxy,
    /// A shape that cannot produce a finite bounding box
    #[error("degenerate shape: {0}")]
    DegenerateShape(&'static str),
    /// Tree linkage or bounds no longer satisfy the tree invariants
    #[error("corrupt tree: {0}")]
    CorruptTree(String),
}

impl BroadphaseError {
    /// Whether this error is a recoverable data error (as opposed to a desync bug)
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            BroadphaseError::InvalidBounds { .. } | BroadphaseError::DegenerateShape(_)
        )
    }
}
