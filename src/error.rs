//! Error types for fallible collision constructors.

use thiserror::Error;

/// Errors reported by the `try_*` constructors and lookups.
///
/// The sentinel-returning API (empty hull, `hit == false`, `ToiState`) remains the
/// primary contract. These variants explain why a sentinel would have been produced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CollisionError {
    /// Fewer than three points were supplied (or survived welding).
    #[error("too few points for a hull: {count}")]
    TooFewPoints { count: usize },

    /// More points than a polygon can hold.
    #[error("too many points for a hull: {count} > {max}")]
    TooManyPoints { count: usize, max: usize },

    /// The points are coincident or collinear.
    #[error("degenerate hull: points are coincident or collinear")]
    DegenerateHull,

    /// A hull failed convexity validation.
    #[error("invalid hull")]
    InvalidHull,

    /// The proxy id does not refer to a live leaf.
    #[error("invalid proxy id: {proxy_id}")]
    InvalidProxy { proxy_id: i32 },

    /// Radius is negative or not finite.
    #[error("invalid radius: {radius}")]
    InvalidRadius { radius: f32 },
}
