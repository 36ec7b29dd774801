//! Error types surfaced by world construction and mutation.

use thiserror::Error;

/// Rejection raised synchronously by a world or body operation.
///
/// These reject the offending request and leave the simulation untouched;
/// death and game-over are ordinary state, never errors. Integration-time
/// position rejections are not surfaced here at all — the integrator consumes
/// them internally as clamping (see the tick pipeline in [`crate::world`]).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorldError {
    /// Position would overlap solid terrain or leave the world.
    #[error("position ({x}, {y}) would overlap solid terrain or leave the world")]
    InvalidLocation {
        /// Pixel x of the rejected bottom-left corner.
        x: i64,
        /// Pixel y of the rejected bottom-left corner.
        y: i64,
    },
    /// Speed magnitude outside the species' allowed band.
    #[error("speed {speed} m/s outside the allowed band [{min}, {max}] m/s")]
    InvalidVelocity {
        /// Offending speed magnitude.
        speed: f64,
        /// Lower bound of the band.
        min: f64,
        /// Upper bound of the band.
        max: f64,
    },
    /// Time step outside the accepted half-open interval.
    #[error("time step {dt} s outside [0, {max}) s")]
    InvalidStep {
        /// Rejected step length.
        dt: f64,
        /// Exclusive upper bound on a single step.
        max: f64,
    },
    /// Tile or pixel query outside the grid extents.
    #[error("tile ({x}, {y}) lies outside the {width}x{height} tile grid")]
    OutOfBounds {
        /// Queried tile column.
        x: i64,
        /// Queried tile row.
        y: i64,
        /// Grid width in tiles.
        width: u32,
        /// Grid height in tiles.
        height: u32,
    },
    /// A registry or swarm cap was reached.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(&'static str),
    /// The operation is not legal in the current state.
    #[error("invalid state transition: {0}")]
    InvalidTransition(&'static str),
    /// Construction-time values that cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}
