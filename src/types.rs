//! Common scalar types shared across the flow engine.

/// Path/edge cost. Integer, non-negative by convention, used as the Dijkstra weight.
pub type Cost = i64;

/// Flow volume / capacity unit.
pub type Flow = f64;

/// Below this magnitude a placement is treated as zero.
pub const MIN_FLOW: Flow = 1e-9;

/// Tolerance used when comparing a flow value against an edge's capacity.
pub const EPSILON: Flow = 1e-9;

/// Round a flow value to 12 fractional digits, snapping sub-[`MIN_FLOW`]
/// magnitudes to exactly zero.
///
/// This is the single place floating point hygiene is enforced: every
/// placement delta that is stored or returned to a caller passes through
/// here first, so repeated placement/removal cycles cannot let floating
/// point drift accumulate past the engine's stated tolerances.
pub fn round_flow(value: Flow) -> Flow {
    if !value.is_finite() {
        return value;
    }
    let scaled = (value * 1e12).round() / 1e12;
    if scaled.abs() < MIN_FLOW {
        0.0
    } else {
        scaled
    }
}
