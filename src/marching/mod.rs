//! Front propagation and centerline voting
//!
//! - `speed`: speed maps from vesselness or intensity edges
//! - `fast_marching`: arrival-time field and its upwind gradient
//! - `tracer`: gradient descent from boundary points back to the seeds

pub mod speed;
pub mod fast_marching;
pub mod tracer;

pub use speed::{edge_speed, regularize_speed, sigmoid_speed, speed_from_vesselness, SpeedParams};
pub use fast_marching::{march, march_from, upwind_gradient, Arrival, FastMarchingParams, VoxelState, UNREACHED};
pub use tracer::{PathTracer, StopCounts, StopReason, Trace, TraceMode, TraceParams, TraceSummary};
