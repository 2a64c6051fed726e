mod bearer;
mod tracing_layer;
mod metrics_layer;

pub use bearer::*;
pub use tracing_layer::*;
pub use metrics_layer::*;
