pub mod acquisition;
pub mod aggregate;
pub mod pipeline;
pub mod stop;

pub use acquisition::{AcquisitionLoop, EndReason};
pub use aggregate::{run_overlay, run_stats};
pub use pipeline::Pipeline;
pub use stop::StopToken;
