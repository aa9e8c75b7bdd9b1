pub mod gate;
pub mod loopback;
pub mod response;

pub use gate::{classify, decide, gate_middleware, GateDecision, RouteAccess};
pub use loopback::loopback_only;
pub use response::{ApiResponse, ApiResult};
