//! Session-backed identity: who is making this request, and may they see
//! the route they asked for.

pub mod gate;
pub mod session;

pub use gate::{Access, RoutePolicy, authorize};
pub use session::{Identity, SessionBackend};
