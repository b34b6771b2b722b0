//! Presentation Layer
//!
//! HTTP handlers, DTOs, router, and the edge gate.

pub mod dto;
pub mod gate;
pub mod handlers;
pub mod router;

pub use gate::{GateConfig, GateDecision, GateState, edge_gate, evaluate};
pub use handlers::AuthAppState;
pub use router::auth_router;
