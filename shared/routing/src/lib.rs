//! Alert routing and on-call resolution: determines which
//! team and escalation policy own an incoming alert, and who is on call
//! right now for a given schedule or team.

pub mod on_call;
pub mod router;

pub use on_call::{OnCallResolver, OnCallResult, OnCallSource};
pub use router::{RouteResult, Router, RouterError};
