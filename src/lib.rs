//! `sentinel_control_plane`: a detection-diagnosis-containment-healing
//! control plane for a fleet of autonomous agents.
//!
//! Vitals recorded by each agent flow into [`telemetry`], feed
//! [`baseline`]'s per-agent EWMA learner, and are periodically compared
//! against that baseline by [`sentinel`]. A detected deviation is
//! classified fleet-wide or agent-specific by [`correlator`], explained
//! by [`diagnostician`], and — unless the likely cause is external —
//! acted on by [`healer`] through a pluggable [`executor`], with
//! [`lifecycle`] and [`quarantine`] governing what an agent is allowed
//! to do at each stage. [`orchestrator`] is the cooperative scheduler
//! that drives all of this; [`api`] is the thin HTTP surface in front of
//! it.

pub mod api;
pub mod baseline;
pub mod cache;
pub mod config;
pub mod correlator;
pub mod diagnostician;
pub mod enforcement;
pub mod error;
pub mod executor;
pub mod healer;
pub mod immune;
pub mod lifecycle;
pub mod orchestrator;
pub mod quarantine;
pub mod ratelimit;
pub mod sentinel;
pub mod server;
pub mod store;
pub mod telemetry;
pub mod types;

pub use error::{SentinelError, SentinelResult};
