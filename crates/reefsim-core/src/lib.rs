//! Deterministic per-tick engine for a 2-D marine ecosystem.
//!
//! Plants grow as node/chain networks rooted in a procedural nutrition field;
//! fish swim under external policy control, eat, defecate, reproduce, and die.
//! The engine is headless: rendering, policy learning, and telemetry export
//! are collaborators talking to [`World`] through the interfaces in
//! [`policy`] and the query methods on [`World`].

pub mod config;
pub mod fields;
pub mod fish;
pub mod physics;
pub mod plants;
pub mod policy;
pub mod store;
pub mod telemetry;
pub mod world;

pub use config::{FishType, PlantType, ReefConfig};
pub use policy::{
    FishActions, FishPolicy, FishSenses, HoldActions, IdlePolicy, ACTION_COUNT, SENSOR_COUNT,
};
pub use store::{Chain, ChainId, Fish, FishId, Node, NodeId, NodeKind};
pub use telemetry::{EcosystemTotals, TickEvents, TickSummary};
pub use world::{Tick, World, WorldError};
