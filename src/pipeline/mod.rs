//! The interaction pipeline: message types and the turn coordinator.

pub mod coordinator;
pub mod messages;

pub use coordinator::{InteractionCoordinator, TurnController, TurnEvent, TurnOutcome, TurnPhase};
