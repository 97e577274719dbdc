//! State module for tracking harvest progress
//!
//! This module provides the in-memory state owned by the harvester while a
//! run is active.
//!
//! # Components
//!
//! - `HarvestState`: collected entries, failed queries and the last attempted query
//! - `RecoveryPhase`: phases of the cooldown and session-recovery cycle

mod harvest_state;
mod recovery_phase;

// Re-export main types
pub use harvest_state::HarvestState;
pub use recovery_phase::RecoveryPhase;
