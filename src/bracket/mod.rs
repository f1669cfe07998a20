// =============================================================================
// OCO Bracket Module
// =============================================================================
//
// One entry, two protective exits, and a polling loop that closes the
// position and cancels the opposite exit once price crosses a threshold.

pub mod monitor;
pub mod pacing;
pub mod state;
