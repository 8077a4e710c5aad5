/// View state machine with planned transitions.
pub mod state_machine;

pub use state_machine::{
    AbortError, ApplyError, InvalidTransition, NavEvent, Plan, PlanError, PlanId, Snapshot,
    ViewState, ViewStateMachine,
};
