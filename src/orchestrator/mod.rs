//! Application-level orchestration.
//!
//! `dispatch` turns user actions into state transitions plus the requests they
//! require; `controller` executes those requests on the runtime and reports
//! completions back as events. Presentation layers only translate input into
//! actions and draw the resulting state.

mod controller;
mod dispatch;

pub(crate) use controller::{run_controller, AppEvent, UiCommand};
pub(crate) use dispatch::{apply_event, dispatch, Action, AppState, Pipeline};
