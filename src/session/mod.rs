//! Session orchestration
//!
//! The single entry point the UI talks to: actions in, status reports out.

pub mod controller;
pub mod state;
pub mod status;

pub use controller::{run_termination_loop, SessionAction, SessionController, SessionHandle};
pub use state::{SessionSnapshot, SessionState};
pub use status::{screen_error_message, StatusLevel, StatusReport};
