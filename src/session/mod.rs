pub mod runner;
pub mod state;
pub mod status;

pub use runner::{SessionCommand, SessionHandle, SessionRunner};
pub use state::{Completion, Session, SessionMode, SessionStateMachine, TransitionError};
pub use status::{Status, StatusStyle};
