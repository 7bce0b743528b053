//! Session status transitions.
//!
//! Every request is tagged with the generation that was current when it was
//! issued. Stop and start bump the generation, so anything that resolves
//! afterwards is recognised as stale and dropped.

use serde::Serialize;
use thiserror::Error;

use super::status::Status;
use crate::api::InferenceResult;
use crate::error::{ErrorInfo, TranslateError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Camera,
    Upload,
}

/// Snapshot handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub status: Status,
    pub detected_label: String,
    pub confidence: f32,
    pub last_error: Option<ErrorInfo>,
    pub mode: SessionMode,
    pub generation: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            status: Status::Idle,
            detected_label: String::new(),
            confidence: 0.0,
            last_error: None,
            mode: SessionMode::Camera,
            generation: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {action} while {from:?}")]
pub struct TransitionError {
    pub from: Status,
    pub action: &'static str,
}

/// Whether a tagged completion was applied or belonged to an abandoned request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied,
    Stale,
}

#[derive(Debug, Default)]
pub struct SessionStateMachine {
    session: Session,
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn status(&self) -> Status {
        self.session.status
    }

    pub fn mode(&self) -> SessionMode {
        self.session.mode
    }

    pub fn generation(&self) -> u64 {
        self.session.generation
    }

    fn expect(&self, expected: Status, action: &'static str) -> Result<(), TransitionError> {
        if self.session.status != expected {
            return Err(TransitionError {
                from: self.session.status,
                action,
            });
        }
        Ok(())
    }

    fn is_current(&self, generation: u64) -> bool {
        generation == self.session.generation
    }

    /// Idle -> RequestingAccess. Returns the generation for the acquisition.
    pub fn request_access(&mut self) -> Result<u64, TransitionError> {
        self.expect(Status::Idle, "request camera access")?;
        self.session.generation += 1;
        self.session.mode = SessionMode::Camera;
        self.session.last_error = None;
        self.session.status = Status::RequestingAccess;
        Ok(self.session.generation)
    }

    pub fn access_granted(&mut self, generation: u64) -> Result<Completion, TransitionError> {
        if !self.is_current(generation) {
            return Ok(Completion::Stale);
        }
        self.expect(Status::RequestingAccess, "grant camera access")?;
        self.session.status = Status::Watching;
        Ok(Completion::Applied)
    }

    pub fn access_denied(
        &mut self,
        generation: u64,
        error: &TranslateError,
    ) -> Result<Completion, TransitionError> {
        if !self.is_current(generation) {
            return Ok(Completion::Stale);
        }
        self.expect(Status::RequestingAccess, "deny camera access")?;
        self.session.last_error = Some(error.info());
        self.session.status = Status::Errored;
        Ok(Completion::Applied)
    }

    /// Watching -> Translating on a capture tick.
    pub fn begin_translation(&mut self) -> Result<u64, TransitionError> {
        self.expect(Status::Watching, "start a capture")?;
        self.session.status = Status::Translating;
        Ok(self.session.generation)
    }

    /// Idle -> Translating for a one-shot upload.
    pub fn begin_upload(&mut self) -> Result<u64, TransitionError> {
        self.expect(Status::Idle, "analyze an upload")?;
        self.session.generation += 1;
        self.session.mode = SessionMode::Upload;
        self.session.last_error = None;
        self.session.status = Status::Translating;
        Ok(self.session.generation)
    }

    pub fn complete(
        &mut self,
        generation: u64,
        result: &InferenceResult,
    ) -> Result<Completion, TransitionError> {
        if !self.is_current(generation) {
            return Ok(Completion::Stale);
        }
        self.expect(Status::Translating, "apply a result")?;
        self.session.detected_label = result.label.clone();
        self.session.confidence = result.confidence;
        self.session.status = match self.session.mode {
            SessionMode::Camera => Status::Watching,
            SessionMode::Upload => Status::Idle,
        };
        Ok(Completion::Applied)
    }

    /// Translating -> Errored. The last good label and confidence are kept.
    pub fn fail(
        &mut self,
        generation: u64,
        error: &TranslateError,
    ) -> Result<Completion, TransitionError> {
        if !self.is_current(generation) {
            return Ok(Completion::Stale);
        }
        self.expect(Status::Translating, "record a failure")?;
        self.session.last_error = Some(error.info());
        self.session.status = Status::Errored;
        Ok(Completion::Applied)
    }

    /// Translating -> Watching without touching the result, for a capture
    /// that was skipped after the status had already flipped.
    pub fn abandon_translation(&mut self, generation: u64) -> Result<Completion, TransitionError> {
        if !self.is_current(generation) {
            return Ok(Completion::Stale);
        }
        self.expect(Status::Translating, "skip a capture")?;
        self.session.status = match self.session.mode {
            SessionMode::Camera => Status::Watching,
            SessionMode::Upload => Status::Idle,
        };
        Ok(Completion::Applied)
    }

    /// Errored -> Watching (camera still live) or Idle. Does not capture.
    pub fn retry(&mut self, camera_live: bool) -> Result<Status, TransitionError> {
        self.expect(Status::Errored, "retry")?;
        self.session.last_error = None;
        self.session.status = if self.session.mode == SessionMode::Camera && camera_live {
            Status::Watching
        } else {
            Status::Idle
        };
        Ok(self.session.status)
    }

    /// Always legal. Abandons whatever is outstanding.
    pub fn stop(&mut self) {
        self.session.generation += 1;
        self.session.status = Status::Idle;
        self.session.detected_label.clear();
        self.session.confidence = 0.0;
        self.session.last_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn result(label: &str, confidence: f32) -> InferenceResult {
        InferenceResult {
            label: label.into(),
            confidence,
        }
    }

    fn watching() -> SessionStateMachine {
        let mut machine = SessionStateMachine::new();
        let generation = machine.request_access().unwrap();
        machine.access_granted(generation).unwrap();
        machine
    }

    #[test]
    fn camera_happy_path() {
        let mut machine = SessionStateMachine::new();
        assert_eq!(machine.status(), Status::Idle);

        let generation = machine.request_access().unwrap();
        assert_eq!(machine.status(), Status::RequestingAccess);
        assert_eq!(machine.access_granted(generation), Ok(Completion::Applied));
        assert_eq!(machine.status(), Status::Watching);

        let tag = machine.begin_translation().unwrap();
        assert_eq!(machine.status(), Status::Translating);
        assert_eq!(machine.complete(tag, &result("A", 0.9)), Ok(Completion::Applied));
        assert_eq!(machine.status(), Status::Watching);
        assert_eq!(machine.session().detected_label, "A");
    }

    #[test]
    fn permission_denial_is_errored() {
        let mut machine = SessionStateMachine::new();
        let generation = machine.request_access().unwrap();
        let err = TranslateError::Permission("blocked".into());
        machine.access_denied(generation, &err).unwrap();
        assert_eq!(machine.status(), Status::Errored);
        assert_eq!(
            machine.session().last_error.as_ref().map(|e| e.kind),
            Some(ErrorKind::Permission)
        );

        // Without a live camera, retry lands back on Idle.
        assert_eq!(machine.retry(false), Ok(Status::Idle));
        assert!(machine.session().last_error.is_none());
    }

    #[test]
    fn failure_preserves_last_good_result() {
        let mut machine = watching();
        let tag = machine.begin_translation().unwrap();
        machine.complete(tag, &result("B", 0.8)).unwrap();

        let tag = machine.begin_translation().unwrap();
        let err = TranslateError::RemoteRejected {
            status: 500,
            body: "boom".into(),
        };
        machine.fail(tag, &err).unwrap();

        let session = machine.session();
        assert_eq!(session.status, Status::Errored);
        assert_eq!(session.detected_label, "B");
        assert_eq!(session.confidence, 0.8);

        assert_eq!(machine.retry(true), Ok(Status::Watching));
    }

    #[test]
    fn results_after_stop_are_stale() {
        let mut machine = watching();
        let tag = machine.begin_translation().unwrap();
        machine.stop();
        let before = machine.session().clone();

        assert_eq!(machine.complete(tag, &result("C", 1.0)), Ok(Completion::Stale));
        assert_eq!(
            machine.fail(tag, &TranslateError::Network("late".into())),
            Ok(Completion::Stale)
        );
        assert_eq!(machine.session(), &before);
    }

    #[test]
    fn grant_after_stop_is_stale() {
        let mut machine = SessionStateMachine::new();
        let generation = machine.request_access().unwrap();
        machine.stop();
        assert_eq!(machine.access_granted(generation), Ok(Completion::Stale));
        assert_eq!(machine.status(), Status::Idle);
    }

    #[test]
    fn upload_returns_to_idle() {
        let mut machine = SessionStateMachine::new();
        let tag = machine.begin_upload().unwrap();
        assert_eq!(machine.mode(), SessionMode::Upload);
        machine.complete(tag, &result("", 0.0)).unwrap();
        assert_eq!(machine.status(), Status::Idle);
    }

    #[test]
    fn illegal_transitions_are_refused() {
        let mut machine = SessionStateMachine::new();
        assert!(machine.begin_translation().is_err());
        assert!(machine.retry(true).is_err());

        let mut machine = watching();
        assert!(machine.request_access().is_err());
        assert!(machine.begin_upload().is_err());
        machine.begin_translation().unwrap();
        // One request at a time.
        assert!(machine.begin_translation().is_err());
    }

    #[test]
    fn stop_is_always_legal() {
        let mut machine = SessionStateMachine::new();
        machine.stop();
        machine.stop();
        assert_eq!(machine.status(), Status::Idle);

        let mut machine = watching();
        machine.begin_translation().unwrap();
        machine.stop();
        assert_eq!(machine.status(), Status::Idle);
        assert!(machine.session().detected_label.is_empty());
    }
}
