use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::persistence::StoreError;

// ============================================================================
// Outcome - Uniform Success/Failure Value
// ============================================================================
//
// Every handler returns an Outcome instead of raising for expected failures.
// A failure never carries a value: the payload lives inside the Success state.
//
// ============================================================================

pub const DEFAULT_SUCCESS_MESSAGE: &str = "Operation completed successfully";
pub const DEFAULT_FAILURE_MESSAGE: &str = "Operation failed";

#[derive(Debug, Clone, PartialEq)]
enum State<T> {
    Success(T),
    Failure(Vec<String>),
}

/// Tagged outcome of a command or query
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    state: State<T>,
    message: String,
}

impl<T> Outcome<T> {
    pub fn success(value: T) -> Self {
        Self {
            state: State::Success(value),
            message: DEFAULT_SUCCESS_MESSAGE.to_string(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self::failures(vec![error.into()])
    }

    /// A failure always carries at least one error; an empty list gets the default message
    pub fn failures(mut errors: Vec<String>) -> Self {
        if errors.is_empty() {
            errors.push(DEFAULT_FAILURE_MESSAGE.to_string());
        }
        Self {
            state: State::Failure(errors),
            message: DEFAULT_FAILURE_MESSAGE.to_string(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self.state, State::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn value(&self) -> Option<&T> {
        match &self.state {
            State::Success(value) => Some(value),
            State::Failure(_) => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self.state {
            State::Success(value) => Some(value),
            State::Failure(_) => None,
        }
    }

    /// All errors; empty on success
    pub fn errors(&self) -> &[String] {
        match &self.state {
            State::Success(_) => &[],
            State::Failure(errors) => errors,
        }
    }

    /// Errors joined with "; ", or None on success
    pub fn error(&self) -> Option<String> {
        match &self.state {
            State::Success(_) => None,
            State::Failure(errors) => Some(errors.join("; ")),
        }
    }

    pub fn into_result(self) -> Result<T, Vec<String>> {
        match self.state {
            State::Success(value) => Ok(value),
            State::Failure(errors) => Err(errors),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        let state = match self.state {
            State::Success(value) => State::Success(f(value)),
            State::Failure(errors) => State::Failure(errors),
        };
        Outcome {
            state,
            message: self.message,
        }
    }
}

impl<T> From<StoreError> for Outcome<T> {
    fn from(error: StoreError) -> Self {
        Outcome::failure(error.to_string())
    }
}

impl<T: Serialize> Serialize for Outcome<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut body = serializer.serialize_struct("Outcome", 4)?;
        body.serialize_field("success", &self.is_success())?;
        body.serialize_field("message", &self.message)?;
        body.serialize_field("data", &self.value())?;
        body.serialize_field("errors", self.errors())?;
        body.end()
    }
}
