//! Errhandler policy.
//!
//! The policy decides what happens to errors the transport reports at run
//! time. Each [`Communicator`](crate::Communicator) carries its own policy and
//! reads it on every fallible call.

use crate::error::Result;

/// How runtime errors surface to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum Errhandler {
    /// Runtime errors are unrecoverable: the call path panics.
    Fatal = 0,
    /// Runtime errors are returned as `Err`.
    #[default]
    ErrorsReturn = 1,
}

impl Errhandler {
    /// Decode a raw policy value. Unknown values decode as `None`.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Errhandler::Fatal),
            1 => Some(Errhandler::ErrorsReturn),
            _ => None,
        }
    }

    /// Raw policy value for the transport.
    pub fn raw(self) -> i32 {
        self as i32
    }

    /// Apply the policy to the outcome of a call.
    ///
    /// Under [`Errhandler::Fatal`] a runtime error (see
    /// [`Error::is_runtime`](crate::Error::is_runtime)) panics. Everything
    /// else passes through.
    pub fn apply<T>(self, result: Result<T>) -> Result<T> {
        match result {
            Err(err) if self == Errhandler::Fatal && err.is_runtime() => {
                tracing::error!(error = %err, "fatal MPI error");
                panic!("fatal MPI error: {err}");
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ErrorClass};

    fn failure() -> Error {
        Error::TransportFailure {
            class: ErrorClass::Other,
            code: 13,
        }
    }

    #[test]
    fn default_is_errors_return() {
        assert_eq!(Errhandler::default(), Errhandler::ErrorsReturn);
    }

    #[test]
    fn raw_values_round_trip() {
        assert_eq!(Errhandler::from_raw(Errhandler::Fatal.raw()), Some(Errhandler::Fatal));
        assert_eq!(
            Errhandler::from_raw(Errhandler::ErrorsReturn.raw()),
            Some(Errhandler::ErrorsReturn)
        );
        assert_eq!(Errhandler::from_raw(7), None);
    }

    #[test]
    fn errors_return_passes_errors_through() {
        let result: Result<()> = Err(failure());
        assert_eq!(Errhandler::ErrorsReturn.apply(result), Err(failure()));
    }

    #[test]
    #[should_panic(expected = "fatal MPI error")]
    fn fatal_panics_on_runtime_error() {
        let result: Result<()> = Err(failure());
        let _ = Errhandler::Fatal.apply(result);
    }

    #[test]
    fn fatal_returns_construction_errors() {
        let result: Result<()> = Err(Error::InvalidRank(9));
        assert_eq!(Errhandler::Fatal.apply(result), Err(Error::InvalidRank(9)));
        assert_eq!(Errhandler::Fatal.apply(Ok(3)), Ok(3));
    }
}
