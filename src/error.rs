//! Error types and the mapping from transport return codes.
//!
//! Every transport call returns an integer code. [`Error::check`] turns that
//! code into `Ok(())` or a typed [`Error`]; [`ErrorClass`] names the standard
//! error classes the codes belong to.

use thiserror::Error;

use crate::datatype::ElementType;
use crate::ReduceOp;

/// Result type for MPI operations
pub type Result<T> = std::result::Result<T, Error>;

/// Standard MPI error classes.
///
/// The discriminants are the raw codes transports report. Codes outside the
/// table classify as [`ErrorClass::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorClass {
    /// No error (`MPI_SUCCESS`)
    Success = 0,
    /// Invalid buffer pointer
    Buffer = 1,
    /// Invalid count argument
    Count = 2,
    /// Invalid datatype argument
    Type = 3,
    /// Invalid tag argument
    Tag = 4,
    /// Invalid communicator
    Comm = 5,
    /// Invalid rank
    Rank = 6,
    /// Invalid request handle
    Request = 7,
    /// Invalid root
    Root = 8,
    /// Invalid operation
    Op = 9,
    /// Invalid argument of some other kind
    Arg = 10,
    /// Unknown error
    Unknown = 11,
    /// Message truncated on receive
    Truncate = 12,
    /// Known error not in this list
    Other = 13,
    /// Internal transport error
    Intern = 14,
}

impl ErrorClass {
    /// Classify a raw transport code.
    pub fn from_raw(code: i32) -> Self {
        match code {
            0 => ErrorClass::Success,
            1 => ErrorClass::Buffer,
            2 => ErrorClass::Count,
            3 => ErrorClass::Type,
            4 => ErrorClass::Tag,
            5 => ErrorClass::Comm,
            6 => ErrorClass::Rank,
            7 => ErrorClass::Request,
            8 => ErrorClass::Root,
            9 => ErrorClass::Op,
            10 => ErrorClass::Arg,
            12 => ErrorClass::Truncate,
            13 => ErrorClass::Other,
            14 => ErrorClass::Intern,
            _ => ErrorClass::Unknown,
        }
    }

    /// The raw code for this class.
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Error types for MPI operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Rank outside `[0, size)` that is not a sentinel
    #[error("Invalid rank: {0}")]
    InvalidRank(i32),

    /// Tag outside the valid range
    #[error("Invalid tag: {0}")]
    InvalidTag(i32),

    /// Container element kind with no element type mapping
    #[error("Unsupported element type: {0}")]
    UnsupportedType(String),

    /// Buffer is not one contiguous memory region
    #[error("Buffer is not contiguous (stride {stride})")]
    NotContiguous {
        /// Distance between consecutive elements, in elements
        stride: usize,
    },

    /// Receive-side container handed out a read-only view
    #[error("Receive buffer is read-only")]
    ReadOnly,

    /// Buffer holds fewer elements than the operation needs
    #[error("Buffer too small: need {required} elements, have {actual}")]
    TooSmall {
        /// Elements required
        required: usize,
        /// Elements available
        actual: usize,
    },

    /// Buffers taking part in one operation disagree on element type
    #[error("Element type mismatch: expected {expected:?}, found {found:?}")]
    TypeMismatch {
        /// Element type the operation was issued with
        expected: ElementType,
        /// Element type of the offending buffer
        found: ElementType,
    },

    /// Invalid count specified
    #[error("Invalid count: {0}")]
    InvalidCount(i64),

    /// Reduction operation not defined for the element type
    #[error("Reduction {op:?} is not defined for {element_type:?}")]
    InvalidOp {
        /// Requested operation
        op: ReduceOp,
        /// Element type of the buffers
        element_type: ElementType,
    },

    /// Incoming message was larger than the receive buffer
    #[error("Message truncated: {count} elements from rank {source_rank} (tag {tag}) into capacity {capacity}")]
    MessageTruncated {
        /// Rank the message came from, [`ANY_SOURCE`](crate::ANY_SOURCE) if
        /// the transport did not say
        source_rank: i32,
        /// Tag the message carried, [`ANY_TAG`](crate::ANY_TAG) if the
        /// transport did not say
        tag: i32,
        /// Full size of the incoming message, in elements (`-1` if the
        /// transport did not say)
        count: i64,
        /// Capacity of the receive buffer, in elements
        capacity: i64,
    },

    /// Non-zero transport code with no finer classification
    #[error("Transport failure: {class:?} (code {code})")]
    TransportFailure {
        /// Error class of the code
        class: ErrorClass,
        /// Raw code reported by the transport
        code: i32,
    },

    /// The request was cancelled before it completed
    #[error("Request was cancelled")]
    Cancelled,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an error from a transport return code.
    ///
    /// A truncation code becomes [`MessageTruncated`](Error::MessageTruncated)
    /// with every field it cannot know marked unknown. Receive paths that have
    /// a status use [`Error::check_status`] to fill them in.
    pub fn from_code(code: i32) -> Self {
        match ErrorClass::from_raw(code) {
            ErrorClass::Success => Error::Internal("success code mapped to an error".into()),
            ErrorClass::Truncate => Error::MessageTruncated {
                source_rank: crate::ANY_SOURCE,
                tag: crate::ANY_TAG,
                count: -1,
                capacity: -1,
            },
            class => Error::TransportFailure { class, code },
        }
    }

    /// Fill in the sender and receive capacity of a truncation reported
    /// without a status. Other errors are returned unchanged.
    pub(crate) fn received_from(self, source: i32, capacity: usize) -> Self {
        match self {
            Error::MessageTruncated { tag, count, .. } => Error::MessageTruncated {
                source_rank: source,
                tag,
                count,
                capacity: capacity as i64,
            },
            other => other,
        }
    }

    /// Check a transport return code, returning Ok(()) for success.
    pub fn check(code: i32) -> Result<()> {
        if code == 0 {
            Ok(())
        } else {
            Err(Error::from_code(code))
        }
    }

    /// Check the code of a completed receive against its status.
    pub(crate) fn check_status(code: i32, status: &crate::Status, capacity: usize) -> Result<()> {
        match ErrorClass::from_raw(code) {
            ErrorClass::Success => Ok(()),
            ErrorClass::Truncate => Err(Error::MessageTruncated {
                source_rank: status.source,
                tag: status.tag,
                count: status.count,
                capacity: capacity as i64,
            }),
            _ => Err(Error::from_code(code)),
        }
    }

    /// The error class this error reports as.
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::InvalidRank(_) => ErrorClass::Rank,
            Error::InvalidTag(_) => ErrorClass::Tag,
            Error::UnsupportedType(_) | Error::TypeMismatch { .. } => ErrorClass::Type,
            Error::NotContiguous { .. } | Error::ReadOnly | Error::TooSmall { .. } => {
                ErrorClass::Buffer
            }
            Error::InvalidCount(_) => ErrorClass::Count,
            Error::InvalidOp { .. } => ErrorClass::Op,
            Error::MessageTruncated { .. } => ErrorClass::Truncate,
            Error::TransportFailure { class, .. } => *class,
            Error::Cancelled => ErrorClass::Request,
            Error::Internal(_) => ErrorClass::Intern,
        }
    }

    /// Whether the transport reported this error at run time.
    ///
    /// Only runtime errors are subject to the errhandler policy; every other
    /// variant is returned to the caller as soon as it is detected.
    pub fn is_runtime(&self) -> bool {
        matches!(
            self,
            Error::MessageTruncated { .. } | Error::TransportFailure { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_success_is_ok() {
        assert!(Error::check(0).is_ok());
    }

    #[test]
    fn check_failure_keeps_code_and_class() {
        let err = Error::check(6).unwrap_err();
        assert_eq!(
            err,
            Error::TransportFailure {
                class: ErrorClass::Rank,
                code: 6
            }
        );
        assert!(err.is_runtime());
    }

    #[test]
    fn unknown_codes_classify_as_unknown() {
        assert_eq!(ErrorClass::from_raw(11), ErrorClass::Unknown);
        assert_eq!(ErrorClass::from_raw(999), ErrorClass::Unknown);
        assert_eq!(ErrorClass::from_raw(-3), ErrorClass::Unknown);
        assert_eq!(Error::from_code(999).class(), ErrorClass::Unknown);
    }

    #[test]
    fn class_codes_round_trip() {
        for code in [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 12, 13, 14] {
            assert_eq!(ErrorClass::from_raw(code).code(), code);
        }
    }

    #[test]
    fn truncation_with_status_reports_full_count() {
        let status = crate::Status {
            source: 3,
            tag: 7,
            error: ErrorClass::Truncate,
            count: 10,
        };
        let err = Error::check_status(ErrorClass::Truncate.code(), &status, 4).unwrap_err();
        assert_eq!(
            err,
            Error::MessageTruncated {
                source_rank: 3,
                tag: 7,
                count: 10,
                capacity: 4
            }
        );
        assert!(err.is_runtime());
    }

    #[test]
    fn truncation_codes_map_to_message_truncated() {
        let err = Error::check(ErrorClass::Truncate.code()).unwrap_err();
        assert_eq!(
            err,
            Error::MessageTruncated {
                source_rank: crate::ANY_SOURCE,
                tag: crate::ANY_TAG,
                count: -1,
                capacity: -1
            }
        );
        assert_eq!(err.class(), ErrorClass::Truncate);
        assert!(err.is_runtime());

        let err = err.received_from(2, 6);
        assert!(matches!(
            err,
            Error::MessageTruncated {
                source_rank: 2,
                capacity: 6,
                ..
            }
        ));
        assert_eq!(Error::Cancelled.received_from(2, 6), Error::Cancelled);
    }

    #[test]
    fn construction_errors_are_not_runtime() {
        assert!(!Error::InvalidRank(5).is_runtime());
        assert!(!Error::InvalidTag(-9).is_runtime());
        assert!(!Error::NotContiguous { stride: 2 }.is_runtime());
        assert!(!Error::ReadOnly.is_runtime());
        assert_eq!(Error::ReadOnly.class(), ErrorClass::Buffer);
        assert!(!Error::Cancelled.is_runtime());
        assert_eq!(Error::InvalidRank(5).class(), ErrorClass::Rank);
    }

    #[test]
    fn error_messages() {
        assert_eq!(Error::InvalidRank(4).to_string(), "Invalid rank: 4");
        assert_eq!(
            Error::TooSmall {
                required: 8,
                actual: 2
            }
            .to_string(),
            "Buffer too small: need 8 elements, have 2"
        );
    }
}
