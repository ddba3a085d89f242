//! Outcome codes of remote procedure calls.

use std::fmt::{self, Display, Formatter};

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Why a remote call (or a lookup made of remote calls) did not succeed.
pub enum Failure {
    /// No response within the request timeout.
    #[error("Request timed out")]
    Timeout,

    /// The peer could not be connected to, or was removed while calls were pending.
    #[error("Peer unreachable")]
    Unreachable,

    /// Hop budget exceeded, or a peer answered something that breaks ring invariants.
    #[error("Protocol error")]
    ProtocolError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Status of a completed call, as carried in error messages on the wire.
pub enum Status {
    Ok,
    Timeout,
    Unreachable,
    ProtocolError,
}

impl Status {
    pub fn code(&self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::Timeout => 1,
            Status::Unreachable => 2,
            Status::ProtocolError => 3,
        }
    }

    /// Unknown codes are read as [Status::ProtocolError].
    pub fn from_code(code: i32) -> Status {
        match code {
            0 => Status::Ok,
            1 => Status::Timeout,
            2 => Status::Unreachable,
            _ => Status::ProtocolError,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => write!(f, "OK"),
            Status::Timeout => write!(f, "TIMEOUT"),
            Status::Unreachable => write!(f, "UNREACHABLE"),
            Status::ProtocolError => write!(f, "PROTOCOL_ERROR"),
        }
    }
}

impl From<Failure> for Status {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::Timeout => Status::Timeout,
            Failure::Unreachable => Status::Unreachable,
            Failure::ProtocolError => Status::ProtocolError,
        }
    }
}

impl<T> From<&Result<T, Failure>> for Status {
    fn from(result: &Result<T, Failure>) -> Self {
        match result {
            Ok(_) => Status::Ok,
            Err(failure) => (*failure).into(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn codes() {
        for status in [
            Status::Ok,
            Status::Timeout,
            Status::Unreachable,
            Status::ProtocolError,
        ] {
            assert_eq!(Status::from_code(status.code()), status);
        }

        assert_eq!(Status::from_code(201), Status::ProtocolError);
    }
}
