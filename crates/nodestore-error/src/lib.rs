// Copyright 2026 The Nodestore Authors. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Shared error taxonomy for the nodestore workspace.
//!
//! Every fallible entry point in the store, cache, and database layers
//! returns `Result<T, Error>`. `Error` carries a closed [`Code`] plus a
//! stack of human-readable context frames accumulated via [`ResultExt::err_tip`],
//! mirroring how the rest of the workspace annotates failures as they
//! propagate up through several layers of backend, cache, and façade code.

use std::fmt;

/// Closed set of error kinds surfaced by the store.
///
/// `NotFound` is intentionally part of this enum even though a plain
/// `fetch()` never returns it as an `Err` (it is folded into `Ok(None)`
/// at the `Database` layer) — backends still need to report it as a
/// status so callers above them can decide what to do with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    NotFound,
    CorruptData,
    BackendError,
    UnsupportedBackend,
    UnsupportedCompressor,
    InvalidConfig,
    InvalidNode,
    Shutdown,
    Cancelled,
    Timeout,
    Internal,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Code::NotFound => "not_found",
            Code::CorruptData => "corrupt_data",
            Code::BackendError => "backend_error",
            Code::UnsupportedBackend => "unsupported_backend",
            Code::UnsupportedCompressor => "unsupported_compressor",
            Code::InvalidConfig => "invalid_config",
            Code::InvalidNode => "invalid_node",
            Code::Shutdown => "shutdown",
            Code::Cancelled => "cancelled",
            Code::Timeout => "timeout",
            Code::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// A tagged error with an accumulating stack of context messages.
///
/// The innermost `err_tip()` call is pushed first, so `messages[0]` is the
/// root cause and the last entry is the outermost frame to add context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub code: Code,
    pub messages: Vec<String>,
}

impl Error {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Error {
            code,
            messages: vec![message.into()],
        }
    }

    /// Appends a context frame, keeping the original `code`.
    pub fn append(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    /// Replaces the code while keeping accumulated context, used when an
    /// inner error's code is too generic for the caller's purposes.
    pub fn with_code(mut self, code: Code) -> Self {
        self.code = code;
        self
    }

    /// Combines two results produced by concurrent or sequential operations
    /// that should both be considered a failure if either failed. If only
    /// one side failed, its error is returned as-is; if both failed, their
    /// messages are concatenated onto the first error's code.
    pub fn merge(self, other: Result<(), Error>) -> Result<(), Error> {
        match other {
            Ok(()) => Err(self),
            Err(other_err) => {
                let mut messages = self.messages;
                messages.extend(other_err.messages);
                Err(Error {
                    code: self.code,
                    messages,
                })
            }
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.messages.join(" -> "))
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::new(Code::BackendError, err.to_string())
    }
}

/// Builds an [`Error`] with a `format!`-style message, mirroring the
/// workspace-wide `make_err!(Code::X, "...", args)` convention.
#[macro_export]
macro_rules! make_err {
    ($code:expr, $($arg:tt)*) => {
        $crate::Error::new($code, format!($($arg)*))
    };
}

/// Early-returns a `make_err!` if `cond` is true, mirroring the
/// workspace's `error_if!(cond, "...", args)` convention used for
/// lightweight validation checks.
#[macro_export]
macro_rules! error_if {
    ($cond:expr, $code:expr, $($arg:tt)*) => {
        if $cond {
            return Err($crate::make_err!($code, $($arg)*));
        }
    };
}

/// Extension trait used to attach context to a `Result` as it propagates,
/// the way `.err_tip(|| "...")` is used throughout the workspace.
pub trait ResultExt<T> {
    /// Attaches a context message without changing the error's code.
    fn err_tip<F, S>(self, f: F) -> Result<T, Error>
    where
        F: FnOnce() -> S,
        S: Into<String>;

    /// Attaches a context message and overrides the error's code — used
    /// when the underlying error type has no notion of our taxonomy (e.g.
    /// a raw `std::io::Error` that should surface as `BackendError`).
    fn err_tip_with_code<F, S>(self, f: F) -> Result<T, Error>
    where
        F: FnOnce() -> (Code, S),
        S: Into<String>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<Error>,
{
    fn err_tip<F, S>(self, f: F) -> Result<T, Error>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.into().append(f().into()))
    }

    fn err_tip_with_code<F, S>(self, f: F) -> Result<T, Error>
    where
        F: FnOnce() -> (Code, S),
        S: Into<String>,
    {
        self.map_err(|e| {
            let (code, msg) = f();
            e.into().with_code(code).append(msg.into())
        })
    }
}

/// Convenience trait for `Option<T>` so a missing value can be promoted
/// directly into a tagged `Error` with `.err_tip(...)`, matching the
/// pattern used for parsing resource names elsewhere in the workspace.
impl<T> ResultExt<T> for Option<T> {
    fn err_tip<F, S>(self, f: F) -> Result<T, Error>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.ok_or_else(|| Error::new(Code::Internal, f().into()))
    }

    fn err_tip_with_code<F, S>(self, f: F) -> Result<T, Error>
    where
        F: FnOnce() -> (Code, S),
        S: Into<String>,
    {
        self.ok_or_else(|| {
            let (code, msg) = f();
            Error::new(code, msg.into())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_context_frames() {
        let err = Error::new(Code::NotFound, "root cause").append("while fetching");
        assert_eq!(format!("{err}"), "not_found: root cause -> while fetching");
    }

    #[test]
    fn err_tip_preserves_code_by_default() {
        let result: Result<(), Error> = Err(Error::new(Code::CorruptData, "bad crc"));
        let tipped = result.err_tip(|| "while decoding record");
        let err = tipped.unwrap_err();
        assert_eq!(err.code, Code::CorruptData);
        assert_eq!(err.messages, vec!["bad crc", "while decoding record"]);
    }

    #[test]
    fn err_tip_with_code_overrides_code() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let result: Result<(), std::io::Error> = Err(io_err);
        let tipped = result.err_tip_with_code(|| (Code::BackendError, "while flushing"));
        assert_eq!(tipped.unwrap_err().code, Code::BackendError);
    }

    #[test]
    fn merge_concatenates_when_both_sides_fail() {
        let a = Error::new(Code::BackendError, "primary close failed");
        let b: Result<(), Error> = Err(Error::new(Code::BackendError, "rotating close failed"));
        let merged = a.merge(b).unwrap_err();
        assert_eq!(merged.messages.len(), 2);
    }

    #[test]
    fn merge_returns_only_error_when_other_side_ok() {
        let a = Error::new(Code::BackendError, "primary close failed");
        let merged = a.merge(Ok(())).unwrap_err();
        assert_eq!(merged.messages.len(), 1);
    }
}
