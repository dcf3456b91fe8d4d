// Copyright 2022 Ryan Seipp
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Incremental HTTP/1.x request and response parsing.
//!
//! The state machine lives in [`message`]; [`method`], [`version`] and [`status`] hold the small
//! enums it parses request/status lines into, and [`header`] holds the ordered, case-insensitive
//! header list both messages share.

use std::fmt::Display;

pub mod cursor;
pub mod header;
pub mod message;
pub mod method;
pub mod status;
pub mod version;

pub use header::{Header, HeaderList};
pub use message::{HttpMessage, Kind as MessageKind, ParserState};
pub use method::Method;
pub use status::Status;
pub use version::Version;

/// Represents possible failures while parsing an HTTP message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Invalid byte in method.
    Method,
    /// Invalid byte in request target.
    Target,
    /// Invalid HTTP version.
    Version,
    /// Invalid byte in status code.
    StatusCode,
    /// Invalid byte in reason phrase.
    Reason,
    /// Invalid byte in header name.
    HeaderName,
    /// Invalid byte in header value.
    HeaderValue,
    /// Invalid or missing new line.
    NewLine,
    /// Invalid whitespace.
    Whitespace,
    /// `Content-Length` value is not a valid non-negative integer.
    ContentLength,
    /// A chunk size line is not valid hexadecimal.
    ChunkSize,
    /// More bytes were fed after the message already reached `COMPLETE`.
    AlreadyComplete,
}

impl ParseError {
    fn description_str(&self) -> &'static str {
        match *self {
            ParseError::Method => "invalid token in method",
            ParseError::Target => "invalid token in target",
            ParseError::Version => "invalid version",
            ParseError::StatusCode => "invalid status code",
            ParseError::Reason => "invalid reason phrase",
            ParseError::HeaderName => "invalid token in header name",
            ParseError::HeaderValue => "invalid token in header value",
            ParseError::NewLine => "invalid or missing new line",
            ParseError::Whitespace => "invalid whitespace",
            ParseError::ContentLength => "invalid content-length",
            ParseError::ChunkSize => "invalid chunk size",
            ParseError::AlreadyComplete => "message already complete",
        }
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description_str())
    }
}

impl std::error::Error for ParseError {}

/// Result whose `Err` variant is [`ParseError`].
pub type ParseResult<T> = std::result::Result<T, ParseError>;
