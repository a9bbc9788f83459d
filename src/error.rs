// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Errors returned by this crate.
//!
//! Every fallible operation returns [`Error`], which carries an
//! [`ErrorKind`] so callers can match on the failure class without
//! parsing messages:
//!
//! ```no_run
//! # use b2_client::{B2Client, ErrorKind};
//! # async fn example(client: B2Client) {
//! if let Err(e) = client.list_buckets().await {
//!     if e.kind() == ErrorKind::Unauthorized {
//!         eprintln!("key has no access to this account")
//!     }
//! }
//! # }
//! ```

use std::fmt;
use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;

use bytes::Bytes;
use http::Response;
use serde::Deserialize;

/// Result that is a wrapper of `Result<T, b2_client::Error>`.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// ErrorKind is all kinds of Error of this crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The crate doesn't know what happened here, and no actions other
    /// than returning it back. For example, an http request could not
    /// even be built.
    Unexpected,
    /// Network or connection failure, or a response body that could not
    /// be decoded. Not specific to the B2 service itself.
    Transport,
    /// The service replied with a non-200 response whose error code has
    /// no specific mapping. The raw code is kept in the message.
    Service,
    /// The authorization token is invalid or has been revoked
    /// server-side (`bad_auth_token`).
    BadAuthToken,
    /// The request body was not valid JSON (`bad_json`).
    BadJson,
    /// The request was malformed (`bad_request`).
    BadRequest,
    /// A request field carried an invalid value (`bad_value`).
    BadValue,
    /// A bucket with that name already exists (`duplicate_bucket_name`).
    DuplicateBucketName,
    /// The requested entity was not found (`not_found`).
    NotFound,
    /// The named file is not present in the bucket (`file_not_present`).
    FileNotPresent,
    /// The bucket still holds files and can't be deleted
    /// (`cannot_delete_non_empty_bucket`).
    BucketNotEmpty,
    /// The token is not allowed to perform this operation
    /// (`unauthorized`).
    Unauthorized,
    /// Client-side pre-check failure: the current token lacks a
    /// required capability. This error never reaches the network.
    MissingCapability,
    /// The client configuration or a caller-supplied input is invalid.
    /// Caught before any request is sent.
    ConfigInvalid,
}

impl ErrorKind {
    /// Convert self into static str.
    pub fn into_static(self) -> &'static str {
        self.into()
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.into_static())
    }
}

impl From<ErrorKind> for &'static str {
    fn from(v: ErrorKind) -> &'static str {
        match v {
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::Transport => "Transport",
            ErrorKind::Service => "Service",
            ErrorKind::BadAuthToken => "BadAuthToken",
            ErrorKind::BadJson => "BadJson",
            ErrorKind::BadRequest => "BadRequest",
            ErrorKind::BadValue => "BadValue",
            ErrorKind::DuplicateBucketName => "DuplicateBucketName",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::FileNotPresent => "FileNotPresent",
            ErrorKind::BucketNotEmpty => "BucketNotEmpty",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::MissingCapability => "MissingCapability",
            ErrorKind::ConfigInvalid => "ConfigInvalid",
        }
    }
}

/// Error is the error struct returned by all b2_client functions.
///
/// Displayed in a single line via `Display`:
///
/// ```shell
/// BadAuthToken at B2Core::send_request, context: { endpoint: b2_list_buckets } => bad_auth_token: token expired
/// ```
pub struct Error {
    kind: ErrorKind,
    message: String,

    operation: &'static str,
    context: Vec<(&'static str, String)>,
    source: Option<anyhow::Error>,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;

        if !self.operation.is_empty() {
            write!(f, " at {}", self.operation)?;
        }

        if !self.context.is_empty() {
            write!(f, ", context: {{ ")?;
            write!(
                f,
                "{}",
                self.context
                    .iter()
                    .map(|(k, v)| format!("{k}: {v}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            )?;
            write!(f, " }}")?;
        }

        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }

        if let Some(source) = &self.source {
            write!(f, ", source: {source}")?;
        }

        Ok(())
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // If alternate has been specified, print the struct-style debug.
        if f.alternate() {
            let mut de = f.debug_struct("Error");
            de.field("kind", &self.kind);
            de.field("message", &self.message);
            de.field("operation", &self.operation);
            de.field("context", &self.context);
            de.field("source", &self.source);
            return de.finish();
        }

        write!(f, "{}", self.kind)?;
        if !self.operation.is_empty() {
            write!(f, " at {}", self.operation)?;
        }
        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }
        writeln!(f)?;

        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "Context:")?;
            for (k, v) in self.context.iter() {
                writeln!(f, "   {k}: {v}")?;
            }
        }
        if let Some(source) = &self.source {
            writeln!(f)?;
            writeln!(f, "Source:")?;
            writeln!(f, "   {source:#}")?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|v| v.as_ref())
    }
}

impl Error {
    /// Create a new Error with error kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),

            operation: "",
            context: Vec::default(),
            source: None,
        }
    }

    /// Update error's operation.
    ///
    /// # Notes
    ///
    /// If the error already carries an operation, we will push a new context
    /// `(called, operation)`.
    pub fn with_operation(mut self, operation: impl Into<&'static str>) -> Self {
        if !self.operation.is_empty() {
            self.context.push(("called", self.operation.to_string()));
        }

        self.operation = operation.into();
        self
    }

    /// Add more context in error.
    pub fn with_context(mut self, key: &'static str, value: impl ToString) -> Self {
        self.context.push((key, value.to_string()));
        self
    }

    /// Set source for error.
    ///
    /// # Notes
    ///
    /// If the source has been set, we will raise a panic here.
    pub fn set_source(mut self, src: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "the source error has been set");

        self.source = Some(src.into());
        self
    }

    /// Return error's kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Return error's message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// B2ErrorResponse is the JSON body the service sends along with any
/// non-200 status.
#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
struct B2ErrorResponse {
    status: u16,
    code: String,
    message: String,
}

/// Parse an error response into Error.
///
/// The body of a failed call is itself JSON; a body that doesn't decode
/// is a transport failure, not a service error.
pub(crate) fn parse_error(resp: Response<Bytes>) -> Error {
    let (parts, bs) = resp.into_parts();

    match serde_json::from_slice::<B2ErrorResponse>(&bs) {
        Ok(b2_err) => {
            let kind = parse_b2_error_code(&b2_err.code).unwrap_or(ErrorKind::Service);

            Error::new(kind, format!("{}: {}", b2_err.code, b2_err.message))
                .with_context("status", parts.status)
        }
        Err(err) => Error::new(
            ErrorKind::Transport,
            String::from_utf8_lossy(&bs).into_owned(),
        )
        .with_context("status", parts.status)
        .set_source(err),
    }
}

/// Returns the [`ErrorKind`] of this service error code, or `None` if
/// the code has no specific mapping.
///
/// All possible error codes: <https://www.backblaze.com/apidocs/calling-the-api>
pub fn parse_b2_error_code(code: &str) -> Option<ErrorKind> {
    match code {
        "bad_auth_token" => Some(ErrorKind::BadAuthToken),
        "bad_json" => Some(ErrorKind::BadJson),
        "bad_request" => Some(ErrorKind::BadRequest),
        "bad_value" => Some(ErrorKind::BadValue),
        "duplicate_bucket_name" => Some(ErrorKind::DuplicateBucketName),
        "not_found" => Some(ErrorKind::NotFound),
        "file_not_present" => Some(ErrorKind::FileNotPresent),
        "cannot_delete_non_empty_bucket" => Some(ErrorKind::BucketNotEmpty),
        "unauthorized" => Some(ErrorKind::Unauthorized),
        _ => None,
    }
}

/// Build an error from a request that could not even be constructed.
pub(crate) fn new_request_build_error(err: http::Error) -> Error {
    Error::new(ErrorKind::Unexpected, "building http request")
        .with_operation("http::Request::build")
        .set_source(err)
}

/// Build an error from a response body that failed to decode as JSON.
pub(crate) fn new_json_deserialize_error(err: serde_json::Error) -> Error {
    Error::new(ErrorKind::Transport, "deserialize json from response body").set_source(err)
}

/// Build an error from a request body that failed to serialize as JSON.
pub(crate) fn new_json_serialize_error(err: serde_json::Error) -> Error {
    Error::new(ErrorKind::Unexpected, "serialize json for request body").set_source(err)
}
