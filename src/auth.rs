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

use std::fmt::Debug;
use std::fmt::Formatter;

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// Response of [b2_authorize_account](https://www.backblaze.com/apidocs/b2-authorize-account).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AuthorizeAccountResponse {
    /// An authorization token to use with all calls, other than
    /// b2_authorize_account, that need an Authorization header.
    /// This authorization token is valid for at most 24 hours.
    pub authorization_token: String,
    /// The base URL to use for all API calls except for uploading and
    /// downloading files.
    pub api_url: String,
    /// The base URL to use for downloading files.
    pub download_url: String,
    /// The base URL for the S3-compatible API.
    pub s3_api_url: String,
    pub recommended_part_size: u64,
    pub absolute_minimum_part_size: u64,
    pub allowed: Allowed,
}

/// The `allowed` object inside the authorization response: what this
/// key is permitted to do, and an optional bucket it is locked to.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Allowed {
    pub capabilities: Vec<String>,
    pub bucket_id: Option<String>,
}

/// An authorization token plus the service endpoints it belongs to.
///
/// Created once per successful authorization call and replaced
/// wholesale on re-authorization, never mutated field by field. The
/// serialized form is what [`TokenCache`][crate::TokenCache]
/// implementations persist.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthToken {
    authorization_token: String,
    api_url: String,
    download_url: String,
    s3_api_url: String,
    recommended_part_size: u64,
    absolute_minimum_part_size: u64,
    capabilities: Vec<String>,
    bucket_id: Option<String>,
    expires_at: DateTime<Utc>,
}

/// Service-issued tokens are valid for 24 hours; we keep a one hour
/// safety margin so a token is never used right at the edge.
const DEFAULT_TOKEN_LIFETIME_HOURS: i64 = 23;

impl Debug for AuthToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // The bearer token must never end up in logs.
        f.debug_struct("AuthToken")
            .field("api_url", &self.api_url)
            .field("download_url", &self.download_url)
            .field("bucket_id", &self.bucket_id)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl AuthToken {
    pub(crate) fn from_response(
        resp: AuthorizeAccountResponse,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        AuthToken {
            authorization_token: resp.authorization_token,
            api_url: resp.api_url,
            download_url: resp.download_url,
            s3_api_url: resp.s3_api_url,
            recommended_part_size: resp.recommended_part_size,
            absolute_minimum_part_size: resp.absolute_minimum_part_size,
            capabilities: resp.allowed.capabilities,
            bucket_id: resp.allowed.bucket_id,
            expires_at: expires_at
                .unwrap_or_else(|| Utc::now() + Duration::hours(DEFAULT_TOKEN_LIFETIME_HOURS)),
        }
    }

    /// The bearer token to send in `Authorization` headers.
    pub fn token(&self) -> &str {
        &self.authorization_token
    }

    /// The base URL to use for all API calls except for uploading and
    /// downloading files.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// The base URL to use for downloading files.
    pub fn download_url(&self) -> &str {
        &self.download_url
    }

    /// The base URL for the S3-compatible API.
    pub fn s3_api_url(&self) -> &str {
        &self.s3_api_url
    }

    /// The recommended size in bytes for each part of a large file.
    pub fn recommended_part_size(&self) -> u64 {
        self.recommended_part_size
    }

    /// The smallest possible size in bytes of any part of a large file,
    /// except the last.
    pub fn absolute_minimum_part_size(&self) -> u64 {
        self.absolute_minimum_part_size
    }

    /// The capabilities granted to this token.
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// The bucket this token is restricted to, if any.
    pub fn bucket_id(&self) -> Option<&str> {
        self.bucket_id.as_deref()
    }

    /// When this token stops being usable.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether `capability` was granted to this token. Capability names
    /// are case-sensitive.
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    /// Whether this token has passed its expiry.
    pub fn has_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}
