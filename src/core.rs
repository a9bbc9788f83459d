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

//! The authenticated-request dispatcher.
//!
//! [`B2Core`] owns the application credentials, the in-memory
//! authorization token and the optional persistent token cache. All
//! operations of [`B2Client`][crate::B2Client] go through it.

use std::fmt::Debug;
use std::fmt::Formatter;
use std::sync::Arc;

use bytes::Bytes;
use http::header;
use http::HeaderMap;
use http::Method;
use http::Request;
use http::Response;
use http::StatusCode;
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::auth::AuthorizeAccountResponse;
use crate::error::new_json_deserialize_error;
use crate::error::new_json_serialize_error;
use crate::error::new_request_build_error;
use crate::error::parse_error;
use crate::http_util::build_header_value;
use crate::http_util::format_authorization_by_basic;
use crate::http_util::percent_encode_path;
use crate::http_util::HttpBody;
use crate::http_util::HttpClient;
use crate::AuthToken;
use crate::Error;
use crate::ErrorKind;
use crate::Result;
use crate::TokenCache;

/// The fixed base URL every account authorizes against.
pub const B2_API_BASE_URL: &str = "https://api.backblazeb2.com";
/// The API version path segment prepended to every endpoint name.
pub const B2_API_PATH: &str = "/b2api/v2";

/// The single key under which the authorization token is cached.
const TOKEN_CACHE_KEY: &str = "authenticationToken";

pub(crate) mod constants {
    pub const X_BZ_FILE_NAME: &str = "X-Bz-File-Name";
    pub const X_BZ_CONTENT_SHA1: &str = "X-Bz-Content-Sha1";
    pub const X_BZ_INFO_SRC_LAST_MODIFIED_MILLIS: &str = "X-Bz-Info-src_last_modified_millis";
}

/// Per-request options for [`B2Core::send_request`] and
/// [`B2Core::send_raw_request`].
#[derive(Default)]
pub struct RequestArgs {
    /// Query pairs appended to the URL. Values are percent-encoded.
    pub query: Vec<(String, String)>,
    /// Extra headers for this request.
    pub headers: HeaderMap,
    /// Raw request body.
    pub body: Option<Bytes>,
}

/// Core of the b2 client: authorization-token lifecycle plus
/// authenticated request dispatch.
pub struct B2Core {
    pub(crate) client: HttpClient,
    pub(crate) account_id: String,

    application_key_id: String,
    application_key: String,

    /// The single authoritative in-memory token. Refreshed lazily;
    /// the write lock serializes refreshes so concurrent callers
    /// coalesce into one in-flight fetch.
    token: RwLock<Option<AuthToken>>,
    cache: Option<Arc<dyn TokenCache>>,
}

impl Debug for B2Core {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // Credentials are deliberately left out.
        f.debug_struct("B2Core")
            .field("account_id", &self.account_id)
            .finish_non_exhaustive()
    }
}

impl B2Core {
    pub(crate) fn new(
        client: HttpClient,
        account_id: String,
        application_key_id: String,
        application_key: String,
        cache: Option<Arc<dyn TokenCache>>,
    ) -> Self {
        B2Core {
            client,
            account_id,
            application_key_id,
            application_key,
            token: RwLock::new(None),
            cache,
        }
    }

    /// Get an authorization token, either from memory, from the cache,
    /// or by requesting a new one.
    pub async fn get_token(&self) -> Result<AuthToken> {
        {
            let token = self.token.read().await;
            if let Some(token) = token.as_ref() {
                if !token.has_expired() {
                    return Ok(token.clone());
                }
            }
        }

        let mut slot = self.token.write().await;

        // Another caller may have refreshed while we waited on the lock.
        if let Some(token) = slot.as_ref() {
            if !token.has_expired() {
                return Ok(token.clone());
            }
        }

        if let Some(cache) = &self.cache {
            match cache.load(TOKEN_CACHE_KEY) {
                Ok(Some(token)) if !token.has_expired() => {
                    *slot = Some(token.clone());
                    return Ok(token);
                }
                Ok(Some(_)) => {
                    // The entry outlived its nominal TTL, which points
                    // at clock skew or a cache bug. Never hand it to a
                    // caller; drop it and take the loss this time.
                    if let Err(err) = cache.invalidate(TOKEN_CACHE_KEY) {
                        warn!("b2 token cache invalidation failed: {err}");
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    // A broken cache must never abort the request.
                    warn!("b2 token cache read failed, falling back to a fresh fetch: {err}");
                    if let Err(err) = cache.invalidate(TOKEN_CACHE_KEY) {
                        warn!("b2 token cache invalidation failed: {err}");
                    }
                }
            }
        }

        let token = self.fetch_token().await?;

        if let Some(cache) = &self.cache {
            if let Err(err) = cache.store(TOKEN_CACHE_KEY, &token) {
                warn!("b2 token cache write failed: {err}");
            }
        }

        *slot = Some(token.clone());
        Ok(token)
    }

    /// [b2_authorize_account](https://www.backblaze.com/apidocs/b2-authorize-account)
    ///
    /// Exchanges the long-lived application key for a fresh token. The
    /// service supplies no expiry, so the default 23 hour window
    /// applies.
    async fn fetch_token(&self) -> Result<AuthToken> {
        let url = format!("{B2_API_BASE_URL}{B2_API_PATH}/b2_authorize_account");

        let req = Request::get(&url)
            .header(
                header::AUTHORIZATION,
                format_authorization_by_basic(&self.application_key_id, &self.application_key)?,
            )
            .body(Bytes::new())
            .map_err(new_request_build_error)?;

        let resp = self.client.send(req).await?;
        if resp.status() != StatusCode::OK {
            return Err(parse_error(resp).with_operation("B2Core::fetch_token"));
        }

        let resp: AuthorizeAccountResponse =
            serde_json::from_slice(resp.body()).map_err(new_json_deserialize_error)?;

        Ok(AuthToken::from_response(resp, None))
    }

    /// Fail fast with a [`MissingCapability`][ErrorKind::MissingCapability]
    /// error when the current token was not granted `capability`.
    ///
    /// This is a client-side pre-check; the service still enforces the
    /// capability on its side.
    pub async fn validate_capability(&self, capability: &str) -> Result<()> {
        let token = self.get_token().await?;

        if !token.has_capability(capability) {
            return Err(Error::new(
                ErrorKind::MissingCapability,
                format!("authorization token was not granted the {capability} capability"),
            )
            .with_operation("B2Core::validate_capability")
            .with_context("capability", capability));
        }

        Ok(())
    }

    /// Send a request carrying the account authorization token and
    /// decode the response body.
    ///
    /// `data` is encoded as query parameters for GET and as a JSON body
    /// otherwise. Caller-supplied headers are merged first; the
    /// `Authorization` header is inserted last so callers can never
    /// override the injected token.
    pub async fn send_authenticated_request<D: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        data: Option<&D>,
        headers: Option<HeaderMap>,
    ) -> Result<T> {
        let token = self.get_token().await?;

        let mut args = RequestArgs {
            headers: headers.unwrap_or_default(),
            ..Default::default()
        };

        if let Some(data) = data {
            if method == Method::GET {
                args.query = to_query_pairs(data)?;
            } else {
                args.body =
                    Some(Bytes::from(serde_json::to_vec(data).map_err(new_json_serialize_error)?));
            }
        }

        args.headers
            .insert(header::AUTHORIZATION, build_header_value(token.token())?);

        self.send_request(token.api_url(), method, endpoint, args)
            .await
    }

    /// Send a request against `{base_url}/b2api/v2/{endpoint}` and
    /// decode the 200 response body as JSON.
    pub async fn send_request<T: DeserializeOwned>(
        &self,
        base_url: &str,
        method: Method,
        endpoint: &str,
        args: RequestArgs,
    ) -> Result<T> {
        let bs = self.send_request_text(base_url, method, endpoint, args).await?;

        serde_json::from_slice(&bs).map_err(new_json_deserialize_error)
    }

    /// Same as [`send_request`][Self::send_request] but hands the 200
    /// response body back undecoded.
    pub async fn send_request_text(
        &self,
        base_url: &str,
        method: Method,
        endpoint: &str,
        args: RequestArgs,
    ) -> Result<Bytes> {
        let url = format!("{base_url}{B2_API_PATH}/{endpoint}");

        let resp = self.send_raw_request(&url, method, args).await?;
        let (_, mut body) = resp.into_parts();
        body.read_all().await
    }

    /// Send a request against a full URL and return the live streaming
    /// response.
    ///
    /// Upload and download need the raw response so bytes can flow
    /// through caller-supplied sinks; every other caller goes through
    /// [`send_request`][Self::send_request]. A non-200 status is mapped
    /// through the error parser exactly as in the buffered path.
    pub async fn send_raw_request(
        &self,
        url: &str,
        method: Method,
        args: RequestArgs,
    ) -> Result<Response<HttpBody>> {
        let url = if args.query.is_empty() {
            url.to_string()
        } else {
            let query = args
                .query
                .iter()
                .map(|(k, v)| format!("{k}={}", percent_encode_path(v)))
                .collect::<Vec<_>>()
                .join("&");
            format!("{url}?{query}")
        };

        let mut req = Request::builder()
            .method(method)
            .uri(&url)
            .body(args.body.unwrap_or_default())
            .map_err(new_request_build_error)?;
        req.headers_mut().extend(args.headers);

        let resp = self.client.fetch(req).await?;

        if resp.status() != StatusCode::OK {
            let (parts, mut body) = resp.into_parts();
            let bs = body.read_all().await?;
            return Err(parse_error(Response::from_parts(parts, bs))
                .with_operation("B2Core::send_raw_request")
                .with_context("url", url));
        }

        Ok(resp)
    }
}

/// Flatten a serializable value into query pairs.
///
/// Only flat objects are supported; nested values are rejected since no
/// GET endpoint of the service takes them.
fn to_query_pairs<D: Serialize>(data: &D) -> Result<Vec<(String, String)>> {
    let value = serde_json::to_value(data).map_err(new_json_serialize_error)?;

    let serde_json::Value::Object(map) = value else {
        return Err(Error::new(
            ErrorKind::Unexpected,
            "query data must serialize to an object",
        ));
    };

    let mut pairs = Vec::with_capacity(map.len());
    for (k, v) in map {
        match v {
            serde_json::Value::Null => continue,
            serde_json::Value::String(s) => pairs.push((k, s)),
            serde_json::Value::Number(n) => pairs.push((k, n.to_string())),
            serde_json::Value::Bool(b) => pairs.push((k, b.to_string())),
            _ => {
                return Err(Error::new(
                    ErrorKind::Unexpected,
                    "query data must not contain nested values",
                )
                .with_context("field", k))
            }
        }
    }

    Ok(pairs)
}
