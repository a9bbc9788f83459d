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
use std::future::Future;
use std::mem;
use std::ops::Deref;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::LazyLock;

use bytes::Bytes;
use futures::TryStreamExt;
use http::Request;
use http::Response;

use super::parse_content_length;
use super::HttpBody;
use crate::Error;
use crate::ErrorKind;
use crate::Result;

/// A boxed future returned by [`HttpFetchDyn`].
pub type BoxedFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The shared reqwest client.
///
/// Deliberately built without an overall timeout: uploads can be large
/// and slow, and the service contract imposes none. Callers that want
/// timeouts supply their own client via [`HttpClient::with`].
static GLOBAL_REQWEST_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(reqwest::Client::new);

/// HttpFetcher is a type erased [`HttpFetch`].
pub type HttpFetcher = Arc<dyn HttpFetchDyn>;

/// The HTTP client instance used for every call this crate makes.
///
/// # Notes
///
/// * The client must support redirections that follow 3xx responses.
#[derive(Clone)]
pub struct HttpClient {
    fetcher: HttpFetcher,
}

/// We don't want users to know details about our clients.
impl Debug for HttpClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient").finish()
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self {
            fetcher: Arc::new(GLOBAL_REQWEST_CLIENT.clone()),
        }
    }
}

impl HttpClient {
    /// Create a new http client backed by the shared reqwest client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct `Self` with a given [`HttpFetch`] implementation,
    /// e.g. a custom-configured `reqwest::Client` or a test transport.
    pub fn with(client: impl HttpFetch) -> Self {
        let fetcher = Arc::new(client);
        Self { fetcher }
    }

    /// Send a request and consume the response into a buffered body.
    pub async fn send(&self, req: Request<Bytes>) -> Result<Response<Bytes>> {
        let (parts, mut body) = self.fetch(req).await?.into_parts();
        let bs = body.read_all().await?;
        Ok(Response::from_parts(parts, bs))
    }

    /// Fetch a request and return a streamable [`HttpBody`].
    pub async fn fetch(&self, req: Request<Bytes>) -> Result<Response<HttpBody>> {
        self.fetcher.fetch(req).await
    }
}

/// HttpFetch is the trait to fetch a request in async way.
/// Users can implement this trait to provide their own http client.
pub trait HttpFetch: Send + Sync + Unpin + 'static {
    /// Fetch a request in async way.
    fn fetch(
        &self,
        req: Request<Bytes>,
    ) -> impl Future<Output = Result<Response<HttpBody>>> + Send;
}

/// HttpFetchDyn is the dyn version of [`HttpFetch`]
/// which makes it possible to use as `Arc<dyn HttpFetchDyn>`.
/// Users should never implement this trait, but use `HttpFetch` instead.
pub trait HttpFetchDyn: Send + Sync + Unpin + 'static {
    /// The dyn version of [`HttpFetch::fetch`].
    ///
    /// This function returns a boxed future to make it object safe.
    fn fetch_dyn(&self, req: Request<Bytes>) -> BoxedFuture<'_, Result<Response<HttpBody>>>;
}

impl<T: HttpFetch + ?Sized> HttpFetchDyn for T {
    fn fetch_dyn(&self, req: Request<Bytes>) -> BoxedFuture<'_, Result<Response<HttpBody>>> {
        Box::pin(self.fetch(req))
    }
}

impl<T: HttpFetchDyn + ?Sized> HttpFetch for Arc<T> {
    async fn fetch(&self, req: Request<Bytes>) -> Result<Response<HttpBody>> {
        self.deref().fetch_dyn(req).await
    }
}

impl HttpFetch for reqwest::Client {
    async fn fetch(&self, req: Request<Bytes>) -> Result<Response<HttpBody>> {
        // Uri stores all string alike data in `Bytes` which means
        // the clone here is cheap.
        let uri = req.uri().clone();

        let (parts, body) = req.into_parts();

        let mut req_builder = self
            .request(
                parts.method,
                reqwest::Url::from_str(&uri.to_string()).expect("input request url must be valid"),
            )
            .headers(parts.headers)
            .version(parts.version);

        // Don't set body if body is empty.
        if !body.is_empty() {
            req_builder = req_builder.body(reqwest::Body::from(body))
        }

        let mut resp = req_builder.send().await.map_err(|err| {
            Error::new(ErrorKind::Transport, "send http request")
                .with_operation("http_util::Client::send")
                .with_context("url", uri.to_string())
                .set_source(err)
        })?;

        // Get content length from header so that we can check it.
        let content_length = parse_content_length(resp.headers())?;

        let mut hr = Response::builder()
            .status(resp.status())
            .version(resp.version());

        // Swap headers directly instead of copy the entire map.
        mem::swap(hr.headers_mut().unwrap(), resp.headers_mut());

        let bs = HttpBody::new(
            resp.bytes_stream().map_err(move |err| {
                Error::new(ErrorKind::Transport, "read data from http response")
                    .with_operation("http_util::Client::send")
                    .with_context("url", uri.to_string())
                    .set_source(err)
            }),
            content_length,
        );

        let resp = hr.body(bs).expect("response must build succeed");
        Ok(resp)
    }
}
