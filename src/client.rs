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
use std::sync::Arc;

use bytes::Bytes;
use chrono::DateTime;
use chrono::Utc;
use http::header;
use http::HeaderMap;
use http::Method;
use log::debug;
use serde::Deserialize;
use serde::Serialize;
use sha1::Digest;
use sha1::Sha1;

use crate::cache::FileTokenCache;
use crate::cache::TokenCache;
use crate::core::constants;
use crate::core::B2Core;
use crate::core::RequestArgs;
use crate::core::B2_API_PATH;
use crate::error::new_json_deserialize_error;
use crate::http_util::build_header_value;
use crate::http_util::percent_encode_path;
use crate::http_util::HttpBody;
use crate::http_util::HttpClient;
use crate::model::Bucket;
use crate::model::BucketType;
use crate::model::File;
use crate::Error;
use crate::ErrorKind;
use crate::Result;

/// The service pages file listings in chunks of at most this many names.
const LIST_FILE_NAMES_PAGE_SIZE: u64 = 1000;

/// Builder for [`B2Client`].
#[derive(Default)]
pub struct B2ClientBuilder {
    account_id: Option<String>,
    application_key_id: Option<String>,
    application_key: Option<String>,
    cache: Option<Arc<dyn TokenCache>>,
    http_client: Option<HttpClient>,
}

impl Debug for B2ClientBuilder {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("B2ClientBuilder")
            .field("account_id", &self.account_id)
            .finish_non_exhaustive()
    }
}

impl B2ClientBuilder {
    /// The id of the account all operations run against.
    pub fn account_id(mut self, account_id: &str) -> Self {
        if !account_id.is_empty() {
            self.account_id = Some(account_id.to_string());
        }
        self
    }

    /// The application key id used to authorize.
    pub fn application_key_id(mut self, application_key_id: &str) -> Self {
        if !application_key_id.is_empty() {
            self.application_key_id = Some(application_key_id.to_string());
        }
        self
    }

    /// The application key secret used to authorize.
    pub fn application_key(mut self, application_key: &str) -> Self {
        if !application_key.is_empty() {
            self.application_key = Some(application_key.to_string());
        }
        self
    }

    /// Persist authorization tokens as JSON files under `dir`, so a
    /// restarted process can skip the authorization round trip.
    pub fn token_cache_dir(mut self, dir: &str) -> Result<Self> {
        self.cache = Some(Arc::new(FileTokenCache::new(dir)?));
        Ok(self)
    }

    /// Persist authorization tokens in a caller-supplied cache.
    pub fn token_cache(mut self, cache: Arc<dyn TokenCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Use a custom transport instead of the shared global one.
    pub fn http_client(mut self, client: HttpClient) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Consume the builder and produce a client.
    pub fn build(self) -> Result<B2Client> {
        debug!("client build started: {:?}", &self);

        let account_id = self.account_id.ok_or_else(|| {
            Error::new(ErrorKind::ConfigInvalid, "account_id is empty")
                .with_operation("B2ClientBuilder::build")
        })?;
        let application_key_id = self.application_key_id.ok_or_else(|| {
            Error::new(ErrorKind::ConfigInvalid, "application_key_id is empty")
                .with_operation("B2ClientBuilder::build")
                .with_context("account_id", &account_id)
        })?;
        let application_key = self.application_key.ok_or_else(|| {
            Error::new(ErrorKind::ConfigInvalid, "application_key is empty")
                .with_operation("B2ClientBuilder::build")
                .with_context("account_id", &account_id)
        })?;

        let client = self.http_client.unwrap_or_default();

        Ok(B2Client {
            core: Arc::new(B2Core::new(
                client,
                account_id,
                application_key_id,
                application_key,
                self.cache,
            )),
        })
    }
}

/// Optional filters for [`B2Client::list_files`].
#[derive(Debug, Default, Clone)]
pub struct ListFilesArgs {
    /// Restrict the listing to one bucket.
    pub bucket_id: Option<String>,
    /// Look up exactly this file name; the result has at most one entry.
    pub file_name: Option<String>,
    /// Only names starting with this prefix are returned.
    pub prefix: Option<String>,
    /// Names past the delimiter collapse into folder placeholders.
    pub delimiter: Option<String>,
}

/// Optional settings for [`B2Client::upload`].
#[derive(Debug, Default, Clone)]
pub struct UploadArgs {
    /// MIME type of the body; the service sniffs one when absent.
    pub content_type: Option<String>,
    /// Stored as the source file's modification time; defaults to now.
    pub last_modified: Option<DateTime<Utc>>,
    /// Extra headers sent with the upload. These win over the generated
    /// ones on conflict.
    pub headers: Option<HeaderMap>,
}

/// Client for the Backblaze B2 native API.
///
/// Cloning is cheap; clones share one token and one token cache.
#[derive(Debug, Clone)]
pub struct B2Client {
    core: Arc<B2Core>,
}

impl B2Client {
    /// Start building a client.
    pub fn builder() -> B2ClientBuilder {
        B2ClientBuilder::default()
    }

    /// [b2_create_bucket](https://www.backblaze.com/apidocs/b2-create-bucket)
    ///
    /// Requires the `writeBuckets` capability.
    pub async fn create_bucket(&self, name: &str, bucket_type: BucketType) -> Result<Bucket> {
        self.core.validate_capability("writeBuckets").await?;

        self.core
            .send_authenticated_request(
                Method::POST,
                "b2_create_bucket",
                Some(&CreateBucketRequest {
                    account_id: &self.core.account_id,
                    bucket_name: name,
                    bucket_type,
                }),
                None,
            )
            .await
    }

    /// [b2_list_buckets](https://www.backblaze.com/apidocs/b2-list-buckets)
    ///
    /// Requires the `listBuckets` capability.
    pub async fn list_buckets(&self) -> Result<Vec<Bucket>> {
        self.core.validate_capability("listBuckets").await?;

        let resp: ListBucketsResponse = self
            .core
            .send_authenticated_request(
                Method::POST,
                "b2_list_buckets",
                Some(&ListBucketsRequest {
                    account_id: &self.core.account_id,
                }),
                None,
            )
            .await?;

        Ok(resp.buckets)
    }

    /// [b2_update_bucket](https://www.backblaze.com/apidocs/b2-update-bucket)
    ///
    /// Requires the `writeBuckets` capability.
    pub async fn update_bucket(&self, bucket_id: &str, bucket_type: BucketType) -> Result<Bucket> {
        self.core.validate_capability("writeBuckets").await?;

        self.core
            .send_authenticated_request(
                Method::POST,
                "b2_update_bucket",
                Some(&UpdateBucketRequest {
                    account_id: &self.core.account_id,
                    bucket_id,
                    bucket_type,
                }),
                None,
            )
            .await
    }

    /// [b2_delete_bucket](https://www.backblaze.com/apidocs/b2-delete-bucket)
    ///
    /// Requires the `deleteBuckets` capability.
    pub async fn delete_bucket(&self, bucket_id: &str) -> Result<()> {
        self.core.validate_capability("deleteBuckets").await?;

        let _: serde_json::Value = self
            .core
            .send_authenticated_request(
                Method::POST,
                "b2_delete_bucket",
                Some(&DeleteBucketRequest {
                    account_id: &self.core.account_id,
                    bucket_id,
                }),
                None,
            )
            .await?;

        Ok(())
    }

    /// [b2_list_file_names](https://www.backblaze.com/apidocs/b2-list-file-names)
    ///
    /// Requires the `listFiles` capability.
    ///
    /// Pages through the whole listing. When `file_name` is set, a
    /// single page of size one starting at that name is requested and
    /// only an exact match is returned.
    pub async fn list_files(&self, args: ListFilesArgs) -> Result<Vec<File>> {
        self.core.validate_capability("listFiles").await?;

        let exact_name = args.file_name;
        let mut request = ListFileNamesRequest {
            bucket_id: args.bucket_id,
            prefix: args.prefix,
            delimiter: args.delimiter,
            max_file_count: if exact_name.is_some() {
                1
            } else {
                LIST_FILE_NAMES_PAGE_SIZE
            },
            start_file_name: exact_name.clone(),
        };

        let mut files = Vec::new();
        loop {
            let resp: ListFileNamesResponse = self
                .core
                .send_authenticated_request(
                    Method::POST,
                    "b2_list_file_names",
                    Some(&request),
                    None,
                )
                .await?;

            match &exact_name {
                Some(name) => {
                    files.extend(resp.files.into_iter().filter(|f| &f.file_name == name));
                    // An exact lookup never needs a second page.
                    return Ok(files);
                }
                None => files.extend(resp.files),
            }

            match resp.next_file_name {
                Some(next) => request.start_file_name = Some(next),
                None => return Ok(files),
            }
        }
    }

    /// Whether [`list_files`][Self::list_files] with `args` finds
    /// anything.
    pub async fn file_exists(&self, args: ListFilesArgs) -> Result<bool> {
        Ok(!self.list_files(args).await?.is_empty())
    }

    /// [b2_get_file_info](https://www.backblaze.com/apidocs/b2-get-file-info)
    ///
    /// Requires the `readFiles` capability.
    pub async fn get_file_info(&self, file_id: &str) -> Result<File> {
        self.core.validate_capability("readFiles").await?;

        self.core
            .send_authenticated_request(
                Method::POST,
                "b2_get_file_info",
                Some(&GetFileInfoRequest { file_id }),
                None,
            )
            .await
    }

    /// [b2_delete_file_version](https://www.backblaze.com/apidocs/b2-delete-file-version)
    ///
    /// Requires the `deleteFiles` capability, plus `bypassGovernance`
    /// when the flag is given.
    pub async fn delete_file(&self, file: &File, bypass_governance: Option<bool>) -> Result<()> {
        self.core.validate_capability("deleteFiles").await?;

        if bypass_governance.is_some() {
            self.core.validate_capability("bypassGovernance").await?;
        }

        let file_id = file.file_id.as_deref().ok_or_else(|| {
            Error::new(ErrorKind::ConfigInvalid, "file has no id")
                .with_operation("B2Client::delete_file")
                .with_context("file_name", &file.file_name)
        })?;

        let _: DeleteFileVersionResponse = self
            .core
            .send_authenticated_request(
                Method::POST,
                "b2_delete_file_version",
                Some(&DeleteFileVersionRequest {
                    file_name: &file.file_name,
                    file_id,
                    bypass_governance,
                }),
                None,
            )
            .await?;

        Ok(())
    }

    /// [b2_upload_file](https://www.backblaze.com/apidocs/b2-upload-file)
    ///
    /// Requires the `writeFiles` capability.
    ///
    /// Fetches a one-shot upload URL and token, then posts `data` with
    /// its SHA-1 in the `X-Bz-Content-Sha1` header. Holding the whole
    /// body as [`Bytes`] lets the hash be computed once without
    /// buffering the payload twice.
    pub async fn upload(
        &self,
        bucket_id: &str,
        data: Bytes,
        file_name: &str,
        args: UploadArgs,
    ) -> Result<File> {
        self.core.validate_capability("writeFiles").await?;

        let file_name = file_name.trim_start_matches('/');

        let upload: GetUploadUrlResponse = self
            .core
            .send_authenticated_request(
                Method::POST,
                "b2_get_upload_url",
                Some(&GetUploadUrlRequest { bucket_id }),
                None,
            )
            .await?;

        let checksum = format!("{:x}", Sha1::new_with_prefix(&data).finalize());
        let last_modified_millis = args
            .last_modified
            .unwrap_or_else(Utc::now)
            .timestamp_millis();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            build_header_value(&upload.authorization_token)?,
        );
        headers.insert(
            header::CONTENT_TYPE,
            build_header_value(args.content_type.as_deref().unwrap_or("b2/x-auto"))?,
        );
        headers.insert(
            header::CONTENT_LENGTH,
            build_header_value(&data.len().to_string())?,
        );
        headers.insert(
            constants::X_BZ_FILE_NAME,
            build_header_value(&percent_encode_path(file_name))?,
        );
        headers.insert(constants::X_BZ_CONTENT_SHA1, build_header_value(&checksum)?);
        headers.insert(
            constants::X_BZ_INFO_SRC_LAST_MODIFIED_MILLIS,
            build_header_value(&last_modified_millis.to_string())?,
        );
        // Caller headers go in last so they win on conflict.
        if let Some(custom) = args.headers {
            headers.extend(custom);
        }

        let resp = self
            .core
            .send_raw_request(
                &upload.upload_url,
                Method::POST,
                RequestArgs {
                    headers,
                    body: Some(data),
                    ..Default::default()
                },
            )
            .await?;

        let (_, mut body) = resp.into_parts();
        let bs = body.read_all().await?;
        serde_json::from_slice(&bs).map_err(new_json_deserialize_error)
    }

    /// [b2_download_file_by_id](https://www.backblaze.com/apidocs/b2-download-file-by-id)
    ///
    /// Requires the `readFiles` capability. Buffers the whole file.
    pub async fn download(&self, file_id: &str) -> Result<Bytes> {
        let mut body = self.download_stream(file_id).await?;
        body.read_all().await
    }

    /// Like [`download`][Self::download] but returns the streaming body
    /// so large files can flow into a caller-supplied sink chunk by
    /// chunk.
    pub async fn download_stream(&self, file_id: &str) -> Result<HttpBody> {
        self.core.validate_capability("readFiles").await?;

        let token = self.core.get_token().await?;
        let url = format!(
            "{}{B2_API_PATH}/b2_download_file_by_id",
            token.download_url()
        );

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, build_header_value(token.token())?);

        let resp = self
            .core
            .send_raw_request(
                &url,
                Method::GET,
                RequestArgs {
                    query: vec![("fileId".to_string(), file_id.to_string())],
                    headers,
                    ..Default::default()
                },
            )
            .await?;

        Ok(resp.into_body())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateBucketRequest<'a> {
    account_id: &'a str,
    bucket_name: &'a str,
    bucket_type: BucketType,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListBucketsRequest<'a> {
    account_id: &'a str,
}

#[derive(Deserialize)]
struct ListBucketsResponse {
    buckets: Vec<Bucket>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateBucketRequest<'a> {
    account_id: &'a str,
    bucket_id: &'a str,
    bucket_type: BucketType,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteBucketRequest<'a> {
    account_id: &'a str,
    bucket_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListFileNamesRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    bucket_id: Option<String>,
    max_file_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    delimiter: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListFileNamesResponse {
    files: Vec<File>,
    next_file_name: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GetFileInfoRequest<'a> {
    file_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteFileVersionRequest<'a> {
    file_name: &'a str,
    file_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    bypass_governance: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
struct DeleteFileVersionResponse {
    file_id: String,
    file_name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GetUploadUrlRequest<'a> {
    bucket_id: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetUploadUrlResponse {
    upload_url: String,
    authorization_token: String,
}
