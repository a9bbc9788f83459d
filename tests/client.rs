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

//! End-to-end tests against a scripted transport.
//!
//! Every test builds a [`B2Client`] whose [`HttpFetch`] implementation
//! replays canned responses and records the requests it saw, so request
//! shapes and header handling can be asserted without a live account.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;

use b2_client::http_util::HttpBody;
use b2_client::http_util::HttpClient;
use b2_client::http_util::HttpFetch;
use b2_client::B2Client;
use b2_client::BucketType;
use b2_client::ErrorKind;
use b2_client::ListFilesArgs;
use b2_client::Result;
use b2_client::UploadArgs;
use bytes::Bytes;
use futures::stream;
use http::header;
use http::HeaderMap;
use http::Method;
use http::Request;
use http::Response;
use http::StatusCode;
use pretty_assertions::assert_eq;

const ACCOUNT_ID: &str = "010203040506";
const APPLICATION_KEY_ID: &str = "qwertyuiop";
const APPLICATION_KEY: &str = "asdfghjkl";

const AUTHORIZE_BODY: &str = r#"{
    "accountId": "010203040506",
    "authorizationToken": "tok",
    "apiUrl": "https://api123.backblazeb2.com",
    "downloadUrl": "https://f123.backblazeb2.com",
    "s3ApiUrl": "https://s3.us-west-000.backblazeb2.com",
    "recommendedPartSize": 100000000,
    "absoluteMinimumPartSize": 5000000,
    "allowed": {
        "capabilities": [
            "listBuckets", "writeBuckets", "deleteBuckets",
            "listFiles", "readFiles", "writeFiles", "deleteFiles"
        ],
        "bucketId": null
    }
}"#;

/// Authorize response whose token is only allowed to list buckets and
/// read files, matching the smallest keys the service hands out.
const AUTHORIZE_BODY_READ_ONLY: &str = r#"{
    "accountId": "010203040506",
    "authorizationToken": "tok",
    "apiUrl": "https://api123.backblazeb2.com",
    "downloadUrl": "https://f123.backblazeb2.com",
    "s3ApiUrl": "https://s3.us-west-000.backblazeb2.com",
    "recommendedPartSize": 100000000,
    "absoluteMinimumPartSize": 5000000,
    "allowed": {"capabilities": ["listBuckets", "readFiles"], "bucketId": null}
}"#;

struct ScriptedTransport {
    responses: Mutex<VecDeque<(StatusCode, Vec<u8>)>>,
    requests: Mutex<Vec<(Method, String, HeaderMap, Bytes)>>,
}

impl ScriptedTransport {
    fn new(responses: Vec<(StatusCode, &str)>) -> Arc<Self> {
        Arc::new(ScriptedTransport {
            responses: Mutex::new(
                responses
                    .into_iter()
                    .map(|(status, body)| (status, body.as_bytes().to_vec()))
                    .collect(),
            ),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<(Method, String, HeaderMap, Bytes)> {
        self.requests.lock().unwrap().clone()
    }
}

impl HttpFetch for ScriptedTransport {
    async fn fetch(&self, req: Request<Bytes>) -> Result<Response<HttpBody>> {
        let (parts, body) = req.into_parts();
        self.requests.lock().unwrap().push((
            parts.method,
            parts.uri.to_string(),
            parts.headers,
            body,
        ));

        let (status, body) = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("scripted transport ran out of responses");

        let bs = Bytes::from(body);
        let size = bs.len() as u64;
        Ok(Response::builder()
            .status(status)
            .body(HttpBody::new(stream::iter(vec![Ok(bs)]), Some(size)))
            .unwrap())
    }
}

fn scripted_client(responses: Vec<(StatusCode, &str)>) -> (B2Client, Arc<ScriptedTransport>) {
    let transport = ScriptedTransport::new(responses);
    let client = B2Client::builder()
        .account_id(ACCOUNT_ID)
        .application_key_id(APPLICATION_KEY_ID)
        .application_key(APPLICATION_KEY)
        .http_client(HttpClient::with(transport.clone()))
        .build()
        .expect("client must build");
    (client, transport)
}

fn body_json(body: &Bytes) -> serde_json::Value {
    serde_json::from_slice(body).expect("request body must be JSON")
}

fn file_fixture() -> b2_client::File {
    serde_json::from_value(serde_json::json!({
        "fileId": "f1",
        "fileName": "a.txt",
        "contentLength": 3,
        "uploadTimestamp": 1,
    }))
    .expect("file fixture must deserialize")
}

#[tokio::test]
async fn test_create_bucket() {
    let (client, transport) = scripted_client(vec![
        (StatusCode::OK, AUTHORIZE_BODY),
        (
            StatusCode::OK,
            r#"{"bucketId":"b1","bucketName":"backups","bucketType":"allPrivate"}"#,
        ),
    ]);

    let bucket = client
        .create_bucket("backups", BucketType::Private)
        .await
        .expect("create_bucket must succeed");

    assert_eq!(bucket.bucket_id, "b1");
    assert_eq!(bucket.bucket_name, "backups");
    assert_eq!(bucket.bucket_type, BucketType::Private);

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);

    // First call is the authorization exchange with basic auth.
    let (method, url, headers, _) = &requests[0];
    assert_eq!(*method, Method::GET);
    assert_eq!(
        url,
        "https://api.backblazeb2.com/b2api/v2/b2_authorize_account"
    );
    assert_eq!(
        headers.get(header::AUTHORIZATION).unwrap(),
        "Basic cXdlcnR5dWlvcDphc2RmZ2hqa2w="
    );

    // Second call carries the account token and the typed body.
    let (method, url, headers, body) = &requests[1];
    assert_eq!(*method, Method::POST);
    assert_eq!(url, "https://api123.backblazeb2.com/b2api/v2/b2_create_bucket");
    assert_eq!(headers.get(header::AUTHORIZATION).unwrap(), "tok");
    assert_eq!(
        body_json(body),
        serde_json::json!({
            "accountId": "010203040506",
            "bucketName": "backups",
            "bucketType": "allPrivate",
        })
    );
}

#[tokio::test]
async fn test_list_buckets_reuses_the_token() {
    let (client, transport) = scripted_client(vec![
        (StatusCode::OK, AUTHORIZE_BODY),
        (
            StatusCode::OK,
            r#"{"buckets":[
                {"bucketId":"b1","bucketName":"backups","bucketType":"allPrivate"},
                {"bucketId":"b2","bucketName":"public-assets","bucketType":"allPublic"}
            ]}"#,
        ),
        (StatusCode::OK, r#"{"buckets":[]}"#),
    ]);

    let buckets = client.list_buckets().await.expect("first list_buckets");
    assert_eq!(buckets.len(), 2);
    assert_eq!(buckets[0].bucket_name, "backups");
    assert_eq!(buckets[1].bucket_type, BucketType::Public);

    let buckets = client.list_buckets().await.expect("second list_buckets");
    assert!(buckets.is_empty());

    // One authorization exchange serves both operations.
    let urls: Vec<_> = transport
        .requests()
        .into_iter()
        .map(|(_, url, _, _)| url)
        .collect();
    assert_eq!(
        urls,
        vec![
            "https://api.backblazeb2.com/b2api/v2/b2_authorize_account",
            "https://api123.backblazeb2.com/b2api/v2/b2_list_buckets",
            "https://api123.backblazeb2.com/b2api/v2/b2_list_buckets",
        ]
    );
}

#[tokio::test]
async fn test_missing_capability_fails_before_the_network() {
    let (client, transport) = scripted_client(vec![(StatusCode::OK, AUTHORIZE_BODY_READ_ONLY)]);

    let err = client
        .create_bucket("backups", BucketType::Private)
        .await
        .expect_err("create_bucket must fail");

    assert_eq!(err.kind(), ErrorKind::MissingCapability);
    // Only the authorization exchange went out.
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn test_service_error_is_mapped() {
    let (client, transport) = scripted_client(vec![
        (StatusCode::OK, AUTHORIZE_BODY),
        (
            StatusCode::BAD_REQUEST,
            r#"{"status":400,"code":"duplicate_bucket_name","message":"backups exists"}"#,
        ),
    ]);

    let err = client
        .create_bucket("backups", BucketType::Private)
        .await
        .expect_err("create_bucket must fail");

    assert_eq!(err.kind(), ErrorKind::DuplicateBucketName);
    assert_eq!(err.message(), "duplicate_bucket_name: backups exists");
    assert_eq!(transport.requests().len(), 2);
}

#[tokio::test]
async fn test_delete_bucket() {
    let (client, transport) = scripted_client(vec![
        (StatusCode::OK, AUTHORIZE_BODY),
        (
            StatusCode::OK,
            r#"{"bucketId":"b1","bucketName":"backups","bucketType":"allPrivate"}"#,
        ),
    ]);

    client.delete_bucket("b1").await.expect("delete_bucket");

    let (_, url, _, body) = &transport.requests()[1];
    assert_eq!(url, "https://api123.backblazeb2.com/b2api/v2/b2_delete_bucket");
    assert_eq!(
        body_json(body),
        serde_json::json!({"accountId": "010203040506", "bucketId": "b1"})
    );
}

#[tokio::test]
async fn test_list_files_paginates() {
    let (client, transport) = scripted_client(vec![
        (StatusCode::OK, AUTHORIZE_BODY),
        (
            StatusCode::OK,
            r#"{"files":[
                {"fileId":"f1","fileName":"a.txt","contentLength":3,"uploadTimestamp":1},
                {"fileId":"f2","fileName":"b.txt","contentLength":3,"uploadTimestamp":2}
            ],"nextFileName":"c.txt"}"#,
        ),
        (
            StatusCode::OK,
            r#"{"files":[
                {"fileId":"f3","fileName":"c.txt","contentLength":3,"uploadTimestamp":3}
            ],"nextFileName":null}"#,
        ),
    ]);

    let files = client
        .list_files(ListFilesArgs {
            bucket_id: Some("b1".to_string()),
            ..Default::default()
        })
        .await
        .expect("list_files must succeed");

    assert_eq!(files.len(), 3);
    assert_eq!(files[2].file_name, "c.txt");

    let requests = transport.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(
        body_json(&requests[1].3),
        serde_json::json!({"bucketId": "b1", "maxFileCount": 1000})
    );
    // The second page resumes at the cursor the service handed back.
    assert_eq!(
        body_json(&requests[2].3),
        serde_json::json!({"bucketId": "b1", "maxFileCount": 1000, "startFileName": "c.txt"})
    );
}

#[tokio::test]
async fn test_list_files_exact_name_lookup() {
    let (client, transport) = scripted_client(vec![
        (StatusCode::OK, AUTHORIZE_BODY),
        (
            StatusCode::OK,
            r#"{"files":[
                {"fileId":"f9","fileName":"a.txt.bak","contentLength":3,"uploadTimestamp":1}
            ],"nextFileName":"b.txt"}"#,
        ),
    ]);

    // The service returned the lexicographic successor, not an exact
    // match, so the lookup comes back empty without a second page.
    let files = client
        .list_files(ListFilesArgs {
            bucket_id: Some("b1".to_string()),
            file_name: Some("a.txt".to_string()),
            ..Default::default()
        })
        .await
        .expect("list_files must succeed");

    assert!(files.is_empty());

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        body_json(&requests[1].3),
        serde_json::json!({"bucketId": "b1", "maxFileCount": 1, "startFileName": "a.txt"})
    );
}

#[tokio::test]
async fn test_file_exists() {
    let (client, _) = scripted_client(vec![
        (StatusCode::OK, AUTHORIZE_BODY),
        (
            StatusCode::OK,
            r#"{"files":[
                {"fileId":"f1","fileName":"a.txt","contentLength":3,"uploadTimestamp":1}
            ],"nextFileName":null}"#,
        ),
        (StatusCode::OK, r#"{"files":[],"nextFileName":null}"#),
    ]);

    let args = ListFilesArgs {
        file_name: Some("a.txt".to_string()),
        ..Default::default()
    };
    assert!(client.file_exists(args.clone()).await.expect("first lookup"));

    let args = ListFilesArgs {
        file_name: Some("missing.txt".to_string()),
        ..Default::default()
    };
    assert!(!client.file_exists(args).await.expect("second lookup"));
}

#[tokio::test]
async fn test_get_file_info() {
    let (client, transport) = scripted_client(vec![
        (StatusCode::OK, AUTHORIZE_BODY),
        (
            StatusCode::OK,
            r#"{
                "fileId": "f1",
                "fileName": "a.txt",
                "contentType": "text/plain",
                "contentLength": 11,
                "contentSha1": "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed",
                "bucketId": "b1",
                "uploadTimestamp": 1718000000000
            }"#,
        ),
    ]);

    let file = client.get_file_info("f1").await.expect("get_file_info");

    assert_eq!(file.file_id.as_deref(), Some("f1"));
    assert_eq!(file.content_type.as_deref(), Some("text/plain"));
    assert_eq!(file.content_length, 11);

    assert_eq!(
        body_json(&transport.requests()[1].3),
        serde_json::json!({"fileId": "f1"})
    );
}

#[tokio::test]
async fn test_delete_file_with_governance_bypass() {
    let (client, transport) = scripted_client(vec![
        (StatusCode::OK, AUTHORIZE_BODY),
        (StatusCode::OK, r#"{"fileId":"f1","fileName":"a.txt"}"#),
    ]);

    let file = file_fixture();

    // The fixture token has no bypassGovernance capability, so the
    // flagged delete fails client-side.
    let err = client
        .delete_file(&file, Some(true))
        .await
        .expect_err("flagged delete must fail");
    assert_eq!(err.kind(), ErrorKind::MissingCapability);

    client
        .delete_file(&file, None)
        .await
        .expect("plain delete must succeed");

    assert_eq!(
        body_json(&transport.requests()[1].3),
        serde_json::json!({"fileName": "a.txt", "fileId": "f1"})
    );
}

#[tokio::test]
async fn test_upload() {
    let (client, transport) = scripted_client(vec![
        (StatusCode::OK, AUTHORIZE_BODY),
        (
            StatusCode::OK,
            r#"{
                "uploadUrl": "https://pod-000.backblazeb2.com/b2api/v2/b2_upload_file/b1/u1",
                "authorizationToken": "upload-tok",
                "bucketId": "b1"
            }"#,
        ),
        (
            StatusCode::OK,
            r#"{
                "fileId": "f1",
                "fileName": "greetings/hello.txt",
                "contentType": "text/plain",
                "contentLength": 11,
                "contentSha1": "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed",
                "bucketId": "b1",
                "uploadTimestamp": 1718000000000
            }"#,
        ),
    ]);

    let file = client
        .upload(
            "b1",
            Bytes::from_static(b"hello world"),
            "/greetings/hello world.txt",
            UploadArgs {
                content_type: Some("text/plain".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("upload must succeed");

    assert_eq!(file.file_id.as_deref(), Some("f1"));

    let requests = transport.requests();
    assert_eq!(requests.len(), 3);

    // The upload URL request names the bucket.
    assert_eq!(
        body_json(&requests[1].3),
        serde_json::json!({"bucketId": "b1"})
    );

    // The raw upload goes to the one-shot URL with its own token.
    let (method, url, headers, body) = &requests[2];
    assert_eq!(*method, Method::POST);
    assert_eq!(
        url,
        "https://pod-000.backblazeb2.com/b2api/v2/b2_upload_file/b1/u1"
    );
    assert_eq!(headers.get(header::AUTHORIZATION).unwrap(), "upload-tok");
    assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "text/plain");
    assert_eq!(headers.get(header::CONTENT_LENGTH).unwrap(), "11");
    // Leading slash stripped, spaces percent-encoded.
    assert_eq!(
        headers.get("X-Bz-File-Name").unwrap(),
        "greetings/hello%20world.txt"
    );
    // sha1("hello world")
    assert_eq!(
        headers.get("X-Bz-Content-Sha1").unwrap(),
        "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"
    );
    assert!(headers.contains_key("X-Bz-Info-src_last_modified_millis"));
    assert_eq!(&body[..], b"hello world");
}

#[tokio::test]
async fn test_upload_custom_headers_win() {
    let (client, transport) = scripted_client(vec![
        (StatusCode::OK, AUTHORIZE_BODY),
        (
            StatusCode::OK,
            r#"{
                "uploadUrl": "https://pod-000.backblazeb2.com/b2api/v2/b2_upload_file/b1/u1",
                "authorizationToken": "upload-tok",
                "bucketId": "b1"
            }"#,
        ),
        (
            StatusCode::OK,
            r#"{"fileId":"f1","fileName":"a.bin","contentLength":3,"uploadTimestamp":1}"#,
        ),
    ]);

    let mut custom = HeaderMap::new();
    custom.insert(header::CONTENT_TYPE, "application/x-tar".parse().unwrap());

    client
        .upload(
            "b1",
            Bytes::from_static(b"abc"),
            "a.bin",
            UploadArgs {
                content_type: None,
                headers: Some(custom),
                ..Default::default()
            },
        )
        .await
        .expect("upload must succeed");

    let (_, _, headers, _) = &transport.requests()[2];
    assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "application/x-tar");
}

#[tokio::test]
async fn test_download() {
    let (client, transport) = scripted_client(vec![
        (StatusCode::OK, AUTHORIZE_BODY),
        (StatusCode::OK, "hello world"),
    ]);

    let content = client.download("f1").await.expect("download must succeed");
    assert_eq!(&content[..], b"hello world");

    let (method, url, headers, _) = &transport.requests()[1];
    assert_eq!(*method, Method::GET);
    assert_eq!(
        url,
        "https://f123.backblazeb2.com/b2api/v2/b2_download_file_by_id?fileId=f1"
    );
    assert_eq!(headers.get(header::AUTHORIZATION).unwrap(), "tok");
}

#[tokio::test]
async fn test_download_stream() {
    let (client, _) = scripted_client(vec![
        (StatusCode::OK, AUTHORIZE_BODY),
        (StatusCode::OK, "hello world"),
    ]);

    let mut body = client
        .download_stream("f1")
        .await
        .expect("download_stream must succeed");

    let mut content = Vec::new();
    while let Some(chunk) = body.next_chunk().await.expect("chunk must arrive") {
        content.extend_from_slice(&chunk);
    }
    assert_eq!(&content[..], b"hello world");
}

#[tokio::test]
async fn test_download_error_is_mapped() {
    let (client, _) = scripted_client(vec![
        (StatusCode::OK, AUTHORIZE_BODY),
        (
            StatusCode::NOT_FOUND,
            r#"{"status":404,"code":"not_found","message":"no such file"}"#,
        ),
    ]);

    let err = client.download("nope").await.expect_err("download must fail");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.message(), "not_found: no such file");
}
