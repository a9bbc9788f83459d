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

//! b2_client is a client for the Backblaze B2 native HTTP API.
//!
//! It authorizes with an application key, keeps the resulting
//! short-lived token in memory (and optionally on disk, see
//! [`TokenCache`]), and exposes typed bucket and file operations.
//!
//! # Quick Start
//!
//! ```no_run
//! use b2_client::B2Client;
//! use b2_client::BucketType;
//! use b2_client::Result;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = B2Client::builder()
//!         .account_id("010203040506")
//!         .application_key_id("0012345abcde")
//!         .application_key("K001xxxxxxxxxxxx")
//!         .token_cache_dir("/var/cache/b2")?
//!         .build()?;
//!
//!     let bucket = client.create_bucket("backups", BucketType::Private).await?;
//!
//!     let file = client
//!         .upload(
//!             &bucket.bucket_id,
//!             "hello world".into(),
//!             "greetings/hello.txt",
//!             Default::default(),
//!         )
//!         .await?;
//!
//!     let content = client.download(file.file_id.as_deref().unwrap()).await?;
//!     assert_eq!(&content[..], b"hello world");
//!     Ok(())
//! }
//! ```

mod error;
pub use error::parse_b2_error_code;
pub use error::Error;
pub use error::ErrorKind;
pub use error::Result;

pub mod http_util;

mod auth;
pub use auth::AuthToken;

mod cache;
pub use cache::FileTokenCache;
pub use cache::TokenCache;

mod core;
pub use crate::core::B2Core;
pub use crate::core::RequestArgs;
pub use crate::core::B2_API_BASE_URL;
pub use crate::core::B2_API_PATH;

mod model;
pub use model::Bucket;
pub use model::BucketType;
pub use model::File;

mod client;
pub use client::B2Client;
pub use client::B2ClientBuilder;
pub use client::ListFilesArgs;
pub use client::UploadArgs;
