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

//! http_util contains the util types and functions that are used across
//! the crate, as well as the transport seam ([`HttpFetch`]) that custom
//! and test clients plug into.

mod client;
pub use client::BoxedFuture;
pub use client::HttpClient;
pub use client::HttpFetch;
pub use client::HttpFetchDyn;
pub use client::HttpFetcher;

mod body;
pub use body::HttpBody;

mod header;
pub use header::build_header_value;
pub use header::format_authorization_by_basic;
pub use header::parse_content_length;

mod uri;
pub use uri::percent_encode_path;
