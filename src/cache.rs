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

//! Persistent storage for authorization tokens.
//!
//! A token survives for 24 hours, so keeping it across process restarts
//! saves one authorization round trip per start. The cache is a
//! best-effort optimization, never a source of truth: the dispatcher
//! treats every cache failure as a miss and falls back to a fresh
//! fetch.

use std::fs;
use std::io;
use std::path::PathBuf;

use crate::AuthToken;
use crate::Error;
use crate::ErrorKind;
use crate::Result;

/// A key-value store for serialized [`AuthToken`]s with the token's own
/// expiry as TTL.
///
/// Implementations must provide read-your-write semantics within a
/// single process; cross-process coordination is not required.
pub trait TokenCache: Send + Sync + 'static {
    /// Return the cached token for `key`, or `None` when the entry is
    /// absent or past its TTL.
    fn load(&self, key: &str) -> Result<Option<AuthToken>>;

    /// Persist `token` under `key` until the token's expiry.
    fn store(&self, key: &str, token: &AuthToken) -> Result<()>;

    /// Remove any cached value for `key`. Removing an absent entry is
    /// not an error.
    fn invalidate(&self, key: &str) -> Result<()>;
}

/// A [`TokenCache`] holding one JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileTokenCache {
    root: PathBuf,
}

impl FileTokenCache {
    /// Create a cache rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let root = dir.into();

        fs::create_dir_all(&root).map_err(|err| {
            Error::new(ErrorKind::ConfigInvalid, "create token cache directory")
                .with_operation("FileTokenCache::new")
                .with_context("dir", root.display())
                .set_source(err)
        })?;

        Ok(FileTokenCache { root })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl TokenCache for FileTokenCache {
    fn load(&self, key: &str) -> Result<Option<AuthToken>> {
        let path = self.entry_path(key);

        let bs = match fs::read(&path) {
            Ok(bs) => bs,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(Error::new(ErrorKind::Unexpected, "read token cache entry")
                    .with_operation("FileTokenCache::load")
                    .with_context("path", path.display())
                    .set_source(err))
            }
        };

        let token: AuthToken = serde_json::from_slice(&bs).map_err(|err| {
            Error::new(ErrorKind::Unexpected, "token cache entry is malformed")
                .with_operation("FileTokenCache::load")
                .with_context("path", path.display())
                .set_source(err)
        })?;

        // An entry past its TTL is treated as a miss and removed so the
        // next store starts clean.
        if token.has_expired() {
            let _ = fs::remove_file(&path);
            return Ok(None);
        }

        Ok(Some(token))
    }

    fn store(&self, key: &str, token: &AuthToken) -> Result<()> {
        let path = self.entry_path(key);

        let bs = serde_json::to_vec(token).map_err(|err| {
            Error::new(ErrorKind::Unexpected, "serialize token cache entry")
                .with_operation("FileTokenCache::store")
                .set_source(err)
        })?;

        fs::write(&path, bs).map_err(|err| {
            Error::new(ErrorKind::Unexpected, "write token cache entry")
                .with_operation("FileTokenCache::store")
                .with_context("path", path.display())
                .set_source(err)
        })
    }

    fn invalidate(&self, key: &str) -> Result<()> {
        let path = self.entry_path(key);

        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::new(ErrorKind::Unexpected, "remove token cache entry")
                .with_operation("FileTokenCache::invalidate")
                .with_context("path", path.display())
                .set_source(err)),
        }
    }
}
