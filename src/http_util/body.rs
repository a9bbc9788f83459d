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

use std::cmp::Ordering;

use bytes::Bytes;
use bytes::BytesMut;
use futures::Stream;
use futures::StreamExt;

use crate::Error;
use crate::ErrorKind;
use crate::Result;

/// The streaming body that [`HttpClient`][super::HttpClient] returned.
///
/// Download and upload paths consume it chunk by chunk; everything else
/// buffers it with [`HttpBody::read_all`].
pub struct HttpBody {
    stream: Box<dyn Stream<Item = Result<Bytes>> + Send + Sync + Unpin + 'static>,
    size: Option<u64>,
    consumed: u64,
}

impl HttpBody {
    /// Create a new `HttpBody` with given stream and optional size.
    pub fn new<S>(stream: S, size: Option<u64>) -> Self
    where
        S: Stream<Item = Result<Bytes>> + Send + Sync + Unpin + 'static,
    {
        HttpBody {
            stream: Box::new(stream),
            size,
            consumed: 0,
        }
    }

    /// The content length the response declared, if any.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Check if the consumed data is equal to the expected content length.
    #[inline]
    fn check(&self) -> Result<()> {
        let Some(expect) = self.size else {
            return Ok(());
        };

        let actual = self.consumed;
        match actual.cmp(&expect) {
            Ordering::Equal => Ok(()),
            Ordering::Less => Err(Error::new(
                ErrorKind::Transport,
                format!("http response got too little data, expect: {expect}, actual: {actual}"),
            )),
            Ordering::Greater => Err(Error::new(
                ErrorKind::Transport,
                format!("http response got too much data, expect: {expect}, actual: {actual}"),
            )),
        }
    }

    /// Fetch the next chunk of the body.
    ///
    /// Returns `Ok(None)` once the stream is exhausted and the declared
    /// content length, if any, has been verified.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        match self.stream.next().await.transpose()? {
            Some(bs) => {
                self.consumed += bs.len() as u64;
                Ok(Some(bs))
            }
            None => {
                self.check()?;
                Ok(None)
            }
        }
    }

    /// Read all data from the stream into one contiguous buffer.
    pub async fn read_all(&mut self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.size.unwrap_or_default() as usize);
        while let Some(bs) = self.next_chunk().await? {
            buf.extend_from_slice(&bs);
        }

        Ok(buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn test_read_all() {
        let chunks = vec![Ok(Bytes::from_static(b"hello ")), Ok(Bytes::from_static(b"world"))];
        let mut body = HttpBody::new(stream::iter(chunks), Some(11));

        let bs = body.read_all().await.expect("read must succeed");
        assert_eq!(&bs[..], b"hello world");
    }

    #[tokio::test]
    async fn test_short_body_is_an_error() {
        let chunks = vec![Ok(Bytes::from_static(b"hello"))];
        let mut body = HttpBody::new(stream::iter(chunks), Some(11));

        let err = body.read_all().await.expect_err("read must fail");
        assert_eq!(err.kind(), ErrorKind::Transport);
    }
}
