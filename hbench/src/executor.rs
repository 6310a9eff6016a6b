//! Call execution.
//!
//! Read-only methods are issued once, uploads build their body once and then
//! retry on transport failures with linear backoff.

use core::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use std::io::{self, Write};

use bytes::{BufMut, Bytes};
use http::{
    header::{HeaderValue, CONTENT_TYPE},
    HeaderMap, Request, StatusCode,
};
use http_body_util::Full;
use rand::{Rng, RngCore};

use crate::{
    body::SyntheticBody,
    descriptor::Descriptor,
    pool::BufferPool,
    transport::{self, Transport},
};

/// Content type switching uploads to multipart form encoding.
pub const MULTIPART: &str = "multipart/form-data";

/// Initial capacity of pooled encoding buffers.
const POOLED_BUF_CAPACITY: usize = 16 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] transport::Error),
    #[error("failed to encode request body: {0}")]
    Encode(#[from] io::Error),
}

/// Where upload bodies come from.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Fixed content, read once at startup.
    File(Bytes),
    /// Synthetic content of random size in `[min; max)` bytes.
    Synthetic { min: u64, max: u64 },
}

/// Retry policy for uploads.
#[derive(Debug, Clone, Copy)]
pub struct Retry {
    /// Total number of attempts, including the first one.
    pub attempts: u32,
    /// Delay before the second attempt, multiplied by the attempt number for
    /// the following ones.
    pub backoff: Duration,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(237),
        }
    }
}

/// Call executor config.
#[derive(Debug, Clone)]
pub struct Config {
    /// Headers added to every call.
    pub headers: HeaderMap,
    pub payload: Payload,
    /// Content type of uploads.
    ///
    /// Uploads are encoded as a multipart form if this is [`MULTIPART`].
    pub content_type: Option<HeaderValue>,
    pub retry: Retry,
}

impl Config {
    #[inline]
    fn is_multipart(&self) -> bool {
        self.content_type.as_ref().is_some_and(|v| v.as_bytes().eq_ignore_ascii_case(MULTIPART.as_bytes()))
    }
}

/// Summary of a finished call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exchange {
    pub status: StatusCode,
    /// Request body bytes sent.
    pub bytes_tx: u64,
    /// Response body bytes received.
    pub bytes_rx: u64,
}

#[derive(Debug)]
pub struct Executor<T> {
    transport: T,
    cfg: Config,
    pool: BufferPool,
    /// Sequence used to stamp synthetic bodies.
    seq: AtomicU64,
}

impl<T> Executor<T>
where
    T: Transport,
{
    pub fn new(transport: T, cfg: Config) -> Self {
        Self {
            transport,
            cfg,
            pool: BufferPool::new(POOLED_BUF_CAPACITY),
            seq: AtomicU64::new(0),
        }
    }

    /// Performs the call described by the given descriptor.
    ///
    /// Any received response is returned as is, regardless of its status.
    /// Errors are reserved for failures to get a response at all.
    pub async fn execute<R>(&self, desc: &Descriptor, rng: &mut R) -> Result<Exchange, Error>
    where
        R: RngCore,
    {
        if desc.method.is_upload() {
            self.upload(desc, rng).await
        } else {
            self.read(desc).await
        }
    }

    async fn read(&self, desc: &Descriptor) -> Result<Exchange, Error> {
        let req = self.request(desc, Bytes::new(), None)?;
        let resp = self.transport.send(req).await?;

        let m = Exchange {
            status: resp.status,
            bytes_tx: 0,
            bytes_rx: resp.bytes,
        };

        Ok(m)
    }

    async fn upload<R>(&self, desc: &Descriptor, rng: &mut R) -> Result<Exchange, Error>
    where
        R: RngCore,
    {
        let (body, content_type) = self.encode(desc, rng)?;
        let Retry { attempts, backoff } = self.cfg.retry;

        let mut attempt = 1;
        loop {
            let req = self.request(desc, body.clone(), content_type.as_ref())?;

            match self.transport.send(req).await {
                Ok(resp) => {
                    let m = Exchange {
                        status: resp.status,
                        bytes_tx: body.len() as u64,
                        bytes_rx: resp.bytes,
                    };

                    return Ok(m);
                }
                Err(err) if attempt < attempts => {
                    log::warn!(
                        "{} {}: attempt {attempt}/{attempts} failed: {err}",
                        desc.method,
                        desc.target
                    );
                    tokio::time::sleep(backoff * attempt).await;
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn request(
        &self,
        desc: &Descriptor,
        body: Bytes,
        content_type: Option<&HeaderValue>,
    ) -> Result<Request<Full<Bytes>>, transport::Error> {
        let mut req = Request::builder()
            .method(http::Method::from(desc.method))
            .uri(desc.target.clone())
            .body(Full::new(body))?;

        let headers = req.headers_mut();
        for (name, value) in &self.cfg.headers {
            headers.append(name, value.clone());
        }
        if let Some(v) = content_type {
            headers.insert(CONTENT_TYPE, v.clone());
        }

        Ok(req)
    }

    /// Builds the upload body together with its content type.
    fn encode<R>(&self, desc: &Descriptor, rng: &mut R) -> Result<(Bytes, Option<HeaderValue>), Error>
    where
        R: RngCore,
    {
        if self.cfg.is_multipart() {
            return self.encode_multipart(desc, rng);
        }

        let body = match &self.cfg.payload {
            Payload::File(data) => data.clone(),
            Payload::Synthetic { min, max } => {
                let mut buf = self.pool.acquire();
                self.write_payload(&mut (&mut *buf).writer(), *min, *max, rng)?;
                Bytes::copy_from_slice(&buf)
            }
        };

        Ok((body, self.cfg.content_type.clone()))
    }

    fn encode_multipart<R>(&self, desc: &Descriptor, rng: &mut R) -> Result<(Bytes, Option<HeaderValue>), Error>
    where
        R: RngCore,
    {
        let boundary = format!("{:016x}{:016x}", rng.next_u64(), rng.next_u64());
        let filename = filename_of(desc);

        let mut buf = self.pool.acquire();
        let mut wr = (&mut *buf).writer();

        write!(wr, "--{boundary}\r\n")?;
        write!(
            wr,
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            filename.replace('"', "\\\"")
        )?;
        write!(wr, "Content-Type: {}\r\n", mime_of(filename))?;
        write!(wr, "Idempotency-Key: {}\r\n\r\n", desc.target)?;
        match &self.cfg.payload {
            Payload::File(data) => wr.write_all(data)?,
            Payload::Synthetic { min, max } => {
                self.write_payload(&mut wr, *min, *max, rng)?;
            }
        }
        write!(wr, "\r\n--{boundary}--\r\n")?;

        let body = Bytes::copy_from_slice(&buf);
        let content_type = HeaderValue::try_from(format!("{MULTIPART}; boundary={boundary}"))
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

        Ok((body, Some(content_type)))
    }

    fn write_payload<W, R>(&self, wr: &mut W, min: u64, max: u64, rng: &mut R) -> Result<u64, io::Error>
    where
        W: Write,
        R: RngCore,
    {
        let size = if min < max { rng.gen_range(min..max) } else { min };
        let id = self.seq.fetch_add(1, Ordering::Relaxed);

        io::copy(&mut SyntheticBody::new(id, size, rng), wr)
    }
}

/// Returns the last path segment of the target, or "file" if it is empty.
fn filename_of(desc: &Descriptor) -> &str {
    match desc.target.path().rsplit('/').next() {
        Some(name) if !name.is_empty() => name,
        _ => "file",
    }
}

fn mime_of(filename: &str) -> &'static str {
    let ext = match filename.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => return "application/octet-stream",
    };

    match ext.as_str() {
        "txt" => "text/plain; charset=utf-8",
        "htm" | "html" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" => "text/javascript; charset=utf-8",
        "xml" => "text/xml; charset=utf-8",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gif" => "image/gif",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
