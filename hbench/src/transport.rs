//! HTTP transport.
//!
//! The engine only needs to send a request and learn the response status
//! and body length, everything else is hidden behind [`Transport`].

use core::{future::Future, time::Duration};
use std::sync::Arc;

use bytes::Bytes;
use http::{Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

/// Maximum number of idle connections kept per host when keep-alive is on.
const MAX_IDLE_PER_HOST: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Client(#[from] hyper_util::client::legacy::Error),
    #[error("failed to read response body: {0}")]
    Body(#[from] hyper::Error),
    #[error("failed to build request: {0}")]
    Http(#[from] http::Error),
}

/// Transport settings.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Per-call timeout, covering both the response head and body.
    pub timeout: Duration,
    /// Whether to reuse connections between calls.
    pub keep_alive: bool,
}

/// What the engine learns about a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    /// Number of body bytes drained.
    pub bytes: u64,
}

/// Capability to perform a single HTTP call.
///
/// Implementations must fully drain the response body before resolving, so
/// that the underlying connection can be reused.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, req: Request<Full<Bytes>>) -> impl Future<Output = Result<Response, Error>> + Send;
}

impl<T> Transport for Arc<T>
where
    T: Transport,
{
    #[inline]
    fn send(&self, req: Request<Full<Bytes>>) -> impl Future<Output = Result<Response, Error>> + Send {
        (**self).send(req)
    }
}

/// Pooled HTTP/1 client.
#[derive(Debug, Clone)]
pub struct HyperTransport {
    client: Client<HttpConnector, Full<Bytes>>,
    timeout: Duration,
}

impl HyperTransport {
    pub fn new(cfg: &Config) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        connector.set_connect_timeout(Some(cfg.timeout));

        let max_idle = if cfg.keep_alive { MAX_IDLE_PER_HOST } else { 0 };
        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(max_idle)
            .build(connector);

        Self { client, timeout: cfg.timeout }
    }

    async fn perform(&self, req: Request<Full<Bytes>>) -> Result<Response, Error> {
        let mut resp = self.client.request(req).await?;
        let status = resp.status();

        let mut bytes = 0;
        while let Some(frame) = resp.frame().await {
            if let Some(data) = frame?.data_ref() {
                bytes += data.len() as u64;
            }
        }

        Ok(Response { status, bytes })
    }
}

impl Transport for HyperTransport {
    fn send(&self, req: Request<Full<Bytes>>) -> impl Future<Output = Result<Response, Error>> + Send {
        async move {
            match tokio::time::timeout(self.timeout, self.perform(req)).await {
                Ok(resp) => resp,
                Err(..) => Err(Error::Timeout(self.timeout)),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use core::sync::atomic::{AtomicUsize, Ordering};
    use std::collections::VecDeque;

    use http::{HeaderMap, Method, Uri};
    use parking_lot::Mutex;

    use super::*;

    /// A request as seen by the [`ScriptedTransport`].
    #[derive(Debug, Clone)]
    pub struct Recorded {
        pub method: Method,
        pub uri: Uri,
        pub headers: HeaderMap,
        pub body: Bytes,
    }

    /// In-memory transport replaying a script of outcomes.
    ///
    /// Once the script is exhausted every call succeeds with the default
    /// status.
    #[derive(Debug)]
    pub struct ScriptedTransport {
        script: Mutex<VecDeque<Option<StatusCode>>>,
        status: StatusCode,
        /// Response body length reported for every successful call.
        rx: u64,
        /// Simulated network delay.
        delay: Duration,
        calls: AtomicUsize,
        requests: Mutex<Vec<Recorded>>,
    }

    impl ScriptedTransport {
        pub fn ok() -> Self {
            Self::with_status(StatusCode::OK)
        }

        pub fn with_status(status: StatusCode) -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                status,
                rx: 100,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        /// Makes the next `n` calls fail with a transport error.
        pub fn fail_first(self, n: usize) -> Self {
            self.script.lock().extend((0..n).map(|_| None));
            self
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::Relaxed)
        }

        pub fn requests(&self) -> Vec<Recorded> {
            self.requests.lock().clone()
        }
    }

    impl Transport for ScriptedTransport {
        fn send(&self, req: Request<Full<Bytes>>) -> impl Future<Output = Result<Response, Error>> + Send {
            async move {
                self.calls.fetch_add(1, Ordering::Relaxed);

                let (head, body) = req.into_parts();
                let body = match body.collect().await {
                    Ok(body) => body.to_bytes(),
                    Err(err) => match err {},
                };
                self.requests.lock().push(Recorded {
                    method: head.method,
                    uri: head.uri,
                    headers: head.headers,
                    body,
                });

                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }

                let next = self.script.lock().pop_front();
                match next {
                    Some(None) => Err(Error::Timeout(Duration::from_secs(1))),
                    Some(Some(status)) => Ok(Response { status, bytes: self.rx }),
                    None => Ok(Response { status: self.status, bytes: self.rx }),
                }
            }
        }
    }
}
