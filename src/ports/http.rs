//! Reqwest-backed fetcher and the fetch-based navigator.

use futures::future::BoxFuture;
use log::debug;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::{
    CancelToken, FetchError, FetchRequest, FetchResponse, Fetcher, NavError, NavigationOutcome,
    Navigator,
};
use crate::dom::{DomAdapter, ElementHandle, StaticDomAdapter};

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_USER_AGENT: &str = concat!("gallery-scout/", env!("CARGO_PKG_VERSION"));

/// HTTP fetcher over a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a fetcher with the default timeout and user agent.
    ///
    /// # Errors
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new() -> anyhow::Result<Self> {
        Self::with_timeout(DEFAULT_FETCH_TIMEOUT)
    }

    /// Build a fetcher with an explicit request timeout.
    ///
    /// # Errors
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn with_timeout(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(
        &self,
        request: FetchRequest,
        cancel: CancelToken,
    ) -> BoxFuture<'_, Result<FetchResponse, FetchError>> {
        Box::pin(async move {
            let method = reqwest::Method::from_bytes(request.method.as_bytes())
                .map_err(|e| FetchError::Invalid(format!("method {:?}: {e}", request.method)))?;

            let mut builder = self.client.request(method, request.url.clone());
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let exchange = async {
                let response = builder.send().await.map_err(map_reqwest_error)?;
                let status = response.status().as_u16();
                let final_url = response.url().clone();
                let headers = response
                    .headers()
                    .iter()
                    .map(|(k, v)| {
                        (
                            k.as_str().to_string(),
                            v.to_str().unwrap_or_default().to_string(),
                        )
                    })
                    .collect();
                let body = response
                    .bytes()
                    .await
                    .map_err(map_reqwest_error)?
                    .to_vec();
                Ok(FetchResponse {
                    status,
                    headers,
                    body,
                    final_url,
                })
            };

            tokio::select! {
                result = exchange => result,
                () = cancel.cancelled() => {
                    debug!("fetch cancelled: {}", request.url);
                    Err(FetchError::Cancelled)
                }
            }
        })
    }
}

fn map_reqwest_error(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(error.to_string())
    }
}

/// Navigator for the headless case: `load` fetches the URL and parses a fresh
/// static document; `click` is unsupported because a static adapter cannot
/// dispatch events. Hosts embedding a browser substitute their own navigator.
pub struct FetchNavigator {
    fetcher: Arc<dyn Fetcher>,
}

impl FetchNavigator {
    #[must_use]
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }
}

impl Navigator for FetchNavigator {
    fn click(&self, handle: ElementHandle) -> BoxFuture<'_, Result<NavigationOutcome, NavError>> {
        Box::pin(async move {
            Err(NavError::Unsupported(format!(
                "static documents cannot dispatch clicks (element {})",
                handle.raw()
            )))
        })
    }

    fn load(&self, url: Url) -> BoxFuture<'_, Result<NavigationOutcome, NavError>> {
        Box::pin(async move {
            let response = self
                .fetcher
                .fetch(FetchRequest::get(url), CancelToken::new())
                .await
                .map_err(|e| match e {
                    FetchError::Timeout => NavError::Timeout,
                    other => NavError::Failed(other.to_string()),
                })?;

            if response.status >= 400 {
                return Err(NavError::Failed(format!("HTTP {}", response.status)));
            }

            let dom: Arc<dyn DomAdapter> =
                Arc::new(StaticDomAdapter::parse(&response.body_text()));
            Ok(NavigationOutcome {
                dom: Some(dom),
                final_url: Some(response.final_url),
            })
        })
    }
}
