//! One origin, two requests.
//!
//! The direct request goes to the origin with its Host header. The proxied
//! request goes to the CDN domain and names the origin in `Cdn-Proxy-Origin`,
//! which the edge function turns into the real upstream. Both run at once and
//! are classified independently.

use std::error::Error as _;
use std::io;

use cdn_proxy_common::config::ScanSettings;
use cdn_proxy_common::error::CdnProxyError;
use cdn_proxy_common::scan::{ProbeOutcome, ScanResult, ServiceState};
use cdn_proxy_edge::{HEADER_HOST, HEADER_ORIGIN};
use reqwest::header::HOST;
use reqwest::redirect::Policy;
use tracing::trace;

#[derive(Clone)]
pub struct Prober {
    client: reqwest::Client,
    scheme: String,
    proxy_domain: String,
    host: Option<String>,
}

impl Prober {
    /// Certificate validation is off: probing by IP or with a Host override
    /// almost never matches the certificate the origin presents.
    pub fn new(
        settings: &ScanSettings,
        proxy_domain: String,
        host: Option<String>,
    ) -> Result<Self, CdnProxyError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(settings.timeout)
            .redirect(Policy::limited(settings.max_redirects))
            .build()
            .map_err(|e| CdnProxyError::Validation(format!("http client: {e}")))?;

        Ok(Self {
            client,
            scheme: settings.scheme.clone(),
            proxy_domain,
            host,
        })
    }

    pub async fn probe(&self, origin: &str) -> ScanResult {
        let host: String = self.host.clone().unwrap_or_else(|| origin.to_string());
        let (direct, proxied) = tokio::join!(self.direct(origin, &host), self.proxied(origin));
        trace!(origin, ?direct, ?proxied, "probe pair finished");

        ScanResult {
            origin: origin.to_string(),
            host,
            proxy_state: ServiceState::classify(&proxied),
            origin_state: ServiceState::classify(&direct),
        }
    }

    async fn direct(&self, origin: &str, host: &str) -> ProbeOutcome {
        let request = self
            .client
            .get(format!("{}://{origin}/", self.scheme))
            .header(HOST, host);
        outcome(request.send().await)
    }

    async fn proxied(&self, origin: &str) -> ProbeOutcome {
        let mut request = self
            .client
            .get(format!("{}://{}/", self.scheme, self.proxy_domain))
            .header(HEADER_ORIGIN, origin);
        if let Some(host) = &self.host {
            request = request.header(HEADER_HOST, host);
        }
        outcome(request.send().await)
    }
}

pub fn outcome(result: Result<reqwest::Response, reqwest::Error>) -> ProbeOutcome {
    let err: reqwest::Error = match result {
        Ok(response) => return ProbeOutcome::Status(response.status().as_u16()),
        Err(err) => err,
    };

    if err.is_timeout() {
        ProbeOutcome::TimedOut
    } else if err.is_redirect() {
        ProbeOutcome::RedirectLimit
    } else if was_reset(&err) {
        ProbeOutcome::ConnectionReset
    } else if err.is_connect() {
        ProbeOutcome::ConnectFailed
    } else {
        ProbeOutcome::Other(err.to_string())
    }
}

/// Peer dropped the connection somewhere under hyper.
fn was_reset(err: &reqwest::Error) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            return matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            );
        }
        if let Some(hyper_err) = cause.downcast_ref::<hyper::Error>() {
            if hyper_err.is_incomplete_message() {
                return true;
            }
        }
        source = cause.source();
    }
    false
}
