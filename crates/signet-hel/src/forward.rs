// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pinned outbound forwarding with time and size caps.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use signet_core::ForwardRecord;
use tracing::debug;
use url::Url;

/// Forwards canonical payload bytes to a policy-approved address.
///
/// The connection is pinned: the hostname resolves to exactly the address
/// the policy engine selected, for the whole request. TLS SNI and
/// certificate verification still use the original hostname. Redirects are
/// never followed; the response body is streamed against a byte cap and
/// discarded.
#[derive(Debug, Clone)]
pub struct PinnedForwarder {
    timeout: Duration,
    max_response_bytes: u64,
}

impl PinnedForwarder {
    /// Build a forwarder with a total elapsed-time cap and a response-body
    /// byte cap.
    #[must_use]
    pub fn new(timeout: Duration, max_response_bytes: u64) -> Self {
        Self {
            timeout,
            max_response_bytes,
        }
    }

    /// POST `body` as `application/json` to `url`, pinned to `ip`.
    ///
    /// Never fails: every outcome, including transport errors, is a
    /// [`ForwardRecord`]. A failed forward has `status_code == 0` (or the
    /// status read before the failure) and a reason in `error`.
    pub async fn forward(&self, url: &Url, ip: IpAddr, body: Vec<u8>) -> ForwardRecord {
        let host = url.host_str().unwrap_or_default().to_string();
        let port = url.port_or_known_default().unwrap_or(443);
        let mut record = ForwardRecord {
            url: url.to_string(),
            status_code: 0,
            host: host.clone(),
            pinned_ip: ip.to_string(),
            response_size: 0,
            error: None,
        };

        let client = match reqwest::Client::builder()
            .resolve(&host, SocketAddr::new(ip, port))
            .redirect(reqwest::redirect::Policy::none())
            .timeout(self.timeout)
            .build()
        {
            Ok(client) => client,
            Err(err) => {
                record.error = Some(format!("client_build_error: {err}"));
                return record;
            }
        };

        let response = client
            .post(url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await;

        let mut response = match response {
            Ok(response) => response,
            Err(err) => {
                record.error = Some(classify(&err));
                return record;
            }
        };
        record.status_code = response.status().as_u16();

        // Stream and discard the body, bounding total bytes read.
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    record.response_size += chunk.len() as u64;
                    if record.response_size > self.max_response_bytes {
                        record.error = Some("response_too_large".to_string());
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    record.error = Some(classify(&err));
                    break;
                }
            }
        }

        debug!(
            host = %record.host,
            status = record.status_code,
            size = record.response_size,
            error = record.error.as_deref().unwrap_or(""),
            "forward completed"
        );
        record
    }
}

fn classify(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "timeout".to_string()
    } else if err.is_connect() {
        "connect_error".to_string()
    } else {
        "request_error".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Forwarder tests run over plain HTTP: the https requirement is the
    /// policy engine's job, and the pinning mechanics are scheme-agnostic.
    fn pinned_url(server: &MockServer, host: &str, route: &str) -> (Url, IpAddr) {
        let port = server.address().port();
        let url = Url::parse(&format!("http://{host}:{port}{route}")).unwrap();
        (url, server.address().ip())
    }

    fn forwarder(cap: u64) -> PinnedForwarder {
        PinnedForwarder::new(Duration::from_secs(5), cap)
    }

    #[tokio::test]
    async fn successful_forward_records_status_and_size() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("content-type", "application/json"))
            .and(body_string(r#"{"amount_minor":100000}"#))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 64]))
            .mount(&server)
            .await;

        // The hostname is fictitious; only the pin makes it reachable.
        let (url, ip) = pinned_url(&server, "api.partner.test", "/hook");
        let record = forwarder(1024)
            .forward(&url, ip, br#"{"amount_minor":100000}"#.to_vec())
            .await;

        assert_eq!(record.status_code, 200);
        assert_eq!(record.response_size, 64);
        assert_eq!(record.host, "api.partner.test");
        assert_eq!(record.pinned_ip, ip.to_string());
        assert!(record.error.is_none());
    }

    #[tokio::test]
    async fn body_exactly_at_cap_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 128]))
            .mount(&server)
            .await;

        let (url, ip) = pinned_url(&server, "api.partner.test", "/h");
        let record = forwarder(128).forward(&url, ip, Vec::new()).await;
        assert_eq!(record.response_size, 128);
        assert!(record.error.is_none());
    }

    #[tokio::test]
    async fn body_one_byte_over_cap_is_overflow() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 129]))
            .mount(&server)
            .await;

        let (url, ip) = pinned_url(&server, "api.partner.test", "/h");
        let record = forwarder(128).forward(&url, ip, Vec::new()).await;
        assert_eq!(record.status_code, 200);
        assert_eq!(record.error.as_deref(), Some("response_too_large"));
    }

    #[tokio::test]
    async fn redirects_are_not_followed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", "http://10.0.0.5/steal"),
            )
            .mount(&server)
            .await;

        let (url, ip) = pinned_url(&server, "api.partner.test", "/h");
        let record = forwarder(1024).forward(&url, ip, Vec::new()).await;
        // The 302 is recorded as-is; no second request happens.
        assert_eq!(record.status_code, 302);
        assert!(record.error.is_none());
    }

    #[tokio::test]
    async fn connection_refused_is_a_forward_error() {
        // Grab a port that is closed by the time we connect.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = Url::parse(&format!("http://api.partner.test:{port}/h")).unwrap();
        let record = forwarder(1024)
            .forward(&url, "127.0.0.1".parse().unwrap(), Vec::new())
            .await;
        assert_eq!(record.status_code, 0);
        assert!(record.error.is_some());
        assert_eq!(record.response_size, 0);
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let (url, ip) = pinned_url(&server, "api.partner.test", "/h");
        let forwarder = PinnedForwarder::new(Duration::from_millis(100), 1024);
        let record = forwarder.forward(&url, ip, Vec::new()).await;
        assert_eq!(record.status_code, 0);
        assert_eq!(record.error.as_deref(), Some("timeout"));
    }
}
