//! Readiness probing: poll a local HTTP endpoint until it answers.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::ProbeScheme;
use crate::errors::LaunchError;

/// Polls `GET <scheme>://localhost:<port>/` at a fixed interval.
///
/// Any HTTP response counts as ready; the status code is not inspected.
#[derive(Debug, Clone)]
pub struct ReadinessProbe {
    url: String,
    interval: Duration,
    timeout: Duration,
    client: reqwest::Client,
}

impl ReadinessProbe {
    pub fn new(url: impl Into<String>, interval: Duration, timeout: Duration) -> Result<Self, LaunchError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| LaunchError::HttpClient(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            interval,
            timeout,
            client,
        })
    }

    pub fn for_port(
        scheme: ProbeScheme,
        port: u16,
        interval: Duration,
        timeout: Duration,
    ) -> Result<Self, LaunchError> {
        Self::new(probe_url(scheme, port), interval, timeout)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Wait until the endpoint responds. Returns how long that took.
    pub async fn wait_ready(&self) -> Result<Duration, LaunchError> {
        let started = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let remaining = self.timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Err(self.timed_out(started));
            }

            // A peer that accepts but never answers must not outlive the deadline.
            match tokio::time::timeout(remaining, self.client.get(&self.url).send()).await {
                Ok(Ok(response)) => {
                    let elapsed = started.elapsed();
                    info!(
                        url = %self.url,
                        status = response.status().as_u16(),
                        attempts,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Target server is ready"
                    );
                    return Ok(elapsed);
                }
                Ok(Err(e)) => {
                    debug!(url = %self.url, attempt = attempts, error = %e, "Not ready yet");
                }
                Err(_) => return Err(self.timed_out(started)),
            }

            let remaining = self.timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Err(self.timed_out(started));
            }
            tokio::time::sleep(self.interval.min(remaining)).await;
        }
    }

    fn timed_out(&self, started: Instant) -> LaunchError {
        LaunchError::ReadinessTimeout {
            url: self.url.clone(),
            elapsed: started.elapsed(),
        }
    }
}

pub fn probe_url(scheme: ProbeScheme, port: u16) -> String {
    format!("{}://localhost:{}/", scheme.as_str(), port)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn free_port() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn test_probe_url() {
        assert_eq!(probe_url(ProbeScheme::Http, 4111), "http://localhost:4111/");
        assert_eq!(probe_url(ProbeScheme::Https, 4111), "https://localhost:4111/");
    }

    #[tokio::test]
    async fn test_ready_once_server_comes_up() {
        let port = free_port().await;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await.unwrap();
            let app = axum::Router::new().route("/", axum::routing::get(|| async { "ok" }));
            axum::serve(listener, app).await.unwrap();
        });

        let probe = ReadinessProbe::for_port(
            ProbeScheme::Http,
            port,
            Duration::from_millis(500),
            Duration::from_secs(5),
        )
        .unwrap();
        let elapsed = probe.wait_ready().await.unwrap();
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_any_status_code_counts_as_ready() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let app = axum::Router::new().route(
            "/",
            axum::routing::get(|| async { (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let probe = ReadinessProbe::new(
            format!("http://127.0.0.1:{}/", port),
            Duration::from_millis(100),
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(probe.wait_ready().await.is_ok());
    }

    #[tokio::test]
    async fn test_times_out_when_nothing_listens() {
        let port = free_port().await;
        let probe = ReadinessProbe::for_port(
            ProbeScheme::Http,
            port,
            Duration::from_millis(500),
            Duration::from_secs(1),
        )
        .unwrap();

        let started = Instant::now();
        let err = probe.wait_ready().await.unwrap_err();
        let wall = started.elapsed();

        match err {
            LaunchError::ReadinessTimeout { url, elapsed } => {
                assert_eq!(url, format!("http://localhost:{}/", port));
                assert!(elapsed >= Duration::from_secs(1));
            }
            other => panic!("Expected ReadinessTimeout, got {other:?}"),
        }
        assert!(wall >= Duration::from_secs(1));
        assert!(wall < Duration::from_millis(1600));
    }

    #[tokio::test]
    async fn test_times_out_when_peer_never_answers() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        // Accept and hold connections without ever writing a response.
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let probe = ReadinessProbe::new(
            format!("http://127.0.0.1:{}/", port),
            Duration::from_millis(500),
            Duration::from_secs(1),
        )
        .unwrap();
        let started = Instant::now();
        assert!(matches!(
            probe.wait_ready().await,
            Err(LaunchError::ReadinessTimeout { .. })
        ));
        assert!(started.elapsed() < Duration::from_millis(1600));
    }
}
