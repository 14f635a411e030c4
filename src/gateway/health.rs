//! Bounded-time reachability probe for the backend.

use crate::gateway::client::format_endpoint;
use crate::gateway::types::HealthReport;
use reqwest::Client;
use std::time::Duration;

/// GET `{base_url}/health`, giving up after `timeout`.
///
/// Any 2xx counts as healthy. Non-2xx, timeouts and transport failures produce an unhealthy
/// report whose message explains what went wrong.
pub(crate) async fn probe_health(client: &Client, base_url: &str, timeout: Duration) -> HealthReport {
    let url = format_endpoint(base_url, "health");
    let outcome = tokio::time::timeout(timeout, client.get(&url).send()).await;

    let (healthy, message) = match outcome {
        Ok(Ok(response)) if response.status().is_success() => {
            (true, "Document service is running".to_string())
        }
        Ok(Ok(response)) => (
            false,
            format!(
                "Document service returned status {}",
                response.status().as_u16()
            ),
        ),
        Err(_) => (
            false,
            format!(
                "Connection timeout: document service did not respond within {}ms",
                timeout.as_millis()
            ),
        ),
        Ok(Err(err)) if err.is_connect() || err.is_request() => (
            false,
            format!("Cannot connect to document service at {base_url}. Please ensure it is running."),
        ),
        Ok(Err(err)) => (false, format!("Health check failed: {err}")),
    };

    if healthy {
        tracing::debug!(url, "Health probe succeeded");
    } else {
        tracing::warn!(url, %message, "Health probe failed");
    }

    HealthReport {
        healthy,
        message,
        service_url: base_url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::GET, MockServer};

    #[tokio::test]
    async fn success_status_is_healthy() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/health");
                then.status(200).json_body(serde_json::json!({ "status": "healthy" }));
            })
            .await;

        let report = probe_health(&Client::new(), &server.base_url(), Duration::from_secs(1)).await;
        assert!(report.healthy);
        assert_eq!(report.service_url, server.base_url());
    }

    #[tokio::test]
    async fn error_status_is_unhealthy_with_status_code() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/health");
                then.status(503);
            })
            .await;

        let report = probe_health(&Client::new(), &server.base_url(), Duration::from_secs(1)).await;
        assert!(!report.healthy);
        assert!(report.message.contains("503"));
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/health");
                then.status(200).delay(Duration::from_millis(500));
            })
            .await;

        let report =
            probe_health(&Client::new(), &server.base_url(), Duration::from_millis(50)).await;
        assert!(!report.healthy);
        assert!(report.message.contains("within 50ms"));
    }

    #[tokio::test]
    async fn refused_connection_is_unhealthy() {
        let report = probe_health(
            &Client::new(),
            "http://127.0.0.1:9",
            Duration::from_millis(500),
        )
        .await;
        assert!(!report.healthy);
        assert!(report.message.contains("Cannot connect"));
    }
}
