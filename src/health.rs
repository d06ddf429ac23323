// Post-start validation of an agent's metrics endpoint

use crate::error::{Result, SetupError};
use crate::retry::RetryPolicy;
use std::time::Duration;

pub struct HealthValidator {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl HealthValidator {
    pub fn new(timeout: Duration, policy: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()?;
        Ok(Self { client, policy })
    }

    /// Wait for the endpoint to answer with a success status. Refused
    /// connections and error statuses count as not ready yet.
    pub async fn validate(&self, url: &str) -> Result<()> {
        let healthy = self
            .policy
            .poll_until(&format!("GET {}", url), || async move {
                let response = self.client.get(url).send().await?;
                tracing::debug!("{} answered {}", url, response.status());
                Ok::<_, anyhow::Error>(response.status().is_success())
            })
            .await;

        if !healthy {
            return Err(SetupError::ValidationTimeout {
                url: url.to_string(),
                attempts: self.policy.max_attempts,
            }
            .into());
        }

        tracing::info!("Metrics endpoint {} is healthy", url);
        println!("  Metrics available at {}", url);
        Ok(())
    }
}
