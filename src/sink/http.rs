use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use log::info;

use super::{ReportSink, RunReport};

/// Posts the run as JSON to a collector endpoint.
pub struct HttpSink {
    client: reqwest::Client,
    url: String,
}

impl HttpSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ReportSink for HttpSink {
    async fn publish(&self, report: &RunReport) -> Result<()> {
        info!("Sending test results to {}", self.url);
        let response = self
            .client
            .post(&self.url)
            .json(report)
            .send()
            .await
            .with_context(|| format!("failed to send test results to {}", self.url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("server responded with an error: {} - {}", status, body.trim());
        }

        info!("Test results published to {}", self.url);
        Ok(())
    }

    fn name(&self) -> &str {
        "HTTP"
    }
}
