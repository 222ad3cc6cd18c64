use crate::convert::IngestionRecord;
use crate::errors::SinkError;
use reqwest::Client;

pub trait SinkApi {
    async fn publish(&self, record: &IngestionRecord) -> Result<(), SinkError>;
}

/// Publishes one ingestion record per call to the configured sink endpoint.
/// The sink enforces a per-stream publish-rate ceiling; the poll cadence
/// stays under it, so a 429 is surfaced as an error rather than retried.
pub struct SinkClient {
    http: Client,
    endpoint: String,
}

impl SinkClient {
    pub fn new(http: Client, endpoint: String) -> Self {
        Self { http, endpoint }
    }
}

impl SinkApi for SinkClient {
    async fn publish(&self, record: &IngestionRecord) -> Result<(), SinkError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(record)
            .send()
            .await
            .map_err(SinkError::Transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Status { status });
        }
        Ok(())
    }
}
