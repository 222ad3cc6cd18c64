use reqwest::StatusCode;
use thiserror::Error;

/// Token issuance failed. Renewal is attempted once per cycle; the next
/// scheduled cycle is the retry mechanism.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token endpoint returned HTTP {status}")]
    Status { status: StatusCode },
    #[error("token exchange transport failure")]
    Transport(#[source] reqwest::Error),
    #[error("token response could not be parsed")]
    Decode(#[source] serde_json::Error),
    #[error("credential store failure: {0:#}")]
    Store(anyhow::Error),
}

/// Source API call failed at the transport/status/parse level, or the
/// telemetry window came back empty.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source API {endpoint} returned HTTP {status}")]
    Status {
        endpoint: &'static str,
        status: StatusCode,
    },
    #[error("source API transport failure")]
    Transport(#[source] reqwest::Error),
    #[error("source API response could not be parsed")]
    Decode(#[source] serde_json::Error),
    #[error("no telemetry samples in the requested window")]
    NoSamples,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink endpoint returned HTTP {status}")]
    Status { status: StatusCode },
    #[error("sink publish transport failure")]
    Transport(#[source] reqwest::Error),
}

/// A failure scoped to one device within a cycle. Recorded on the report,
/// never propagated past the device boundary.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// A failure that aborts the whole cycle before any publish happens.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("token acquisition failed: {0}")]
    Auth(#[source] AuthError),
    #[error("device listing failed: {0}")]
    ListDevices(#[source] SourceError),
}
