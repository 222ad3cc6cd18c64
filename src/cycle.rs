use crate::convert::convert;
use crate::errors::{CycleError, DeviceError};
use crate::sink::SinkApi;
use crate::source::SourceApi;
use crate::token::TokenSource;
use tracing::warn;

#[derive(Debug)]
pub struct DeviceFailure {
    pub device_id: String,
    pub error: DeviceError,
}

/// Outcome of one scheduled cycle. `aborted` is set when a cycle-level step
/// (token acquisition or device listing) failed before any device was
/// processed.
#[derive(Debug)]
pub struct CycleReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<DeviceFailure>,
    pub aborted: Option<CycleError>,
}

impl CycleReport {
    fn aborted(error: CycleError) -> Self {
        Self {
            attempted: 0,
            succeeded: 0,
            failures: Vec::new(),
            aborted: Some(error),
        }
    }
}

/// One end-to-end run: token, device list, then fetch/convert/publish per
/// device. A failing device is recorded and never stops the rest; nothing is
/// retried within a cycle — the next scheduled tick is the retry mechanism.
pub struct PollCycle<T, S, K> {
    tokens: T,
    source: S,
    sink: K,
}

impl<T: TokenSource, S: SourceApi, K: SinkApi> PollCycle<T, S, K> {
    pub fn new(tokens: T, source: S, sink: K) -> Self {
        Self {
            tokens,
            source,
            sink,
        }
    }

    pub async fn run(&self) -> CycleReport {
        let token = match self.tokens.get_token().await {
            Ok(token) => token,
            Err(err) => return CycleReport::aborted(CycleError::Auth(err)),
        };

        let devices = match self.source.list_devices(&token).await {
            Ok(devices) => devices,
            Err(err) => return CycleReport::aborted(CycleError::ListDevices(err)),
        };

        let mut report = CycleReport {
            attempted: devices.len(),
            succeeded: 0,
            failures: Vec::new(),
            aborted: None,
        };
        for device in &devices {
            match self.forward_device(&token, &device.id).await {
                Ok(()) => report.succeeded += 1,
                Err(error) => {
                    warn!(device = %device.id, error = %error, "device skipped this cycle");
                    report.failures.push(DeviceFailure {
                        device_id: device.id.clone(),
                        error,
                    });
                }
            }
        }
        report
    }

    async fn forward_device(&self, token: &str, device_id: &str) -> Result<(), DeviceError> {
        let sample = self.source.latest_sample(token, device_id).await?;
        let record = convert(&sample);
        self.sink.publish(&record).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::IngestionRecord;
    use crate::errors::{AuthError, SinkError, SourceError};
    use crate::source::{Device, TelemetrySample};
    use chrono::Utc;
    use reqwest::StatusCode;
    use std::collections::HashSet;
    use std::sync::Mutex;

    struct FakeTokens {
        fail: bool,
    }

    impl TokenSource for FakeTokens {
        async fn get_token(&self) -> Result<String, AuthError> {
            if self.fail {
                Err(AuthError::Status {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                })
            } else {
                Ok("token".to_string())
            }
        }
    }

    struct FakeSource {
        devices: Vec<String>,
        fail_listing: bool,
        empty_window: HashSet<String>,
    }

    impl SourceApi for FakeSource {
        async fn list_devices(&self, token: &str) -> Result<Vec<Device>, SourceError> {
            assert_eq!(token, "token");
            if self.fail_listing {
                return Err(SourceError::Status {
                    endpoint: "GetHydrometers",
                    status: StatusCode::BAD_GATEWAY,
                });
            }
            Ok(self
                .devices
                .iter()
                .map(|id| Device { id: id.clone() })
                .collect())
        }

        async fn latest_sample(
            &self,
            _token: &str,
            device_id: &str,
        ) -> Result<TelemetrySample, SourceError> {
            if self.empty_window.contains(device_id) {
                return Err(SourceError::NoSamples);
            }
            Ok(TelemetrySample {
                device_id: device_id.to_string(),
                observed_at: Utc::now(),
                temperature_c: 18.5,
                specific_gravity_raw: 1038,
                rssi: -70,
                battery_voltage: 3.9,
                firmware_version: "1.2.3".to_string(),
            })
        }
    }

    struct FakeSink {
        published: Mutex<Vec<IngestionRecord>>,
        reject: HashSet<String>,
    }

    impl FakeSink {
        fn new(reject: HashSet<String>) -> Self {
            Self {
                published: Mutex::new(Vec::new()),
                reject,
            }
        }
    }

    impl SinkApi for FakeSink {
        async fn publish(&self, record: &IngestionRecord) -> Result<(), SinkError> {
            if self.reject.contains(&record.name) {
                return Err(SinkError::Status {
                    status: StatusCode::TOO_MANY_REQUESTS,
                });
            }
            self.published.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn devices(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[tokio::test]
    async fn happy_path_publishes_every_device() {
        let cycle = PollCycle::new(
            FakeTokens { fail: false },
            FakeSource {
                devices: devices(&["a", "b"]),
                fail_listing: false,
                empty_window: HashSet::new(),
            },
            FakeSink::new(HashSet::new()),
        );
        let report = cycle.run().await;
        assert_eq!(report.attempted, 2);
        assert_eq!(report.succeeded, 2);
        assert!(report.failures.is_empty());
        assert!(report.aborted.is_none());

        let published = cycle.sink.published.lock().unwrap();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].name, "a");
        assert_eq!(published[0].gravity, 1.038);
    }

    #[tokio::test]
    async fn failing_devices_never_stop_the_rest() {
        let cycle = PollCycle::new(
            FakeTokens { fail: false },
            FakeSource {
                devices: devices(&["a", "b", "c", "d"]),
                fail_listing: false,
                empty_window: HashSet::from(["b".to_string()]),
            },
            FakeSink::new(HashSet::from(["c".to_string()])),
        );
        let report = cycle.run().await;
        assert_eq!(report.attempted, 4);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failures.len(), 2);
        assert!(report.aborted.is_none());

        let failed: Vec<&str> = report
            .failures
            .iter()
            .map(|f| f.device_id.as_str())
            .collect();
        assert_eq!(failed, vec!["b", "c"]);
        assert_eq!(cycle.sink.published.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn listing_failure_aborts_before_any_publish() {
        let cycle = PollCycle::new(
            FakeTokens { fail: false },
            FakeSource {
                devices: devices(&["a"]),
                fail_listing: true,
                empty_window: HashSet::new(),
            },
            FakeSink::new(HashSet::new()),
        );
        let report = cycle.run().await;
        assert_eq!(report.attempted, 0);
        assert!(matches!(report.aborted, Some(CycleError::ListDevices(_))));
        assert!(cycle.sink.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn auth_failure_means_zero_devices_attempted() {
        let cycle = PollCycle::new(
            FakeTokens { fail: true },
            FakeSource {
                devices: devices(&["a"]),
                fail_listing: false,
                empty_window: HashSet::new(),
            },
            FakeSink::new(HashSet::new()),
        );
        let report = cycle.run().await;
        assert_eq!(report.attempted, 0);
        assert_eq!(report.succeeded, 0);
        assert!(matches!(report.aborted, Some(CycleError::Auth(_))));
        assert!(cycle.sink.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_device_list_is_a_clean_cycle() {
        let cycle = PollCycle::new(
            FakeTokens { fail: false },
            FakeSource {
                devices: Vec::new(),
                fail_listing: false,
                empty_window: HashSet::new(),
            },
            FakeSink::new(HashSet::new()),
        );
        let report = cycle.run().await;
        assert_eq!(report.attempted, 0);
        assert!(report.aborted.is_none());
    }
}
