use std::time::Duration;

use nimbus_common::{Error, ErrorKind};
use nimbus_provider::{DeploymentStatus, InstanceStatus, ProviderClient, RequestHandle, RequestStatus};
use tokio::time::sleep;
use tracing::debug;

/// Default tick interval and loop bound shared by every waiter: 30s x 60,
/// a 30-minute ceiling.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_TRIES: u32 = 60;

/// Polls an in-flight provider operation's [`RequestHandle`] until it
/// resolves, backing off `interval` between polls. A terminal status other
/// than `Succeeded` is always a failure, never a retry.
pub struct AsyncWaiter {
    interval: Duration,
    max_tries: u32,
}

impl Default for AsyncWaiter {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_tries: DEFAULT_TRIES,
        }
    }
}

impl AsyncWaiter {
    pub fn new(interval: Duration, max_tries: u32) -> Self {
        Self { interval, max_tries }
    }

    /// Blocks until the request reaches a terminal state or the loop bound
    /// is exhausted. The only suspension point is the sleep between polls,
    /// so a caller racing this against a timeout future can cancel cleanly
    /// between iterations.
    pub async fn wait(
        &self,
        provider: &dyn ProviderClient,
        request: &RequestHandle,
    ) -> Result<(), Error> {
        for attempt in 0..self.max_tries {
            if attempt > 0 {
                sleep(self.interval).await;
            }

            match provider.get_request_status(request).await? {
                RequestStatus::Succeeded => return Ok(()),
                RequestStatus::Failed => {
                    return Err(Error::custom(
                        ErrorKind::ProviderRejected,
                        "provider reported request failed",
                    ))
                }
                RequestStatus::InProgress => {
                    debug!(attempt, "request still in progress");
                }
            }
        }

        Err(Error::from_kind(ErrorKind::AsyncTimeout))
    }
}

/// Polls a deployment's reported state until it reaches a target shape.
/// Shares the async waiter's (interval, max_tries) parameterization but
/// distinct defaults for deployment-status vs. role-readiness targets.
pub struct ResourceWaiter {
    interval: Duration,
    max_tries: u32,
}

impl Default for ResourceWaiter {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_tries: DEFAULT_TRIES,
        }
    }
}

impl ResourceWaiter {
    pub fn new(interval: Duration, max_tries: u32) -> Self {
        Self { interval, max_tries }
    }

    /// Waits for `get_deployment(service, deployment)` to report `target`
    /// as its overall status.
    pub async fn wait_for_deployment_status(
        &self,
        provider: &dyn ProviderClient,
        service: &str,
        deployment: &str,
        target: DeploymentStatus,
    ) -> Result<(), Error> {
        for attempt in 0..self.max_tries {
            if attempt > 0 {
                sleep(self.interval).await;
            }

            let info = provider
                .get_deployment(service, deployment)
                .await?
                .ok_or_else(|| {
                    Error::custom(ErrorKind::PostconditionsViolated, "deployment disappeared")
                })?;

            if info.status == target {
                return Ok(());
            }
            debug!(attempt, status = %info.status, "waiting for deployment status");
        }

        Err(Error::from_kind(ErrorKind::ReadinessTimeout))
    }

    /// Waits for `role` within `deployment` to report `target` as its
    /// instance status. `targets` may list more than one acceptable status
    /// (e.g. `StoppedVM` or `StoppedDeallocated`) since the provider does
    /// not guarantee which of the two a stop settles on.
    pub async fn wait_for_role_status(
        &self,
        provider: &dyn ProviderClient,
        service: &str,
        deployment: &str,
        role: &str,
        targets: &[InstanceStatus],
    ) -> Result<(), Error> {
        for attempt in 0..self.max_tries {
            if attempt > 0 {
                sleep(self.interval).await;
            }

            let info = provider
                .get_deployment(service, deployment)
                .await?
                .ok_or_else(|| {
                    Error::custom(ErrorKind::PostconditionsViolated, "deployment disappeared")
                })?;

            let role_instance = info.role_instances.iter().find(|r| r.role_name == role);
            match role_instance {
                Some(r) if targets.contains(&r.instance_status) => return Ok(()),
                Some(r) => debug!(attempt, status = %r.instance_status, "waiting for role status"),
                None => debug!(attempt, "role not yet present in deployment"),
            }
        }

        Err(Error::from_kind(ErrorKind::ReadinessTimeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_provider::FakeProvider;

    #[tokio::test]
    async fn async_waiter_succeeds_once_request_completes() {
        let provider = FakeProvider::new();
        let handle = provider
            .create_storage_account(&nimbus_provider::StorageAccountSpec {
                name: "acct".into(),
                description: "d".into(),
                label: "l".into(),
                location: "West US".into(),
            })
            .await
            .unwrap();

        let waiter = AsyncWaiter::new(Duration::from_millis(1), 5);
        waiter.wait(&provider, &handle).await.unwrap();
    }

    #[tokio::test]
    async fn async_waiter_times_out_on_stuck_request() {
        let provider = FakeProvider::new();
        let handle = RequestHandle("req-stuck".into());
        provider.seed_request_outcomes(
            &handle,
            vec![RequestStatus::InProgress, RequestStatus::InProgress, RequestStatus::InProgress],
        );

        let waiter = AsyncWaiter::new(Duration::from_millis(1), 3);
        let err = waiter.wait(&provider, &handle).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AsyncTimeout);
    }

    #[tokio::test]
    async fn async_waiter_fails_on_failed_request() {
        let provider = FakeProvider::new();
        let handle = RequestHandle("req-fail".into());
        provider.seed_request_outcomes(&handle, vec![RequestStatus::Failed]);

        let waiter = AsyncWaiter::new(Duration::from_millis(1), 5);
        let err = waiter.wait(&provider, &handle).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProviderRejected);
    }
}
