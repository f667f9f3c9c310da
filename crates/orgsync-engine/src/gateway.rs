//! Timeout-bounded adapters over the external gateways.
//!
//! Engine components never talk to a gateway directly; they go through these
//! wrappers so that no single external call can hold an operation longer than
//! the configured timeout.

use std::time::Duration;

use orgsync_core::gateway::{DirectoryGateway, GatewayError, GatewayResult, SecretStoreGateway};
use tracing::warn;
use uuid::Uuid;

async fn bounded<T>(
    service: &'static str,
    operation: &'static str,
    limit: Duration,
    call: impl Future<Output = GatewayResult<T>>,
) -> GatewayResult<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            warn!(service, operation, error = %e, "External call failed");
            Err(e)
        }
        Err(_) => {
            let after_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
            warn!(service, operation, after_ms, "External call timed out");
            Err(GatewayError::Timeout { after_ms })
        }
    }
}

pub struct TimedDirectory<D> {
    inner: D,
    limit: Duration,
}

impl<D: DirectoryGateway> TimedDirectory<D> {
    pub fn new(inner: D, limit: Duration) -> Self {
        Self { inner, limit }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }
}

impl<D: DirectoryGateway> DirectoryGateway for TimedDirectory<D> {
    async fn group_exists(&self, group_id: &str) -> GatewayResult<bool> {
        bounded("directory", "group_exists", self.limit, self.inner.group_exists(group_id)).await
    }

    async fn add_user_to_group(&self, user_id: &str, group_id: &str) -> GatewayResult<bool> {
        bounded(
            "directory",
            "add_user_to_group",
            self.limit,
            self.inner.add_user_to_group(user_id, group_id),
        )
        .await
    }

    async fn remove_user_from_group(&self, user_id: &str, group_id: &str) -> GatewayResult<bool> {
        bounded(
            "directory",
            "remove_user_from_group",
            self.limit,
            self.inner.remove_user_from_group(user_id, group_id),
        )
        .await
    }

    async fn get_group_members(&self, group_id: &str) -> GatewayResult<Vec<String>> {
        bounded(
            "directory",
            "get_group_members",
            self.limit,
            self.inner.get_group_members(group_id),
        )
        .await
    }

    async fn user_exists(&self, user_id: &str) -> GatewayResult<bool> {
        bounded("directory", "user_exists", self.limit, self.inner.user_exists(user_id)).await
    }

    async fn get_account_enabled(&self, user_id: &str) -> GatewayResult<bool> {
        bounded(
            "directory",
            "get_account_enabled",
            self.limit,
            self.inner.get_account_enabled(user_id),
        )
        .await
    }
}

pub struct TimedSecretStore<S> {
    inner: S,
    limit: Duration,
}

impl<S: SecretStoreGateway> TimedSecretStore<S> {
    pub fn new(inner: S, limit: Duration) -> Self {
        Self { inner, limit }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: SecretStoreGateway> SecretStoreGateway for TimedSecretStore<S> {
    async fn secret_exists(&self, name: &str, organization_id: Uuid) -> GatewayResult<bool> {
        bounded(
            "secret_store",
            "secret_exists",
            self.limit,
            self.inner.secret_exists(name, organization_id),
        )
        .await
    }

    async fn get_secret_enabled(&self, name: &str) -> GatewayResult<bool> {
        bounded(
            "secret_store",
            "get_secret_enabled",
            self.limit,
            self.inner.get_secret_enabled(name),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stalled;

    impl DirectoryGateway for Stalled {
        async fn group_exists(&self, _: &str) -> GatewayResult<bool> {
            std::future::pending().await
        }
        async fn add_user_to_group(&self, _: &str, _: &str) -> GatewayResult<bool> {
            std::future::pending().await
        }
        async fn remove_user_from_group(&self, _: &str, _: &str) -> GatewayResult<bool> {
            std::future::pending().await
        }
        async fn get_group_members(&self, _: &str) -> GatewayResult<Vec<String>> {
            Ok(vec!["u1".into()])
        }
        async fn user_exists(&self, _: &str) -> GatewayResult<bool> {
            Err(GatewayError::Unavailable("down".into()))
        }
        async fn get_account_enabled(&self, _: &str) -> GatewayResult<bool> {
            Ok(true)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_call_becomes_timeout() {
        let dir = TimedDirectory::new(Stalled, Duration::from_secs(30));
        let err = dir.group_exists("g").await.unwrap_err();
        assert!(matches!(err, GatewayError::Timeout { after_ms: 30_000 }));
    }

    #[tokio::test]
    async fn results_and_errors_pass_through() {
        let dir = TimedDirectory::new(Stalled, Duration::from_secs(30));
        assert_eq!(dir.get_group_members("g").await.unwrap(), vec!["u1".to_string()]);
        assert!(matches!(
            dir.user_exists("u").await.unwrap_err(),
            GatewayError::Unavailable(_)
        ));
    }
}
