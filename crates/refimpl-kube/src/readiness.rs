//! Waiting for Argo CD applications to become healthy
//!
//! Readiness is checked in three stages:
//! 1. The root application reports `Healthy` (fatal on timeout)
//! 2. At least a minimum number of applications exist (warns on timeout)
//! 3. Every application in the namespace reports `Healthy` (fatal on timeout)
//!
//! The second stage only gives the root application time to fan out; the
//! third stage is the authoritative gate.

use async_trait::async_trait;
use kube::{
    Client,
    api::{Api, DeleteParams, DynamicObject, ListParams},
    core::GroupVersionKind,
    discovery::ApiResource,
};
use refimpl_core::Settings;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{KubeError, Result};

/// Namespace holding the Argo CD applications
pub const ARGOCD_NAMESPACE: &str = "argocd";

/// Application that fans out every add-on
pub const ROOT_APPLICATION: &str = "addons-appset";

const HEALTHY: &str = "Healthy";

/// Name and health of one application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationStatus {
    pub name: String,
    /// `.status.health.status`, absent until Argo CD reports it
    pub health: Option<String>,
}

impl ApplicationStatus {
    pub fn new(name: impl Into<String>, health: Option<&str>) -> Self {
        Self {
            name: name.into(),
            health: health.map(str::to_string),
        }
    }

    pub fn healthy(name: impl Into<String>) -> Self {
        Self::new(name, Some(HEALTHY))
    }

    pub fn is_healthy(&self) -> bool {
        self.health.as_deref() == Some(HEALTHY)
    }

    fn from_object(obj: &DynamicObject) -> Self {
        let health = obj
            .data
            .get("status")
            .and_then(|s| s.get("health"))
            .and_then(|h| h.get("status"))
            .and_then(|s| s.as_str());
        Self::new(obj.metadata.name.clone().unwrap_or_default(), health)
    }
}

/// Read access to Argo CD applications
#[async_trait]
pub trait ApplicationSource: Send + Sync {
    /// Look up one application, `None` if it does not exist
    async fn get_application(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ApplicationStatus>>;

    /// List every application in a namespace
    async fn list_applications(&self, namespace: &str) -> Result<Vec<ApplicationStatus>>;

    /// Delete one application; a missing application is not an error
    async fn delete_application(&self, namespace: &str, name: &str) -> Result<()>;
}

/// `argoproj.io/v1alpha1` Application
pub fn application_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("argoproj.io", "v1alpha1", "Application"),
        "applications",
    )
}

/// Applications read through the Kubernetes API
#[derive(Clone)]
pub struct KubeApplicationSource {
    client: Client,
}

impl KubeApplicationSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &application_resource())
    }
}

#[async_trait]
impl ApplicationSource for KubeApplicationSource {
    async fn get_application(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ApplicationStatus>> {
        let obj = self.api(namespace).get_opt(name).await?;
        Ok(obj.as_ref().map(ApplicationStatus::from_object))
    }

    async fn list_applications(&self, namespace: &str) -> Result<Vec<ApplicationStatus>> {
        let list = self.api(namespace).list(&ListParams::default()).await?;
        Ok(list.items.iter().map(ApplicationStatus::from_object).collect())
    }

    async fn delete_application(&self, namespace: &str, name: &str) -> Result<()> {
        match self.api(namespace).delete(name, &DeleteParams::background()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(()),
            Err(e) => Err(KubeError::Api(e)),
        }
    }
}

/// One scripted observation for [`MockApplicationSource`]
#[derive(Debug, Clone)]
pub enum Observation {
    /// The API answered with these applications
    Apps(Vec<ApplicationStatus>),
    /// The API call failed
    Error,
}

/// Scripted application source for tests
///
/// Each call consumes the next observation; the last one repeats forever.
#[derive(Clone)]
pub struct MockApplicationSource {
    observations: Arc<Mutex<VecDeque<Observation>>>,
    calls: Arc<Mutex<usize>>,
    deleted: Arc<Mutex<Vec<String>>>,
}

impl MockApplicationSource {
    pub fn new(observations: Vec<Observation>) -> Self {
        Self {
            observations: Arc::new(Mutex::new(observations.into())),
            calls: Arc::new(Mutex::new(0)),
            deleted: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Names passed to `delete_application`, in order
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    /// Total number of API calls made
    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    fn next(&self) -> Result<Vec<ApplicationStatus>> {
        *self.calls.lock().unwrap() += 1;

        let mut observations = self.observations.lock().unwrap();
        let current = if observations.len() > 1 {
            observations.pop_front()
        } else {
            observations.front().cloned()
        };

        match current {
            Some(Observation::Apps(apps)) => Ok(apps),
            Some(Observation::Error) => Err(KubeError::Io(std::io::Error::other(
                "the server is currently unable to handle the request",
            ))),
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl ApplicationSource for MockApplicationSource {
    async fn get_application(
        &self,
        _namespace: &str,
        name: &str,
    ) -> Result<Option<ApplicationStatus>> {
        Ok(self.next()?.into_iter().find(|a| a.name == name))
    }

    async fn list_applications(&self, _namespace: &str) -> Result<Vec<ApplicationStatus>> {
        self.next()
    }

    async fn delete_application(&self, _namespace: &str, name: &str) -> Result<()> {
        self.deleted.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

/// Readiness timing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessConfig {
    pub namespace: String,
    pub root_application: String,
    pub root_timeout: Duration,
    pub root_interval: Duration,
    /// Applications that must exist before the final wait
    pub min_applications: usize,
    pub count_timeout: Duration,
    pub count_interval: Duration,
    /// `None` waits as long as it takes
    pub final_timeout: Option<Duration>,
    pub final_interval: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            namespace: ARGOCD_NAMESPACE.to_string(),
            root_application: ROOT_APPLICATION.to_string(),
            root_timeout: Duration::from_secs(15 * 60),
            root_interval: Duration::from_secs(10),
            min_applications: 2,
            count_timeout: Duration::from_secs(10 * 60),
            count_interval: Duration::from_secs(30),
            final_timeout: Some(refimpl_core::config::DEFAULT_FINAL_TIMEOUT),
            final_interval: Duration::from_secs(10),
        }
    }
}

impl ReadinessConfig {
    /// Defaults with the final cap taken from the settings
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            final_timeout: settings.readiness.final_timeout(),
            ..Self::default()
        }
    }
}

/// Result of the application count stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountOutcome {
    /// Enough applications were observed
    Reached(usize),
    /// Gave up waiting; not an error
    TimedOut,
}

/// Blocks until the applications are ready
pub struct ReadinessWaiter<'a, S: ApplicationSource> {
    source: &'a S,
    config: ReadinessConfig,
}

impl<'a, S: ApplicationSource> ReadinessWaiter<'a, S> {
    pub fn new(source: &'a S, config: ReadinessConfig) -> Self {
        Self { source, config }
    }

    /// Run all three stages in order
    pub async fn wait_all(&self) -> Result<()> {
        self.wait_root().await?;
        self.wait_count().await;
        self.wait_all_healthy().await
    }

    /// Stage 1: the root application is healthy
    pub async fn wait_root(&self) -> Result<()> {
        let namespace = self.config.namespace.as_str();
        let name = self.config.root_application.as_str();
        let source = self.source;
        tracing::info!(namespace, application = name, "waiting for root application");

        poll(self.config.root_interval, Some(self.config.root_timeout), || async move {
            match source.get_application(namespace, name).await {
                Ok(Some(app)) => app.is_healthy(),
                Ok(None) => false,
                Err(e) => {
                    tracing::debug!(error = %e, "root application lookup failed");
                    false
                }
            }
        })
        .await
        .map_err(|elapsed| KubeError::ReadinessTimeout {
            what: format!("application '{}' to become Healthy", name),
            elapsed,
        })?;

        tracing::info!(application = name, "root application is healthy");
        Ok(())
    }

    /// Stage 2: enough applications exist
    ///
    /// Listing errors count as "not yet". Running out of time only warns.
    pub async fn wait_count(&self) -> CountOutcome {
        let namespace = self.config.namespace.as_str();
        let target = self.config.min_applications;
        let source = self.source;
        let seen = Arc::new(AtomicUsize::new(0));
        tracing::info!(namespace, target, "waiting for applications to be created");

        let result = poll(self.config.count_interval, Some(self.config.count_timeout), || {
            let seen = Arc::clone(&seen);
            async move {
                match source.list_applications(namespace).await {
                    Ok(apps) => {
                        seen.store(apps.len(), Ordering::Relaxed);
                        tracing::debug!(count = apps.len(), target, "applications found");
                        apps.len() >= target
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "listing applications failed, retrying");
                        false
                    }
                }
            }
        })
        .await;

        match result {
            Ok(()) => CountOutcome::Reached(seen.load(Ordering::Relaxed)),
            Err(elapsed) => {
                tracing::warn!(
                    ?elapsed,
                    target,
                    "timed out waiting for applications to be created, continuing"
                );
                CountOutcome::TimedOut
            }
        }
    }

    /// Stage 3: every application is healthy
    pub async fn wait_all_healthy(&self) -> Result<()> {
        let namespace = self.config.namespace.as_str();
        let source = self.source;
        match self.config.final_timeout {
            Some(limit) => tracing::info!(namespace, ?limit, "waiting for all applications"),
            None => tracing::info!(namespace, "waiting for all applications (no time limit)"),
        }

        poll(self.config.final_interval, self.config.final_timeout, || async move {
            match source.list_applications(namespace).await {
                Ok(apps) => {
                    let pending: Vec<&str> = apps
                        .iter()
                        .filter(|a| !a.is_healthy())
                        .map(|a| a.name.as_str())
                        .collect();
                    if !pending.is_empty() {
                        tracing::debug!(?pending, "applications not yet healthy");
                    }
                    !apps.is_empty() && pending.is_empty()
                }
                Err(e) => {
                    tracing::debug!(error = %e, "listing applications failed, retrying");
                    false
                }
            }
        })
        .await
        .map_err(|elapsed| KubeError::ReadinessTimeout {
            what: format!("all applications in '{}' to become Healthy", namespace),
            elapsed,
        })?;

        tracing::info!(namespace, "all applications are healthy");
        Ok(())
    }
}

/// Probe until it succeeds; `Err(elapsed)` once `timeout` has passed
pub(crate) async fn poll<F, Fut>(
    interval: Duration,
    timeout: Option<Duration>,
    mut probe: F,
) -> std::result::Result<(), Duration>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    loop {
        if probe().await {
            return Ok(());
        }

        let elapsed = start.elapsed();
        let pause = match timeout {
            Some(limit) if elapsed >= limit => return Err(elapsed),
            Some(limit) => interval.min(limit - elapsed),
            None => interval,
        };
        tokio::time::sleep(pause).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apps(statuses: &[(&str, Option<&str>)]) -> Observation {
        Observation::Apps(
            statuses
                .iter()
                .map(|(name, health)| ApplicationStatus::new(*name, *health))
                .collect(),
        )
    }

    #[test]
    fn test_status_from_object() {
        let obj: DynamicObject = serde_json::from_value(serde_json::json!({
            "apiVersion": "argoproj.io/v1alpha1",
            "kind": "Application",
            "metadata": {"name": "argo-workflows", "namespace": "argocd"},
            "status": {"health": {"status": "Progressing"}}
        }))
        .unwrap();

        let status = ApplicationStatus::from_object(&obj);
        assert_eq!(status.name, "argo-workflows");
        assert_eq!(status.health.as_deref(), Some("Progressing"));
        assert!(!status.is_healthy());
    }

    #[test]
    fn test_status_without_health() {
        let obj: DynamicObject = serde_json::from_value(serde_json::json!({
            "apiVersion": "argoproj.io/v1alpha1",
            "kind": "Application",
            "metadata": {"name": "fresh"}
        }))
        .unwrap();
        assert_eq!(ApplicationStatus::from_object(&obj).health, None);
    }

    #[test]
    fn test_config_from_settings() {
        let settings = Settings::from_yaml(
            "cluster_name: c\nregion: r\nreadiness:\n  final_timeout_seconds: -1\n",
        )
        .unwrap();
        let config = ReadinessConfig::from_settings(&settings);
        assert_eq!(config.final_timeout, None);
        assert_eq!(config.root_timeout, Duration::from_secs(900));
        assert_eq!(config.count_interval, Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_all_happy_path() {
        let source = MockApplicationSource::new(vec![
            apps(&[(ROOT_APPLICATION, Some("Progressing"))]),
            apps(&[(ROOT_APPLICATION, Some("Healthy"))]),
            apps(&[(ROOT_APPLICATION, Some("Healthy")), ("keycloak", Some("Progressing"))]),
            apps(&[(ROOT_APPLICATION, Some("Healthy")), ("keycloak", Some("Healthy"))]),
        ]);

        let waiter = ReadinessWaiter::new(&source, ReadinessConfig::default());
        waiter.wait_all().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_root_timeout_is_fatal() {
        let source =
            MockApplicationSource::new(vec![apps(&[(ROOT_APPLICATION, Some("Degraded"))])]);
        let waiter = ReadinessWaiter::new(&source, ReadinessConfig::default());

        let start = Instant::now();
        let err = waiter.wait_all().await.unwrap_err();

        assert!(matches!(err, KubeError::ReadinessTimeout { .. }));
        assert_eq!(start.elapsed(), Duration::from_secs(15 * 60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_root_missing_then_present() {
        let source = MockApplicationSource::new(vec![
            Observation::Error,
            apps(&[]),
            apps(&[(ROOT_APPLICATION, Some("Healthy"))]),
        ]);
        let waiter = ReadinessWaiter::new(&source, ReadinessConfig::default());

        waiter.wait_root().await.unwrap();
        assert_eq!(source.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_count_errors_only_warn() {
        let source = MockApplicationSource::new(vec![Observation::Error]);
        let waiter = ReadinessWaiter::new(&source, ReadinessConfig::default());

        let start = Instant::now();
        let outcome = waiter.wait_count().await;

        assert_eq!(outcome, CountOutcome::TimedOut);
        assert_eq!(start.elapsed(), Duration::from_secs(10 * 60));
        // one probe at t=0 and every 30s until t=600
        assert_eq!(source.call_count(), 21);
    }

    #[tokio::test(start_paused = true)]
    async fn test_count_tolerates_transient_errors() {
        let source = MockApplicationSource::new(vec![
            Observation::Error,
            apps(&[("a", None)]),
            Observation::Error,
            apps(&[("a", None), ("b", None), ("c", None)]),
        ]);
        let waiter = ReadinessWaiter::new(&source, ReadinessConfig::default());

        assert_eq!(waiter.wait_count().await, CountOutcome::Reached(3));
        assert_eq!(source.call_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_count_timeout_does_not_stop_wait_all() {
        let source = MockApplicationSource::new(vec![apps(&[(ROOT_APPLICATION, Some("Healthy"))])]);
        let waiter = ReadinessWaiter::new(&source, ReadinessConfig::default());

        // Only one application ever exists, and it is healthy
        waiter.wait_all().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_timeout_is_fatal() {
        let source = MockApplicationSource::new(vec![apps(&[
            ("a", Some("Healthy")),
            ("b", Some("Missing")),
        ])]);
        let config = ReadinessConfig {
            final_timeout: Some(Duration::from_secs(120)),
            ..ReadinessConfig::default()
        };
        let waiter = ReadinessWaiter::new(&source, config);

        let err = waiter.wait_all_healthy().await.unwrap_err();
        match err {
            KubeError::ReadinessTimeout { elapsed, .. } => {
                assert_eq!(elapsed, Duration::from_secs(120))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_requires_at_least_one_application() {
        let source = MockApplicationSource::new(vec![apps(&[])]);
        let config = ReadinessConfig {
            final_timeout: Some(Duration::from_secs(30)),
            ..ReadinessConfig::default()
        };
        let waiter = ReadinessWaiter::new(&source, config);

        assert!(waiter.wait_all_healthy().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_unbounded_waits_past_default_cap() {
        let mut observations = vec![apps(&[("slow", Some("Progressing"))]); 500];
        observations.push(apps(&[("slow", Some("Healthy"))]));
        let source = MockApplicationSource::new(observations);
        let config = ReadinessConfig {
            final_timeout: None,
            ..ReadinessConfig::default()
        };
        let waiter = ReadinessWaiter::new(&source, config);

        let start = Instant::now();
        waiter.wait_all_healthy().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(500 * 10));
    }
}
