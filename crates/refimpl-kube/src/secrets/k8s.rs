//! Kubernetes Secrets store
//!
//! Each payload becomes an Opaque Secret holding the payload JSON under a
//! single key. A missing Secret is created, an existing one is updated with
//! Server-Side Apply, so repeating a run is harmless.

use async_trait::async_trait;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
use kube::api::{Api, Patch, PatchParams, PostParams};
use refimpl_core::SecretPayload;
use std::collections::BTreeMap;

use super::SecretStore;
use crate::error::Result;
use crate::readiness::ARGOCD_NAMESPACE;
use crate::resources::FIELD_MANAGER;

/// Prefix of every Secret written by this store
pub const K8S_SECRET_PREFIX: &str = "cnoe-ref-impl-";

/// Data key holding the payload JSON
pub const SECRET_DATA_KEY: &str = "value";

const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Build the Secret manifest for a payload
pub fn secret_manifest(payload: &SecretPayload, namespace: &str) -> Result<Secret> {
    let json = payload.to_json()?;

    let mut labels = BTreeMap::new();
    labels.insert(MANAGED_BY_LABEL.to_string(), FIELD_MANAGER.to_string());

    let mut data = BTreeMap::new();
    data.insert(SECRET_DATA_KEY.to_string(), ByteString(json.into_bytes()));

    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(format!("{}{}", K8S_SECRET_PREFIX, payload.name())),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        data: Some(data),
        ..Default::default()
    })
}

/// Kubernetes Secrets store
pub struct KubeSecretStore {
    client: Client,
    namespace: String,
}

impl KubeSecretStore {
    /// Store Secrets in the Argo CD namespace
    pub fn new(client: Client) -> Self {
        Self::with_namespace(client, ARGOCD_NAMESPACE)
    }

    pub fn with_namespace(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn secrets_api(&self) -> Api<Secret> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    /// Apply the namespace so the first run on a fresh cluster works
    async fn ensure_namespace(&self) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(self.namespace.clone()),
                ..Default::default()
            },
            ..Default::default()
        };
        api.patch(
            &self.namespace,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Apply(&namespace),
        )
        .await?;
        Ok(())
    }

    async fn apply(&self, payload: &SecretPayload) -> Result<()> {
        let secret = secret_manifest(payload, &self.namespace)?;
        let name = self.entry_name(payload);
        let params = PatchParams::apply(FIELD_MANAGER).force();
        self.secrets_api()
            .patch(&name, &params, &Patch::Apply(&secret))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    fn name(&self) -> &str {
        "kubernetes"
    }

    fn entry_name(&self, payload: &SecretPayload) -> String {
        format!("{}{}", K8S_SECRET_PREFIX, payload.name())
    }

    /// Plain create; an existing Secret fails with a conflict
    async fn create(&self, payload: &SecretPayload) -> Result<()> {
        self.ensure_namespace().await?;
        let secret = secret_manifest(payload, &self.namespace)?;
        self.secrets_api()
            .create(&PostParams::default(), &secret)
            .await?;
        Ok(())
    }

    /// Server-Side Apply, taking ownership of every field
    async fn update(&self, payload: &SecretPayload) -> Result<()> {
        self.apply(payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KubeError;
    use serde_json::json;

    #[test]
    fn test_secret_manifest() {
        let payload = SecretPayload::new(
            "github-app",
            json!({"a": {"appId": 1}, "b": {"appId": 2}}),
        );

        let secret = secret_manifest(&payload, "argocd").unwrap();

        assert_eq!(
            secret.metadata.name.as_deref(),
            Some("cnoe-ref-impl-github-app")
        );
        assert_eq!(secret.metadata.namespace.as_deref(), Some("argocd"));
        assert_eq!(secret.type_.as_deref(), Some("Opaque"));
        assert_eq!(
            secret.metadata.labels.unwrap().get(MANAGED_BY_LABEL).map(String::as_str),
            Some("refimpl")
        );

        let data = secret.data.unwrap();
        assert_eq!(data.len(), 1);
        let stored: serde_json::Value = serde_json::from_slice(&data[SECRET_DATA_KEY].0).unwrap();
        assert_eq!(stored, json!({"a": {"appId": 1}, "b": {"appId": 2}}));
    }

    #[tokio::test]
    async fn test_upsert_tries_create_then_update() {
        // Nothing listens here, so both the POST and the apply fail
        let config = kube::Config::new("http://127.0.0.1:1".parse().unwrap());
        let store = KubeSecretStore::new(Client::try_from(config).unwrap());
        let payload = SecretPayload::new("config", json!({"cluster_name": "demo"}));

        let err = store.upsert(&payload).await.unwrap_err();

        match err {
            KubeError::SecretWriteFailed { store, name, .. } => {
                assert_eq!(store, "kubernetes");
                assert_eq!(name, "cnoe-ref-impl-config");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_secret_manifest_serializes_type_meta() {
        let payload = SecretPayload::new("config", json!({"cluster_name": "demo"}));
        let secret = secret_manifest(&payload, "argocd").unwrap();

        let value = serde_json::to_value(&secret).unwrap();
        assert_eq!(value["apiVersion"], "v1");
        assert_eq!(value["kind"], "Secret");
    }
}
