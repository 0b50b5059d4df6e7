//! Applying manifests and removing CRDs
//!
//! Works like `kubectl apply -f <dir>`: every YAML document is applied with
//! Server-Side Apply, resolving its type through API discovery. Cluster-wide
//! types (CRDs, namespaces) go first so the objects that depend on them can
//! be resolved afterwards.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{
    Client,
    api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams},
    core::{GroupVersionKind, TypeMeta},
    discovery::{ApiCapabilities, ApiResource, Discovery, Scope},
};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{KubeError, Result};

/// Field manager name for Server-Side Apply
pub const FIELD_MANAGER: &str = "refimpl";

/// Summary of apply/delete operations
#[derive(Debug, Clone, Default)]
pub struct OperationSummary {
    /// Successfully processed resources
    pub succeeded: Vec<String>,
    /// Failed resources with errors
    pub failed: Vec<(String, String)>,
    /// Skipped resources with the reason
    pub skipped: Vec<(String, String)>,
}

impl OperationSummary {
    /// Check if all operations succeeded
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Get total count
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.skipped.len()
    }

    /// Format as human-readable summary
    pub fn summary(&self) -> String {
        let mut parts = Vec::with_capacity(3);
        if !self.succeeded.is_empty() {
            parts.push(format!("{} succeeded", self.succeeded.len()));
        }
        if !self.failed.is_empty() {
            parts.push(format!("{} failed", self.failed.len()));
        }
        if !self.skipped.is_empty() {
            parts.push(format!("{} skipped", self.skipped.len()));
        }
        if parts.is_empty() {
            "No resources processed".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Apply order: lower ranks first, unknown kinds (custom resources) last
pub fn apply_rank(kind: &str) -> u8 {
    match kind {
        "CustomResourceDefinition" => 0,
        "Namespace" => 1,
        "ServiceAccount" | "ClusterRole" | "ClusterRoleBinding" | "Role" | "RoleBinding" => 2,
        "ConfigMap" | "Secret" => 3,
        "Service" => 4,
        "Deployment" | "StatefulSet" | "DaemonSet" | "Job" => 5,
        _ => 6,
    }
}

/// Split a multi-document manifest into objects, in document order
pub fn parse_manifest(manifest: &str) -> Result<Vec<DynamicObject>> {
    let mut objects = Vec::new();

    for (index, doc) in manifest.split("\n---").enumerate() {
        let doc = doc.trim().trim_start_matches("---").trim();
        if doc
            .lines()
            .all(|l| l.trim().is_empty() || l.trim().starts_with('#'))
        {
            continue;
        }

        let obj: DynamicObject = serde_yaml::from_str(doc).map_err(|e| {
            KubeError::InvalidManifest(format!("document {}: {}", index, e))
        })?;
        if obj.types.is_none() {
            return Err(KubeError::InvalidManifest(format!(
                "document {}: missing apiVersion or kind",
                index
            )));
        }
        if obj.metadata.name.is_none() {
            return Err(KubeError::InvalidManifest(format!(
                "document {}: missing metadata.name",
                index
            )));
        }
        objects.push(obj);
    }

    Ok(objects)
}

/// YAML files directly inside `dir`, sorted by name
pub fn manifest_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(refimpl_core::CoreError::DirectoryMissing {
            path: dir.display().to_string(),
        }
        .into());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| KubeError::Io(std::io::Error::other(e.to_string())))?;
        let is_yaml = matches!(
            entry.path().extension().and_then(|e| e.to_str()),
            Some("yaml" | "yml")
        );
        if entry.file_type().is_file() && is_yaml {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// CRD names whose API group is one of `groups`
pub fn crds_in_groups<'a>(
    crds: &'a [CustomResourceDefinition],
    groups: &[String],
) -> Vec<&'a str> {
    crds.iter()
        .filter(|crd| groups.iter().any(|g| *g == crd.spec.group))
        .filter_map(|crd| crd.metadata.name.as_deref())
        .collect()
}

fn display_name(obj: &DynamicObject) -> String {
    let kind = obj.types.as_ref().map(|t| t.kind.as_str()).unwrap_or("?");
    let name = obj.metadata.name.as_deref().unwrap_or("unnamed");
    match &obj.metadata.namespace {
        Some(ns) => format!("{}/{}/{}", ns, kind, name),
        None => format!("{}/{}", kind, name),
    }
}

/// Convert TypeMeta to GroupVersionKind
///
/// - "apps/v1" -> group="apps", version="v1"
/// - "v1" -> group="", version="v1" (core API)
fn gvk_from_type_meta(tm: &TypeMeta) -> GroupVersionKind {
    let (group, version) = match tm.api_version.rsplit_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), tm.api_version.clone()),
    };

    GroupVersionKind {
        group,
        version,
        kind: tm.kind.clone(),
    }
}

/// Resource manager for applying manifests and deleting CRDs
pub struct ResourceManager {
    client: Client,
    discovery: Discovery,
}

impl ResourceManager {
    /// Create a new ResourceManager, running discovery once
    pub async fn new(client: Client) -> Result<Self> {
        let discovery = Discovery::new(client.clone()).run().await?;
        Ok(Self { client, discovery })
    }

    /// Refresh discovery cache (call after CRD changes)
    pub async fn refresh_discovery(&mut self) -> Result<()> {
        self.discovery = Discovery::new(self.client.clone()).run().await?;
        Ok(())
    }

    /// Apply every YAML file in `dir`
    pub async fn apply_directory(
        &mut self,
        namespace: &str,
        dir: &Path,
    ) -> Result<OperationSummary> {
        let mut objects = Vec::new();
        for file in manifest_files(dir)? {
            let manifest = std::fs::read_to_string(&file)?;
            let parsed = parse_manifest(&manifest).map_err(|e| {
                KubeError::InvalidManifest(format!("{}: {}", file.display(), e))
            })?;
            tracing::debug!(file = %file.display(), resources = parsed.len(), "parsed manifest");
            objects.extend(parsed);
        }

        if objects.is_empty() {
            return Err(refimpl_core::CoreError::NoInputFiles {
                path: dir.display().to_string(),
                extension: "yaml".to_string(),
            }
            .into());
        }

        self.apply_objects(namespace, objects).await
    }

    /// Apply a manifest string (one or more documents)
    pub async fn apply_manifest(
        &mut self,
        namespace: &str,
        manifest: &str,
    ) -> Result<OperationSummary> {
        let objects = parse_manifest(manifest)?;
        self.apply_objects(namespace, objects).await
    }

    async fn apply_objects(
        &mut self,
        namespace: &str,
        mut objects: Vec<DynamicObject>,
    ) -> Result<OperationSummary> {
        // Stable sort keeps document order within a rank
        objects.sort_by_key(|o| {
            apply_rank(o.types.as_ref().map(|t| t.kind.as_str()).unwrap_or(""))
        });

        let mut summary = OperationSummary::default();
        let mut crds_applied = false;

        for obj in objects {
            let mut resolved = self.resolve(&obj);
            if resolved.is_none() && crds_applied {
                self.refresh_discovery().await?;
                crds_applied = false;
                resolved = self.resolve(&obj);
            }

            let name = display_name(&obj);
            let Some((api_resource, capabilities)) = resolved else {
                summary.failed.push((name, "unknown resource type".to_string()));
                continue;
            };

            let is_crd = api_resource.kind == "CustomResourceDefinition";
            match self.apply_one(obj, namespace, &api_resource, &capabilities).await {
                Ok(applied) => {
                    tracing::info!(resource = %applied, "applied");
                    summary.succeeded.push(applied);
                    crds_applied |= is_crd;
                }
                Err(e) => {
                    tracing::warn!(resource = %name, error = %e, "apply failed");
                    summary.failed.push((name, e.to_string()));
                }
            }
        }

        Ok(summary)
    }

    fn resolve(&self, obj: &DynamicObject) -> Option<(ApiResource, ApiCapabilities)> {
        let gvk = gvk_from_type_meta(obj.types.as_ref()?);
        self.discovery.resolve_gvk(&gvk)
    }

    async fn apply_one(
        &self,
        mut obj: DynamicObject,
        default_namespace: &str,
        api_resource: &ApiResource,
        capabilities: &ApiCapabilities,
    ) -> Result<String> {
        let api: Api<DynamicObject> = if capabilities.scope == Scope::Namespaced {
            let ns = obj
                .metadata
                .namespace
                .get_or_insert_with(|| default_namespace.to_string())
                .clone();
            Api::namespaced_with(self.client.clone(), &ns, api_resource)
        } else {
            Api::all_with(self.client.clone(), api_resource)
        };

        let name = obj
            .metadata
            .name
            .clone()
            .ok_or_else(|| KubeError::InvalidManifest("missing metadata.name".to_string()))?;

        api.patch(&name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(&obj))
            .await?;
        Ok(display_name(&obj))
    }

    /// Delete every CRD belonging to one of `groups`
    pub async fn delete_crds(&self, groups: &[String]) -> Result<OperationSummary> {
        let api: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        let crds = api.list(&ListParams::default()).await?.items;
        let targets = crds_in_groups(&crds, groups);

        let mut summary = OperationSummary::default();
        for name in targets {
            let label = format!("CustomResourceDefinition/{}", name);
            match api.delete(name, &DeleteParams::background()).await {
                Ok(_) => {
                    tracing::info!(crd = name, "deleted");
                    summary.succeeded.push(label);
                }
                Err(kube::Error::Api(resp)) if resp.code == 404 => {
                    summary.skipped.push((label, "not found".to_string()));
                }
                Err(e) => {
                    tracing::warn!(crd = name, error = %e, "delete failed");
                    summary.failed.push((label, e.to_string()));
                }
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1 as apiextensions;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::fs;

    fn crd(name: &str, group: &str) -> CustomResourceDefinition {
        CustomResourceDefinition {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: apiextensions::CustomResourceDefinitionSpec {
                group: group.to_string(),
                ..Default::default()
            },
            status: None,
        }
    }

    #[test]
    fn test_parse_manifest_multi_document() {
        let manifest = r#"
# argocd bootstrap
apiVersion: v1
kind: Namespace
metadata:
  name: argocd
---
# comment only
---
apiVersion: argoproj.io/v1alpha1
kind: Application
metadata:
  name: addons-appset
  namespace: argocd
spec:
  project: default
"#;
        let objects = parse_manifest(manifest).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].types.as_ref().unwrap().kind, "Namespace");
        assert_eq!(objects[1].metadata.name.as_deref(), Some("addons-appset"));
        assert_eq!(objects[1].data["spec"]["project"], "default");
    }

    #[test]
    fn test_parse_manifest_leading_separator() {
        let manifest = "---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n";
        let objects = parse_manifest(manifest).unwrap();
        assert_eq!(objects.len(), 1);
    }

    #[test]
    fn test_parse_manifest_missing_kind() {
        let err = parse_manifest("metadata:\n  name: a\n").unwrap_err();
        assert!(matches!(err, KubeError::InvalidManifest(_)));
    }

    #[test]
    fn test_parse_manifest_missing_name() {
        let err = parse_manifest("apiVersion: v1\nkind: ConfigMap\nmetadata: {}\n").unwrap_err();
        assert!(err.to_string().contains("metadata.name"));
    }

    #[test]
    fn test_apply_rank() {
        assert!(apply_rank("CustomResourceDefinition") < apply_rank("Namespace"));
        assert!(apply_rank("Namespace") < apply_rank("ClusterRole"));
        assert!(apply_rank("ConfigMap") < apply_rank("Deployment"));
        assert!(apply_rank("Deployment") < apply_rank("Application"));
    }

    #[test]
    fn test_gvk_from_type_meta() {
        let gvk = gvk_from_type_meta(&TypeMeta {
            api_version: "argoproj.io/v1alpha1".to_string(),
            kind: "Application".to_string(),
        });
        assert_eq!(gvk.group, "argoproj.io");
        assert_eq!(gvk.version, "v1alpha1");

        let core = gvk_from_type_meta(&TypeMeta {
            api_version: "v1".to_string(),
            kind: "ConfigMap".to_string(),
        });
        assert_eq!(core.group, "");
        assert_eq!(core.version, "v1");
    }

    #[test]
    fn test_crds_in_groups() {
        let crds = vec![
            crd("applications.argoproj.io", "argoproj.io"),
            crd("certificates.cert-manager.io", "cert-manager.io"),
            crd("widgets.example.com", "example.com"),
        ];
        let groups = vec!["argoproj.io".to_string(), "cert-manager.io".to_string()];

        assert_eq!(
            crds_in_groups(&crds, &groups),
            vec!["applications.argoproj.io", "certificates.cert-manager.io"]
        );
        assert!(crds_in_groups(&crds, &[]).is_empty());
    }

    #[test]
    fn test_crds_in_groups_exact_match() {
        let crds = vec![crd("providers.pkg.crossplane.io", "pkg.crossplane.io")];
        assert!(crds_in_groups(&crds, &["crossplane.io".to_string()]).is_empty());
    }

    #[test]
    fn test_manifest_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.yaml"), "").unwrap();
        fs::write(dir.path().join("a.yml"), "").unwrap();
        fs::write(dir.path().join("README.md"), "").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c.yaml"), "").unwrap();

        let files = manifest_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.yml", "b.yaml"]);
    }

    #[test]
    fn test_manifest_files_missing_dir() {
        let err = manifest_files(Path::new("/nonexistent/bootstrap")).unwrap_err();
        assert!(matches!(
            err,
            KubeError::Core(refimpl_core::CoreError::DirectoryMissing { .. })
        ));
    }

    #[test]
    fn test_operation_summary() {
        let mut summary = OperationSummary::default();
        assert_eq!(summary.summary(), "No resources processed");

        summary.succeeded.push("Namespace/argocd".to_string());
        summary
            .skipped
            .push(("CustomResourceDefinition/x".to_string(), "not found".to_string()));
        assert!(summary.is_success());
        assert_eq!(summary.total(), 2);
        assert_eq!(summary.summary(), "1 succeeded, 1 skipped");

        summary
            .failed
            .push(("argocd/Application/a".to_string(), "denied".to_string()));
        assert!(!summary.is_success());
        assert!(summary.summary().contains("1 failed"));
    }
}
