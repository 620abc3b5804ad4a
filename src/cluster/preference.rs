// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Restore preference: archive path classification and staging-area indexes.
//!
//! Every archive entry is classified to exactly one [`Tier`], which decides
//! whether it is restored at all and in which pass. After extraction, the
//! preference scans the staging area once to index the ClusterRoleBindings
//! reachable from user-namespace ServiceAccounts and the Services whose
//! Endpoints must not be restored.

use super::{get_map, get_slice, load_item};
use crate::crd::RestorePreference;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

/// Restore tier of one archive entry. Controls restore order and inclusion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tier {
    Namespace,
    Crd,
    Pv,
    Pvc,
    App,
    Restore,
    Exclude,
}

impl Tier {
    /// Staging directory name of this tier.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Namespace => "Namespace",
            Tier::Crd => "CRD",
            Tier::Pv => "PV",
            Tier::Pvc => "PVC",
            Tier::App => "App",
            Tier::Restore => "Restore",
            Tier::Exclude => "Exclude",
        }
    }
}

/// Whether an archive path matches one exclude/app API-path entry.
///
/// An entry is a path prefix, optionally followed by `,substring`:
/// `/apis/apps/v1` matches by prefix alone, `/apis/apps/v1,deployments`
/// additionally requires the substring anywhere in the path.
#[must_use]
pub fn api_path_matched(path: &str, api_path: &str) -> bool {
    let mut parts = api_path.splitn(2, ',');
    let prefix = parts.next().unwrap_or_default();
    match parts.next() {
        None => path.starts_with(prefix),
        Some(substring) => path.starts_with(prefix) && path.contains(substring),
    }
}

/// A [`RestorePreference`] plus the indexes built from the staging area.
pub struct Preference {
    pref: RestorePreference,
    pub(crate) included_cluster_roles: Vec<String>,
    pub(crate) included_cluster_role_bindings: Vec<String>,
    pub(crate) service_list: Vec<String>,
    tiers: Vec<String>,
}

impl Preference {
    #[must_use]
    pub fn new(pref: &RestorePreference) -> Self {
        Self {
            pref: pref.clone(),
            included_cluster_roles: Vec::new(),
            included_cluster_role_bindings: Vec::new(),
            service_list: Vec::new(),
            tiers: Vec::new(),
        }
    }

    /// Classify an archive path (leading `/`, snapshot stem stripped) to its
    /// tier. First match wins.
    #[must_use]
    pub fn tier_for(&self, path: &str) -> Tier {
        let spec = &self.pref.spec;

        // namespace resources
        if path.starts_with("/namespaces/") {
            if spec.exclude_namespaces.iter().any(|n| path.contains(n)) {
                return Tier::Exclude;
            }
            return Tier::Namespace;
        }
        // crds
        if path.starts_with("/crds/") {
            if spec.exclude_crds.iter().any(|crd| path.contains(crd)) {
                return Tier::Exclude;
            }
            return Tier::Crd;
        }
        // excluded API pathes
        if spec
            .exclude_api_pathes
            .iter()
            .any(|p| api_path_matched(path, p))
        {
            return Tier::Exclude;
        }
        // excluded namespaces
        if spec
            .exclude_namespaces
            .iter()
            .any(|n| path.contains(&format!("namespaces/{n}")))
        {
            return Tier::Exclude;
        }
        // storage classes
        if path.contains("/storageclasses/") {
            if spec
                .restore_nfs_storage_classes
                .iter()
                .any(|s| path.contains(&format!("storageclasses/{s}")))
            {
                return Tier::Restore;
            }
            return Tier::Exclude;
        }
        // PV/PVC
        if path.contains("/persistentvolumes/") {
            return Tier::Pv;
        }
        if path.contains("/persistentvolumeclaims/") {
            return Tier::Pvc;
        }
        // application workloads
        if spec
            .restore_app_api_pathes
            .iter()
            .any(|p| api_path_matched(path, p))
        {
            return Tier::App;
        }
        Tier::Restore
    }

    /// Whether a namespace is a user namespace (not excluded).
    #[must_use]
    pub fn is_user_namespace(&self, namespace: &str) -> bool {
        !self
            .pref
            .spec
            .exclude_namespaces
            .iter()
            .any(|n| n == namespace)
    }

    /// Whether a storage class is eligible for PV/PVC restore (prefix match).
    #[must_use]
    pub fn is_included_storage_class(&self, storage_class: &str) -> bool {
        self.pref
            .spec
            .restore_nfs_storage_classes
            .iter()
            .any(|s| storage_class.starts_with(s))
    }

    /// Whether the staging area holds entries of this tier.
    #[must_use]
    pub fn has_tier(&self, tier: Tier) -> bool {
        self.tiers.iter().any(|t| t == tier.as_str())
    }

    /// Scan the staging area: record present tiers and build the
    /// cluster-role and service indexes from the `Restore` and `App` tiers.
    ///
    /// # Errors
    ///
    /// Fails on unreadable staging files.
    pub fn initialize_by_dir(&mut self, dir: &Path) -> Result<()> {
        self.tiers.clear();
        self.included_cluster_roles.clear();
        self.included_cluster_role_bindings.clear();
        self.service_list.clear();

        for entry in std::fs::read_dir(dir).context("reading staging dir")? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                self.tiers.push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        for tier in [Tier::Restore, Tier::App] {
            if self.has_tier(tier) {
                self.set_included_cluster_roles(dir, tier)?;
                self.set_service_list(dir, tier)?;
            }
        }
        Ok(())
    }

    /// Index ClusterRoleBindings with a ServiceAccount subject in a user
    /// namespace; both the binding and its roleRef target are included.
    fn set_included_cluster_roles(&mut self, dir: &Path, tier: Tier) -> Result<()> {
        info!("Included ClusterRoles : {}", tier.as_str());
        for file in staged_files(dir, tier)? {
            let file_name = file.file_name().unwrap_or_default().to_string_lossy();
            if !file_name.contains("|clusterrolebindings|") {
                continue;
            }
            let item = load_item(&file)?;
            let Some(subjects) = get_slice(&item.data, "subjects") else {
                continue;
            };
            let include = subjects.iter().any(|sub| {
                sub.as_object().is_some_and(|s| {
                    s.get("kind").and_then(|k| k.as_str()) == Some("ServiceAccount")
                        && self.is_user_namespace(
                            s.get("namespace").and_then(|n| n.as_str()).unwrap_or(""),
                        )
                })
            });
            if include {
                let Some(roleref) = get_map(&item.data, "roleRef") else {
                    continue;
                };
                let rolename = roleref.get("name").and_then(|n| n.as_str()).unwrap_or("");
                if !rolename.is_empty() {
                    let binding = item.metadata.name.clone().unwrap_or_default();
                    info!("---- {rolename} referenced in {binding}");
                    self.included_cluster_roles.push(rolename.to_string());
                    self.included_cluster_role_bindings.push(binding);
                }
            }
        }
        Ok(())
    }

    /// Index Services so their Endpoints are skipped on restore.
    fn set_service_list(&mut self, dir: &Path, tier: Tier) -> Result<()> {
        info!("Included Services : {}", tier.as_str());
        for file in staged_files(dir, tier)? {
            let file_name = file.file_name().unwrap_or_default().to_string_lossy();
            if !file_name.contains("|services|") {
                continue;
            }
            let item = load_item(&file)?;
            let service = format!(
                "{}/{}",
                item.metadata.namespace.as_deref().unwrap_or_default(),
                item.metadata.name.as_deref().unwrap_or_default()
            );
            info!("---- {service}");
            self.service_list.push(service);
        }
        Ok(())
    }
}

/// Sorted staged files of one tier directory.
pub(crate) fn staged_files(dir: &Path, tier: Tier) -> Result<Vec<std::path::PathBuf>> {
    let tier_dir = dir.join(tier.as_str());
    let mut files = Vec::new();
    for entry in std::fs::read_dir(&tier_dir)
        .with_context(|| format!("reading staging dir {}", tier_dir.display()))?
    {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Whether a string is in a list (exact match).
pub(crate) fn is_in_list(name: &str, list: &[String]) -> bool {
    list.iter().any(|s| s == name)
}

#[cfg(test)]
#[path = "preference_tests.rs"]
mod preference_tests;
