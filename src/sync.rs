/// Cross-view membership mirroring (project view -> domain view)
///
/// Only membership travels, and only one way: inserting into a project adds
/// the URL to its domain group, removing from a project removes it from
/// every domain group. Domain-side changes never reach projects.
///
/// Every mirror runs after the project write has been committed and inside
/// its own failure boundary. Nothing makes the pair atomic: if the second
/// step fails or another writer lands in between, the project holds a URL
/// the domain view lacks (or the reverse). [`audit`] finds the first case
/// and [`repair_missing_mirrors`] re-applies the insert mirror.
use crate::domain_store::{DomainStore, MirrorInsert};
use crate::error::Result;
use crate::project_store::ProjectStore;
use crate::tab_data::{CustomProject, TabGroup, UrlEntry};
use std::collections::HashSet;

/// What happened on the domain side of a project write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorStatus {
    /// The project write did not call for a mirror
    NotAttempted,
    Inserted { group_id: String, created_group: bool },
    AlreadyPresent { group_id: String },
    Removed { emptied_groups: Vec<String> },
    /// Non-fatal; the project side is already committed
    Failed { warning: String },
}

impl MirrorStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, MirrorStatus::Failed { .. })
    }
}

pub async fn mirror_insert(domains: &DomainStore, entry: &UrlEntry) -> MirrorStatus {
    match domains.mirror_url(entry).await {
        Ok(MirrorInsert::Inserted {
            group_id,
            created_group,
        }) => {
            log::debug!("Mirrored {} into tab group {}", entry.url, group_id);
            MirrorStatus::Inserted {
                group_id,
                created_group,
            }
        }
        Ok(MirrorInsert::AlreadyPresent { group_id }) => MirrorStatus::AlreadyPresent { group_id },
        Err(e) => {
            let warning = format!("Saved to project, but not to the domain view: {}", e);
            log::warn!("{}", warning);
            MirrorStatus::Failed { warning }
        }
    }
}

pub async fn mirror_remove(domains: &DomainStore, url: &str) -> MirrorStatus {
    match domains.remove_url_everywhere(url).await {
        Ok(emptied_groups) => MirrorStatus::Removed { emptied_groups },
        Err(e) => {
            let warning = format!("Removed from project, but not from the domain view: {}", e);
            log::warn!("{}", warning);
            MirrorStatus::Failed { warning }
        }
    }
}

/// A project URL that no domain group holds
#[derive(Debug, Clone, PartialEq)]
pub struct MissingMirror {
    pub project_id: String,
    pub entry: UrlEntry,
}

/// Project URLs without domain-view membership
///
/// Besides interrupted mirrors this also reports URLs deliberately removed
/// from the domain view (or expired there), which is legitimate.
pub fn audit(
    projects: &[(CustomProject, Vec<UrlEntry>)],
    groups: &[(TabGroup, Vec<UrlEntry>)],
) -> Vec<MissingMirror> {
    let indexed: HashSet<&str> = groups
        .iter()
        .flat_map(|(_, entries)| entries.iter().map(|e| e.url.as_str()))
        .collect();

    projects
        .iter()
        .flat_map(|(project, entries)| {
            entries
                .iter()
                .filter(|e| !indexed.contains(e.url.as_str()))
                .map(|entry| MissingMirror {
                    project_id: project.id.clone(),
                    entry: entry.clone(),
                })
        })
        .collect()
}

/// Re-apply the insert mirror for every project URL the domain view lacks
pub async fn repair_missing_mirrors(projects: &ProjectStore) -> Result<Vec<MissingMirror>> {
    let missing = audit(&projects.resolved().await?, &projects.domains().resolved().await?);
    let mut repaired = Vec::with_capacity(missing.len());
    for item in missing {
        if mirror_insert(projects.domains(), &item.entry).await.is_failed() {
            continue;
        }
        repaired.push(item);
    }
    if !repaired.is_empty() {
        log::info!("Re-mirrored {} project URLs into the domain view", repaired.len());
    }
    Ok(repaired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::keys;
    use crate::testing::harness;
    use futures::executor::block_on;

    #[test]
    fn test_interrupted_mirror_is_non_fatal_and_repairable() {
        let h = harness();
        let projects = ProjectStore::new(h.backend.clone());

        block_on(async {
            let project = projects.create("Research", None).await.unwrap();

            h.store.fail_writes_to(keys::SAVED_TABS);
            let outcome = projects
                .add_url(&project.id, "https://arxiv.org/abs/1", "Paper", None, None)
                .await
                .unwrap();
            assert!(outcome.mirror.is_failed());

            // Project side committed, domain side missing
            assert_eq!(projects.entries(&project.id).await.unwrap().len(), 1);
            let missing = audit(&projects.resolved().await.unwrap(), &projects.domains().resolved().await.unwrap());
            assert_eq!(missing.len(), 1);
            assert_eq!(missing[0].entry.url, "https://arxiv.org/abs/1");

            // Still broken while the store keeps failing
            assert!(repair_missing_mirrors(&projects).await.unwrap().is_empty());

            h.store.heal();
            let repaired = repair_missing_mirrors(&projects).await.unwrap();
            assert_eq!(repaired.len(), 1);
            let groups = projects.domains().resolved().await.unwrap();
            assert_eq!(groups.len(), 1);
            assert_eq!(groups[0].0.domain, "https://arxiv.org");
            assert!(repair_missing_mirrors(&projects).await.unwrap().is_empty());
        });
    }

    #[test]
    fn test_failed_removal_mirror_keeps_project_removal() {
        let h = harness();
        let projects = ProjectStore::new(h.backend.clone());

        block_on(async {
            let project = projects.create("Reading", None).await.unwrap();
            projects
                .add_url(&project.id, "https://blog.rust-lang.org/1", "Post", None, None)
                .await
                .unwrap();

            h.store.fail_writes_to(keys::SAVED_TABS);
            let outcome = projects
                .remove_url(&project.id, "https://blog.rust-lang.org/1")
                .await
                .unwrap();

            assert!(outcome.removed);
            assert!(outcome.mirror.is_failed());
            assert!(projects.entries(&project.id).await.unwrap().is_empty());
            // The stale domain membership survives
            assert_eq!(projects.domains().resolved().await.unwrap()[0].1.len(), 1);
        });
    }

    #[test]
    fn test_domain_removal_does_not_touch_projects() {
        let h = harness();
        let projects = ProjectStore::new(h.backend.clone());

        block_on(async {
            let project = projects.create("Keep", None).await.unwrap();
            projects
                .add_url(&project.id, "https://a.com/x", "x", None, None)
                .await
                .unwrap();
            let group_id = projects.domains().get().await.unwrap()[0].id.clone();

            projects.domains().remove_url(&group_id, "https://a.com/x").await.unwrap();

            assert_eq!(projects.entries(&project.id).await.unwrap().len(), 1);
            let missing = audit(&projects.resolved().await.unwrap(), &projects.domains().resolved().await.unwrap());
            assert_eq!(missing.len(), 1);
        });
    }

    #[test]
    fn test_domain_save_does_not_create_project_membership() {
        let h = harness();
        let projects = ProjectStore::new(h.backend.clone());

        block_on(async {
            let project = projects.create("Empty", None).await.unwrap();
            projects
                .domains()
                .save_tab(
                    &crate::settings::UserSettings::default(),
                    UrlEntry::new("https://a.com/y", "y", 0.0),
                )
                .await
                .unwrap();

            assert!(projects.entries(&project.id).await.unwrap().is_empty());
        });
    }
}
