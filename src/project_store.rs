/// Project view storage: user-named collections of URLs with their own categories
use crate::backend::Backend;
use crate::category::{self, CategoryLedger};
use crate::clock::restamp;
use crate::domain_store::DomainStore;
use crate::error::{Error, Result};
use crate::storage::{self, keys};
use crate::sync::{self, MirrorStatus};
use crate::tab_data::{CustomProject, UrlEntry, UrlList, UrlRecords};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddUrlOutcome {
    /// false when the URL was already in the project and only its metadata changed
    pub inserted: bool,
    pub mirror: MirrorStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveUrlOutcome {
    pub removed: bool,
    pub mirror: MirrorStatus,
}

#[derive(Clone)]
pub struct ProjectStore {
    backend: Backend,
    domains: DomainStore,
}

impl ProjectStore {
    pub fn new(backend: Backend) -> ProjectStore {
        let domains = DomainStore::new(backend.clone());
        ProjectStore { backend, domains }
    }

    /// The domain store URL inserts and removals are mirrored into
    pub fn domains(&self) -> &DomainStore {
        &self.domains
    }

    async fn load_projects(&self) -> Result<Vec<CustomProject>> {
        storage::load_or_default(self.backend.store(), keys::CUSTOM_PROJECTS).await
    }

    async fn load_records(&self) -> Result<UrlRecords> {
        storage::load_or_default(self.backend.store(), keys::CUSTOM_PROJECT_URL_RECORDS).await
    }

    async fn commit(&self, projects: &[CustomProject], records: Option<&UrlRecords>) -> Result<()> {
        if let Some(records) = records {
            storage::save(self.backend.store(), keys::CUSTOM_PROJECT_URL_RECORDS, records).await?;
        }
        storage::save(self.backend.store(), keys::CUSTOM_PROJECTS, &projects).await
    }

    pub async fn list(&self) -> Result<Vec<CustomProject>> {
        self.load_projects().await
    }

    pub async fn get(&self, project_id: &str) -> Result<CustomProject> {
        self.load_projects()
            .await?
            .into_iter()
            .find(|p| p.id == project_id)
            .ok_or_else(|| Error::not_found("project", project_id))
    }

    pub async fn entries(&self, project_id: &str) -> Result<Vec<UrlEntry>> {
        let project = self.get(project_id).await?;
        Ok(project.url_list.resolve(&self.load_records().await?))
    }

    /// Every project with its URLs resolved
    pub async fn resolved(&self) -> Result<Vec<(CustomProject, Vec<UrlEntry>)>> {
        let records = self.load_records().await?;
        Ok(self
            .load_projects()
            .await?
            .into_iter()
            .map(|project| {
                let entries = project.url_list.resolve(&records);
                (project, entries)
            })
            .collect())
    }

    pub async fn project_order(&self) -> Result<Vec<String>> {
        storage::load_or_default(self.backend.store(), keys::CUSTOM_PROJECT_ORDER).await
    }

    /// Projects in display order: the saved order first, then the rest by creation time
    pub async fn ordered(&self) -> Result<Vec<CustomProject>> {
        let order = self.project_order().await?;
        let mut projects = self.load_projects().await?;
        let rank: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        projects.sort_by(|a, b| {
            let ra = rank.get(a.id.as_str()).copied().unwrap_or(usize::MAX);
            let rb = rank.get(b.id.as_str()).copied().unwrap_or(usize::MAX);
            ra.cmp(&rb).then(a.created_at.total_cmp(&b.created_at))
        });
        Ok(projects)
    }

    fn validate_name(projects: &[CustomProject], name: &str, except_id: Option<&str>) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("project", "name must not be empty"));
        }
        let lowered = name.to_lowercase();
        if projects
            .iter()
            .any(|p| Some(p.id.as_str()) != except_id && p.name.to_lowercase() == lowered)
        {
            return Err(Error::duplicate("project", name));
        }
        Ok(name.to_string())
    }

    pub async fn create(&self, name: &str, description: Option<&str>) -> Result<CustomProject> {
        let mut projects = self.load_projects().await?;
        let name = Self::validate_name(&projects, name, None)?;
        let now = self.backend.now();
        // Follow the store's current encoding
        let url_list = if projects.iter().any(|p| p.url_list.is_referenced()) {
            UrlList::Referenced { url_ids: Vec::new() }
        } else {
            UrlList::Inline { urls: Vec::new() }
        };
        let project = CustomProject {
            id: Uuid::new_v4().to_string(),
            name,
            description: description
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            url_list,
            categories: Vec::new(),
            category_order: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        projects.push(project.clone());
        self.commit(&projects, None).await?;
        log::info!("Created project {}", project.name);
        Ok(project)
    }

    /// Load, edit and write back one project, restamping `updatedAt`
    async fn edit_project<T, F>(&self, project_id: &str, edit: F) -> Result<T>
    where
        F: FnOnce(&mut CustomProject, &mut Vec<UrlEntry>) -> Result<T>,
    {
        let mut projects = self.load_projects().await?;
        let mut records = self.load_records().await?;
        let Some(project) = projects.iter_mut().find(|p| p.id == project_id) else {
            return Err(Error::not_found("project", project_id));
        };

        let mut entries = project.url_list.resolve(&records);
        let value = edit(project, &mut entries)?;
        project.url_list.store(entries, &mut records);
        project.updated_at = restamp(self.backend.now(), project.updated_at);
        let referenced = project.url_list.is_referenced();

        self.commit(&projects, referenced.then_some(&records)).await?;
        Ok(value)
    }

    pub async fn rename_project(&self, project_id: &str, name: &str) -> Result<()> {
        let projects = self.load_projects().await?;
        let name = Self::validate_name(&projects, name, Some(project_id))?;
        self.edit_project(project_id, |project, _| {
            project.name = name;
            Ok(())
        })
        .await
    }

    pub async fn update_description(&self, project_id: &str, description: Option<String>) -> Result<()> {
        self.edit_project(project_id, |project, _| {
            project.description = description.filter(|d| !d.trim().is_empty());
            Ok(())
        })
        .await
    }

    /// Delete a project; its URLs stay in the domain view
    pub async fn delete_project(&self, project_id: &str) -> Result<()> {
        let mut projects = self.load_projects().await?;
        let Some(index) = projects.iter().position(|p| p.id == project_id) else {
            return Err(Error::not_found("project", project_id));
        };
        let project = projects.remove(index);

        if project.url_list.is_referenced() {
            let mut records = self.load_records().await?;
            project.url_list.release(&mut records);
            self.commit(&projects, Some(&records)).await?;
        } else {
            self.commit(&projects, None).await?;
        }

        let mut order = self.project_order().await?;
        let before = order.len();
        order.retain(|id| id != project_id);
        if order.len() != before {
            storage::save(self.backend.store(), keys::CUSTOM_PROJECT_ORDER, &order).await?;
        }
        log::info!("Deleted project {}", project.name);
        Ok(())
    }

    /// Add a URL, or refresh its metadata if the project already has it
    ///
    /// New URLs are mirrored into the domain view after the project write.
    /// A category the project lacks is added to its ledger.
    pub async fn add_url(
        &self,
        project_id: &str,
        url: &str,
        title: &str,
        notes: Option<String>,
        category: Option<String>,
    ) -> Result<AddUrlOutcome> {
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::validation("url", "must not be empty"));
        }
        let category = category.map(|c| CategoryLedger::validate_name(&c)).transpose()?;
        let now = self.backend.now();

        let added = self
            .edit_project(project_id, |project, entries| {
                if let Some(name) = &category {
                    CategoryLedger::new(&mut project.categories, &mut project.category_order).add(name);
                }
                if let Some(existing) = entries.iter_mut().find(|e| e.url == url) {
                    existing.title = title.to_string();
                    existing.saved_at = Some(now);
                    if notes.is_some() {
                        existing.notes = notes;
                    }
                    if category.is_some() {
                        existing.category = category;
                    }
                    return Ok(None);
                }
                let entry = UrlEntry {
                    notes,
                    category,
                    ..UrlEntry::new(url, title, now)
                };
                entries.push(entry.clone());
                Ok(Some(entry))
            })
            .await?;

        let Some(entry) = added else {
            log::debug!("Updated {} in project {}", url, project_id);
            return Ok(AddUrlOutcome {
                inserted: false,
                mirror: MirrorStatus::NotAttempted,
            });
        };
        log::debug!("Added {} to project {}", url, project_id);
        let mirror = sync::mirror_insert(&self.domains, &entry).await;
        Ok(AddUrlOutcome {
            inserted: true,
            mirror,
        })
    }

    /// Remove a URL, then best-effort remove it from the domain view
    pub async fn remove_url(&self, project_id: &str, url: &str) -> Result<RemoveUrlOutcome> {
        let removed = self
            .edit_project(project_id, |_, entries| {
                let before = entries.len();
                entries.retain(|e| e.url != url);
                Ok(entries.len() != before)
            })
            .await?;

        if !removed {
            return Ok(RemoveUrlOutcome {
                removed,
                mirror: MirrorStatus::NotAttempted,
            });
        }
        let mirror = sync::mirror_remove(&self.domains, url).await;
        Ok(RemoveUrlOutcome { removed, mirror })
    }

    /// `None` moves the URL to uncategorized; unknown categories join the ledger
    pub async fn set_url_category(&self, project_id: &str, url: &str, category: Option<String>) -> Result<()> {
        let category = category.map(|c| CategoryLedger::validate_name(&c)).transpose()?;
        self.edit_project(project_id, |project, entries| {
            let Some(entry) = entries.iter_mut().find(|e| e.url == url) else {
                return Err(Error::not_found("url", url));
            };
            if let Some(name) = &category {
                CategoryLedger::new(&mut project.categories, &mut project.category_order).add(name);
            }
            entry.category = category;
            Ok(())
        })
        .await
    }

    /// Reorder URLs by the given sequence; unlisted URLs keep their relative order at the end
    pub async fn reorder_project_urls(&self, project_id: &str, urls: &[String]) -> Result<()> {
        self.edit_project(project_id, |_, entries| {
            let rank: HashMap<&str, usize> = urls
                .iter()
                .enumerate()
                .map(|(i, url)| (url.as_str(), i))
                .collect();
            entries.sort_by_key(|e| rank.get(e.url.as_str()).copied().unwrap_or(usize::MAX));
            Ok(())
        })
        .await
    }

    pub async fn add_category(&self, project_id: &str, name: &str) -> Result<bool> {
        let name = CategoryLedger::validate_name(name)?;
        self.edit_project(project_id, |project, _| {
            Ok(CategoryLedger::new(&mut project.categories, &mut project.category_order).add(&name))
        })
        .await
    }

    /// Drop a category; its URLs become uncategorized
    pub async fn remove_category_from_project(&self, project_id: &str, name: &str) -> Result<()> {
        self.edit_project(project_id, |project, entries| {
            let removed = CategoryLedger::new(&mut project.categories, &mut project.category_order).remove(name);
            if let Some(removed) = removed {
                let moved = category::uncategorize(entries, &removed);
                log::debug!("Removed category {} ({} URLs uncategorized)", removed.name, moved);
            }
            Ok(())
        })
        .await
    }

    pub async fn rename_category_in_project(&self, project_id: &str, old: &str, new: &str) -> Result<()> {
        let new = CategoryLedger::validate_name(new)?;
        self.edit_project(project_id, |project, entries| {
            CategoryLedger::new(&mut project.categories, &mut project.category_order).rename(old, &new)?;
            category::recategorize(entries, old, &new);
            Ok(())
        })
        .await
    }

    pub async fn update_category_order(&self, project_id: &str, order: Vec<String>) -> Result<()> {
        self.edit_project(project_id, |project, _| {
            CategoryLedger::new(&mut project.categories, &mut project.category_order).reorder(order);
            Ok(())
        })
        .await
    }

    /// Persist the project list order and touch every project's `updatedAt`
    ///
    /// The touch is not a content change; consumers using `updatedAt` for
    /// change detection see every project as modified.
    pub async fn update_project_order(&self, ids: Vec<String>) -> Result<()> {
        storage::save(self.backend.store(), keys::CUSTOM_PROJECT_ORDER, &ids).await?;

        let mut projects = self.load_projects().await?;
        let now = self.backend.now();
        for project in projects.iter_mut() {
            project.updated_at = restamp(now, project.updated_at);
        }
        self.commit(&projects, None).await
    }

    /// Convert every inline project to the id-referenced encoding
    pub async fn migrate_url_encoding(&self) -> Result<usize> {
        let mut projects = self.load_projects().await?;
        let mut records = self.load_records().await?;
        let migrated = projects
            .iter_mut()
            .map(|project| project.url_list.migrate(&mut records))
            .filter(|migrated| *migrated)
            .count();
        if migrated > 0 {
            self.commit(&projects, Some(&records)).await?;
            log::info!("Migrated {} projects to referenced URLs", migrated);
        }
        Ok(migrated)
    }
}
