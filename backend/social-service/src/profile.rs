//! User profiles: load-or-create, field updates and section editing.
//!
//! Section edits read the viewer's cached profile, rewrite the whole list
//! field and write it back (last write wins per document). The service also
//! keeps a directory of every profile pushed by the `users` live query.

use crate::domain::models::{
    Achievement, Certificate, Education, Project, UserProfile, WorkExperience,
};
use crate::error::{ServiceError, ServiceResult};
use crate::mapping;
use chrono::Utc;
use document_store::{Collection, Document, DocumentStore, Patch, Query};
use identity_core::{IdentityProvider, UserId, Viewer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Scalar profile fields to overwrite; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub profile_picture: Option<String>,
    pub cover_photo: Option<String>,
    pub headline: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub linkedin: Option<String>,
}

impl ProfileUpdate {
    fn fields(&self) -> [(&'static str, &Option<String>); 9] {
        [
            ("displayName", &self.display_name),
            ("profilePicture", &self.profile_picture),
            ("coverPhoto", &self.cover_photo),
            ("headline", &self.headline),
            ("bio", &self.bio),
            ("location", &self.location),
            ("phone", &self.phone),
            ("website", &self.website),
            ("linkedin", &self.linkedin),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.fields().iter().all(|(_, value)| value.is_none())
    }

    fn apply_to(&self, profile: &mut UserProfile) {
        if let Some(name) = &self.display_name {
            profile.display_name = name.clone();
        }
        let targets = [
            (&self.profile_picture, &mut profile.profile_picture),
            (&self.cover_photo, &mut profile.cover_photo),
            (&self.headline, &mut profile.headline),
            (&self.bio, &mut profile.bio),
            (&self.location, &mut profile.location),
            (&self.phone, &mut profile.phone),
            (&self.website, &mut profile.website),
            (&self.linkedin, &mut profile.linkedin),
        ];
        for (update, target) in targets {
            if let Some(value) = update {
                *target = Some(value.clone());
            }
        }
    }
}

pub struct ProfileService {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
    current: RwLock<Option<UserProfile>>,
    directory: RwLock<BTreeMap<UserId, UserProfile>>,
}

fn new_item_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn index_in_range<T>(items: &[T], index: usize, section: &str) -> ServiceResult<()> {
    if index >= items.len() {
        return Err(ServiceError::NotFound(format!("{section} entry {index}")));
    }
    Ok(())
}

fn position_by_id<T, F>(items: &[T], id: &str, item_id: F, section: &str) -> ServiceResult<usize>
where
    F: Fn(&T) -> &str,
{
    items
        .iter()
        .position(|item| item_id(item) == id)
        .ok_or_else(|| ServiceError::NotFound(format!("{section} {id}")))
}

fn require_text(text: &str, what: &str) -> ServiceResult<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::InvalidInput(format!("{what} must not be empty")));
    }
    Ok(trimmed.to_string())
}

impl ProfileService {
    pub fn new(store: Arc<dyn DocumentStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            store,
            identity,
            current: RwLock::new(None),
            directory: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn watch_query() -> Query {
        Query::collection(Collection::Users)
    }

    /// Replace the directory of known users. Malformed profiles are skipped.
    pub fn apply_snapshot(&self, documents: &[Document]) -> usize {
        let mut next = BTreeMap::new();
        for doc in documents {
            match mapping::profile_from_document(doc) {
                Ok(profile) => {
                    next.insert(profile.id.clone(), profile);
                }
                Err(e) => warn!(user_id = %doc.id, error = %e, "Skipping malformed profile document"),
            }
        }

        let kept = next.len();
        *self.directory.write().unwrap_or_else(|e| e.into_inner()) = next;
        debug!(profiles = kept, "Profile directory applied");
        kept
    }

    /// Every known user id, in id order
    pub fn directory_ids(&self) -> Vec<UserId> {
        self.directory
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    pub fn directory_profile(&self, id: &UserId) -> Option<UserProfile> {
        self.directory
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// The viewer's cached profile, if loaded
    pub fn current(&self) -> Option<UserProfile> {
        self.current.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn cache(&self, profile: &UserProfile) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Some(profile.clone());
    }

    /// Read the viewer's profile, creating it from the viewer's identity
    /// fields when it does not exist yet.
    pub async fn load_or_create(&self) -> ServiceResult<UserProfile> {
        let viewer = self.identity.require_viewer()?;

        let profile = match self.store.get(Collection::Users, viewer.id.as_str()).await? {
            Some(doc) => {
                let mut profile = mapping::profile_from_document(&doc)?;
                fill_from_viewer(&mut profile, &doc, &viewer);
                profile
            }
            None => {
                let mut profile = UserProfile::basic(viewer.id.clone());
                profile.email = viewer.email.clone();
                if !viewer.display_name.trim().is_empty() {
                    profile.display_name = viewer.display_name.clone();
                }
                profile.profile_picture = viewer.profile_picture.clone();
                self.create(profile).await?
            }
        };

        self.cache(&profile);
        Ok(profile)
    }

    /// Read any user's profile; a missing one is created as a basic profile
    pub async fn profile_by_id(&self, id: &UserId) -> ServiceResult<UserProfile> {
        match self.store.get(Collection::Users, id.as_str()).await? {
            Some(doc) => Ok(mapping::profile_from_document(&doc)?),
            None => self.create(UserProfile::basic(id.clone())).await,
        }
    }

    async fn create(&self, mut profile: UserProfile) -> ServiceResult<UserProfile> {
        let now = Utc::now();
        profile.created_at = Some(now);
        profile.updated_at = Some(now);

        let fields = mapping::to_fields(&profile)?;
        self.store
            .set(Collection::Users, profile.id.as_str(), mapping::set_all(fields))
            .await?;
        info!(user_id = %profile.id, "Profile created");
        Ok(profile)
    }

    async fn viewer_profile(&self) -> ServiceResult<UserProfile> {
        let viewer = self.identity.require_viewer()?;
        match self.current() {
            Some(profile) if profile.id == viewer.id => Ok(profile),
            _ => self.load_or_create().await,
        }
    }

    pub async fn update_profile(&self, update: ProfileUpdate) -> ServiceResult<UserProfile> {
        let mut profile = self.viewer_profile().await?;

        let patch = update
            .fields()
            .into_iter()
            .filter_map(|(field, value)| value.as_ref().map(|v| (field, v.clone())))
            .fold(Patch::new(), |patch, (field, value)| patch.set(field, value))
            .server_timestamp("updatedAt");

        debug!(user_id = %profile.id, empty = update.is_empty(), "Updating profile");
        self.store
            .update(Collection::Users, profile.id.as_str(), patch)
            .await?;

        update.apply_to(&mut profile);
        profile.updated_at = Some(Utc::now());
        self.cache(&profile);
        info!(user_id = %profile.id, "Profile updated");
        Ok(profile)
    }

    /// Edit one list section of the viewer's profile and write that field
    async fn edit_section<F>(&self, field: &'static str, edit: F) -> ServiceResult<UserProfile>
    where
        F: FnOnce(&mut UserProfile) -> ServiceResult<()>,
    {
        let mut profile = self.viewer_profile().await?;
        edit(&mut profile)?;

        let value = mapping::to_fields(&profile)?
            .remove(field)
            .unwrap_or_else(|| serde_json::Value::Array(Vec::new()));
        let patch = Patch::new().set(field, value).server_timestamp("updatedAt");
        self.store
            .update(Collection::Users, profile.id.as_str(), patch)
            .await?;

        profile.updated_at = Some(Utc::now());
        self.cache(&profile);
        debug!(user_id = %profile.id, section = field, "Profile section updated");
        Ok(profile)
    }

    pub async fn add_skill(&self, skill: &str) -> ServiceResult<UserProfile> {
        let skill = require_text(skill, "skill")?;
        self.edit_section("skills", |p| {
            if !p.skills.contains(&skill) {
                p.skills.push(skill);
            }
            Ok(())
        })
        .await
    }

    pub async fn remove_skill(&self, skill: &str) -> ServiceResult<UserProfile> {
        self.edit_section("skills", |p| {
            p.skills.retain(|s| s != skill);
            Ok(())
        })
        .await
    }

    pub async fn add_language(&self, language: &str) -> ServiceResult<UserProfile> {
        let language = require_text(language, "language")?;
        self.edit_section("languages", |p| {
            if !p.languages.contains(&language) {
                p.languages.push(language);
            }
            Ok(())
        })
        .await
    }

    pub async fn remove_language(&self, language: &str) -> ServiceResult<UserProfile> {
        self.edit_section("languages", |p| {
            p.languages.retain(|l| l != language);
            Ok(())
        })
        .await
    }

    pub async fn add_education(&self, education: Education) -> ServiceResult<UserProfile> {
        self.edit_section("education", |p| {
            p.education.push(education);
            Ok(())
        })
        .await
    }

    pub async fn update_education(
        &self,
        index: usize,
        education: Education,
    ) -> ServiceResult<UserProfile> {
        self.edit_section("education", |p| {
            index_in_range(&p.education, index, "education")?;
            p.education[index] = education;
            Ok(())
        })
        .await
    }

    pub async fn remove_education(&self, index: usize) -> ServiceResult<UserProfile> {
        self.edit_section("education", |p| {
            index_in_range(&p.education, index, "education")?;
            p.education.remove(index);
            Ok(())
        })
        .await
    }

    pub async fn add_work_experience(
        &self,
        experience: WorkExperience,
    ) -> ServiceResult<UserProfile> {
        self.edit_section("workExperience", |p| {
            p.work_experience.push(experience);
            Ok(())
        })
        .await
    }

    pub async fn update_work_experience(
        &self,
        index: usize,
        experience: WorkExperience,
    ) -> ServiceResult<UserProfile> {
        self.edit_section("workExperience", |p| {
            index_in_range(&p.work_experience, index, "work experience")?;
            p.work_experience[index] = experience;
            Ok(())
        })
        .await
    }

    pub async fn remove_work_experience(&self, index: usize) -> ServiceResult<UserProfile> {
        self.edit_section("workExperience", |p| {
            index_in_range(&p.work_experience, index, "work experience")?;
            p.work_experience.remove(index);
            Ok(())
        })
        .await
    }

    /// Append an achievement under a freshly generated id
    pub async fn add_achievement(&self, mut achievement: Achievement) -> ServiceResult<UserProfile> {
        achievement.id = new_item_id();
        self.edit_section("achievements", |p| {
            p.achievements.push(achievement);
            Ok(())
        })
        .await
    }

    /// Replace the achievement with `id`, keeping its id
    pub async fn update_achievement(
        &self,
        id: &str,
        mut achievement: Achievement,
    ) -> ServiceResult<UserProfile> {
        self.edit_section("achievements", |p| {
            let at = position_by_id(&p.achievements, id, |a| a.id.as_str(), "achievement")?;
            achievement.id = id.to_string();
            p.achievements[at] = achievement;
            Ok(())
        })
        .await
    }

    pub async fn remove_achievement(&self, id: &str) -> ServiceResult<UserProfile> {
        self.edit_section("achievements", |p| {
            let at = position_by_id(&p.achievements, id, |a| a.id.as_str(), "achievement")?;
            p.achievements.remove(at);
            Ok(())
        })
        .await
    }

    pub async fn add_project(&self, mut project: Project) -> ServiceResult<UserProfile> {
        project.id = new_item_id();
        self.edit_section("projects", |p| {
            p.projects.push(project);
            Ok(())
        })
        .await
    }

    pub async fn update_project(&self, id: &str, mut project: Project) -> ServiceResult<UserProfile> {
        self.edit_section("projects", |p| {
            let at = position_by_id(&p.projects, id, |x| x.id.as_str(), "project")?;
            project.id = id.to_string();
            p.projects[at] = project;
            Ok(())
        })
        .await
    }

    pub async fn remove_project(&self, id: &str) -> ServiceResult<UserProfile> {
        self.edit_section("projects", |p| {
            let at = position_by_id(&p.projects, id, |x| x.id.as_str(), "project")?;
            p.projects.remove(at);
            Ok(())
        })
        .await
    }

    pub async fn add_certificate(&self, mut certificate: Certificate) -> ServiceResult<UserProfile> {
        certificate.id = new_item_id();
        self.edit_section("certificates", |p| {
            p.certificates.push(certificate);
            Ok(())
        })
        .await
    }

    pub async fn update_certificate(
        &self,
        id: &str,
        mut certificate: Certificate,
    ) -> ServiceResult<UserProfile> {
        self.edit_section("certificates", |p| {
            let at = position_by_id(&p.certificates, id, |c| c.id.as_str(), "certificate")?;
            certificate.id = id.to_string();
            p.certificates[at] = certificate;
            Ok(())
        })
        .await
    }

    pub async fn remove_certificate(&self, id: &str) -> ServiceResult<UserProfile> {
        self.edit_section("certificates", |p| {
            let at = position_by_id(&p.certificates, id, |c| c.id.as_str(), "certificate")?;
            p.certificates.remove(at);
            Ok(())
        })
        .await
    }

    pub async fn increment_profile_views(&self, id: &UserId) -> ServiceResult<()> {
        self.bump(id, "profileViews").await
    }

    pub async fn increment_post_impressions(&self, id: &UserId) -> ServiceResult<()> {
        self.bump(id, "postImpressions").await
    }

    async fn bump(&self, id: &UserId, counter: &'static str) -> ServiceResult<()> {
        self.store
            .update(Collection::Users, id.as_str(), Patch::new().increment(counter, 1))
            .await?;
        debug!(user_id = %id, counter, "Profile counter incremented");
        Ok(())
    }
}

/// Stored values win; blanks fall back to the identity provider
fn fill_from_viewer(profile: &mut UserProfile, doc: &Document, viewer: &Viewer) {
    if doc.get_str("email").map_or(true, str::is_empty) {
        profile.email = viewer.email.clone();
    }
    if doc.get_str("displayName").map_or(true, str::is_empty) && !viewer.display_name.is_empty() {
        profile.display_name = viewer.display_name.clone();
    }
    if profile.profile_picture.is_none() {
        profile.profile_picture = viewer.profile_picture.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_update_applies_only_given_fields() {
        let mut profile = UserProfile::basic(UserId::new("u1").unwrap());
        profile.bio = Some("old".to_string());

        let update = ProfileUpdate {
            headline: Some("Engineer".to_string()),
            ..ProfileUpdate::default()
        };
        assert!(!update.is_empty());
        update.apply_to(&mut profile);

        assert_eq!(profile.headline.as_deref(), Some("Engineer"));
        assert_eq!(profile.bio.as_deref(), Some("old"));
        assert!(ProfileUpdate::default().is_empty());
    }

    #[test]
    fn test_section_lookups() {
        let items = vec!["a".to_string(), "b".to_string()];
        assert!(index_in_range(&items, 1, "skills").is_ok());
        assert!(matches!(
            index_in_range(&items, 2, "skills"),
            Err(ServiceError::NotFound(_))
        ));
        assert_eq!(position_by_id(&items, "b", |s| s.as_str(), "skill").unwrap(), 1);
    }
}
