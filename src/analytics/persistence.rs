use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::analytics::error::PersistenceError;
use crate::analytics::types::{ActivityRecord, ElementPreferences, EngagementProfile, SkillProfile};

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn load_skill(
        &self,
        user_id: &str,
        topic_id: &str,
    ) -> Result<Option<SkillProfile>, PersistenceError>;

    async fn save_skill(&self, profile: &SkillProfile) -> Result<(), PersistenceError>;

    async fn list_skills(&self, user_id: &str) -> Result<Vec<SkillProfile>, PersistenceError>;

    async fn load_engagement(
        &self,
        user_id: &str,
    ) -> Result<Option<EngagementProfile>, PersistenceError>;

    async fn save_engagement(&self, profile: &EngagementProfile) -> Result<(), PersistenceError>;

    async fn load_preferences(
        &self,
        user_id: &str,
    ) -> Result<Option<ElementPreferences>, PersistenceError>;

    async fn save_preferences(
        &self,
        user_id: &str,
        preferences: &ElementPreferences,
    ) -> Result<(), PersistenceError>;
}

#[async_trait]
pub trait ActivityRepository: Send + Sync {
    async fn save_activity(&self, record: &ActivityRecord) -> Result<(), PersistenceError>;

    async fn load_activity(
        &self,
        activity_id: &str,
    ) -> Result<Option<ActivityRecord>, PersistenceError>;

    /// Activities of `user_id` created at or after `since`, oldest first.
    async fn activities_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActivityRecord>, PersistenceError>;
}

#[derive(Default)]
pub struct InMemoryProfileRepository {
    skills: RwLock<HashMap<(String, String), SkillProfile>>,
    engagement: RwLock<HashMap<String, EngagementProfile>>,
    preferences: RwLock<HashMap<String, ElementPreferences>>,
}

impl InMemoryProfileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skill_count(&self) -> usize {
        self.skills.read().len()
    }
}

#[async_trait]
impl ProfileRepository for InMemoryProfileRepository {
    async fn load_skill(
        &self,
        user_id: &str,
        topic_id: &str,
    ) -> Result<Option<SkillProfile>, PersistenceError> {
        let key = (user_id.to_string(), topic_id.to_string());
        Ok(self.skills.read().get(&key).cloned())
    }

    async fn save_skill(&self, profile: &SkillProfile) -> Result<(), PersistenceError> {
        let key = (profile.user_id.clone(), profile.topic_id.clone());
        self.skills.write().insert(key, profile.clone());
        Ok(())
    }

    async fn list_skills(&self, user_id: &str) -> Result<Vec<SkillProfile>, PersistenceError> {
        let mut profiles: Vec<SkillProfile> = self
            .skills
            .read()
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        profiles.sort_by(|a, b| a.topic_id.cmp(&b.topic_id));
        Ok(profiles)
    }

    async fn load_engagement(
        &self,
        user_id: &str,
    ) -> Result<Option<EngagementProfile>, PersistenceError> {
        Ok(self.engagement.read().get(user_id).cloned())
    }

    async fn save_engagement(&self, profile: &EngagementProfile) -> Result<(), PersistenceError> {
        self.engagement
            .write()
            .insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }

    async fn load_preferences(
        &self,
        user_id: &str,
    ) -> Result<Option<ElementPreferences>, PersistenceError> {
        Ok(self.preferences.read().get(user_id).cloned())
    }

    async fn save_preferences(
        &self,
        user_id: &str,
        preferences: &ElementPreferences,
    ) -> Result<(), PersistenceError> {
        self.preferences
            .write()
            .insert(user_id.to_string(), preferences.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryActivityRepository {
    records: RwLock<HashMap<String, ActivityRecord>>,
}

impl InMemoryActivityRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl ActivityRepository for InMemoryActivityRepository {
    async fn save_activity(&self, record: &ActivityRecord) -> Result<(), PersistenceError> {
        self.records
            .write()
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn load_activity(
        &self,
        activity_id: &str,
    ) -> Result<Option<ActivityRecord>, PersistenceError> {
        Ok(self.records.read().get(activity_id).cloned())
    }

    async fn activities_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActivityRecord>, PersistenceError> {
        let mut records: Vec<ActivityRecord> = self
            .records
            .read()
            .values()
            .filter(|r| r.user_id == user_id && r.created_at >= since)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }
}

/// Stores each profile as a JSON document:
/// `skills/<user>/<topic>.json`, `engagement/<user>.json`, `preferences/<user>.json`.
pub struct JsonFileProfileRepository {
    root: PathBuf,
}

impl JsonFileProfileRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn skill_path(&self, user_id: &str, topic_id: &str) -> Result<PathBuf, PersistenceError> {
        Ok(self
            .root
            .join("skills")
            .join(path_key(user_id)?)
            .join(format!("{}.json", path_key(topic_id)?)))
    }

    fn user_doc_path(&self, kind: &str, user_id: &str) -> Result<PathBuf, PersistenceError> {
        Ok(self
            .root
            .join(kind)
            .join(format!("{}.json", path_key(user_id)?)))
    }
}

fn path_key(raw: &str) -> Result<&str, PersistenceError> {
    let valid = !raw.is_empty()
        && raw != "."
        && raw != ".."
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(raw)
    } else {
        Err(PersistenceError::InvalidKey(raw.to_string()))
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistenceError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

async fn write_json<T: Serialize + Sync>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let payload = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, payload).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl ProfileRepository for JsonFileProfileRepository {
    async fn load_skill(
        &self,
        user_id: &str,
        topic_id: &str,
    ) -> Result<Option<SkillProfile>, PersistenceError> {
        read_json(&self.skill_path(user_id, topic_id)?).await
    }

    async fn save_skill(&self, profile: &SkillProfile) -> Result<(), PersistenceError> {
        let path = self.skill_path(&profile.user_id, &profile.topic_id)?;
        write_json(&path, profile).await
    }

    async fn list_skills(&self, user_id: &str) -> Result<Vec<SkillProfile>, PersistenceError> {
        let dir = self.root.join("skills").join(path_key(user_id)?);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut profiles = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(profile) = read_json::<SkillProfile>(&path).await? {
                profiles.push(profile);
            }
        }
        profiles.sort_by(|a, b| a.topic_id.cmp(&b.topic_id));
        Ok(profiles)
    }

    async fn load_engagement(
        &self,
        user_id: &str,
    ) -> Result<Option<EngagementProfile>, PersistenceError> {
        read_json(&self.user_doc_path("engagement", user_id)?).await
    }

    async fn save_engagement(&self, profile: &EngagementProfile) -> Result<(), PersistenceError> {
        let path = self.user_doc_path("engagement", &profile.user_id)?;
        write_json(&path, profile).await
    }

    async fn load_preferences(
        &self,
        user_id: &str,
    ) -> Result<Option<ElementPreferences>, PersistenceError> {
        read_json(&self.user_doc_path("preferences", user_id)?).await
    }

    async fn save_preferences(
        &self,
        user_id: &str,
        preferences: &ElementPreferences,
    ) -> Result<(), PersistenceError> {
        let path = self.user_doc_path("preferences", user_id)?;
        write_json(&path, preferences).await
    }
}
