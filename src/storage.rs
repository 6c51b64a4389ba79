use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite, sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous}};
use tracing::warn;

use crate::profile::{PreferencesPatch, UserProfile};

const PROFILE_KEY: &str = "lingoka_user";

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn load(&self) -> anyhow::Result<UserProfile>;
    async fn save(&self, profile: &UserProfile) -> anyhow::Result<()>;
    async fn update_preferences(&self, patch: PreferencesPatch) -> anyhow::Result<UserProfile>;
}

#[derive(Clone)]
pub struct SqliteProfileRepository {
    pool: Pool<Sqlite>,
}

impl SqliteProfileRepository {
    pub async fn initialize(database_url: Option<String>) -> anyhow::Result<Self> {
        let url = match database_url {
            Some(u) => u,
            None => resolve_default_db_url()?,
        };
        let options = url.parse::<SqliteConnectOptions>()?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);
        let pool = Pool::<Sqlite>::connect_with(options).await?;
        sqlx::query("PRAGMA busy_timeout = 5000;").execute(&pool).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub fn pool(&self) -> &Pool<Sqlite> { &self.pool }
}

fn resolve_default_db_url() -> anyhow::Result<String> {
    let base = std::env::var("XDG_DATA_HOME").ok().map(PathBuf::from).unwrap_or_else(|| {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        PathBuf::from(home).join(".local").join("share")
    });
    let dir = base.join("lingoka");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("lingoka.db");
    Ok(format!("sqlite://{}", path.to_string_lossy()))
}

#[async_trait]
impl ProfileRepository for SqliteProfileRepository {
    /// Falls back to the demo profile when nothing usable is stored.
    async fn load(&self) -> anyhow::Result<UserProfile> {
        let row = sqlx::query("SELECT profile_json FROM profiles WHERE key = ?1")
            .bind(PROFILE_KEY)
            .fetch_optional(&self.pool)
            .await?;
        let Some(r) = row else { return Ok(UserProfile::demo()) };
        let json: String = r.get("profile_json");
        match serde_json::from_str(&json) {
            Ok(profile) => Ok(profile),
            Err(err) => {
                warn!(error = %err, "stored profile is unreadable, starting from the default profile");
                Ok(UserProfile::demo())
            }
        }
    }

    async fn save(&self, profile: &UserProfile) -> anyhow::Result<()> {
        let json = serde_json::to_string(profile)?;
        sqlx::query(
            "INSERT INTO profiles (key, profile_json, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(key) DO UPDATE SET profile_json = excluded.profile_json, updated_at = excluded.updated_at",
        )
        .bind(PROFILE_KEY)
        .bind(json)
        .bind(profile.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_preferences(&self, patch: PreferencesPatch) -> anyhow::Result<UserProfile> {
        let mut profile = self.load().await?;
        profile.preferences.apply_patch(patch);
        profile.updated_at = Utc::now();
        self.save(&profile).await?;
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::VoiceSpeed;
    use tempfile::tempdir;

    async fn repo_in(dir: &tempfile::TempDir) -> SqliteProfileRepository {
        let path = dir.path().join("test.db");
        let url = format!("sqlite://{}", path.to_string_lossy());
        SqliteProfileRepository::initialize(Some(url)).await.unwrap()
    }

    #[tokio::test]
    async fn empty_store_yields_demo_profile() {
        let dir = tempdir().unwrap();
        let repo = repo_in(&dir).await;
        let profile = repo.load().await.unwrap();
        assert_eq!(profile.user_id, "demo-user");
        assert_eq!(profile.target_language, "Hiligaynon");
    }

    #[tokio::test]
    async fn save_then_load_roundtrip_and_upsert() {
        let dir = tempdir().unwrap();
        let repo = repo_in(&dir).await;
        let mut profile = UserProfile::demo();
        profile.name = "Ana".into();
        repo.save(&profile).await.unwrap();
        profile.total_xp = 2000;
        repo.save(&profile).await.unwrap();

        let got = repo.load().await.unwrap();
        assert_eq!(got.name, "Ana");
        assert_eq!(got.total_xp, 2000);

        let row = sqlx::query("SELECT count(*) as c FROM profiles").fetch_one(repo.pool()).await.unwrap();
        let c: i64 = row.get("c");
        assert_eq!(c, 1);
    }

    #[tokio::test]
    async fn update_preferences_merges_and_persists() {
        let dir = tempdir().unwrap();
        let repo = repo_in(&dir).await;
        let before = repo.load().await.unwrap();

        let updated = repo
            .update_preferences(PreferencesPatch { dark_mode: Some(true), voice_speed: Some(VoiceSpeed::Fast), ..Default::default() })
            .await
            .unwrap();
        assert!(updated.preferences.dark_mode);
        assert!(updated.updated_at >= before.updated_at);

        // a second connection sees the persisted change
        let reopened = repo_in(&dir).await;
        let got = reopened.load().await.unwrap();
        assert!(got.preferences.dark_mode);
        assert_eq!(got.preferences.voice_speed, VoiceSpeed::Fast);
        assert_eq!(got.preferences.daily_goal_minutes, 15);
    }

    #[tokio::test]
    async fn corrupt_row_falls_back_to_default() {
        let dir = tempdir().unwrap();
        let repo = repo_in(&dir).await;
        sqlx::query("INSERT INTO profiles (key, profile_json, updated_at) VALUES (?1, '{not json', '')")
            .bind(PROFILE_KEY)
            .execute(repo.pool())
            .await
            .unwrap();
        let profile = repo.load().await.unwrap();
        assert_eq!(profile.user_id, "demo-user");
    }

    #[tokio::test]
    async fn wal_mode_applied() {
        let dir = tempdir().unwrap();
        let repo = repo_in(&dir).await;
        let row = sqlx::query("PRAGMA journal_mode;").fetch_one(repo.pool()).await.unwrap();
        let mode: String = row.get(0);
        assert!(mode.eq_ignore_ascii_case("wal"), "journal_mode should be WAL, got {}", mode);
    }
}
