use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::LearningLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VoiceSpeed {
    Slow,
    #[default]
    Normal,
    Fast,
}

impl fmt::Display for VoiceSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VoiceSpeed::Slow => "slow",
            VoiceSpeed::Normal => "normal",
            VoiceSpeed::Fast => "fast",
        })
    }
}

impl FromStr for VoiceSpeed {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slow" => Ok(VoiceSpeed::Slow),
            "normal" => Ok(VoiceSpeed::Normal),
            "fast" => Ok(VoiceSpeed::Fast),
            other => anyhow::bail!("unknown voice speed: {}", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub daily_goal_minutes: u32,
    pub notification_enabled: bool,
    pub sound_enabled: bool,
    pub dark_mode: bool,
    pub voice_speed: VoiceSpeed,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            daily_goal_minutes: 15,
            notification_enabled: true,
            sound_enabled: true,
            dark_mode: false,
            voice_speed: VoiceSpeed::Normal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PreferencesPatch {
    pub daily_goal_minutes: Option<u32>,
    pub notification_enabled: Option<bool>,
    pub sound_enabled: Option<bool>,
    pub dark_mode: Option<bool>,
    pub voice_speed: Option<VoiceSpeed>,
}

impl PreferencesPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl UserPreferences {
    pub fn apply_patch(&mut self, patch: PreferencesPatch) {
        if let Some(v) = patch.daily_goal_minutes {
            self.daily_goal_minutes = v;
        }
        if let Some(v) = patch.notification_enabled {
            self.notification_enabled = v;
        }
        if let Some(v) = patch.sound_enabled {
            self.sound_enabled = v;
        }
        if let Some(v) = patch.dark_mode {
            self.dark_mode = v;
        }
        if let Some(v) = patch.voice_speed {
            self.voice_speed = v;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub native_language: String,
    pub target_language: String,
    pub current_level: LearningLevel,
    pub current_streak: u32,
    pub total_xp: u32,
    pub energy: u32,
    pub preferences: UserPreferences,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// The profile a fresh install starts with.
    pub fn demo() -> Self {
        let now = Utc::now();
        Self {
            user_id: "demo-user".into(),
            email: "demo@lingoka.app".into(),
            name: "Learner".into(),
            native_language: "English".into(),
            target_language: "Hiligaynon".into(),
            current_level: LearningLevel::Beginner,
            current_streak: 7,
            total_xp: 1250,
            energy: 5,
            preferences: UserPreferences::default(),
            created_at: now,
            updated_at: now,
        }
    }
}
