use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::tutor::TutorService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LearningLevel {
    #[default]
    Beginner,
    Elementary,
    Intermediate,
    UpperIntermediate,
    Advanced,
}

impl LearningLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LearningLevel::Beginner => "beginner",
            LearningLevel::Elementary => "elementary",
            LearningLevel::Intermediate => "intermediate",
            LearningLevel::UpperIntermediate => "upper_intermediate",
            LearningLevel::Advanced => "advanced",
        }
    }
}

impl fmt::Display for LearningLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LearningLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "beginner" => Ok(LearningLevel::Beginner),
            "elementary" => Ok(LearningLevel::Elementary),
            "intermediate" => Ok(LearningLevel::Intermediate),
            "upper_intermediate" => Ok(LearningLevel::UpperIntermediate),
            "advanced" => Ok(LearningLevel::Advanced),
            other => anyhow::bail!("unknown level: {}", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lesson {
    pub id: String,
    pub title: String,
    pub description: String,
    pub level: LearningLevel,
    pub topic: String,
    pub duration_minutes: u32,
    pub xp_reward: u32,
    pub vocabulary_count: u32,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub progress_percent: u8,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SkillBreakdown {
    pub speaking: u8,
    pub listening: u8,
    pub reading: u8,
    pub writing: u8,
    pub vocabulary: u8,
    pub grammar: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Lesson,
    Practice,
    Conversation,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityItem {
    pub date: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub title: String,
    pub xp_earned: u32,
    pub duration_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Achievement {
    pub id: String,
    pub title: String,
    pub description: String,
    pub icon: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earned_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<u32>,
}

impl Achievement {
    pub fn is_earned(&self) -> bool {
        self.earned_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProgress {
    pub user_id: String,
    pub total_xp: u32,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub lessons_completed: u32,
    pub words_learned: u32,
    pub practice_time_minutes: u32,
    pub skill_breakdown: SkillBreakdown,
    #[serde(default)]
    pub recent_activity: Vec<ActivityItem>,
    #[serde(default)]
    pub achievements: Vec<Achievement>,
    #[serde(default)]
    pub weekly_xp: Vec<u32>,
}

/// Lessons and progress from the tutoring service, with local fallbacks for
/// deployments that do not serve them.
#[derive(Clone)]
pub struct LessonCatalog {
    service: Arc<dyn TutorService>,
}

impl LessonCatalog {
    pub fn new(service: Arc<dyn TutorService>) -> Self {
        Self { service }
    }

    pub async fn lessons(&self, level: Option<LearningLevel>) -> Vec<Lesson> {
        match self.service.lessons(level).await {
            Ok(lessons) => lessons,
            Err(err) => {
                debug!(error = %err, "lessons unavailable from service, using built-in catalog");
                builtin_lessons()
                    .into_iter()
                    .filter(|l| level.is_none_or(|lvl| l.level == lvl))
                    .collect()
            }
        }
    }

    pub async fn lesson(&self, id: &str) -> anyhow::Result<Lesson> {
        match self.service.lesson(id).await {
            Ok(lesson) => Ok(lesson),
            Err(err) => {
                debug!(lesson_id = id, error = %err, "lesson unavailable from service, using built-in catalog");
                builtin_lessons()
                    .into_iter()
                    .find(|l| l.id == id)
                    .ok_or_else(|| anyhow::anyhow!("lesson not found: {}", id))
            }
        }
    }

    pub async fn progress(&self, user_id: &str) -> UserProgress {
        match self.service.progress(user_id).await {
            Ok(progress) => progress,
            Err(err) => {
                warn!(user_id, error = %err, "progress unavailable from service, showing sample data");
                sample_progress(user_id, Utc::now())
            }
        }
    }
}

fn lesson(
    id: &str,
    title: &str,
    description: &str,
    level: LearningLevel,
    topic: &str,
    (duration_minutes, xp_reward, vocabulary_count): (u32, u32, u32),
    prerequisites: &[&str],
) -> Lesson {
    Lesson {
        id: id.into(),
        title: title.into(),
        description: description.into(),
        level,
        topic: topic.into(),
        duration_minutes,
        xp_reward,
        vocabulary_count,
        is_completed: false,
        progress_percent: 0,
        prerequisites: prerequisites.iter().map(|p| p.to_string()).collect(),
        thumbnail: None,
    }
}

pub fn builtin_lessons() -> Vec<Lesson> {
    use LearningLevel::*;
    vec![
        lesson("1", "Greetings & Introductions", "Learn basic greetings and how to introduce yourself in Hiligaynon", Beginner, "Basics", (15, 50, 12), &[]),
        lesson("2", "Numbers 1-20", "Master counting from one to twenty in Hiligaynon", Beginner, "Numbers", (10, 40, 20), &[]),
        lesson("3", "Common Phrases", "Essential everyday phrases for basic communication", Beginner, "Phrases", (20, 60, 15), &[]),
        lesson("4", "Family Members", "Learn vocabulary for family relationships", Beginner, "Family", (15, 50, 18), &[]),
        lesson("5", "Food & Dining", "Vocabulary and phrases for ordering food and dining", Elementary, "Food", (25, 70, 25), &["1", "3"]),
        lesson("6", "Basic Verb Conjugation", "Understanding how verbs change in Hiligaynon", Elementary, "Grammar", (30, 80, 10), &["1", "3"]),
        lesson("7", "Directions & Places", "Ask for and give directions, learn place vocabulary", Intermediate, "Travel", (25, 75, 20), &["5", "6"]),
        lesson("8", "Past Tense", "Talk about events that happened in the past", Intermediate, "Grammar", (35, 90, 8), &["6"]),
    ]
}

pub fn sample_progress(user_id: &str, now: DateTime<Utc>) -> UserProgress {
    let achievement = |id: &str, title: &str, description: &str, icon: &str, earned: Option<i64>| Achievement {
        id: id.into(),
        title: title.into(),
        description: description.into(),
        icon: icon.into(),
        earned_at: earned.map(|days| now - Duration::days(days)),
        progress: None,
        target: None,
    };

    let mut conversation_master = achievement("4", "Conversation Master", "Complete 50 conversations", "message-circle", None);
    conversation_master.progress = Some(23);
    conversation_master.target = Some(50);

    UserProgress {
        user_id: user_id.into(),
        total_xp: 1250,
        current_streak: 7,
        longest_streak: 14,
        lessons_completed: 12,
        words_learned: 156,
        practice_time_minutes: 420,
        skill_breakdown: SkillBreakdown {
            speaking: 45,
            listening: 60,
            reading: 75,
            writing: 30,
            vocabulary: 65,
            grammar: 50,
        },
        recent_activity: vec![
            ActivityItem { date: now, kind: ActivityKind::Conversation, title: "Practice Conversation".into(), xp_earned: 25, duration_minutes: 10 },
            ActivityItem { date: now - Duration::days(1), kind: ActivityKind::Lesson, title: "Common Phrases".into(), xp_earned: 60, duration_minutes: 18 },
            ActivityItem { date: now - Duration::days(2), kind: ActivityKind::Practice, title: "Vocabulary Review".into(), xp_earned: 30, duration_minutes: 8 },
        ],
        achievements: vec![
            achievement("1", "First Steps", "Complete your first lesson", "trophy", Some(7)),
            achievement("2", "Week Warrior", "Maintain a 7-day streak", "flame", Some(0)),
            achievement("3", "Word Collector", "Learn 100 words", "book", Some(3)),
            conversation_master,
        ],
        weekly_xp: vec![120, 85, 150, 200, 175, 180, 340],
    }
}
