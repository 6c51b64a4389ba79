use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use lingoka::catalog::{LearningLevel, LessonCatalog};
use lingoka::profile::{PreferencesPatch, VoiceSpeed};
use lingoka::settings::{self, ClientSettings, EffectiveSettings};
use lingoka::storage::{ProfileRepository, SqliteProfileRepository};
use lingoka::{ConversationManager, ConversationOptions, HttpTutorService, TutorService};

#[derive(Debug, Parser)]
#[command(name = "lingoka")]
#[command(about = "Conversational language practice with the LingoKa tutor", long_about = None)]
struct Cli {
    /// Base URL of the tutoring service
    #[arg(long, global = true)]
    api_url: Option<String>,
    /// Target language sent with every message
    #[arg(long, global = true)]
    language: Option<String>,
    #[arg(long, global = true)]
    user_id: Option<String>,
    /// Request timeout in seconds, 0 for none
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,
    /// Config file (JSON); defaults to $XDG_CONFIG_HOME/lingoka/config.json
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// SQLite URL for the local profile store
    #[arg(long, global = true)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Interactive conversation practice
    Chat,
    Health,
    Lessons {
        #[arg(long)]
        level: Option<LearningLevel>,
    },
    /// Show one lesson
    Lesson {
        id: String,
    },
    Progress,
    /// Inspect a session held by the service
    Session {
        id: String,
        /// Print the message history instead of the summary
        #[arg(long)]
        history: bool,
    },
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
}

#[derive(Debug, Subcommand)]
enum ProfileAction {
    Show,
    Set {
        #[arg(long)]
        daily_goal: Option<u32>,
        #[arg(long)]
        notifications: Option<bool>,
        #[arg(long)]
        sound: Option<bool>,
        #[arg(long)]
        dark_mode: Option<bool>,
        #[arg(long)]
        voice_speed: Option<VoiceSpeed>,
    },
}

impl Cli {
    fn overrides(&self) -> ClientSettings {
        ClientSettings {
            api_url: self.api_url.clone(),
            language: self.language.clone(),
            user_id: self.user_id.clone(),
            timeout_secs: self.timeout_secs,
            include_audio: None,
            database_url: self.database_url.clone(),
        }
    }
}

fn tutor_service(settings: &EffectiveSettings) -> anyhow::Result<Arc<dyn TutorService>> {
    Ok(Arc::new(HttpTutorService::new(settings.api_url.clone(), settings.request_timeout)?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let file = settings::load_config_file(cli.config.as_deref())?;
    let settings = settings::resolve_effective_settings(&file, &ClientSettings::from_env(), &cli.overrides())?;
    info!(api_url = %settings.api_url, language = %settings.language, "settings resolved");

    match cli.command {
        Commands::Chat => {
            let service = tutor_service(&settings)?;
            let manager = ConversationManager::new(service, ConversationOptions::from(&settings));
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            let mut stdout = std::io::stdout();
            tokio::select! {
                res = lingoka::repl::run(&manager, stdin, &mut stdout) => res?,
                _ = tokio::signal::ctrl_c() => info!("interrupted"),
            }
            if let Some(handle) = manager.clear() {
                // runtime shutdown would drop the end-session call
                if let Err(err) = handle.await {
                    warn!(error = %err, "end-session task did not complete");
                }
            }
        }
        Commands::Health => {
            let health = tutor_service(&settings)?.health().await?;
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
        Commands::Lessons { level } => {
            let catalog = LessonCatalog::new(tutor_service(&settings)?);
            for lesson in catalog.lessons(level).await {
                let status = if lesson.is_completed { "done" } else { "" };
                println!(
                    "{:>3}  {:<28} {:<18} {:>3} min  {:>3} xp  {}",
                    lesson.id, lesson.title, lesson.level.as_str(), lesson.duration_minutes, lesson.xp_reward, status
                );
            }
        }
        Commands::Lesson { id } => {
            let catalog = LessonCatalog::new(tutor_service(&settings)?);
            let lesson = catalog.lesson(&id).await?;
            println!("{}", serde_json::to_string_pretty(&lesson)?);
        }
        Commands::Session { id, history } => {
            let service = tutor_service(&settings)?;
            if history {
                for entry in service.session_history(&id).await? {
                    println!("[{}] {}: {}", entry.timestamp.as_deref().unwrap_or("-"), entry.role.as_str(), entry.content);
                }
            } else {
                println!("{}", serde_json::to_string_pretty(&service.session_info(&id).await?)?);
            }
        }
        Commands::Progress => {
            let catalog = LessonCatalog::new(tutor_service(&settings)?);
            let progress = catalog.progress(&settings.user_id).await;
            println!("{}", serde_json::to_string_pretty(&progress)?);
        }
        Commands::Profile { action } => {
            let repo = SqliteProfileRepository::initialize(settings.database_url.clone()).await?;
            let profile = match action {
                ProfileAction::Show => repo.load().await?,
                ProfileAction::Set { daily_goal, notifications, sound, dark_mode, voice_speed } => {
                    let patch = PreferencesPatch {
                        daily_goal_minutes: daily_goal,
                        notification_enabled: notifications,
                        sound_enabled: sound,
                        dark_mode,
                        voice_speed,
                    };
                    if patch.is_empty() {
                        anyhow::bail!("nothing to update; pass at least one preference flag");
                    }
                    repo.update_preferences(patch).await?
                }
            };
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
    }
    Ok(())
}
