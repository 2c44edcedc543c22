use std::sync::Arc;

use clap::{Parser, Subcommand};

use coach::agent::{CoachAgent, CoachDeps};
use coach::channels::CliChannel;
use coach::config::CoachConfig;
use coach::llm::create_provider;
use coach::store::{Database, LibSqlBackend, SessionStore};
use coach::tools::CommandRegistry;
use coach::tracker::{CoachSession, RecordKind, SessionKey, UserProfile};

/// Conversational self-analysis coach.
#[derive(Parser)]
#[command(name = "coach", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the user's career profile.
    Profile {
        #[arg(long, default_value = "default_user")]
        user_id: String,
        #[arg(long, default_value = "profile_session")]
        session_id: String,
        /// Name the user already gave.
        #[arg(long)]
        name: Option<String>,
        /// Age the user already gave.
        #[arg(long)]
        age: Option<String>,
    },

    /// Walk through one meaningful life experience.
    Event {
        #[arg(long, default_value = "sarah_user")]
        user_id: String,
        #[arg(long, default_value = "experience_session_1")]
        session_id: String,
        /// Name to use when no stored profile exists.
        #[arg(long)]
        name: Option<String>,
        /// Experience number; defaults to one past the stored experiences.
        #[arg(long)]
        experience_no: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = CoachConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export OPENAI_API_KEY=sk-...");
        std::process::exit(1);
    });

    eprintln!("🧭 Coach v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.model);
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Type 'exit', 'quit' or 'bye' to leave.\n");

    let llm = create_provider(&config.llm())?;

    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .unwrap_or_else(|e| {
                eprintln!(
                    "Error: Failed to open database at {}: {}",
                    config.db_path.display(),
                    e
                );
                std::process::exit(1);
            }),
    );

    let deps = CoachDeps {
        llm,
        commands: Arc::new(CommandRegistry::new().with_database(Arc::clone(&db))),
        sessions: Arc::new(SessionStore::with_database(Arc::clone(&db))),
        config: config.agent.clone(),
    };

    let session = match cli.command {
        Commands::Profile {
            user_id,
            session_id,
            name,
            age,
        } => {
            let seed: Vec<(&str, &str)> = [("name", name.as_deref()), ("age", age.as_deref())]
                .into_iter()
                .filter_map(|(field, value)| value.map(|v| (field, v)))
                .collect();
            CoachSession::profile(SessionKey::new(user_id, session_id)).with_seed(seed)
        }
        Commands::Event {
            user_id,
            session_id,
            name,
            experience_no,
        } => {
            let profile = latest_profile(db.as_ref(), &user_id).await;
            let profile = match (profile, name) {
                (Some(p), _) => Some(p),
                (None, Some(name)) => Some(UserProfile {
                    name: Some(name),
                    ..Default::default()
                }),
                (None, None) => None,
            };
            let number = match experience_no {
                Some(n) => n,
                None => next_experience_number(db.as_ref(), &user_id).await,
            };
            CoachSession::event(SessionKey::new(user_id, session_id), number, profile)
        }
    };

    let mut agent = CoachAgent::start(deps, session).await;
    let mut channel = CliChannel::stdio();
    let finalized = agent.run(&mut channel).await?;

    tracing::info!(records = finalized.len(), "Session ended");
    Ok(())
}

/// The user's most recently completed profile, if any.
async fn latest_profile(db: &dyn Database, user_id: &str) -> Option<UserProfile> {
    match db
        .list_finalized_records(user_id, Some(RecordKind::Profile))
        .await
    {
        Ok(records) => records.last().and_then(|r| r.to_profile()),
        Err(e) => {
            tracing::warn!(user = user_id, "Failed to load stored profile: {}", e);
            None
        }
    }
}

async fn next_experience_number(db: &dyn Database, user_id: &str) -> u32 {
    match db
        .list_finalized_records(user_id, Some(RecordKind::Event))
        .await
    {
        Ok(records) => records
            .iter()
            .map(|r| r.sequence_number)
            .max()
            .unwrap_or(0)
            + 1,
        Err(e) => {
            tracing::warn!(user = user_id, "Failed to count stored experiences: {}", e);
            1
        }
    }
}
