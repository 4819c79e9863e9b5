use std::io::Read;
use std::path::PathBuf;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use kbox::Kbox;
use kbox::config::Config;
use kbox::models::{CardMedia, DailyQuotas, Grade, NewCard, SchedulerModel, TrainingDate};

#[derive(Parser)]
#[command(name = "kbox", about = "Spaced repetition trainer for flashcard collections")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, env = "KBOX_CONFIG")]
    config: Option<PathBuf>,

    /// Path to the SQLite database file (overrides the configuration)
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Where to write it (default: the user config directory)
        #[arg(long)]
        path: Option<PathBuf>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Manage collections
    Collection {
        #[command(subcommand)]
        action: CollectionAction,
    },
    /// Add cards to a collection (single via --content, batch via stdin)
    Add {
        #[arg(long)]
        collection: i64,
        /// Card as JSON {"front", "back", ...} (omit to read a JSON array from stdin)
        #[arg(long)]
        content: Option<String>,
    },
    /// Import cards from a file (front<separator>back per line), skipping duplicates
    Import {
        #[arg(long)]
        collection: i64,
        #[arg(long)]
        file: PathBuf,
        /// Field separator between front and back
        #[arg(long, default_value = "##")]
        separator: String,
    },
    /// Inspect and edit cards
    Card {
        #[command(subcommand)]
        action: CardAction,
    },
    /// Run training sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Show or change daily quotas and totals
    Training {
        #[command(subcommand)]
        action: TrainingAction,
    },
    /// Show learning statistics for a collection
    Stats {
        #[arg(long)]
        collection: i64,
        /// Number of days of review activity to include
        #[arg(long, default_value = "30")]
        days: u32,
        /// Report activity as Monday-first weeks instead
        #[arg(long)]
        weeks: Option<u32>,
    },
}

#[derive(Subcommand)]
enum CollectionAction {
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// Scheduling model: fsrs or legacy
        #[arg(long)]
        model: Option<SchedulerModel>,
    },
    List,
    Show {
        #[arg(long)]
        id: i64,
    },
    Update {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        model: Option<SchedulerModel>,
    },
    Delete {
        #[arg(long)]
        id: i64,
    },
}

#[derive(Subcommand)]
enum CardAction {
    Show {
        #[arg(long)]
        id: i64,
    },
    List {
        #[arg(long)]
        collection: i64,
    },
    Edit {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        front: Option<String>,
        #[arg(long)]
        back: Option<String>,
        /// Media references as JSON {"front_image", "back_image", "front_audio", "back_audio"}
        #[arg(long)]
        media: Option<String>,
    },
    Hide {
        #[arg(long)]
        id: i64,
    },
    Unhide {
        #[arg(long)]
        id: i64,
    },
    Delete {
        #[arg(long)]
        id: i64,
    },
    /// Review history, newest first
    History {
        #[arg(long)]
        id: i64,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Start today's session, or resume it if one is open
    Start {
        #[arg(long)]
        collection: i64,
        /// Training day as YYYY-MM-DD (default: today, UTC)
        #[arg(long)]
        date: Option<TrainingDate>,
    },
    /// Show the next queued card
    Next {
        #[arg(long)]
        session: i64,
    },
    /// Grade a card: again, hard, good, easy (or 1-4)
    Grade {
        #[arg(long)]
        session: i64,
        #[arg(long)]
        card: i64,
        #[arg(long)]
        grade: Grade,
        /// Time spent on the card, in milliseconds
        #[arg(long, default_value = "0")]
        duration_ms: i64,
    },
    Postpone {
        #[arg(long)]
        session: i64,
        #[arg(long)]
        card: i64,
    },
    Complete {
        #[arg(long)]
        session: i64,
    },
    /// Abandon a session so the day can be rebuilt
    Reset {
        #[arg(long)]
        session: i64,
    },
    List {
        #[arg(long)]
        collection: i64,
        #[arg(long, default_value = "20")]
        limit: u32,
    },
}

#[derive(Subcommand)]
enum TrainingAction {
    Show {
        #[arg(long)]
        collection: i64,
    },
    Set {
        #[arg(long)]
        collection: i64,
        #[arg(long)]
        max_new: Option<u32>,
        #[arg(long)]
        max_review: Option<u32>,
        #[arg(long)]
        max_learning: Option<u32>,
    },
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log.filter))
        .unwrap_or_else(|_| EnvFilter::new("kbox=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn parse_lines(text: &str, separator: &str) -> Vec<NewCard> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match line.split_once(separator) {
            Some((front, back)) => Some(NewCard::text(front.trim(), back.trim())),
            None => {
                tracing::warn!("Skipping malformed line: {line}");
                None
            }
        })
        .collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Commands::Init { path, force } = &cli.command {
        let path = path.clone().unwrap_or_else(Config::default_path);
        if path.exists() && !*force {
            return Err(format!("{} already exists (use --force to overwrite)", path.display()).into());
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, Config::generate_default())?;
        println!("{}", serde_json::json!({"status": "ok", "path": path}));
        return Ok(());
    }

    let mut config = Config::resolve(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database.path = db;
    }
    init_tracing(&config);
    let kb = Kbox::new(&config)?;

    let now = Utc::now();
    let today = TrainingDate::of(now);

    match cli.command {
        Commands::Init { .. } => {}

        Commands::Collection { action } => match action {
            CollectionAction::Create {
                name,
                description,
                model,
            } => {
                let c = kb.create_collection(&name, description.as_deref(), model)?;
                println!("{}", serde_json::to_string(&c)?);
            }
            CollectionAction::List => {
                println!("{}", serde_json::to_string(&kb.list_collections()?)?);
            }
            CollectionAction::Show { id } => {
                let c = kb.get_collection(id)?;
                let overview = kb.collection_overview(id, today)?;
                println!(
                    "{}",
                    serde_json::json!({"collection": c, "overview": overview})
                );
            }
            CollectionAction::Update {
                id,
                name,
                description,
                model,
            } => {
                let c = kb.update_collection(id, name.as_deref(), description.as_deref(), model)?;
                println!("{}", serde_json::to_string(&c)?);
            }
            CollectionAction::Delete { id } => {
                kb.delete_collection(id)?;
                println!("{}", serde_json::json!({"status": "ok", "deleted": id}));
            }
        },

        Commands::Add {
            collection,
            content,
        } => {
            if let Some(content_str) = content {
                let card: NewCard = serde_json::from_str(&content_str)?;
                let id = kb.add_card(collection, &card)?;
                println!("{}", serde_json::json!({"id": id}));
            } else {
                let mut input = String::new();
                std::io::stdin().read_to_string(&mut input)?;
                let cards: Vec<NewCard> = serde_json::from_str(&input)?;
                let ids = kb.add_cards(collection, &cards)?;
                println!("{}", serde_json::to_string(&ids)?);
            }
        }

        Commands::Import {
            collection,
            file,
            separator,
        } => {
            let text = std::fs::read_to_string(&file)?;
            let cards = parse_lines(&text, &separator);
            let result = kb.import_cards(collection, &cards)?;
            println!("{}", serde_json::to_string(&result)?);
        }

        Commands::Card { action } => match action {
            CardAction::Show { id } => {
                println!("{}", serde_json::to_string(&kb.get_card(id)?)?);
            }
            CardAction::List { collection } => {
                println!("{}", serde_json::to_string(&kb.list_cards(collection)?)?);
            }
            CardAction::Edit {
                id,
                front,
                back,
                media,
            } => {
                let media: Option<CardMedia> = media.map(|m| serde_json::from_str(&m)).transpose()?;
                let card = kb.edit_card(id, front.as_deref(), back.as_deref(), media.as_ref())?;
                println!("{}", serde_json::to_string(&card)?);
            }
            CardAction::Hide { id } => {
                println!("{}", serde_json::to_string(&kb.set_card_hidden(id, true)?)?);
            }
            CardAction::Unhide { id } => {
                println!("{}", serde_json::to_string(&kb.set_card_hidden(id, false)?)?);
            }
            CardAction::Delete { id } => {
                kb.delete_card(id)?;
                println!("{}", serde_json::json!({"status": "ok", "deleted": id}));
            }
            CardAction::History { id } => {
                println!("{}", serde_json::to_string(&kb.card_history(id)?)?);
            }
        },

        Commands::Session { action } => match action {
            SessionAction::Start { collection, date } => {
                let view = kb.start_or_resume_session(collection, date.unwrap_or(today), now)?;
                println!("{}", serde_json::to_string(&view)?);
            }
            SessionAction::Next { session } => {
                println!("{}", serde_json::to_string(&kb.next_card(session)?)?);
            }
            SessionAction::Grade {
                session,
                card,
                grade,
                duration_ms,
            } => {
                let s = kb.submit_grade(session, card, grade, now, duration_ms)?;
                println!("{}", serde_json::to_string(&s)?);
            }
            SessionAction::Postpone { session, card } => {
                println!("{}", serde_json::to_string(&kb.postpone_card(session, card)?)?);
            }
            SessionAction::Complete { session } => {
                println!("{}", serde_json::to_string(&kb.complete_session(session)?)?);
            }
            SessionAction::Reset { session } => {
                println!("{}", serde_json::to_string(&kb.reset_session(session)?)?);
            }
            SessionAction::List { collection, limit } => {
                println!("{}", serde_json::to_string(&kb.list_sessions(collection, limit)?)?);
            }
        },

        Commands::Training { action } => match action {
            TrainingAction::Show { collection } => {
                println!("{}", serde_json::to_string(&kb.get_training_data(collection)?)?);
            }
            TrainingAction::Set {
                collection,
                max_new,
                max_review,
                max_learning,
            } => {
                let mut data = kb.get_training_data(collection)?;
                let current: DailyQuotas = data.quotas();
                data.max_new_cards = max_new.unwrap_or(current.max_new_cards);
                data.max_review_cards = max_review.unwrap_or(current.max_review_cards);
                data.max_learning_cards = max_learning.unwrap_or(current.max_learning_cards);
                println!("{}", serde_json::to_string(&kb.update_training_data(&data)?)?);
            }
        },

        Commands::Stats {
            collection,
            days,
            weeks,
        } => match weeks {
            Some(w) => {
                let activity = kb.weekly_activity(collection, today, w)?;
                println!("{}", serde_json::to_string(&activity)?);
            }
            None => {
                let stats = kb.collection_stats(collection, today, days)?;
                println!("{}", serde_json::to_string(&stats)?);
            }
        },
    }

    Ok(())
}
