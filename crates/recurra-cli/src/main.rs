use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "recurra", version, about = "Recurring reminders from the command line")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a reminder or a recurring series
    Add(commands::reminder::AddArgs),
    /// List reminders
    List(commands::reminder::ListArgs),
    /// Show one reminder
    Show {
        /// Occurrence ID
        id: String,
    },
    /// Edit a reminder or its series
    Edit(commands::reminder::EditArgs),
    /// Mark a reminder as done
    Complete {
        /// Occurrence ID
        id: String,
    },
    /// Mark a reminder as not done
    Uncomplete {
        /// Occurrence ID
        id: String,
    },
    /// Push a reminder forward from now
    Snooze {
        /// Occurrence ID
        id: String,
        /// Minutes (default: notifications.snooze_minutes)
        #[arg(long)]
        minutes: Option<u32>,
    },
    /// Permanently delete a reminder, its series, or its later members
    Delete(commands::reminder::DeleteArgs),
    /// Recoverable bin
    Bin {
        #[command(subcommand)]
        action: commands::bin::BinAction,
    },
    /// Notification outbox
    Notify {
        #[command(subcommand)]
        action: commands::notify::NotifyAction,
    },
    /// Re-issue notifications and present recently missed reminders
    Sweep,
    /// Run the in-app trigger loop in the foreground
    Watch(commands::watch::WatchArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("RECURRA_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Add(args) => commands::reminder::add(args),
        Commands::List(args) => commands::reminder::list(args),
        Commands::Show { id } => commands::reminder::show(&id),
        Commands::Edit(args) => commands::reminder::edit(args),
        Commands::Complete { id } => commands::reminder::complete(&id),
        Commands::Uncomplete { id } => commands::reminder::uncomplete(&id),
        Commands::Snooze { id, minutes } => commands::reminder::snooze(&id, minutes),
        Commands::Delete(args) => commands::reminder::delete(args),
        Commands::Bin { action } => commands::bin::run(action),
        Commands::Notify { action } => commands::notify::run(action),
        Commands::Sweep => commands::sweep::run(),
        Commands::Watch(args) => commands::watch::run(args),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
