use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mailsort", version, about = "Hybrid spam + per-user email classifier")]
pub struct Cli {
    /// SQLite model database path
    #[arg(long, env = "MAILSORT_DB", global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the normalized form of the text on stdin
    Clean,
    /// Classify the email on stdin for a user
    Predict(UserArgs),
    /// Teach a user's model the correct label for the email on stdin
    Learn(LearnArgs),
    /// List the labels a user's model knows
    Categories(UserArgs),
    /// Show per-label scores of the user's model for the email on stdin
    Explain(UserArgs),
}

#[derive(Parser)]
pub struct UserArgs {
    /// User identifier
    #[arg(long, short)]
    pub user: String,
}

#[derive(Parser)]
pub struct LearnArgs {
    /// User identifier
    #[arg(long, short)]
    pub user: String,

    /// Correct label for the email
    #[arg(long, short)]
    pub label: String,
}
