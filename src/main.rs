use clap::Parser;
use std::process::ExitCode;

use mailsort::MailsortError;
use mailsort::cli::{Cli, Command};
use mailsort::commands;
use mailsort::config::load_config;

fn run() -> Result<ExitCode, MailsortError> {
    let cli = Cli::parse();
    let config = load_config()?;
    let db = cli.db.as_deref();

    match &cli.command {
        Command::Clean => commands::handle_clean(&config),
        Command::Predict(args) => commands::handle_predict(db, &config, args),
        Command::Learn(args) => commands::handle_learn(db, &config, args),
        Command::Categories(args) => commands::handle_categories(db, &config, args),
        Command::Explain(args) => commands::handle_explain(db, &config, args),
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("mailsort: {e}");
            ExitCode::from(1)
        }
    }
}
