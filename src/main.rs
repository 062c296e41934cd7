mod advisor;
mod aggregate;
mod category;
mod cli;
mod config_text;
mod detector;
mod earnings;
mod error;
mod fmt;
mod models;
mod period;
mod pipeline;
mod report;
mod sanitize;
mod settings;
mod store;
mod table;
mod telemetry;

use clap::Parser;

use cli::{Cli, Commands, ConfigCommands, Session};

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = settings::load_settings().with_env(|k| std::env::var(k).ok());
    if let Err(e) = telemetry::init(&settings.log_level) {
        eprintln!("Warning: {e}");
    }
    let mut session = Session::open(settings);

    let result = match cli.command {
        Commands::Detect { file, format } => cli::detect::run(&session, &file, format.as_deref()),
        Commands::Analyze {
            file,
            format,
            categories,
            no_weeks,
            json,
        } => cli::analyze::run(&session, &file, format.as_deref(), &categories, no_weeks, json),
        Commands::Suggest {
            file,
            format,
            category,
        } => cli::suggest::run(&session, &file, format.as_deref(), &category),
        Commands::Config { command } => match command {
            ConfigCommands::Set {
                category,
                file,
                method,
            } => cli::config::set(&mut session, &category, file.as_deref(), method.as_deref()),
            ConfigCommands::Show { category } => cli::config::show(&session, &category),
            ConfigCommands::List => cli::config::list(&session),
            ConfigCommands::Delete { category } => cli::config::delete(&mut session, &category),
            ConfigCommands::Template {
                file,
                format,
                category,
            } => cli::config::template(&session, &file, format.as_deref(), &category),
            ConfigCommands::Migrate { legacy } => cli::config::migrate(&mut session, legacy.as_deref()),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
