pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use menuguard_core::config::{ConfigOverrides, LoadOptions};

#[derive(Debug, Parser)]
#[command(
    name = "menuguard",
    about = "Guardrailed menu ordering assistant",
    long_about = "Chat with the menu assistant, run single guardrail checks, and inspect configuration.",
    after_help = "Examples:\n  menuguard chat\n  menuguard check --input \"I'm allergic to peanuts.\" --output \"Try the Pad Thai!\"\n  menuguard doctor --json"
)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    #[arg(long, global = true, help = "Config file to load instead of menuguard.toml")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Menu catalog TOML file")]
    menu: Option<PathBuf>,
    #[arg(long, global = true, help = "Append guardrail events to this JSON-lines file")]
    event_log: Option<PathBuf>,
    #[arg(long, global = true, help = "Log level (trace, debug, info, warn, error)")]
    log_level: Option<String>,
}

impl GlobalArgs {
    fn load_options(self) -> LoadOptions {
        LoadOptions {
            require_file: self.config.is_some(),
            config_path: self.config,
            overrides: ConfigOverrides {
                log_level: self.log_level,
                menu_path: self.menu,
                event_log_path: self.event_log,
                ..ConfigOverrides::default()
            },
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Start an interactive guarded conversation on stdin")]
    Chat {
        #[arg(long, help = "Session identifier; a random one is used when omitted")]
        session: Option<String>,
    },
    #[command(about = "Run the input check and, optionally, the output check for one turn")]
    Check {
        #[arg(long, help = "Guest utterance to screen")]
        input: String,
        #[arg(long, help = "Candidate assistant reply to validate")]
        output: Option<String>,
        #[arg(long, default_value = "cli", help = "Session identifier")]
        session: String,
    },
    #[command(about = "List the menu catalog with prices and allergens")]
    Menu {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, menu catalog, and model backend readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.global.load_options();

    let result = match cli.command {
        Command::Chat { session } => commands::chat::run(options, session),
        Command::Check { input, output, session } => {
            commands::check::run(options, &session, &input, output.as_deref())
        }
        Command::Menu { json } => commands::menu::run(options, json),
        Command::Config => commands::config::run(options),
        Command::Doctor { json } => commands::doctor::run(options, json),
    };

    if !result.output.is_empty() {
        println!("{}", result.output);
    }
    ExitCode::from(result.exit_code)
}
