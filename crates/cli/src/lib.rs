pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::process::ExitCode;

use platter_core::fixtures::{CATERING_BOX, WINGS};

#[derive(Debug, Parser)]
#[command(
    name = "platter",
    about = "Platter operator CLI",
    long_about = "Inspect configuration, check storage readiness, and run the sample menu \
                  through the configurator.",
    after_help = "Examples:\n  platter doctor --json\n  platter config\n  \
                  platter demo --product catering-box"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, local cache writability, and remote DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Configure a sample product end to end and print the resulting cart item")]
    Demo {
        #[arg(long, value_enum, default_value_t = DemoProduct::Wings)]
        product: DemoProduct,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DemoProduct {
    Wings,
    CateringBox,
}

impl DemoProduct {
    pub fn key(self) -> &'static str {
        match self {
            Self::Wings => WINGS,
            Self::CateringBox => CATERING_BOX,
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Demo { product } => commands::demo::run(product),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
