pub mod bake;
pub mod cli;
pub mod evaluate;
pub mod fake;
pub mod functions;
pub mod identity;
pub mod io_utils;
pub mod parser;
pub mod recipe;
pub mod scanner;

use std::{env, fmt, fs, io, sync::OnceLock};

use anyhow::anyhow;
use clap::Parser;
use clap::error::ErrorKind;
use log::LevelFilter;

use crate::cli::{Cli, Commands, ParseArgs};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_recipe", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

/// An error paired with the process exit code it should produce.
#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub source: anyhow::Error,
}

impl CliError {
    pub fn new(code: i32, source: anyhow::Error) -> Self {
        CliError { code, source }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.source)
    }
}

impl std::error::Error for CliError {}

pub fn run() -> Result<(), CliError> {
    init_logging();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = err.print();
            return Ok(());
        }
        Err(err) => {
            let _ = err.print();
            return Err(CliError::new(1, anyhow!("invalid command line arguments")));
        }
    };
    match cli.command {
        Commands::Bake(args) => bake::execute(&args),
        Commands::Identity(args) => identity::execute(&args),
        Commands::Parse(args) => handle_parse(&args),
        Commands::Write(args) => fake::execute(&args),
    }
}

fn handle_parse(args: &ParseArgs) -> Result<(), CliError> {
    let text = fs::read_to_string(&args.recipe).map_err(|err| {
        CliError::new(
            1,
            anyhow!("unable to read recipe file {:?}: {err}", args.recipe),
        )
    })?;
    let transformation = parser::parse(&text).map_err(|err| CliError::new(7, err))?;
    transformation
        .dump(&mut io::stdout().lock())
        .map_err(|err| CliError::new(6, err.into()))?;
    Ok(())
}
