use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about = "Transform CSV files with recipes", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Apply a recipe to an input CSV and write the transformed output
    Bake(BakeArgs),
    /// Emit a passthrough recipe built from a CSV's first row
    Identity(IdentityArgs),
    /// Parse a recipe and dump the resulting transformation for debugging
    Parse(ParseArgs),
    /// Write a fake voter-roll CSV for trying out recipes
    Write(WriteArgs),
}

#[derive(Debug, Args)]
pub struct BakeArgs {
    /// Input CSV file ('-' for stdin)
    #[arg(short = 'i', long = "in")]
    pub input: PathBuf,
    /// Output CSV file ('-' for stdout)
    #[arg(short = 'o', long = "out")]
    pub output: PathBuf,
    /// Recipe file describing the transformation
    #[arg(short = 'r', long = "recipe")]
    pub recipe: PathBuf,
    /// Maximum number of input lines to process; <= 0 means unlimited. The
    /// header line is not counted when headers are processed.
    #[arg(short = 'n', long = "lines", default_value_t = -1, allow_negative_numbers = true)]
    pub lines: i64,
    /// Treat the first input line as data instead of a header
    #[arg(short = 'd', long = "no-header")]
    pub no_header: bool,
    /// Overwrite the output file if it already exists
    #[arg(short = 'f', long = "force")]
    pub force: bool,
    /// Abort on CSV parse errors instead of skipping the offending row
    #[arg(short = 'p', long = "parseErrorIsError")]
    pub parse_error_is_error: bool,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Delimiter for output (defaults to the input delimiter)
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Character encoding for the output file (defaults to utf-8)
    #[arg(long = "output-encoding")]
    pub output_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct IdentityArgs {
    /// Input CSV file whose first row describes the columns
    pub input: PathBuf,
    /// Also emit a header recipe line per column
    #[arg(short = 'w', long = "with-headers")]
    pub with_headers: bool,
    /// Destination recipe file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
}

#[derive(Debug, Args)]
pub struct ParseArgs {
    /// Recipe file to parse
    pub recipe: PathBuf,
}

#[derive(Debug, Args)]
pub struct WriteArgs {
    /// Destination CSV file ('-' for stdout)
    pub output: PathBuf,
    /// Number of data lines to write
    #[arg(short = 'n', long = "lines", default_value_t = 100)]
    pub lines: usize,
    /// Overwrite the output file if it already exists
    #[arg(short = 'f', long = "force")]
    pub force: bool,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "pipe" | "|" => Ok(b'|'),
        "semicolon" | ";" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
