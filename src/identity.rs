//! The `identity` subcommand: generate a passthrough recipe.
//!
//! Reads the first row of a CSV and emits one `k <- k` line per column
//! (plus `!k <- k` header lines with `--with-headers`), using the column
//! names as trailing comments. The output is a valid recipe that reproduces
//! its input, meant as a starting point for hand editing.

use std::{
    fs::File,
    io::{self, BufWriter, Write},
};

use anyhow::{Context, Result, anyhow};
use log::info;

use crate::{CliError, cli::IdentityArgs, io_utils};

pub fn execute(args: &IdentityArgs) -> Result<(), CliError> {
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let mut reader = io_utils::open_csv_reader_from_path(&args.input, delimiter)
        .map_err(|err| CliError::new(1, err))?;

    let mut record = csv::StringRecord::new();
    let has_row = reader
        .read_record(&mut record)
        .with_context(|| format!("reading first row of {:?}", args.input))
        .map_err(|err| CliError::new(1, err))?;
    if !has_row {
        return Err(CliError::new(1, anyhow!("input CSV was empty")));
    }
    let columns: Vec<String> = record.iter().map(str::to_string).collect();

    match &args.output {
        Some(path) if !io_utils::is_dash(path) => {
            if path.exists() {
                return Err(CliError::new(
                    5,
                    anyhow!("output file already exists: {path:?}"),
                ));
            }
            let file = File::create(path)
                .with_context(|| format!("creating output file {path:?}"))
                .map_err(|err| CliError::new(6, err))?;
            let mut writer = BufWriter::new(file);
            write_recipe(&mut writer, &columns, args.with_headers)
                .and_then(|_| writer.flush().map_err(Into::into))
                .map_err(|err| CliError::new(6, err))?;
            info!(
                "Wrote identity recipe for {} column(s) to {:?}",
                columns.len(),
                path
            );
        }
        _ => {
            write_recipe(&mut io::stdout().lock(), &columns, args.with_headers)
                .map_err(|err| CliError::new(6, err))?;
        }
    }
    Ok(())
}

/// Emits the recipe lines for one column set.
pub fn write_recipe<W: Write>(w: &mut W, columns: &[String], with_headers: bool) -> Result<()> {
    for (index, column) in columns.iter().enumerate() {
        let number = index + 1;
        if with_headers {
            writeln!(w, "!{number} <- {number} # {column} header")?;
            writeln!(w, "{number} <- {number} # {column}")?;
        } else {
            writeln!(w, "{number} <- {number}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn emits_one_line_per_column() {
        let mut out = Vec::new();
        write_recipe(&mut out, &columns(&["first", "last"]), false).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "1 <- 1\n2 <- 2\n");
    }

    #[test]
    fn with_headers_adds_header_lines_and_comments() {
        let mut out = Vec::new();
        write_recipe(&mut out, &columns(&["id"]), true).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "!1 <- 1 # id header\n1 <- 1 # id\n"
        );
    }

    #[test]
    fn generated_recipe_parses_and_validates() {
        let mut out = Vec::new();
        write_recipe(&mut out, &columns(&["a", "b", "c"]), true).unwrap();
        let text = String::from_utf8(out).unwrap();
        let transformation = parser::parse(&text).unwrap();
        transformation.validate().unwrap();
        assert_eq!(transformation.columns.len(), 3);
        assert_eq!(transformation.headers.len(), 3);
        assert_eq!(transformation.columns[&2].comment, "b");
    }
}
