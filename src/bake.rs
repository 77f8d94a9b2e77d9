//! The `bake` subcommand: apply a recipe to an input CSV.
//!
//! Resolves delimiters and encodings, checks the overwrite guard, parses
//! the recipe, then streams rows through the evaluator. Each failure stage
//! maps to its contract exit code: 1 bad input, 5 output exists without
//! `--force`, 6 I/O error, 7 recipe parse error, 8 evaluator error.

use std::fs;

use anyhow::{Context, anyhow};
use log::info;

use crate::{
    CliError,
    cli::BakeArgs,
    evaluate::ExecuteOptions,
    functions, io_utils, parser,
};

pub fn execute(args: &BakeArgs) -> Result<(), CliError> {
    let input_encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())
        .map_err(|err| CliError::new(1, err))?;
    let output_encoding = io_utils::resolve_encoding(args.output_encoding.as_deref())
        .map_err(|err| CliError::new(1, err))?;
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let output_delimiter =
        io_utils::resolve_output_delimiter(&args.output, args.output_delimiter, delimiter);

    let recipe_text = fs::read_to_string(&args.recipe)
        .with_context(|| format!("reading recipe file {:?}", args.recipe))
        .map_err(|err| CliError::new(6, err))?;
    let transformation = parser::parse(&recipe_text).map_err(|err| CliError::new(7, err))?;
    transformation
        .validate()
        .map_err(|err| CliError::new(7, err))?;

    if !args.force && !io_utils::is_dash(&args.output) && args.output.exists() {
        return Err(CliError::new(
            5,
            anyhow!("output file already exists: {:?} (use --force to overwrite)", args.output),
        ));
    }

    let mut reader = io_utils::open_csv_reader_from_path(&args.input, delimiter)
        .map_err(|err| CliError::new(1, err))?;
    let mut writer = io_utils::open_csv_writer(&args.output, output_delimiter, output_encoding)
        .map_err(|err| CliError::new(6, err))?;

    let options = ExecuteOptions {
        process_header: !args.no_header,
        max_lines: args.lines,
        parse_error_is_error: args.parse_error_is_error,
        input_encoding,
        clock: functions::system_clock,
    };
    let summary = transformation
        .execute(&mut reader, &mut writer, &options)
        .map_err(|err| CliError::new(8, err))?;

    info!(
        "Baked '{}' into '{}': {} header line(s), {} data line(s)",
        args.input.display(),
        args.output.display(),
        summary.header_lines,
        summary.lines
    );
    Ok(())
}
