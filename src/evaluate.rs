//! Streaming row evaluation.
//!
//! [`Transformation::execute`] drives the row loop: for every input record
//! it builds a fresh [`LineContext`], evaluates variable pipelines in
//! declaration order, runs header pipelines once when header processing is
//! on, then produces one output cell per column pipeline. The first error
//! aborts the run; no partial row is ever written.
//!
//! Pipeline state is two strings plus a join-mode flag. Each `value` or
//! function operation produces a current value and merges it into the
//! accumulator (replace, or append when a `join` is pending). A `join`
//! operation resolves its argument and arms the append without merging, so
//! a pipeline that ends on a pending join performs one final append.

use std::io::{Read, Write};

use anyhow::{Result, anyhow};
use csv::ByteRecord;
use encoding_rs::{Encoding, UTF_8};
use itertools::Itertools;
use log::{debug, warn};

use crate::functions::{self, Clock, FunctionContext};
use crate::io_utils;
use crate::recipe::{Argument, ArgumentKind, LineContext, Operation, Transformation};

/// How often the output writer is flushed, in data rows.
const FLUSH_INTERVAL: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinMode {
    Replace,
    Join,
}

#[derive(Debug, Clone, Copy)]
pub struct ExecuteOptions {
    /// Apply header pipelines to the first input row.
    pub process_header: bool,
    /// Maximum input rows to read; `<= 0` means unlimited. The header row
    /// does not count against the cap when header processing is on.
    pub max_lines: i64,
    /// Abort on malformed CSV records instead of skipping them.
    pub parse_error_is_error: bool,
    /// Character encoding of the input records.
    pub input_encoding: &'static Encoding,
    pub clock: Clock,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        ExecuteOptions {
            process_header: true,
            max_lines: -1,
            parse_error_is_error: false,
            input_encoding: UTF_8,
            clock: functions::system_clock,
        }
    }
}

/// Row counts reported after a successful run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub header_lines: usize,
    pub lines: usize,
}

impl Transformation {
    /// Streams `reader` through the transformation into `writer`.
    pub fn execute<R: Read, W: Write>(
        &self,
        reader: &mut csv::Reader<R>,
        writer: &mut csv::Writer<W>,
        options: &ExecuteOptions,
    ) -> Result<ExecutionSummary> {
        self.validate()?;

        let num_columns = self.num_columns();
        let budget = if options.max_lines <= 0 {
            None
        } else {
            // The header row is read but exempt from the cap.
            Some(options.max_lines as usize + usize::from(options.process_header))
        };

        let mut summary = ExecutionSummary::default();
        let mut row_number = 0usize;
        let mut header_pending = options.process_header;
        let mut record = ByteRecord::new();

        loop {
            if let Some(limit) = budget {
                if row_number >= limit {
                    debug!("line cap of {} reached", options.max_lines);
                    break;
                }
            }
            match reader.read_byte_record(&mut record) {
                Ok(false) => break,
                Ok(true) => {}
                Err(err) => {
                    if options.parse_error_is_error {
                        return Err(err.into());
                    }
                    row_number += 1;
                    warn!("skipping unparseable row {row_number}: {err}");
                    continue;
                }
            }
            row_number += 1;

            let row = io_utils::decode_record(&record, options.input_encoding)?;
            let mut context = LineContext::from_row(&row);

            for name in &self.variable_order {
                let pipe = &self.variables[name].pipe;
                let value = self
                    .run_pipeline(pipe, &context, row_number, options.clock)
                    .map_err(|err| anyhow!("line {row_number} / variable {name}: {err}"))?;
                context.variables.insert(name.clone(), value);
            }

            if header_pending {
                header_pending = false;
                let mut output = row;
                output.resize(num_columns, String::new());
                for number in self.headers.keys().sorted() {
                    let pipe = &self.headers[number].pipe;
                    let value = self
                        .run_pipeline(pipe, &context, row_number, options.clock)
                        .map_err(|err| anyhow!("line {row_number} / header {number}: {err}"))?;
                    output[number - 1] = value;
                }
                writer.write_record(&output)?;
                summary.header_lines += 1;
                continue;
            }

            let mut output = Vec::with_capacity(num_columns);
            for number in 1..=num_columns {
                let pipe = &self.columns[&number].pipe;
                let value = self
                    .run_pipeline(pipe, &context, row_number, options.clock)
                    .map_err(|err| anyhow!("line {row_number} / column {number}: {err}"))?;
                output.push(value);
            }
            writer.write_record(&output)?;
            summary.lines += 1;
            if summary.lines % FLUSH_INTERVAL == 0 {
                writer.flush()?;
            }
        }

        writer.flush()?;
        Ok(summary)
    }

    fn run_pipeline(
        &self,
        pipe: &[Operation],
        context: &LineContext,
        line_number: usize,
        clock: Clock,
    ) -> Result<String> {
        let mut acc = String::new();
        let mut cur = String::new();
        let mut mode = JoinMode::Replace;

        for operation in pipe {
            match operation.name.as_str() {
                "value" => {
                    let argument = operation
                        .arguments
                        .first()
                        .ok_or_else(|| anyhow!("value operation has no argument"))?;
                    cur = resolve_argument(argument, context, &acc)?;
                    merge(&mut acc, &cur, &mut mode);
                }
                "join" => {
                    cur = match operation.arguments.first() {
                        Some(argument) => resolve_argument(argument, context, &acc)?,
                        None => acc.clone(),
                    };
                    mode = JoinMode::Join;
                }
                name => {
                    let spec = functions::lookup(name)
                        .ok_or_else(|| anyhow!("unknown function '{name}'"))?;
                    let mut args = Vec::with_capacity(spec.arity.max(operation.arguments.len()));
                    for argument in &operation.arguments {
                        let resolved = resolve_argument(argument, context, &acc)
                            .map_err(|err| anyhow!("{name}(): error evaluating arg: {err}"))?;
                        args.push(resolved);
                    }
                    // A call site may supply fewer arguments than the
                    // function's arity; the missing trailing positions carry
                    // the accumulator, the same value an implicit
                    // placeholder would have resolved to.
                    while args.len() < spec.arity {
                        args.push(acc.clone());
                    }
                    let function_context = FunctionContext { line_number, clock };
                    cur = spec
                        .call(&args, &function_context)
                        .map_err(|err| anyhow!("{name}(): {err}"))?;
                    merge(&mut acc, &cur, &mut mode);
                }
            }
        }

        if mode == JoinMode::Join {
            acc.push_str(&cur);
        }
        Ok(acc)
    }
}

fn merge(acc: &mut String, cur: &str, mode: &mut JoinMode) {
    match mode {
        JoinMode::Replace => {
            acc.clear();
            acc.push_str(cur);
        }
        JoinMode::Join => {
            acc.push_str(cur);
            *mode = JoinMode::Replace;
        }
    }
}

fn resolve_argument(argument: &Argument, context: &LineContext, acc: &str) -> Result<String> {
    match argument.kind {
        ArgumentKind::Literal => Ok(argument.value.clone()),
        ArgumentKind::Placeholder => Ok(acc.to_string()),
        ArgumentKind::Column => argument
            .value
            .parse::<usize>()
            .ok()
            .and_then(|number| context.columns.get(&number).cloned())
            .ok_or_else(|| {
                anyhow!(
                    "column {} referenced, but it does not exist in the input",
                    argument.value
                )
            }),
        ArgumentKind::Variable => context
            .variables
            .get(&argument.value)
            .cloned()
            .ok_or_else(|| {
                anyhow!(
                    "variable '{}' referenced, but it is not defined",
                    argument.value
                )
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::Target;
    use chrono::{TimeZone, Utc};

    fn context(cells: &[&str]) -> LineContext {
        let row: Vec<String> = cells.iter().map(|c| c.to_string()).collect();
        LineContext::from_row(&row)
    }

    fn frozen_clock() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 6, 15, 12, 0, 0).unwrap()
    }

    fn run(transformation: &Transformation, pipe: &[Operation], ctx: &LineContext) -> Result<String> {
        transformation.run_pipeline(pipe, ctx, 1, frozen_clock)
    }

    #[test]
    fn value_then_join_then_value_concatenates() {
        let transformation = Transformation::new();
        let pipe = vec![
            Operation::value(Argument::column("2")),
            Operation::join_placeholder(),
            Operation::value(Argument::column("1")),
        ];
        let got = run(&transformation, &pipe, &context(&["alpha", "beta"])).unwrap();
        assert_eq!(got, "betaalpha");
    }

    #[test]
    fn placeholder_doubles_accumulator() {
        // 1 + ? on a row whose first cell is "ab"
        let transformation = Transformation::new();
        let pipe = vec![
            Operation::value(Argument::column("1")),
            Operation::join_placeholder(),
            Operation::value(Argument::placeholder()),
        ];
        let got = run(&transformation, &pipe, &context(&["ab", "c"])).unwrap();
        assert_eq!(got, "abab");
    }

    #[test]
    fn trailing_join_appends_its_argument() {
        // 1 -> join(1)
        let transformation = Transformation::new();
        let pipe = vec![
            Operation::value(Argument::column("1")),
            Operation::function("join", vec![Argument::column("1"), Argument::placeholder()]),
        ];
        let got = run(&transformation, &pipe, &context(&["a"])).unwrap();
        assert_eq!(got, "aa");
    }

    #[test]
    fn join_after_plus_does_not_double_append() {
        // 1 + join(1)
        let transformation = Transformation::new();
        let pipe = vec![
            Operation::value(Argument::column("1")),
            Operation::join_placeholder(),
            Operation::function("join", vec![Argument::column("1"), Argument::placeholder()]),
        ];
        let got = run(&transformation, &pipe, &context(&["a"])).unwrap();
        assert_eq!(got, "aa");
    }

    #[test]
    fn function_placeholder_receives_accumulator() {
        let transformation = Transformation::new();
        let pipe = vec![
            Operation::value(Argument::column("1")),
            Operation::function("uppercase", vec![Argument::placeholder()]),
        ];
        let got = run(&transformation, &pipe, &context(&["apple"])).unwrap();
        assert_eq!(got, "APPLE");
    }

    #[test]
    fn short_function_calls_are_padded_with_accumulator() {
        // 1 -> ifempty("empty") leaves non-empty input alone
        let transformation = Transformation::new();
        let pipe = vec![
            Operation::value(Argument::column("1")),
            Operation::function(
                "ifempty",
                vec![Argument::literal("empty"), Argument::placeholder()],
            ),
        ];
        assert_eq!(run(&transformation, &pipe, &context(&["A"])).unwrap(), "A");
        assert_eq!(
            run(&transformation, &pipe, &context(&[""])).unwrap(),
            "empty"
        );
    }

    #[test]
    fn excess_function_arguments_are_ignored() {
        let transformation = Transformation::new();
        let pipe = vec![Operation::function(
            "add",
            vec![
                Argument::column("2"),
                Argument::column("1"),
                Argument::literal("0"),
                Argument::placeholder(),
            ],
        )];
        let got = run(&transformation, &pipe, &context(&["1", "2"])).unwrap();
        assert_eq!(got, "3.000000");
    }

    #[test]
    fn missing_column_reference_is_an_error() {
        let transformation = Transformation::new();
        let pipe = vec![Operation::value(Argument::column("5"))];
        let err = run(&transformation, &pipe, &context(&["a", "b"])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "column 5 referenced, but it does not exist in the input"
        );
    }

    #[test]
    fn missing_variable_reference_is_an_error() {
        let transformation = Transformation::new();
        let pipe = vec![Operation::value(Argument::variable("$plop"))];
        let err = run(&transformation, &pipe, &context(&["a"])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "variable '$plop' referenced, but it is not defined"
        );
    }

    #[test]
    fn function_argument_errors_are_wrapped() {
        let transformation = Transformation::new();
        let pipe = vec![Operation::function(
            "uppercase",
            vec![Argument::variable("$foo"), Argument::placeholder()],
        )];
        let err = run(&transformation, &pipe, &context(&["a"])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "uppercase(): error evaluating arg: variable '$foo' referenced, but it is not defined"
        );
    }

    #[test]
    fn fresh_pipeline_placeholder_is_empty() {
        let transformation = Transformation::new();
        let pipe = vec![Operation::function(
            "ifempty",
            vec![
                Argument::literal("was empty"),
                Argument::literal("was not"),
                Argument::placeholder(),
            ],
        )];
        let got = run(&transformation, &pipe, &context(&["a"])).unwrap();
        assert_eq!(got, "was empty");
    }

    #[test]
    fn execute_summary_counts_header_and_data_rows() {
        let mut transformation = Transformation::new();
        transformation.push_operation(
            &Target::Column(1),
            Operation::value(Argument::column("1")),
        );
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader("a\nb\nc\n".as_bytes());
        let mut writer = csv::Writer::from_writer(Vec::new());
        let options = ExecuteOptions {
            clock: frozen_clock,
            ..ExecuteOptions::default()
        };
        let summary = transformation
            .execute(&mut reader, &mut writer, &options)
            .unwrap();
        assert_eq!(
            summary,
            ExecutionSummary {
                header_lines: 1,
                lines: 2
            }
        );
    }

    #[test]
    fn execute_line_cap_exempts_header_row() {
        let mut transformation = Transformation::new();
        transformation.push_operation(
            &Target::Column(1),
            Operation::value(Argument::column("1")),
        );
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader("h\na\nb\nc\n".as_bytes());
        let mut writer = csv::Writer::from_writer(Vec::new());
        let options = ExecuteOptions {
            max_lines: 2,
            clock: frozen_clock,
            ..ExecuteOptions::default()
        };
        let summary = transformation
            .execute(&mut reader, &mut writer, &options)
            .unwrap();
        assert_eq!(summary.header_lines, 1);
        assert_eq!(summary.lines, 2);
        let written = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(written, "h\na\nb\n");
    }
}
