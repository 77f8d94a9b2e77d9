//! Data model for parsed recipes.
//!
//! A recipe source file parses into a [`Transformation`]: one [`Recipe`]
//! (pipeline of [`Operation`]s) per assignment target, where a target is an
//! output column, a header cell, or a named per-row variable. The model is
//! built once by the parser, checked by [`Transformation::validate`], and
//! then shared read-only across every input row.

use std::collections::HashMap;
use std::io::{self, Write};

use anyhow::{Result, bail};
use itertools::Itertools;

/// The sentinel text carried by placeholder arguments.
pub const PLACEHOLDER: &str = "?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentKind {
    /// A 1-based input column reference; the value is its decimal text.
    Column,
    /// A `$name` reference; the value keeps the leading `$`.
    Variable,
    /// Quoted text with escapes already collapsed.
    Literal,
    /// `?`: resolves to the current pipeline accumulator.
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub kind: ArgumentKind,
    pub value: String,
}

impl Argument {
    pub fn column(value: impl Into<String>) -> Self {
        Argument {
            kind: ArgumentKind::Column,
            value: value.into(),
        }
    }

    pub fn variable(value: impl Into<String>) -> Self {
        Argument {
            kind: ArgumentKind::Variable,
            value: value.into(),
        }
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Argument {
            kind: ArgumentKind::Literal,
            value: value.into(),
        }
    }

    pub fn placeholder() -> Self {
        Argument {
            kind: ArgumentKind::Placeholder,
            value: PLACEHOLDER.to_string(),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self.kind {
            ArgumentKind::Column => "column",
            ArgumentKind::Variable => "variable",
            ArgumentKind::Literal => "literal",
            ArgumentKind::Placeholder => "placeholder",
        }
    }
}

/// One named step in a pipeline. The names `value` and `join` are synthetic;
/// every other name refers to an entry in the function registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub name: String,
    pub arguments: Vec<Argument>,
}

impl Operation {
    /// Loads a single argument into the pipeline.
    pub fn value(argument: Argument) -> Self {
        Operation {
            name: "value".to_string(),
            arguments: vec![argument],
        }
    }

    /// The operation emitted for the `+` connector.
    pub fn join_placeholder() -> Self {
        Operation {
            name: "join".to_string(),
            arguments: vec![Argument::placeholder()],
        }
    }

    pub fn function(name: impl Into<String>, arguments: Vec<Argument>) -> Self {
        Operation {
            name: name.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Column(usize),
    Header(usize),
    Variable(String),
}

/// The pipeline attached to one assignment target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipe {
    pub pipe: Vec<Operation>,
    pub comment: String,
}

/// A fully parsed recipe program.
///
/// `variable_order` records first-assignment order; evaluation must follow
/// it because variables may reference previously evaluated variables and a
/// hash map does not remember declaration order.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Transformation {
    pub variables: HashMap<String, Recipe>,
    pub variable_order: Vec<String>,
    pub columns: HashMap<usize, Recipe>,
    pub headers: HashMap<usize, Recipe>,
}

impl Transformation {
    pub fn new() -> Self {
        Transformation::default()
    }

    /// Appends `operation` to the pipe for `target`, creating the recipe on
    /// first use.
    pub fn push_operation(&mut self, target: &Target, operation: Operation) {
        self.recipe_mut(target).pipe.push(operation);
    }

    /// Attaches a trailing comment to the recipe for `target`.
    pub fn set_comment(&mut self, target: &Target, comment: &str) {
        self.recipe_mut(target).comment = comment.to_string();
    }

    fn recipe_mut(&mut self, target: &Target) -> &mut Recipe {
        match target {
            Target::Column(number) => self.columns.entry(*number).or_default(),
            Target::Header(number) => self.headers.entry(*number).or_default(),
            Target::Variable(name) => {
                if !self.variables.contains_key(name) {
                    self.variable_order.push(name.clone());
                }
                self.variables.entry(name.clone()).or_default()
            }
        }
    }

    /// Number of output columns. Meaningful once [`validate`] has passed,
    /// at which point the column set is dense starting at 1.
    ///
    /// [`validate`]: Transformation::validate
    pub fn num_columns(&self) -> usize {
        self.columns.keys().copied().max().unwrap_or(0)
    }

    /// Structural checks that must hold before any row is evaluated.
    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            bail!("no column recipes provided");
        }
        if self.columns.contains_key(&0) || self.headers.contains_key(&0) {
            bail!("column numbers are 1-based; found column #0");
        }
        let max = self.num_columns();
        for number in 1..=max {
            if !self.columns.contains_key(&number) {
                bail!("missing column definition for column #{number}");
            }
        }
        for number in self.headers.keys().sorted() {
            if !self.columns.contains_key(number) {
                bail!("found header for column {number}, but no recipe for column {number}");
            }
        }
        Ok(())
    }

    /// Writes a human-readable rendering of the parsed program, used by the
    /// `parse` subcommand for debugging recipes.
    pub fn dump<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "Variables:\n======")?;
        for name in &self.variable_order {
            if let Some(recipe) = self.variables.get(name) {
                write_recipe(w, name, recipe)?;
            }
        }
        writeln!(w, "\nHeaders:\n======")?;
        for number in self.headers.keys().sorted() {
            write_recipe(w, &format!("!{number}"), &self.headers[number])?;
        }
        writeln!(w, "\nColumns:\n======")?;
        for number in self.columns.keys().sorted() {
            write_recipe(w, &number.to_string(), &self.columns[number])?;
        }
        Ok(())
    }
}

fn write_recipe<W: Write>(w: &mut W, name: &str, recipe: &Recipe) -> io::Result<()> {
    writeln!(w, "{name}")?;
    write!(w, "  pipe: ")?;
    for operation in &recipe.pipe {
        let args = operation
            .arguments
            .iter()
            .map(|a| format!("{}: {}", a.kind_name(), a.value))
            .join(", ");
        write!(w, "{}({args}) -> ", operation.name)?;
    }
    writeln!(w)?;
    if recipe.comment.is_empty() {
        writeln!(w, "  ---")
    } else {
        writeln!(w, "  comment: {}\n  ---", recipe.comment)
    }
}

/// Per-row evaluation scratchpad. Rebuilt for every input row.
#[derive(Debug, Default)]
pub struct LineContext {
    /// Input cells, keyed by 1-based column number.
    pub columns: HashMap<usize, String>,
    /// Variables evaluated so far for this row.
    pub variables: HashMap<String, String>,
}

impl LineContext {
    pub fn from_row(row: &[String]) -> Self {
        let mut context = LineContext::default();
        for (index, cell) in row.iter().enumerate() {
            context.columns.insert(index + 1, cell.clone());
        }
        context
    }
}
