//! Recipe parser: one assignment per source line.
//!
//! Each non-blank, non-comment line has the shape `target <- expression`,
//! where the target is an output column number, a `!N` header, or a `$name`
//! variable, and the expression is a pipeline of terms connected by `+`
//! (concatenate) and `->` (pipe). Parsing appends operations to the
//! [`Transformation`] under construction; all errors carry the 1-based
//! source line number.

use anyhow::{Result, anyhow, bail};
use log::debug;

use crate::functions;
use crate::recipe::{Argument, Operation, Target, Transformation};
use crate::scanner::{Scanner, TokenKind};

pub fn parse(source: &str) -> Result<Transformation> {
    let mut transformation = Transformation::new();
    for (index, line) in source.lines().enumerate() {
        parse_line(&mut transformation, line, index + 1)?;
    }
    Ok(transformation)
}

fn parse_line(transformation: &mut Transformation, line: &str, line_number: usize) -> Result<()> {
    let mut scanner = Scanner::new(line);

    let token = scanner.next_significant();
    let target = match token.kind {
        TokenKind::Eof | TokenKind::Comment => return Ok(()),
        TokenKind::ColumnId => Target::Column(parse_column_number(&token.text, line_number)?),
        TokenKind::Header => Target::Header(parse_column_number(&token.text, line_number)?),
        TokenKind::Variable => Target::Variable(token.text),
        _ => bail!(
            "line {line_number}: expected column, header, or variable, found '{}'",
            token.text
        ),
    };
    debug!("line {line_number}: target {target:?}");

    let token = scanner.next_significant();
    if token.kind != TokenKind::Assignment {
        bail!(
            "line {line_number}: expected assignment '<-', found '{}'",
            token.text
        );
    }

    parse_term(transformation, &target, &mut scanner, line_number)?;

    loop {
        let token = scanner.next_significant();
        match token.kind {
            TokenKind::Eof => break,
            TokenKind::Comment => {
                transformation.set_comment(&target, &token.text);
                break;
            }
            // A pipe only marks that the next operation's implicit
            // placeholder refers to the current pipeline value.
            TokenKind::Pipe => {
                parse_term(transformation, &target, &mut scanner, line_number)?;
            }
            TokenKind::Plus => {
                transformation.push_operation(&target, Operation::join_placeholder());
                parse_term(transformation, &target, &mut scanner, line_number)?;
            }
            _ => bail!(
                "line {line_number}: unexpected token '{}' in expression",
                token.text
            ),
        }
    }
    Ok(())
}

fn parse_term(
    transformation: &mut Transformation,
    target: &Target,
    scanner: &mut Scanner,
    line_number: usize,
) -> Result<()> {
    let token = scanner.next_significant();
    let operation = match token.kind {
        TokenKind::ColumnId => Operation::value(Argument::column(token.text)),
        TokenKind::Variable => Operation::value(Argument::variable(token.text)),
        TokenKind::Literal => Operation::value(Argument::literal(token.text)),
        TokenKind::Placeholder => Operation::value(Argument::placeholder()),
        TokenKind::Function => parse_function(scanner, &token.text, line_number)?,
        _ => bail!(
            "line {line_number}: unexpected token '{}' in expression",
            token.text
        ),
    };
    transformation.push_operation(target, operation);
    Ok(())
}

fn parse_function(scanner: &mut Scanner, name: &str, line_number: usize) -> Result<Operation> {
    let spec = functions::lookup(name)
        .ok_or_else(|| anyhow!("line {line_number}: unknown function '{name}'"))?;

    let token = scanner.next_token();
    if token.kind != TokenKind::OpenParen {
        // No argument list: the call carries one implicit placeholder per
        // parameter. Whatever the token was, another rule can have it.
        scanner.unread(token);
        let arguments = vec![Argument::placeholder(); spec.arity];
        return Ok(Operation::function(spec.name, arguments));
    }

    let mut arguments = Vec::new();
    let mut saw_placeholder = false;
    loop {
        let token = scanner.next_significant();
        match token.kind {
            TokenKind::Eof => bail!(
                "line {line_number}: unterminated arguments for function '{}'",
                spec.name
            ),
            TokenKind::CloseParen => break,
            TokenKind::Comma => {}
            TokenKind::ColumnId => arguments.push(Argument::column(token.text)),
            TokenKind::Variable => arguments.push(Argument::variable(token.text)),
            TokenKind::Literal => arguments.push(Argument::literal(token.text)),
            TokenKind::Placeholder => {
                saw_placeholder = true;
                arguments.push(Argument::placeholder());
            }
            _ => bail!(
                "line {line_number}: unexpected token '{}' in arguments for function '{}'",
                token.text,
                spec.name
            ),
        }
    }

    if !saw_placeholder || arguments.is_empty() {
        arguments.push(Argument::placeholder());
    }
    Ok(Operation::function(spec.name, arguments))
}

fn parse_column_number(text: &str, line_number: usize) -> Result<usize> {
    text.parse()
        .map_err(|_| anyhow!("line {line_number}: column number '{text}' is out of range"))
}
