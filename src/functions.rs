//! Built-in recipe functions and the static registry.
//!
//! The registry is the single source of truth for both parse-time arity
//! (used to synthesise implicit placeholder arguments) and evaluate-time
//! dispatch. Lookups are case-insensitive.
//!
//! Every handler receives at least `arity` resolved string arguments (the
//! evaluator pads short calls with the pipeline accumulator and handlers
//! ignore extras) plus a [`FunctionContext`] carrying the current row number
//! and the injected clock. The clock is a plain function pointer so tests
//! can freeze time; production wiring passes [`system_clock`].

use std::sync::OnceLock;

use anyhow::{Result, anyhow, bail};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use regex::Regex;

/// Source of "now" for the date functions.
pub type Clock = fn() -> DateTime<Utc>;

/// The production clock.
pub fn system_clock() -> DateTime<Utc> {
    Utc::now()
}

/// Evaluation state visible to function handlers.
pub struct FunctionContext {
    /// 1-based input row number (the header row counts when processed).
    pub line_number: usize,
    pub clock: Clock,
}

type Handler = fn(&[String], &FunctionContext) -> Result<String>;

pub struct FunctionSpec {
    pub name: &'static str,
    pub arity: usize,
    handler: Handler,
}

impl FunctionSpec {
    pub fn call(&self, args: &[String], context: &FunctionContext) -> Result<String> {
        (self.handler)(args, context)
    }
}

/// Case-insensitive registry lookup.
pub fn lookup(name: &str) -> Option<&'static FunctionSpec> {
    REGISTRY
        .iter()
        .find(|spec| spec.name.eq_ignore_ascii_case(name))
}

static REGISTRY: &[FunctionSpec] = &[
    FunctionSpec { name: "uppercase", arity: 1, handler: uppercase },
    FunctionSpec { name: "lowercase", arity: 1, handler: lowercase },
    // Dispatched by the evaluator's join mode; the handler only exists so
    // `join`/`join(x)` parse like any other call.
    FunctionSpec { name: "join", arity: 1, handler: join },
    FunctionSpec { name: "add", arity: 2, handler: add },
    FunctionSpec { name: "subtract", arity: 2, handler: subtract },
    FunctionSpec { name: "multiply", arity: 2, handler: multiply },
    FunctionSpec { name: "divide", arity: 2, handler: divide },
    FunctionSpec { name: "mod", arity: 2, handler: modulus },
    FunctionSpec { name: "power", arity: 2, handler: power },
    FunctionSpec { name: "numberformat", arity: 2, handler: number_format },
    FunctionSpec { name: "removedigits", arity: 1, handler: remove_digits },
    FunctionSpec { name: "onlydigits", arity: 1, handler: only_digits },
    FunctionSpec { name: "trim", arity: 1, handler: trim },
    FunctionSpec { name: "firstchars", arity: 2, handler: first_chars },
    FunctionSpec { name: "lastchars", arity: 2, handler: last_chars },
    FunctionSpec { name: "repeat", arity: 2, handler: repeat },
    FunctionSpec { name: "replace", arity: 3, handler: replace },
    FunctionSpec { name: "change", arity: 3, handler: change },
    FunctionSpec { name: "changei", arity: 3, handler: change_insensitive },
    FunctionSpec { name: "ifempty", arity: 3, handler: if_empty },
    FunctionSpec { name: "today", arity: 0, handler: today },
    FunctionSpec { name: "now", arity: 0, handler: now },
    FunctionSpec { name: "formatdate", arity: 2, handler: format_date },
    FunctionSpec { name: "formatdatef", arity: 2, handler: format_date_strict },
    FunctionSpec { name: "readdate", arity: 2, handler: read_date },
    FunctionSpec { name: "readdatef", arity: 2, handler: read_date_strict },
    FunctionSpec { name: "smartdate", arity: 1, handler: smart_date },
    FunctionSpec { name: "ispast", arity: 3, handler: is_past },
    FunctionSpec { name: "isfuture", arity: 3, handler: is_future },
    FunctionSpec { name: "lineno", arity: 0, handler: line_number },
];

fn uppercase(args: &[String], _: &FunctionContext) -> Result<String> {
    Ok(args[0].to_uppercase())
}

fn lowercase(args: &[String], _: &FunctionContext) -> Result<String> {
    Ok(args[0].to_lowercase())
}

fn join(args: &[String], _: &FunctionContext) -> Result<String> {
    Ok(args[0].clone())
}

fn parse_numeric(value: &str, position: &str, name: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .map_err(|_| anyhow!("error: {position} arg to {name} was not numeric, got '{value}'"))
}

// add and subtract predate the "error: ..., got 'x'" message style the
// later arithmetic functions use; downstream tooling matches on the old
// wording, so they keep it.
fn add(args: &[String], _: &FunctionContext) -> Result<String> {
    let x: f64 = args[0]
        .parse()
        .map_err(|_| anyhow!("first arg to Add was not numeric: {}", args[0]))?;
    let y: f64 = args[1]
        .parse()
        .map_err(|_| anyhow!("second arg to Add was not numeric: {}", args[1]))?;
    Ok(format!("{:.6}", x + y))
}

fn subtract(args: &[String], _: &FunctionContext) -> Result<String> {
    let x: f64 = args[0]
        .parse()
        .map_err(|_| anyhow!("first arg to subtract was not numeric: {}", args[0]))?;
    let y: f64 = args[1]
        .parse()
        .map_err(|_| anyhow!("second arg to subtract was not numeric: {}", args[1]))?;
    Ok(format!("{:.6}", x - y))
}

fn multiply(args: &[String], _: &FunctionContext) -> Result<String> {
    let x = parse_numeric(&args[0], "first", "multiply")?;
    let y = parse_numeric(&args[1], "second", "multiply")?;
    Ok(format!("{:.6}", x * y))
}

fn divide(args: &[String], _: &FunctionContext) -> Result<String> {
    let x = parse_numeric(&args[0], "first", "divide")?;
    let y = parse_numeric(&args[1], "second", "divide")?;
    if y == 0.0 {
        bail!("error: attempt to divide by zero");
    }
    Ok(format!("{:.6}", x / y))
}

fn modulus(args: &[String], _: &FunctionContext) -> Result<String> {
    let x: i64 = args[0]
        .parse()
        .map_err(|_| anyhow!("first arg to mod was not an integer: '{}'", args[0]))?;
    let y: i64 = args[1]
        .parse()
        .map_err(|_| anyhow!("second arg to mod was not an integer: '{}'", args[1]))?;
    if y == 0 {
        bail!("attempt to divide by zero");
    }
    Ok((x % y).to_string())
}

fn power(args: &[String], _: &FunctionContext) -> Result<String> {
    let x: f64 = args[0]
        .parse()
        .map_err(|_| anyhow!("unrecognized number '{}' for num parameter", args[0]))?;
    let y: f64 = args[1]
        .parse()
        .map_err(|_| anyhow!("unrecognized number '{}' for power parameter", args[1]))?;
    Ok(format!("{:.6}", x.powf(y)))
}

fn number_format(args: &[String], _: &FunctionContext) -> Result<String> {
    let digits: usize = args[0]
        .parse()
        .map_err(|_| anyhow!("error: digits must be an integer, got '{}'", args[0]))?;
    let input: f64 = args[1]
        .parse()
        .map_err(|_| anyhow!("error: input is not numeric: got '{}'", args[1]))?;
    Ok(format!("{input:.digits$}"))
}

fn digit_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("[0-9]+").expect("digit pattern compiles"))
}

fn non_digit_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("[^0-9]+").expect("non-digit pattern compiles"))
}

fn remove_digits(args: &[String], _: &FunctionContext) -> Result<String> {
    Ok(digit_runs().replace_all(&args[0], "").into_owned())
}

fn only_digits(args: &[String], _: &FunctionContext) -> Result<String> {
    Ok(non_digit_runs().replace_all(&args[0], "").into_owned())
}

fn trim(args: &[String], _: &FunctionContext) -> Result<String> {
    Ok(args[0].trim().to_string())
}

fn parse_count(value: &str) -> Result<usize> {
    let count: i64 = value
        .parse()
        .map_err(|_| anyhow!("first arg is not an integer: got '{value}'"))?;
    if count < 0 {
        bail!("first arg is negative: got '{value}'");
    }
    Ok(count as usize)
}

fn first_chars(args: &[String], _: &FunctionContext) -> Result<String> {
    let count = parse_count(&args[0])?;
    let input = &args[1];
    if count >= input.chars().count() {
        return Ok(input.clone());
    }
    Ok(input.chars().take(count).collect())
}

fn last_chars(args: &[String], _: &FunctionContext) -> Result<String> {
    let count = parse_count(&args[0])?;
    let input = &args[1];
    let length = input.chars().count();
    if count >= length {
        return Ok(input.clone());
    }
    Ok(input.chars().skip(length - count).collect())
}

fn repeat(args: &[String], _: &FunctionContext) -> Result<String> {
    let count = parse_count(&args[0])?;
    Ok(args[1].repeat(count))
}

fn replace(args: &[String], _: &FunctionContext) -> Result<String> {
    let (search, replacement, input) = (&args[0], &args[1], &args[2]);
    if search.is_empty() {
        return Ok(input.clone());
    }
    Ok(input.replace(search.as_str(), replacement))
}

fn change(args: &[String], _: &FunctionContext) -> Result<String> {
    let (from, to, input) = (&args[0], &args[1], &args[2]);
    if input == from {
        Ok(to.clone())
    } else {
        Ok(input.clone())
    }
}

fn change_insensitive(args: &[String], _: &FunctionContext) -> Result<String> {
    let (from, to, input) = (&args[0], &args[1], &args[2]);
    if input.to_lowercase() == from.to_lowercase() {
        Ok(to.clone())
    } else {
        Ok(input.clone())
    }
}

fn if_empty(args: &[String], _: &FunctionContext) -> Result<String> {
    let (empty_val, non_empty_val, input) = (&args[0], &args[1], &args[2]);
    if input.is_empty() {
        Ok(empty_val.clone())
    } else {
        Ok(non_empty_val.clone())
    }
}

fn today(_: &[String], context: &FunctionContext) -> Result<String> {
    Ok((context.clock)().format("%Y-%m-%d").to_string())
}

fn now(_: &[String], context: &FunctionContext) -> Result<String> {
    Ok(rfc3339((context.clock)()))
}

fn line_number(_: &[String], context: &FunctionContext) -> Result<String> {
    Ok(context.line_number.to_string())
}

fn rfc3339(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Rejects layouts chrono cannot render; a bad layout would otherwise panic
/// at format time.
fn check_layout(layout: &str) -> Result<()> {
    if StrftimeItems::new(layout).any(|item| matches!(item, Item::Error)) {
        bail!("invalid date layout '{layout}'");
    }
    Ok(())
}

fn format_date(args: &[String], _: &FunctionContext) -> Result<String> {
    let (layout, input) = (&args[0], &args[1]);
    match DateTime::parse_from_rfc3339(input) {
        Ok(timestamp) => {
            check_layout(layout)?;
            Ok(timestamp.format(layout).to_string())
        }
        Err(_) => Ok(input.clone()),
    }
}

fn format_date_strict(args: &[String], _: &FunctionContext) -> Result<String> {
    let (layout, input) = (&args[0], &args[1]);
    let timestamp = DateTime::parse_from_rfc3339(input)
        .map_err(|_| anyhow!("expected RFC3339 format for input date: '{input}'"))?;
    check_layout(layout)?;
    Ok(timestamp.format(layout).to_string())
}

fn parse_by_layout(layout: &str, input: &str) -> Option<DateTime<Utc>> {
    if let Ok(timestamp) = DateTime::parse_from_str(input, layout) {
        return Some(timestamp.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(input, layout) {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, layout) {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    None
}

fn read_date(args: &[String], _: &FunctionContext) -> Result<String> {
    let (layout, input) = (&args[0], &args[1]);
    match parse_by_layout(layout, input) {
        Some(timestamp) => Ok(rfc3339(timestamp)),
        None => Ok(input.clone()),
    }
}

fn read_date_strict(args: &[String], _: &FunctionContext) -> Result<String> {
    let (layout, input) = (&args[0], &args[1]);
    parse_by_layout(layout, input)
        .map(rfc3339)
        .ok_or_else(|| anyhow!("unrecognized date '{input}' for format: '{layout}'"))
}

const RELAXED_DATETIME_LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

const RELAXED_DATE_LAYOUTS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m/%d/%y",
    "%d-%m-%Y",
    "%B %d, %Y",
    "%B %d %Y",
    "%b %d, %Y",
    "%b %d %Y",
    "%Y%m%d",
];

/// Core of `smartdate`, shared with `ispast`/`isfuture`.
fn smart_date_value(input: &str, clock: Clock) -> Result<String> {
    if DateTime::parse_from_rfc3339(input).is_ok() {
        return Ok(input.to_string());
    }

    let relaxed = input.trim();
    match relaxed.to_ascii_lowercase().as_str() {
        "now" => return Ok(rfc3339(clock())),
        "today" => return Ok(rfc3339(midnight(clock(), 0))),
        "yesterday" => return Ok(rfc3339(midnight(clock(), -1))),
        "tomorrow" => return Ok(rfc3339(midnight(clock(), 1))),
        _ => {}
    }

    for layout in RELAXED_DATETIME_LAYOUTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(relaxed, layout) {
            return Ok(rfc3339(Utc.from_utc_datetime(&naive)));
        }
    }
    for layout in RELAXED_DATE_LAYOUTS {
        if let Ok(date) = NaiveDate::parse_from_str(relaxed, layout) {
            if let Some(naive) = date.and_hms_opt(0, 0, 0) {
                return Ok(rfc3339(Utc.from_utc_datetime(&naive)));
            }
        }
    }

    bail!("unrecognized date '{input}'")
}

fn midnight(timestamp: DateTime<Utc>, offset_days: i64) -> DateTime<Utc> {
    let date = (timestamp + Duration::days(offset_days)).date_naive();
    // Midnight always exists for a UTC date.
    match date.and_hms_opt(0, 0, 0) {
        Some(naive) => Utc.from_utc_datetime(&naive),
        None => timestamp,
    }
}

fn smart_date(args: &[String], context: &FunctionContext) -> Result<String> {
    smart_date_value(&args[0], context.clock)
}

fn normalized_instant(date: &str, clock: Clock) -> Result<DateTime<Utc>> {
    let normalized =
        smart_date_value(date, clock).map_err(|err| anyhow!("unable to recognize date: {err}"))?;
    DateTime::parse_from_rfc3339(&normalized)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|err| anyhow!("unable to recognize date: {err}"))
}

fn is_past(args: &[String], context: &FunctionContext) -> Result<String> {
    let (past, future, date) = (&args[0], &args[1], &args[2]);
    if date.is_empty() {
        return Ok(String::new());
    }
    let instant = normalized_instant(date, context.clock)?;
    if (context.clock)() > instant {
        Ok(past.clone())
    } else {
        Ok(future.clone())
    }
}

fn is_future(args: &[String], context: &FunctionContext) -> Result<String> {
    let (future, past, date) = (&args[0], &args[1], &args[2]);
    if date.is_empty() {
        return Ok(String::new());
    }
    let instant = normalized_instant(date, context.clock)?;
    if (context.clock)() < instant {
        Ok(future.clone())
    } else {
        Ok(past.clone())
    }
}
