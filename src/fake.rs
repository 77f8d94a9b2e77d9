//! The `write` subcommand: generate a fake voter-roll CSV.
//!
//! Produces a file with the column set the README examples are written
//! against (voter_id through email), so recipes can be exercised without
//! real data. Values come from small embedded word lists plus `rand`.

use anyhow::{Result, anyhow};
use chrono::{Duration, NaiveDate, Utc};
use encoding_rs::UTF_8;
use log::info;
use rand::Rng;
use rand::rngs::ThreadRng;

use crate::{CliError, cli::WriteArgs, io_utils};

const FIRST_NAMES: &[&str] = &[
    "Hazel", "Melyna", "Uriah", "Helene", "Janet", "Marcus", "Priya", "Dmitri", "Rosa", "Kenji",
    "Amara", "Felix", "Ingrid", "Omar", "Lucille", "Theo", "Nadia", "Walter", "June", "Silas",
];

const LAST_NAMES: &[&str] = &[
    "Dooley", "Yost", "Padberg", "Kiehn", "Gaylord", "Okafor", "Lindqvist", "Marsh", "Ibarra",
    "Tanaka", "Whitfield", "O'Neill", "Castellanos", "Bergstrom", "Hale", "Drummond", "Vance",
    "Soto", "Pemberton", "Ashworth",
];

const STREET_SUFFIXES: &[&str] = &[
    "Center", "Terrace", "Point", "Stravenue", "Estate", "Avenue", "Lane", "Hollow", "Ridge",
    "Crossing",
];

const CITY_PREFIXES: &[&str] = &["New", "West", "Port", "Lake", "East", "North", "South", "Fort"];

const STATES: &[&str] = &[
    "Alaska", "North Carolina", "Nebraska", "Maryland", "Texas", "Ohio", "Vermont", "Oregon",
    "Kansas", "Georgia",
];

const PARTIES: &[&str] = &["REP", "DEM", "", "IND", "GRN"];

const EMAIL_DOMAINS: &[&str] = &["gmail.com", "yahoo.com", "hotmail.com", "example.net"];

pub fn execute(args: &WriteArgs) -> Result<(), CliError> {
    if !args.force && !io_utils::is_dash(&args.output) && args.output.exists() {
        return Err(CliError::new(
            5,
            anyhow!("output file already exists: {:?}", args.output),
        ));
    }
    let mut writer = io_utils::open_csv_writer(&args.output, b',', UTF_8)
        .map_err(|err| CliError::new(6, err))?;
    write_rows(&mut writer, args.lines).map_err(|err| CliError::new(6, err))?;
    info!(
        "Wrote {} fake line(s) to '{}'",
        args.lines,
        args.output.display()
    );
    Ok(())
}

fn write_rows<W: std::io::Write>(writer: &mut csv::Writer<W>, lines: usize) -> Result<()> {
    writer.write_record([
        "voter_id",
        "first",
        "last",
        "address",
        "city",
        "state",
        "zipcode",
        "birthdate",
        "party",
        "sent",
        "email",
    ])?;

    let mut rng = rand::thread_rng();
    let today = Utc::now().date_naive();
    for _ in 0..lines {
        let first = pick(&mut rng, FIRST_NAMES);
        let last = pick(&mut rng, LAST_NAMES);
        // Roughly one in ten voters has already been sent a mailing.
        let sent = if rng.gen_range(0..100) < 10 {
            nearby_date(&mut rng, today)
        } else {
            String::new()
        };
        writer.write_record([
            rng.gen_range(100_000..100_000_000u64).to_string(),
            first.to_string(),
            last.to_string(),
            format!(
                "{} {} {}",
                rng.gen_range(1..45_000),
                pick(&mut rng, LAST_NAMES),
                pick(&mut rng, STREET_SUFFIXES)
            ),
            format!(
                "{} {}{}",
                pick(&mut rng, CITY_PREFIXES),
                pick(&mut rng, FIRST_NAMES),
                ["ville", "borough", "furt", "view", "town"][rng.gen_range(0..5)]
            ),
            pick(&mut rng, STATES).to_string(),
            format!("{:05}", rng.gen_range(10_000..99_999)),
            birthday(&mut rng, today),
            pick(&mut rng, PARTIES).to_string(),
            sent,
            format!(
                "{}.{}@{}",
                first.to_lowercase(),
                last.to_lowercase().replace('\'', ""),
                pick(&mut rng, EMAIL_DOMAINS)
            ),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn pick<'a>(rng: &mut ThreadRng, choices: &'a [&'a str]) -> &'a str {
    choices[rng.gen_range(0..choices.len())]
}

/// A date within ten days of `today`, for the `sent` column.
fn nearby_date(rng: &mut ThreadRng, today: NaiveDate) -> String {
    let offset = rng.gen_range(-10..=10i64);
    (today + Duration::days(offset))
        .format("%Y-%m-%d")
        .to_string()
}

/// A birthdate for a voter aged 17 to 99.
fn birthday(rng: &mut ThreadRng, today: NaiveDate) -> String {
    let days: i64 = rng.gen_range(17 * 365..=99 * 365);
    (today - Duration::days(days)).format("%Y-%m-%d").to_string()
}
