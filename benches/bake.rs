use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use csv_recipe::evaluate::ExecuteOptions;
use csv_recipe::parser;

const RECIPE: &str = "\
!1 <- 1 # voter_id header\n\
1 <- 1\n\
!2 <- 2 # first header\n\
2 <- 2\n\
!3 <- 3 # last header\n\
3 <- 3\n\
!4 <- 4 # party header\n\
4 <- 4 -> changei(\"rep\", \"REP\") -> changei(\"dem\", \"DEM\")\n\
$username <- firstchars(\"1\", 2) + 3 -> replace(\"'\", \"\") -> lowercase\n\
!5 <- \"username\"\n\
5 <- $username\n\
!6 <- \"email\"\n\
6 <- $username + \"@example.net\"\n";

fn voter_csv(rows: usize) -> String {
    let first = ["Hazel", "Melyna", "Uriah", "Helene", "Janet"];
    let last = ["Dooley", "Yost", "Padberg", "Kiehn", "Gaylord"];
    let party = ["REP", "dem", "", "IND", "GRN"];
    let mut out = String::from("voter_id,first,last,party\n");
    for i in 0..rows {
        out.push_str(&format!(
            "{},{},{},{}\n",
            10_000_000 + i,
            first[i % first.len()],
            last[i % last.len()],
            party[i % party.len()],
        ));
    }
    out
}

fn bench_bake(c: &mut Criterion) {
    let transformation = parser::parse(RECIPE).expect("benchmark recipe parses");
    let input = voter_csv(5_000);
    let options = ExecuteOptions::default();

    c.bench_function("bake_5k_voter_rows", |b| {
        b.iter_batched(
            || input.clone(),
            |input| {
                let mut reader = csv::ReaderBuilder::new()
                    .has_headers(false)
                    .from_reader(std::io::Cursor::new(input.into_bytes()));
                let mut writer = csv::Writer::from_writer(Vec::with_capacity(1 << 20));
                transformation
                    .execute(&mut reader, &mut writer, &options)
                    .expect("benchmark input evaluates");
                writer
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_bake);
criterion_main!(benches);
