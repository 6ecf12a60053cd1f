//! Writes a batch of random payout fixtures as CSV to stdout.
//! can be run with `cargo run --example generator > fixtures.csv`

use std::io;

use chrono::Utc;
use rand::thread_rng;

use payout_fixtures::config::GeneratorConfig;
use payout_fixtures::generator::OrderGenerator;

fn main() {
    let generator = OrderGenerator::new(GeneratorConfig::default()).unwrap();
    let fixtures = generator
        .generate(10_000, Utc::now(), &mut thread_rng())
        .unwrap();
    let mut writer = csv::WriterBuilder::new().from_writer(io::stdout());
    for fixture in &fixtures {
        writer.serialize(fixture).unwrap();
    }
    writer.flush().unwrap();
}
