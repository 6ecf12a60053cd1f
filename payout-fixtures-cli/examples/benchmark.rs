use std::error::Error;
use std::io;
use std::time::Instant;

use chrono::Utc;
use log::{error, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use payout_fixtures::config::GeneratorConfig;
use payout_fixtures::generator::OrderGenerator;
use payout_fixtures::order::write_csv;
use payout_fixtures::script::{render_script, ScriptOptions};
use payout_fixtures::store::SqliteStore;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let generator = OrderGenerator::new(GeneratorConfig::default())?;
    let mut rng = StdRng::seed_from_u64(42);
    let start = Instant::now();
    let fixtures = generator.generate(100_000, Utc::now(), &mut rng)?;
    error!("Generating took: {:.2?}", start.elapsed());

    let start_rendering = Instant::now();
    let script = render_script(&fixtures, &ScriptOptions::default())?;
    warn!(
        "Rendering took: {:.2?} ({} bytes)",
        start_rendering.elapsed(),
        script.len()
    );

    let start_applying = Instant::now();
    let mut store = SqliteStore::in_memory("orders")?;
    store.create_orders_table()?;
    store.execute_script(&script)?;
    warn!(
        "Applying took: {:.2?} ({} rows)",
        start_applying.elapsed(),
        store.count_by_type("payout")?
    );

    let start_writing = Instant::now();
    write_csv(&fixtures, io::sink())?;
    warn!("Writing CSV took: {:.2?}", start_writing.elapsed());

    warn!("Total took: {:.2?}", start.elapsed());

    Ok(())
}
