use std::error::Error;
use std::fs::{self, File};
use std::io::{self, Write};

use clap::{ArgEnum, Args, Parser, Subcommand};
use log::{error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use payout_fixtures::config::GeneratorConfig;
use payout_fixtures::error::{ConfigurationError, FixtureError};
use payout_fixtures::generator::OrderGenerator;
use payout_fixtures::order::{write_csv, OrderFixture, ORDER_TYPE};
use payout_fixtures::rest::{RestClient, RestConfig};
use payout_fixtures::rows::{insert_rows, Cleanup};
use payout_fixtures::script::{render_script, ScriptOptions, Trailer, UpdatedAt, DEFAULT_TABLE};
use payout_fixtures::store::{OrderStore, SqliteStore};
use payout_fixtures::verify::{verify, OrderFilter};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render fixtures as one SQL batch script (or CSV)
    Generate {
        #[clap(flatten)]
        fixtures: FixtureArgs,
        /// Write here instead of stdout
        #[clap(short, long)]
        output: Option<String>,
        #[clap(long, arg_enum, default_value = "sql")]
        format: OutputFormat,
        #[clap(long, default_value = DEFAULT_TABLE)]
        table: String,
        /// Leave out the leading delete of existing payout rows
        #[clap(long)]
        no_cleanup: bool,
        /// Stamp `updated_at` with the database clock at insertion time
        #[clap(long)]
        database_clock: bool,
        /// Run the verification aggregate instead of leaving it commented
        #[clap(long)]
        run_trailer: bool,
    },
    /// Execute a rendered script against a SQLite database in one transaction
    Apply {
        /// The SQL script to run
        script: String,
        #[clap(long)]
        database: String,
        #[clap(long, default_value = DEFAULT_TABLE)]
        table: String,
        #[clap(long)]
        create_table: bool,
    },
    /// Insert fixtures one row at a time, skipping rows that fail
    Insert {
        #[clap(flatten)]
        fixtures: FixtureArgs,
        #[clap(flatten)]
        target: Target,
        /// Rows per commit, overrides the configuration file
        #[clap(long)]
        batch_size: Option<usize>,
    },
    /// Summarise persisted fixtures
    Verify {
        #[clap(flatten)]
        target: Target,
        /// Only orders whose number starts with this
        #[clap(long)]
        prefix: Option<String>,
        #[clap(long, default_value = ORDER_TYPE)]
        type_tag: String,
    },
    /// Delete persisted payout fixtures
    Clean {
        #[clap(flatten)]
        target: Target,
        /// Only orders whose number starts with this
        #[clap(long)]
        prefix: Option<String>,
    },
}

#[derive(Args)]
struct FixtureArgs {
    /// Number of fixtures to generate
    #[clap(short = 'n', long, default_value_t = 500)]
    count: usize,
    /// Seed for a reproducible batch; random when omitted
    #[clap(long)]
    seed: Option<u64>,
    /// JSON generator configuration
    #[clap(long)]
    config: Option<String>,
    /// Order number prefix, overrides the configuration file
    #[clap(long)]
    prefix: Option<String>,
}

#[derive(Args)]
struct Target {
    /// SQLite database file
    #[clap(long)]
    database: Option<String>,
    /// Base URL of the REST data endpoint
    #[clap(long, env = "PAYOUT_REST_URL")]
    rest_url: Option<String>,
    #[clap(long, env = "PAYOUT_REST_KEY", hide_env_values = true)]
    rest_key: Option<String>,
    #[clap(long, default_value = DEFAULT_TABLE)]
    table: String,
    /// Create the SQLite table when it is missing
    #[clap(long)]
    create_table: bool,
}

#[derive(ArgEnum, Clone, Copy)]
enum OutputFormat {
    Sql,
    Csv,
}

impl FixtureArgs {
    fn config(&self) -> Result<GeneratorConfig, FixtureError> {
        let mut config = match &self.config {
            Some(path) => GeneratorConfig::from_json_file(path)?,
            None => GeneratorConfig::default(),
        };
        if let Some(prefix) = &self.prefix {
            config.order_no_prefix = prefix.clone();
        }
        Ok(config)
    }

    fn generate(&self, config: GeneratorConfig) -> Result<Vec<OrderFixture>, FixtureError> {
        let generator = OrderGenerator::new(config)?;
        let seed = self.seed.unwrap_or_else(|| rand::thread_rng().gen());
        info!("Generating {} fixtures with seed {}", self.count, seed);
        let mut rng = StdRng::seed_from_u64(seed);
        Ok(generator.generate(self.count, chrono::Utc::now(), &mut rng)?)
    }
}

impl Target {
    fn open(&self) -> Result<Box<dyn OrderStore>, FixtureError> {
        match (&self.database, &self.rest_url) {
            (Some(path), _) => {
                if self.rest_url.is_some() {
                    warn!("Both a database and a REST endpoint were given, using the database");
                }
                let store = SqliteStore::open(path, &self.table)?;
                if self.create_table {
                    store.create_orders_table()?;
                }
                Ok(Box::new(store))
            }
            (None, Some(base_url)) => {
                let api_key = self
                    .rest_key
                    .clone()
                    .ok_or(ConfigurationError::MissingApiKey)?;
                let client = RestClient::new(&RestConfig {
                    base_url: base_url.clone(),
                    api_key,
                    table: self.table.clone(),
                })?;
                Ok(Box::new(client))
            }
            (None, None) => Err(ConfigurationError::MissingTarget.into()),
        }
    }
}

fn output(path: Option<&str>) -> Result<Box<dyn Write>, FixtureError> {
    Ok(match path {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout()),
    })
}

fn run(cli: Cli) -> Result<(), FixtureError> {
    match cli.command {
        Command::Generate {
            fixtures,
            output: path,
            format,
            table,
            no_cleanup,
            database_clock,
            run_trailer,
        } => {
            let config = fixtures.config()?;
            let batch = fixtures.generate(config)?;
            let mut writer = output(path.as_deref())?;
            match format {
                OutputFormat::Sql => {
                    let options = ScriptOptions {
                        table,
                        cleanup: !no_cleanup,
                        trailer: if run_trailer {
                            Trailer::Statement
                        } else {
                            Trailer::Comment
                        },
                        updated_at: if database_clock {
                            UpdatedAt::Database
                        } else {
                            UpdatedAt::Fixture
                        },
                    };
                    writer.write_all(render_script(&batch, &options)?.as_bytes())?;
                }
                OutputFormat::Csv => write_csv(&batch, writer)?,
            }
            if let Some(path) = path {
                info!("Wrote {} fixtures to {}", batch.len(), path);
            }
        }
        Command::Apply {
            script,
            database,
            table,
            create_table,
        } => {
            let sql = fs::read_to_string(&script)?;
            let mut store = SqliteStore::open(&database, &table)?;
            if create_table {
                store.create_orders_table()?;
            }
            store.execute_script(&sql)?;
            println!(
                "Total payout tasks: {}",
                store.count_by_type(ORDER_TYPE)?
            );
        }
        Command::Insert {
            fixtures,
            target,
            batch_size,
        } => {
            let mut config = fixtures.config()?;
            if let Some(batch_size) = batch_size {
                config.batch_size = batch_size;
            }
            let batch_size = config.batch_size;
            let batch = fixtures.generate(config)?;
            let mut store = target.open()?;
            let report = insert_rows(store.as_mut(), &batch, batch_size)?;
            println!(
                "Inserted {}/{} payout fixtures ({} skipped)",
                report.inserted,
                report.requested,
                report.failed()
            );
            for failure in report.failures.iter().take(10) {
                println!("  {}", failure);
            }
        }
        Command::Verify {
            target,
            prefix,
            type_tag,
        } => {
            let store = target.open()?;
            let filter = OrderFilter {
                type_tag,
                order_no_prefix: prefix,
            };
            print!("{}", verify(store.as_ref(), &filter)?);
        }
        Command::Clean { target, prefix } => {
            let mut store = target.open()?;
            let filter = OrderFilter {
                type_tag: ORDER_TYPE.to_owned(),
                order_no_prefix: prefix,
            };
            let deleted = store.delete_matching(&filter)?;
            println!("Deleted {} payout fixtures", deleted);
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    run(cli).map_err(|e| {
        error!("{}", e);
        e.into()
    })
}
