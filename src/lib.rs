pub mod cli;
pub mod import;
pub mod parse;
pub mod partition;
pub mod pg;
pub mod profile;
pub mod reader;
pub mod scan;
pub mod schema;
pub mod sql;
pub mod types;

use std::{env, fs, sync::OnceLock};

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;

use crate::{cli::Cli, import::Request};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv2pg", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let request = Request {
        path: cli.input,
        database: cli.db,
        schema: cli.schema,
        table: cli.table,
        append: cli.append,
        cstore: cli.cstore,
        csv: cli.csv,
        compression: cli.compression,
        delimiter: cli.delimiter,
        header: !cli.noheader,
    };

    let is_dir = fs::metadata(&request.path)
        .map(|meta| meta.is_dir())
        .unwrap_or(false);

    if is_dir {
        import::load_dir(&request)
    } else {
        import::import(&request).map(|_| ())
    }
}
