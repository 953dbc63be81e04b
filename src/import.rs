//! Two-pass ingest orchestration: profile the input, reopen it, and load.

use std::{
    io::BufReader,
    panic::{self, AssertUnwindSafe},
    path::Path,
    thread,
};

use anyhow::{Context, Result, bail};
use log::{debug, error, info};
use walkdir::WalkDir;

use crate::{
    pg::{CsvOptions, Loader},
    profile::CsvProfiler,
    reader::{self, Format, Source},
    schema::Schema,
};

/// Parameters for one ingest.
#[derive(Debug, Clone)]
pub struct Request {
    /// Input path; empty or `-` reads standard input.
    pub path: String,

    /// Database connection URL.
    pub database: String,
    /// Destination schema.
    pub schema: String,
    /// Destination table; derived from the file name when empty.
    pub table: String,

    /// Append to the table instead of replacing it.
    pub append: bool,
    /// Create a cstore foreign table.
    pub cstore: bool,

    /// Treat the input as CSV even without a `.csv` extension.
    pub csv: bool,
    /// Compression hint; autodetected from the extension when empty.
    pub compression: String,

    pub delimiter: u8,
    pub header: bool,
}

/// Runs one two-pass ingest and returns the number of loaded records.
pub fn import(request: &Request) -> Result<u64> {
    let hint = reader::parse_compression(&request.compression)?;
    let (format, detected) = reader::detect_type(&request.path);

    if !(request.csv || format == Some(Format::Csv)) {
        bail!("file type not supported; pass --csv for extensionless CSV input");
    }
    let compression = hint.or(detected);

    let table = if request.table.is_empty() {
        reader::table_stem(&request.path)
            .context("table name required when reading standard input")?
    } else {
        request.table.clone()
    };

    let source = Source::new(&request.path, compression)?;

    let profiler = CsvProfiler {
        delimiter: request.delimiter,
        header: request.header,
        ..CsvProfiler::default()
    };
    let profile = {
        let input = source.open()?;
        profiler
            .profile(BufReader::new(input))
            .with_context(|| format!("profiling {}", display_name(&request.path)))?
    };
    info!(
        "profiled {} records across {} columns",
        profile.record_count,
        profile.fields.len()
    );
    if log::log_enabled!(log::Level::Debug) {
        debug!("profile: {}", serde_json::to_string(&profile)?);
    }

    let mut table_schema = Schema::from_profile(&profile);
    table_schema.cstore = request.cstore;

    let mut loader = Loader::connect(&request.database)?;
    let options = CsvOptions {
        delimiter: request.delimiter,
        header: request.header,
    };

    info!(r#"begin load into "{}"."{}""#, request.schema, table);
    let input = source.open()?;
    let count = if request.append {
        loader.append(&request.schema, &table, &table_schema, options, input)?
    } else {
        loader.replace(&request.schema, &table, &table_schema, options, input)?
    };
    info!("loaded {count} records");

    Ok(count)
}

/// Walks a directory tree and imports every file on its own worker. The
/// table name comes from each file's basename and the schema from its
/// relative directory path; worker failures and panics are logged without
/// aborting the rest of the batch.
pub fn load_dir(request: &Request) -> Result<()> {
    let root = Path::new(&request.path);
    let mut requests = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry.with_context(|| format!("walking {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let Some(table) = reader::table_stem(&path.to_string_lossy()) else {
            continue;
        };

        requests.push(Request {
            path: path.to_string_lossy().into_owned(),
            schema: schema_from_relative_path(relative),
            table,
            csv: true,
            header: true,
            ..request.clone()
        });
    }

    thread::scope(|scope| {
        for file_request in &requests {
            scope.spawn(move || {
                info!(
                    r#"loading {} into "{}"."{}""#,
                    file_request.path, file_request.schema, file_request.table
                );
                match panic::catch_unwind(AssertUnwindSafe(|| import(file_request))) {
                    Ok(Ok(_)) => {}
                    Ok(Err(err)) => error!("error importing {}: {err:#}", file_request.path),
                    Err(_) => error!("panic while loading {}", file_request.path),
                }
            });
        }
    });

    Ok(())
}

// The destination schema for a file in directory mode: its relative
// directory path with separators replaced by underscores, or `public` at
// the root.
fn schema_from_relative_path(relative: &Path) -> String {
    let joined = relative
        .parent()
        .map(|dir| {
            dir.components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("_")
        })
        .unwrap_or_default();

    if joined.is_empty() {
        "public".to_string()
    } else {
        joined
    }
}

fn display_name(path: &str) -> &str {
    if path.is_empty() || path == "-" {
        "<stdin>"
    } else {
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_names_follow_the_directory_layout() {
        assert_eq!(schema_from_relative_path(Path::new("users.csv")), "public");
        assert_eq!(
            schema_from_relative_path(Path::new("finance/users.csv")),
            "finance"
        );
        assert_eq!(
            schema_from_relative_path(Path::new("finance/2024/q1.csv")),
            "finance_2024"
        );
    }

    #[test]
    fn unsupported_inputs_fail_before_any_work() {
        let request = Request {
            path: "events.parquet".to_string(),
            database: String::new(),
            schema: "public".to_string(),
            table: String::new(),
            append: false,
            cstore: false,
            csv: false,
            compression: String::new(),
            delimiter: b',',
            header: true,
        };
        assert!(import(&request).is_err());

        let request = Request {
            compression: "zip".to_string(),
            csv: true,
            ..request
        };
        let err = import(&request).unwrap_err();
        assert!(err.to_string().contains("compression type not supported"));
    }
}
