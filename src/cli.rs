use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Profile a CSV file and bulk-load it into Postgres",
    long_about = None
)]
pub struct Cli {
    /// Input file or directory; "-" reads from standard input
    pub input: String,

    /// Database connection URL
    #[arg(long = "db")]
    pub db: String,

    /// Destination schema (derived per file in directory mode)
    #[arg(long, default_value = "public")]
    pub schema: String,

    /// Destination table (defaults to the input file name stem)
    #[arg(long, default_value = "")]
    pub table: String,

    /// Treat the input as CSV; required when reading stdin or files without
    /// a .csv extension
    #[arg(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub csv: bool,

    /// CSV delimiter (supports ',', 'tab', ';', '|')
    #[arg(long = "csv.delim", value_parser = parse_delimiter, default_value = ",")]
    pub delimiter: u8,

    /// No CSV header present; columns are named c0, c1, ...
    #[arg(long = "csv.noheader")]
    pub noheader: bool,

    /// Compression used ("gzip" or "bzip2"; detected from the extension
    /// when omitted)
    #[arg(long, default_value = "")]
    pub compression: String,

    /// Create a cstore foreign table
    #[arg(long)]
    pub cstore: bool,

    /// Append to the destination table instead of replacing it
    #[arg(long)]
    pub append: bool,
}

/// Accepts the named forms `comma`, `tab`, `pipe`, and `semicolon`, or any
/// single ASCII character literal.
pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "comma" => return Ok(b','),
        "tab" => return Ok(b'\t'),
        "pipe" => return Ok(b'|'),
        "semicolon" => return Ok(b';'),
        _ => {}
    }
    // A one-byte str is ASCII by construction.
    match value.as_bytes() {
        [] => Err("delimiter cannot be empty".to_string()),
        [byte] => Ok(*byte),
        _ => Err(format!("delimiter must be a single ASCII character, got '{value}'")),
    }
}
