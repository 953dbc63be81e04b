//! Input stream adapter.
//!
//! Opens a file or standard input, layers decompression on top, and
//! normalizes the byte stream for the CSV layers: a leading UTF-8 BOM is
//! stripped and every carriage return becomes a newline, so the scanners
//! only ever deal with `\n` terminators. Classic Mac files come out with
//! plain newlines; `\r\n` pairs produce an empty physical line that the
//! scanner skips.

use std::{
    fs::File,
    io::{self, Read},
    path::Path,
};

use anyhow::{Context, Result, bail};
use bzip2::read::BzDecoder;
use flate2::read::MultiGzDecoder;

const BOM: &[u8] = &[0xef, 0xbb, 0xbf];

/// File format detected from the path extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Csv,
    Json,
    Ldjson,
}

/// Supported compression codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Bzip2,
}

impl Compression {
    fn from_token(token: &str) -> Option<Compression> {
        match token {
            "gz" | "gzip" => Some(Compression::Gzip),
            "bz2" | "bzip2" => Some(Compression::Bzip2),
            _ => None,
        }
    }
}

/// Parses an explicit compression hint. An empty hint means autodetect;
/// anything else must name a supported codec.
pub fn parse_compression(hint: &str) -> Result<Option<Compression>> {
    if hint.is_empty() {
        return Ok(None);
    }
    match Compression::from_token(hint) {
        Some(compression) => Ok(Some(compression)),
        None => bail!("compression type not supported: {hint}"),
    }
}

/// Detects the file format and compression from the path extensions. Every
/// extension token after the first dot is inspected, so `data.csv.gz`
/// yields both.
pub fn detect_type(name: &str) -> (Option<Format>, Option<Compression>) {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut format = None;
    let mut compression = None;
    for token in base.split('.').skip(1) {
        match token {
            "gz" | "gzip" => compression = Some(Compression::Gzip),
            "bz2" | "bzip2" => compression = Some(Compression::Bzip2),
            "csv" => format = Some(Format::Csv),
            "json" => format = Some(Format::Json),
            "ldjson" => format = Some(Format::Ldjson),
            _ => {}
        }
    }
    (format, compression)
}

/// The default table name for a path: the basename up to the first dot.
pub fn table_stem(name: &str) -> Option<String> {
    let base = Path::new(name).file_name()?.to_string_lossy().into_owned();
    let stem = base.split('.').next().unwrap_or_default();
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}

/// Wraps a reader to strip a leading UTF-8 BOM and rewrite every `\r` to
/// `\n`.
pub struct UniversalReader<R> {
    inner: R,
    first_read: bool,
}

impl<R> UniversalReader<R> {
    pub fn new(inner: R) -> UniversalReader<R> {
        UniversalReader {
            inner,
            first_read: true,
        }
    }
}

impl<R: Read> Read for UniversalReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut n = self.inner.read(buf)?;

        if self.first_read && n > 0 {
            self.first_read = false;
            if buf[..n].starts_with(BOM) {
                buf.copy_within(BOM.len()..n, 0);
                n -= BOM.len();
            }
        }

        for b in &mut buf[..n] {
            if *b == b'\r' {
                *b = b'\n';
            }
        }

        Ok(n)
    }
}

fn is_stdin(name: &str) -> bool {
    name.is_empty() || name == "-"
}

/// Opens the named input with the given compression applied, normalized
/// through the universal reader. An empty name or `-` opens stdin.
pub fn open(name: &str, compression: Option<Compression>) -> Result<UniversalReader<Box<dyn Read>>> {
    let raw: Box<dyn Read> = if is_stdin(name) {
        Box::new(io::stdin())
    } else {
        Box::new(File::open(name).with_context(|| format!("cannot open input: {name}"))?)
    };

    let decompressed: Box<dyn Read> = match compression {
        Some(Compression::Gzip) => Box::new(MultiGzDecoder::new(raw)),
        Some(Compression::Bzip2) => Box::new(BzDecoder::new(raw)),
        None => raw,
    };

    Ok(UniversalReader::new(decompressed))
}

/// A re-openable input source. The orchestrator reads the whole stream for
/// profiling and again for loading; stdin cannot be reopened, so it is
/// drained into memory once and both passes read from the buffer.
pub enum Source {
    File {
        name: String,
        compression: Option<Compression>,
    },
    Memory(Vec<u8>),
}

impl Source {
    pub fn new(name: &str, compression: Option<Compression>) -> Result<Source> {
        if is_stdin(name) {
            let mut buf = Vec::new();
            open(name, compression)?
                .read_to_end(&mut buf)
                .context("reading standard input")?;
            Ok(Source::Memory(buf))
        } else {
            Ok(Source::File {
                name: name.to_string(),
                compression,
            })
        }
    }

    /// Opens a fresh normalized reader over the input.
    pub fn open(&self) -> Result<Box<dyn Read + '_>> {
        match self {
            Source::File { name, compression } => Ok(Box::new(open(name, *compression)?)),
            // The buffer already went through the universal reader.
            Source::Memory(buf) => Ok(Box::new(buf.as_slice())),
        }
    }
}
