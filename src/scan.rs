//! Field-granular CSV scanner.
//!
//! Compatible with RFC 4180, extended with a configurable single-byte
//! separator. Successive calls to [`Scanner::scan`] step through the fields
//! of the input, skipping the separator or newline between them;
//! [`Scanner::end_of_record`] tells when a field was terminated by a line
//! break rather than a separator.
//!
//! Unlike the `csv` crate reader used on the load path, this scanner
//! recovers from malformed fields: with `continue_on_error` set (the
//! default) a field error surfaces through [`Scanner::err`], the remainder
//! of the line is emitted as the current token, and scanning resumes on the
//! next line. Quoted fields may not span lines.

use std::{
    fmt,
    io::{self, BufRead},
};

/// A field-level scan failure. Scanning can continue past any of these when
/// `continue_on_error` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanError {
    /// A bare `"` appeared inside an unquoted field.
    UnquotedField,
    /// A quote was reopened inside a quoted field without being escaped.
    UnescapedQuote,
    /// The line ended inside an open quoted field.
    UnterminatedField,
    /// The line holds more fields than the caller's row.
    ExtraColumns,
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ScanError::UnquotedField => "unquoted field",
            ScanError::UnescapedQuote => "bare quote",
            ScanError::UnterminatedField => "unterminated field",
            ScanError::ExtraColumns => "extra columns",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for ScanError {}

/// Outcome of a whole-row read.
#[derive(Debug, PartialEq, Eq)]
pub enum RowRead {
    /// A full record was scanned into the row.
    Record,
    /// A record was scanned but a field was malformed; the row tail past the
    /// offending field is cleared.
    Malformed(ScanError),
    /// The input is exhausted.
    Eof,
}

pub struct Scanner<R> {
    input: R,
    /// Keep scanning after field-level errors. Callers check [`Scanner::err`]
    /// between calls to [`Scanner::scan`].
    pub continue_on_error: bool,

    sep: u8,
    // True when the most recent field was terminated by a newline.
    eor: bool,
    lineno: usize,
    column: usize,

    eof: bool,
    err: Option<ScanError>,
    io_err: Option<io::Error>,

    // Current physical line, scan position within it, and last token.
    line: String,
    pos: usize,
    token: String,

    // A separator ended the line; one trailing empty field is still owed.
    trail: bool,
}

impl<R: BufRead> Scanner<R> {
    pub fn new(input: R, sep: u8) -> Scanner<R> {
        Scanner {
            input,
            continue_on_error: true,
            sep,
            eor: true,
            lineno: 0,
            column: 0,
            eof: false,
            err: None,
            io_err: None,
            line: String::new(),
            pos: 0,
            token: String::new(),
            trail: false,
        }
    }

    /// The current physical line, verbatim.
    pub fn line(&self) -> &str {
        &self.line
    }

    /// The text of the current field.
    pub fn text(&self) -> &str {
        &self.token
    }

    /// 1-based line number of the current field.
    pub fn line_number(&self) -> usize {
        self.lineno
    }

    /// 1-based column index of the current field within its record.
    pub fn column_number(&self) -> usize {
        self.column
    }

    /// True when the most recent field was terminated by a newline rather
    /// than a separator.
    pub fn end_of_record(&self) -> bool {
        self.eor
    }

    /// The field-level error raised by the most recent [`Scanner::scan`].
    pub fn err(&self) -> Option<&ScanError> {
        self.err.as_ref()
    }

    /// Takes the underlying I/O error, if one stopped the scanner.
    pub fn io_error(&mut self) -> Option<io::Error> {
        self.io_err.take()
    }

    /// Advances to the next field. Returns false at end of input, on an I/O
    /// error, or on a field error when `continue_on_error` is unset.
    pub fn scan(&mut self) -> bool {
        if self.err.is_some() && !self.continue_on_error {
            return false;
        }
        if self.io_err.is_some() {
            return false;
        }
        if self.eof && self.rest().is_empty() {
            return false;
        }

        // The previous field ended its record; fetch the next non-empty line.
        if self.eor {
            self.pos = 0;
            self.token.clear();
            loop {
                self.line.clear();
                let mut raw = Vec::new();
                match self.input.read_until(b'\n', &mut raw) {
                    Err(err) => {
                        self.io_err = Some(err);
                        return false;
                    }
                    Ok(0) => {
                        self.eof = true;
                        break;
                    }
                    Ok(_) => {
                        if raw.last() == Some(&b'\n') {
                            raw.pop();
                        }
                        if !raw.is_empty() {
                            self.line = String::from_utf8_lossy(&raw).into_owned();
                            break;
                        }
                    }
                }
            }
        }

        let (adv, token, trail, err) = self.scan_field();
        self.pos += adv;
        self.err = err;

        if trail && self.rest().is_empty() {
            self.trail = true;
        }

        match token {
            Some(token) if err.is_none() => self.token = token,
            _ => {
                if self.continue_on_error {
                    self.token = self.line[self.pos..].to_string();
                    self.eor = true;
                } else {
                    return false;
                }
            }
        }

        if !self.trail && self.eof && self.rest().is_empty() {
            return false;
        }

        true
    }

    /// Scans every field of one record into a fresh vector. Field errors are
    /// recovered per the scanner's policy and reported via [`Scanner::err`].
    /// Returns `None` once the input is exhausted.
    pub fn read_record(&mut self) -> io::Result<Option<Vec<String>>> {
        let mut record = Vec::new();
        while self.scan() {
            record.push(self.token.clone());
            if self.end_of_record() {
                break;
            }
        }
        if let Some(err) = self.io_err.take() {
            return Err(err);
        }
        if record.is_empty() { Ok(None) } else { Ok(Some(record)) }
    }

    /// Scans the fields of one record into the passed row. Yields
    /// [`ScanError::ExtraColumns`] when the record holds more fields than the
    /// row; on any field error the unfilled tail of the row is cleared and
    /// the rest of the record is drained so the next call starts fresh.
    pub fn read_row(&mut self, row: &mut [String]) -> io::Result<RowRead> {
        let mut i = 0;
        let mut scanned = false;
        while self.scan() {
            scanned = true;
            if i == row.len() {
                clear_row(&mut row[..]);
                self.drain_record();
                return self.row_result(RowRead::Malformed(ScanError::ExtraColumns));
            }
            if let Some(err) = self.err {
                row[i] = self.token.clone();
                clear_row(&mut row[i + 1..]);
                return self.row_result(RowRead::Malformed(err));
            }
            row[i] = self.token.clone();
            i += 1;
            if self.end_of_record() {
                break;
            }
        }
        if let Some(err) = self.io_err.take() {
            return Err(err);
        }
        if !scanned {
            return Ok(RowRead::Eof);
        }
        clear_row(&mut row[i..]);
        Ok(RowRead::Record)
    }

    fn row_result(&mut self, read: RowRead) -> io::Result<RowRead> {
        match self.io_err.take() {
            Some(err) => Err(err),
            None => Ok(read),
        }
    }

    // Consumes the remaining fields of the current record.
    fn drain_record(&mut self) {
        while !self.end_of_record() && self.scan() {}
    }

    fn rest(&self) -> &[u8] {
        &self.line.as_bytes()[self.pos..]
    }

    // Scans one field from the remaining bytes of the current line, returning
    // the number of bytes consumed, the token, whether the field was
    // terminated by a separator, and any field error.
    fn scan_field(&mut self) -> (usize, Option<String>, bool, Option<ScanError>) {
        // A separator ended the previous line; emit the owed empty field.
        if self.trail {
            self.column += 1;
            self.eor = true;
            self.trail = false;
            return (0, Some(String::new()), false, None);
        }

        let data = &self.line.as_bytes()[self.pos..];
        if data.is_empty() {
            return (0, None, false, None);
        }

        // Previous field ended a record: advance the line, reset the column.
        if self.eor {
            self.column = 0;
            self.lineno += 1;
        }
        self.column += 1;
        self.eor = false;

        if data[0] == b'"' {
            // Quoted field.
            let mut escaped = 0usize;
            let mut open_quote = false;
            let mut c = 0u8;
            let mut pc = 0u8;

            let mut i = 1;
            while i < data.len() {
                c = data[i];

                if c == b'"' {
                    // Successive quotes denote an escaped quote. Clear the
                    // previous byte so escaped quotes are not overlapped.
                    if pc == b'"' {
                        pc = 0;
                        open_quote = false;
                        escaped += 1;
                        i += 1;
                        continue;
                    }
                    if open_quote {
                        return (0, None, false, Some(ScanError::UnescapedQuote));
                    }
                    open_quote = true;
                }

                // Closing quote followed by a separator ends the field.
                if pc == b'"' && c == self.sep {
                    return (
                        i + 1,
                        Some(unescape_quotes(&data[1..i - 1], escaped)),
                        true,
                        None,
                    );
                }

                pc = c;
                i += 1;
            }

            // Ran out of bytes.
            self.eor = true;

            // Final byte of the line closes the field.
            if c == b'"' {
                return (
                    data.len(),
                    Some(unescape_quotes(&data[1..data.len() - 1], escaped)),
                    false,
                    None,
                );
            }

            (0, None, false, Some(ScanError::UnterminatedField))
        } else {
            // Unquoted field. Only a stray double quote is an error.
            for (i, &c) in data.iter().enumerate() {
                if c == self.sep {
                    self.eor = false;
                    return (i + 1, Some(lossy(&data[..i])), true, None);
                }
                if c == b'"' {
                    return (0, None, false, Some(ScanError::UnquotedField));
                }
            }

            // Ran out of bytes.
            self.eor = true;

            (data.len(), Some(lossy(data)), false, None)
        }
    }
}

fn clear_row(row: &mut [String]) {
    for cell in row {
        cell.clear();
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

// Collapses escaped quote pairs, dropping `count` bytes.
fn unescape_quotes(bytes: &[u8], count: usize) -> String {
    if count == 0 {
        return lossy(bytes);
    }

    let mut out = Vec::with_capacity(bytes.len() - count);
    let mut i = 0;
    while i < bytes.len() {
        out.push(bytes[i]);
        if bytes[i] == b'"' && i + 1 < bytes.len() && bytes[i + 1] == b'"' {
            i += 1;
        }
        i += 1;
    }

    lossy(&out)
}
