//! Pass-1 profiling: per-column type, nullability, and uniqueness
//! aggregation over a full scan of the input.

use std::{
    collections::{BTreeMap, HashSet},
    io::BufRead,
};

use anyhow::{Context, Result, bail};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::{
    parse,
    scan::{RowRead, Scanner},
    types::{ValueType, generalize},
};

/// Aggregated statistics for one profiled column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    /// Canonical lowercase name of the column.
    pub name: String,
    /// Zero-based position in the source header order.
    pub index: usize,
    /// Most specific type every observed value satisfies.
    #[serde(rename = "type")]
    pub value_type: ValueType,
    /// True if the column contains null values.
    pub nullable: bool,
    /// True if the column contains empty strings.
    pub missing: bool,
    /// True if all non-empty raw values are distinct.
    pub unique: bool,
    /// True if at least one integer value carried a leading zero.
    pub leading_zeros: bool,
}

/// The result of profiling one input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub record_count: i64,
    pub fields: BTreeMap<String, Field>,
}

/// Column name filters applied while profiling. Names are matched after
/// lowercasing.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

#[derive(Debug)]
struct FieldState {
    name: String,
    types: HashSet<ValueType>,
    values: HashSet<String>,
    unique: bool,
    leading_zeros: bool,
    missing: bool,
}

impl FieldState {
    fn new(name: String) -> FieldState {
        FieldState {
            name,
            types: HashSet::new(),
            values: HashSet::new(),
            unique: true,
            leading_zeros: false,
            missing: false,
        }
    }

    // The most specific type this field satisfies.
    fn resolved_type(&self) -> ValueType {
        if self.leading_zeros {
            return ValueType::String;
        }
        self.types.iter().fold(ValueType::Unknown, |acc, &t| {
            if acc == ValueType::Unknown {
                t
            } else {
                generalize(acc, t)
            }
        })
    }

    // Index is assigned afterwards from the header order.
    fn freeze(self) -> Field {
        let value_type = self.resolved_type();
        let nullable = self.types.contains(&ValueType::Null);
        Field {
            name: self.name,
            index: 0,
            value_type,
            nullable,
            missing: self.missing,
            unique: self.unique,
            leading_zeros: self.leading_zeros,
        }
    }
}

/// Streaming profiler consuming `(column, raw value)` events plus an
/// end-of-record tick.
pub struct Profiler {
    count: i64,
    include: HashSet<String>,
    exclude: HashSet<String>,
    fields: BTreeMap<String, FieldState>,
}

impl Profiler {
    pub fn new(config: &Config) -> Profiler {
        Profiler {
            count: 0,
            include: config.include.iter().map(|f| f.to_lowercase()).collect(),
            exclude: config.exclude.iter().map(|f| f.to_lowercase()).collect(),
            fields: BTreeMap::new(),
        }
    }

    /// Increments the record count.
    pub fn incr(&mut self) {
        self.count += 1;
    }

    // The field state for a name, unless the name is filtered out.
    fn field(&mut self, name: &str) -> Option<&mut FieldState> {
        let name = name.to_lowercase();
        if self.exclude.contains(&name) {
            return None;
        }
        if !self.include.is_empty() && !self.include.contains(&name) {
            return None;
        }
        Some(
            self.fields
                .entry(name.clone())
                .or_insert_with(|| FieldState::new(name)),
        )
    }

    /// Records a raw value of unknown type; the value is parsed in priority
    /// order to detect the most specific type it satisfies.
    pub fn record(&mut self, name: &str, raw: &str) {
        let Some(field) = self.field(name) else {
            return;
        };

        if field.unique {
            if !field.values.insert(raw.to_string()) {
                field.unique = false;
                field.values = HashSet::new();
            }
        }

        // Already the most general type.
        if field.types.contains(&ValueType::String) {
            return;
        }

        if parse::parse_int(raw).is_some() {
            if raw.starts_with('0') {
                field.leading_zeros = true;
            }
            field.types.insert(ValueType::Int);
        } else if parse::parse_float(raw).is_some() {
            field.types.insert(ValueType::Float);
        } else if parse::parse_bool(raw).is_some() {
            field.types.insert(ValueType::Bool);
        } else if parse::parse_date(raw).is_some() {
            field.types.insert(ValueType::Date);
        } else if parse::parse_datetime(raw).is_some() {
            field.types.insert(ValueType::DateTime);
        } else {
            field.types.insert(ValueType::String);
        }
    }

    /// Records a null observation; uniqueness is untouched.
    pub fn record_null(&mut self, name: &str) {
        if let Some(field) = self.field(name) {
            field.types.insert(ValueType::Null);
            field.missing = true;
        }
    }

    /// Freezes the aggregation into a profile.
    pub fn finish(self) -> Profile {
        let fields = self
            .fields
            .into_iter()
            .map(|(name, state)| (name, state.freeze()))
            .collect();
        Profile {
            record_count: self.count,
            fields,
        }
    }
}

/// Pass-1 driver: scans a CSV stream and profiles every cell.
#[derive(Debug, Clone)]
pub struct CsvProfiler {
    pub config: Config,
    pub delimiter: u8,
    pub header: bool,
}

impl Default for CsvProfiler {
    fn default() -> Self {
        CsvProfiler {
            config: Config::default(),
            delimiter: b',',
            header: true,
        }
    }
}

impl CsvProfiler {
    /// Profiles the whole stream. Column names come from the header record,
    /// lowercased, or are synthesized as `c0, c1, ...` for headless input
    /// (in which case the first record is profiled as data). Rows with
    /// field-level scan errors are logged and skipped.
    pub fn profile<R: BufRead>(&self, input: R) -> Result<Profile> {
        let mut scanner = Scanner::new(input, self.delimiter);
        let mut profiler = Profiler::new(&self.config);

        let Some(first) = scanner.read_record().context("reading first record")? else {
            bail!("input is empty");
        };
        if let Some(err) = scanner.err() {
            warn!("line {}: {err} in first record", scanner.line_number());
        }

        let header: Vec<String> = if self.header {
            first.iter().map(|name| name.to_lowercase()).collect()
        } else {
            (0..first.len()).map(|i| format!("c{i}")).collect()
        };

        if !self.header {
            self.record_row(&mut profiler, &header, &first);
        }

        let mut row = vec![String::new(); header.len()];
        loop {
            match scanner
                .read_row(&mut row)
                .context("reading record")?
            {
                RowRead::Eof => break,
                RowRead::Malformed(err) => {
                    warn!(
                        "line {}: {err}; skipping row: {}",
                        scanner.line_number(),
                        scanner.line()
                    );
                }
                RowRead::Record => self.record_row(&mut profiler, &header, &row),
            }
        }

        let mut profile = profiler.finish();
        for (index, name) in header.iter().enumerate() {
            if let Some(field) = profile.fields.get_mut(name) {
                field.index = index;
            }
        }
        Ok(profile)
    }

    fn record_row(&self, profiler: &mut Profiler, header: &[String], row: &[String]) {
        for (name, value) in header.iter().zip(row) {
            // Empty strings count as null values.
            if value.is_empty() {
                profiler.record_null(name);
            } else {
                profiler.record(name, value);
            }
        }
        profiler.incr();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn profile(input: &str) -> Profile {
        CsvProfiler::default()
            .profile(Cursor::new(input.as_bytes().to_vec()))
            .unwrap()
    }

    #[test]
    fn detects_types_uniqueness_and_nulls() {
        let p = profile(
            "name,color,dob\nJohn,Blue,03/11/2013\nJane,Red,2008-2-24\nJoe,,2010-02-11\n",
        );

        assert_eq!(p.record_count, 3);
        assert_eq!(p.fields.len(), 3);

        let name = &p.fields["name"];
        assert_eq!(name.value_type, ValueType::String);
        assert!(name.unique);
        assert!(!name.nullable);
        assert_eq!(name.index, 0);

        let color = &p.fields["color"];
        assert_eq!(color.value_type, ValueType::String);
        assert!(color.nullable);
        assert!(color.missing);
        assert_eq!(color.index, 1);

        let dob = &p.fields["dob"];
        assert_eq!(dob.value_type, ValueType::Date);
        assert!(dob.unique);
        assert!(!dob.nullable);
        assert_eq!(dob.index, 2);
    }

    #[test]
    fn leading_zeros_force_string() {
        let p = profile("id,score\n007,10\n008,20\n");

        let id = &p.fields["id"];
        assert_eq!(id.value_type, ValueType::String);
        assert!(id.leading_zeros);
        assert!(id.unique);

        let score = &p.fields["score"];
        assert_eq!(score.value_type, ValueType::Int);
        assert!(!score.leading_zeros);
        assert!(score.unique);
    }

    #[test]
    fn duplicate_values_clear_uniqueness() {
        let p = profile("city\nParis\nLondon\nParis\n");
        assert!(!p.fields["city"].unique);

        // Empty cells do not count against uniqueness.
        let p = profile("city,n\nParis,1\n,2\n,3\nLondon,4\n");
        assert!(p.fields["city"].unique);
        assert!(p.fields["city"].nullable);
    }

    #[test]
    fn mixed_numeric_columns_generalize() {
        let p = profile("n\n1\n2.5\n");
        assert_eq!(p.fields["n"].value_type, ValueType::Float);

        let p = profile("n\n1\ntrue\n");
        assert_eq!(p.fields["n"].value_type, ValueType::Int);

        let p = profile("n\n2010-02-11\n2010-02-11 10:00\n");
        assert_eq!(p.fields["n"].value_type, ValueType::DateTime);

        let p = profile("n\n1\nhello\n");
        assert_eq!(p.fields["n"].value_type, ValueType::String);
    }

    #[test]
    fn headless_input_synthesizes_column_names() {
        let mut profiler = CsvProfiler::default();
        profiler.header = false;
        let p = profiler
            .profile(Cursor::new(b"John,10\nJane,20\n".to_vec()))
            .unwrap();

        assert_eq!(p.record_count, 2);
        assert_eq!(p.fields["c0"].value_type, ValueType::String);
        assert_eq!(p.fields["c1"].value_type, ValueType::Int);
        assert_eq!(p.fields["c1"].index, 1);
    }

    #[test]
    fn include_and_exclude_filters_apply() {
        let mut profiler = CsvProfiler::default();
        profiler.config.exclude = vec!["B".to_string()];
        let p = profiler
            .profile(Cursor::new(b"a,b\n1,2\n".to_vec()))
            .unwrap();
        assert!(p.fields.contains_key("a"));
        assert!(!p.fields.contains_key("b"));

        let mut profiler = CsvProfiler::default();
        profiler.config.include = vec!["b".to_string()];
        let p = profiler
            .profile(Cursor::new(b"a,b\n1,2\n".to_vec()))
            .unwrap();
        assert!(!p.fields.contains_key("a"));
        assert!(p.fields.contains_key("b"));
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let p = profile("name,state\nJoe, \"GA\"\nSue,NJ\n");
        assert_eq!(p.record_count, 1);
        assert_eq!(p.fields["state"].value_type, ValueType::String);
    }

    #[test]
    fn empty_input_is_an_error() {
        let result = CsvProfiler::default().profile(Cursor::new(Vec::new()));
        assert!(result.is_err());
    }

    #[test]
    fn empty_strings_mark_missing_not_type() {
        // The blank physical line is skipped entirely; only integers seen.
        let p = profile("v\n1\n\n10\n");
        let v = &p.fields["v"];
        assert_eq!(v.value_type, ValueType::Int);
        assert!(!v.missing);

        let p = profile("a,b\n1,\n2,x\n");
        let b = &p.fields["b"];
        assert!(b.missing);
        assert!(b.nullable);
        assert_eq!(b.value_type, ValueType::String);
    }
}
