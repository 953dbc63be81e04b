//! Destination schema derived from a profile.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::{profile::Profile, types::ValueType};

/// Synthetic key binding partition tables together.
pub const ROW_ID_COLUMN: &str = "_row_id";

static BAD_CHARS: OnceLock<Regex> = OnceLock::new();
static SEP_CHARS: OnceLock<Regex> = OnceLock::new();

/// One column definition of the destination table.
#[derive(Debug, Clone, Serialize)]
pub struct Column {
    /// Cleaned identifier, safe to quote into DDL.
    pub name: String,
    /// Destination SQL type.
    pub sql_type: &'static str,
    /// Values across the records are expected to be unique.
    pub unique: bool,
    /// Values may be null.
    pub nullable: bool,
}

/// Ordered destination schema. Column order follows the source header
/// order, which the partitioner relies on.
#[derive(Debug, Clone, Serialize)]
pub struct Schema {
    pub columns: Vec<Column>,
    /// Emit cstore foreign-table DDL instead of plain tables.
    pub cstore: bool,
}

impl Schema {
    pub fn from_profile(profile: &Profile) -> Schema {
        let mut fields: Vec<_> = profile.fields.values().collect();
        fields.sort_by_key(|f| f.index);

        let columns = fields
            .into_iter()
            .map(|f| Column {
                name: clean_column_name(&f.name),
                sql_type: sql_type(f.value_type),
                unique: f.unique,
                nullable: f.nullable,
            })
            .collect();

        Schema {
            columns,
            cstore: false,
        }
    }
}

/// Maps a resolved value type to the destination SQL type.
pub fn sql_type(t: ValueType) -> &'static str {
    match t {
        ValueType::Unknown => "integer",
        ValueType::Null => "text",
        ValueType::String => "text",
        ValueType::Binary => "bytea",
        ValueType::Int => "integer",
        ValueType::Float => "real",
        ValueType::Bool => "boolean",
        ValueType::Date => "date",
        ValueType::DateTime => "timestamp",
        ValueType::Object => "json",
    }
}

/// Sanitizes a header name into a destination identifier: lowercased, runs
/// of characters outside `[a-z0-9_\-.+]` collapse to one `_`, then runs of
/// separator characters collapse to one `_`.
pub fn clean_column_name(name: &str) -> String {
    let bad = BAD_CHARS.get_or_init(|| Regex::new(r"[^a-z0-9_\-\.\+]+").unwrap());
    let sep = SEP_CHARS.get_or_init(|| Regex::new(r"[_\-\.\+]+").unwrap());

    let lowered = name.to_lowercase();
    let cleaned = bad.replace_all(&lowered, "_");
    sep.replace_all(&cleaned, "_").into_owned()
}
