//! Wide-table partition planning.
//!
//! Postgres caps a table at 1600 columns, and in practice rejects wide
//! tables well below that depending on the row layout. A schema wider than
//! the active size cap is split into contiguous column groups, one physical
//! table each, stitched back together by a synthetic `_row_id` key and,
//! when the target list stays within bounds, a union view.

use crate::schema::{Column, Schema};

/// Column caps tried in order when creating tables. The narrower fallback
/// covers type mixes the engine rejects at the wider layout.
pub const PARTITION_CAPS: &[usize] = &[924, 249];

/// The engine's limit on entries in a select target list, which bounds the
/// union view.
pub const TARGET_LIST_MAX: usize = 1664;

/// One contiguous column group mapped to a physical table.
#[derive(Debug, Clone)]
pub struct Partition {
    /// Offset of the group's first column within the schema.
    pub start: usize,
    pub columns: Vec<Column>,
}

/// The physical layout of one logical schema.
#[derive(Debug, Clone)]
pub struct PartitionPlan {
    pub partitions: Vec<Partition>,
}

impl PartitionPlan {
    /// Splits the schema into `ceil(columns / cap)` contiguous groups in
    /// header order; the last group holds the remainder.
    pub fn new(schema: &Schema, cap: usize) -> PartitionPlan {
        let partitions = schema
            .columns
            .chunks(cap)
            .enumerate()
            .map(|(i, chunk)| Partition {
                start: i * cap,
                columns: chunk.to_vec(),
            })
            .collect();
        PartitionPlan { partitions }
    }

    /// True when the schema spans more than one physical table, in which
    /// case every table carries the synthetic row id.
    pub fn is_partitioned(&self) -> bool {
        self.partitions.len() > 1
    }

    /// The physical table name for one partition: the base name itself for
    /// a single-table plan, `<base>_<i>` otherwise.
    pub fn table_name(&self, base: &str, index: usize) -> String {
        if self.is_partitioned() {
            format!("{base}_{index}")
        } else {
            base.to_string()
        }
    }

    /// Total number of logical columns across all partitions.
    pub fn column_count(&self) -> usize {
        self.partitions.iter().map(|p| p.columns.len()).sum()
    }

    /// A union view can only be created while its select list (every
    /// logical column plus one join key per partition) fits the engine's
    /// target-list limit.
    pub fn view_eligible(&self) -> bool {
        self.column_count() + self.partitions.len() <= TARGET_LIST_MAX
    }
}
