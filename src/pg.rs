//! Postgres bulk loader.
//!
//! Drives the write side of an ingest: table creation with wide-table
//! fallback, per-partition transactional `COPY FROM STDIN`, and the
//! replace-by-rename swap that keeps the previous data visible until the
//! new load commits.

use std::io::Read;

use anyhow::{Context, Result, anyhow, bail};
use log::{debug, info};
use postgres::{Client, Config, NoTls};
use uuid::Uuid;

use crate::{
    partition::{PARTITION_CAPS, PartitionPlan},
    schema::{ROW_ID_COLUMN, Schema},
    sql,
};

// Substring of the server error that triggers the partition-cap fallback.
const COLUMN_LIMIT_ERROR: &str = "tables can have at most 1600 columns";

/// CSV shape of the input on the load pass.
#[derive(Debug, Clone, Copy)]
pub struct CsvOptions {
    pub delimiter: u8,
    pub header: bool,
}

pub struct Loader {
    config: Config,
    client: Client,
}

impl Loader {
    pub fn connect(database_url: &str) -> Result<Loader> {
        let config: Config = database_url
            .parse()
            .context("parsing database URL")?;
        let client = config
            .connect(NoTls)
            .context("cannot open db connection")?;
        Ok(Loader { config, client })
    }

    /// Replaces the destination table with freshly loaded data. The load
    /// lands in tables under a temporary UUID base name and only takes the
    /// target name in the final rename transaction, so a failure anywhere
    /// leaves the previous data untouched.
    pub fn replace<R: Read>(
        &mut self,
        schema_name: &str,
        table_name: &str,
        table_schema: &Schema,
        options: CsvOptions,
        data: R,
    ) -> Result<u64> {
        self.create_schema(schema_name)?;

        let temp_base = Uuid::new_v4().to_string();
        let plan = self.create_tables(schema_name, &temp_base, table_schema)?;

        let count = self.copy_data(schema_name, &temp_base, &plan, options, data)?;

        self.swap_tables(schema_name, &temp_base, table_name, &plan)?;

        if plan.is_partitioned() && plan.view_eligible() {
            self.exec_stmt(&sql::create_view(schema_name, table_name, table_name, &plan))
                .context("error creating view")?;
        }

        self.analyze_tables(schema_name, table_name, &plan)?;
        Ok(count)
    }

    /// Appends to the destination table, creating it when absent. No
    /// rename and no view changes. Schemas wide enough to partition are
    /// rejected: the row id restarts at 1 on every load and would collide
    /// with the unique key already present in the partition tables.
    pub fn append<R: Read>(
        &mut self,
        schema_name: &str,
        table_name: &str,
        table_schema: &Schema,
        options: CsvOptions,
        data: R,
    ) -> Result<u64> {
        if table_schema.columns.len() > PARTITION_CAPS[0] {
            bail!(
                "append cannot target a partitioned layout ({} columns exceeds {}); replace the table instead",
                table_schema.columns.len(),
                PARTITION_CAPS[0]
            );
        }

        self.create_schema(schema_name)?;
        let plan = self.create_tables(schema_name, table_name, table_schema)?;
        let count = self.copy_data(schema_name, table_name, &plan, options, data)?;
        self.analyze_tables(schema_name, table_name, &plan)?;
        Ok(count)
    }

    // Runs a function inside a transaction on the control connection.
    fn exec_tx<T>(
        &mut self,
        f: impl FnOnce(&mut postgres::Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut tx = self.client.transaction()?;
        let out = f(&mut tx)?;
        tx.commit()?;
        Ok(out)
    }

    fn exec_stmt(&mut self, stmt: &str) -> Result<()> {
        self.exec_tx(|tx| {
            tx.batch_execute(stmt)
                .with_context(|| format!("offending statement:\n{stmt}"))
        })
    }

    fn create_schema(&mut self, schema_name: &str) -> Result<()> {
        self.exec_stmt(&sql::create_schema(schema_name))
            .context("error creating schema")
    }

    // Creates the partition tables for the schema, trying each size cap in
    // turn. A creation attempt runs in one transaction; when the server
    // reports its column limit the attempt rolls back and the next,
    // narrower cap is tried. Any other failure is fatal.
    fn create_tables(
        &mut self,
        schema_name: &str,
        base: &str,
        table_schema: &Schema,
    ) -> Result<PartitionPlan> {
        let mut last_err = None;

        for &cap in PARTITION_CAPS {
            let plan = PartitionPlan::new(table_schema, cap);
            let partitioned = plan.is_partitioned();

            let attempt = self.exec_tx(|tx| {
                for (idx, part) in plan.partitions.iter().enumerate() {
                    let stmt = sql::create_table(
                        schema_name,
                        &plan.table_name(base, idx),
                        &part.columns,
                        partitioned,
                        table_schema.cstore,
                    );
                    tx.batch_execute(&stmt)
                        .with_context(|| format!("error creating table:\n{stmt}"))?;
                }
                Ok(())
            });

            match attempt {
                Ok(()) => {
                    if partitioned {
                        info!(
                            "schema spans {} columns; split across {} tables",
                            plan.column_count(),
                            plan.partitions.len()
                        );
                    }
                    return Ok(plan);
                }
                Err(err) if is_column_limit_error(&err) => {
                    debug!("column limit hit at cap {cap}; retrying narrower");
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("no partition caps to try")))
    }

    // Streams every row into the partition tables: one connection and one
    // transaction per partition, held open for the duration of the copy.
    // All transactions commit together after every copy stream finished;
    // any error rolls all of them back.
    fn copy_data<R: Read>(
        &mut self,
        schema_name: &str,
        base: &str,
        plan: &PartitionPlan,
        options: CsvOptions,
        data: R,
    ) -> Result<u64> {
        let partitioned = plan.is_partitioned();

        let statements: Vec<String> = plan
            .partitions
            .iter()
            .enumerate()
            .map(|(idx, part)| {
                let mut columns: Vec<&str> = Vec::with_capacity(part.columns.len() + 1);
                if partitioned {
                    columns.push(ROW_ID_COLUMN);
                }
                columns.extend(part.columns.iter().map(|c| c.name.as_str()));
                sql::copy_in(schema_name, &plan.table_name(base, idx), &columns)
            })
            .collect();

        let mut connections = Vec::with_capacity(plan.partitions.len());
        for _ in &plan.partitions {
            connections.push(
                self.config
                    .connect(NoTls)
                    .context("cannot open partition connection")?,
            );
        }
        for connection in &mut connections {
            connection
                .batch_execute("begin")
                .context("error opening partition transaction")?;
        }

        match stream_rows(&mut connections, &statements, plan, options, data) {
            Ok(count) => {
                for connection in &mut connections {
                    connection
                        .batch_execute("commit")
                        .context("error committing partition transaction")?;
                }
                Ok(count)
            }
            Err(err) => {
                for connection in &mut connections {
                    let _ = connection.batch_execute("rollback");
                }
                Err(err)
            }
        }
    }

    // Swaps the temp tables in under the target name in one transaction.
    // Whatever relation currently occupies a target name (a table from the
    // previous load, or a view or foreign table when the layout changed
    // between runs) is dropped with the matching drop statement.
    fn swap_tables(
        &mut self,
        schema_name: &str,
        temp_base: &str,
        table_name: &str,
        plan: &PartitionPlan,
    ) -> Result<()> {
        let partitioned = plan.is_partitioned();
        self.exec_tx(|tx| {
            drop_existing(tx, schema_name, table_name)?;
            for idx in 0..plan.partitions.len() {
                let target = plan.table_name(table_name, idx);
                if partitioned {
                    drop_existing(tx, schema_name, &target)?;
                }
                let stmt =
                    sql::rename_table(schema_name, &plan.table_name(temp_base, idx), &target);
                tx.batch_execute(&stmt)
                    .with_context(|| format!("error renaming table:\n{stmt}"))?;
            }
            Ok(())
        })
    }

    fn analyze_tables(
        &mut self,
        schema_name: &str,
        table_name: &str,
        plan: &PartitionPlan,
    ) -> Result<()> {
        for idx in 0..plan.partitions.len() {
            let stmt = sql::analyze_table(schema_name, &plan.table_name(table_name, idx));
            self.exec_stmt(&stmt).context("error analyzing table")?;
        }
        Ok(())
    }
}

// `drop table`/`drop view` on the wrong kind of relation is an error even
// with `if exists`, so the occupant's kind drives which drop runs.
const RELKIND_QUERY: &str = "select c.relkind from pg_catalog.pg_class c \
     join pg_catalog.pg_namespace n on n.oid = c.relnamespace \
     where n.nspname = $1 and c.relname = $2";

// Drops whatever relation holds the name, if any.
fn drop_existing(
    tx: &mut postgres::Transaction<'_>,
    schema_name: &str,
    name: &str,
) -> Result<()> {
    let row = tx
        .query_opt(RELKIND_QUERY, &[&schema_name, &name])
        .context("error inspecting existing relation")?;
    let Some(row) = row else {
        return Ok(());
    };

    let kind: i8 = row.get(0);
    let stmt = match kind as u8 {
        b'v' => sql::drop_view(schema_name, name),
        b'f' => sql::drop_foreign_table(schema_name, name),
        _ => sql::drop_table(schema_name, name),
    };
    tx.batch_execute(&stmt)
        .with_context(|| format!("error dropping existing relation:\n{stmt}"))
}

// Reads the input a second time and pushes every row through the copy
// stream of each partition. The row id is assigned in source order and
// prepended to every partition slice of a partitioned layout.
fn stream_rows<R: Read>(
    connections: &mut [Client],
    statements: &[String],
    plan: &PartitionPlan,
    options: CsvOptions,
    data: R,
) -> Result<u64> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(options.header)
        .delimiter(options.delimiter)
        .flexible(false)
        .from_reader(data);

    let partitioned = plan.is_partitioned();

    let mut writers = Vec::with_capacity(connections.len());
    for (connection, stmt) in connections.iter_mut().zip(statements) {
        let sink = connection
            .copy_in(stmt.as_str())
            .with_context(|| format!("error preparing copy:\n{stmt}"))?;
        // Rows are re-encoded as CSV on the wire; unquoted empty cells
        // arrive as nulls.
        writers.push(csv::WriterBuilder::new().from_writer(sink));
    }

    let mut row_id: u64 = 0;
    let mut record = csv::ByteRecord::new();
    let mut slice = csv::ByteRecord::new();
    while reader
        .read_byte_record(&mut record)
        .context("error reading record")?
    {
        row_id += 1;
        for (part, writer) in plan.partitions.iter().zip(writers.iter_mut()) {
            slice.clear();
            if partitioned {
                slice.push_field(row_id.to_string().as_bytes());
            }
            for cell in record.iter().skip(part.start).take(part.columns.len()) {
                slice.push_field(cell);
            }
            writer
                .write_byte_record(&slice)
                .with_context(|| format!("error sending row {row_id}"))?;
        }
    }

    for (writer, stmt) in writers.into_iter().zip(statements) {
        let sink = writer
            .into_inner()
            .map_err(|err| anyhow!("error flushing copy stream: {err}"))?;
        sink.finish()
            .with_context(|| format!("error executing copy:\n{stmt}"))?;
    }

    Ok(row_id)
}

fn is_column_limit_error(err: &anyhow::Error) -> bool {
    format!("{err:#}").contains(COLUMN_LIMIT_ERROR)
}
