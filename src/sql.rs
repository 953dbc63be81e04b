//! SQL statement rendering.
//!
//! Every statement is assembled from a fixed template; the only variable
//! parts are identifiers, and those always pass through the driver's
//! escaping routine. User data never reaches a statement — rows travel
//! through the copy protocol.

use postgres_protocol::escape::escape_identifier;

use crate::{
    partition::PartitionPlan,
    schema::{Column, ROW_ID_COLUMN},
};

pub fn quote_ident(name: &str) -> String {
    escape_identifier(name)
}

fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

pub fn create_schema(schema: &str) -> String {
    format!("create schema if not exists {}", quote_ident(schema))
}

/// Column clause of a create statement: type plus at most one constraint.
/// Unique text columns stay unconstrained because long values can overflow
/// index rows.
pub fn column_ddl(column: &Column) -> String {
    let name = quote_ident(&column.name);
    if column.unique && column.sql_type != "text" {
        format!("{name} {} unique", column.sql_type)
    } else if !column.nullable {
        format!("{name} {} not null", column.sql_type)
    } else {
        format!("{name} {}", column.sql_type)
    }
}

fn row_id_ddl() -> String {
    format!("{} integer not null unique", quote_ident(ROW_ID_COLUMN))
}

/// Create statement for one partition table. Partitioned layouts lead with
/// the synthetic row id; the cstore flavor creates a foreign table instead.
pub fn create_table(
    schema: &str,
    table: &str,
    columns: &[Column],
    with_row_id: bool,
    cstore: bool,
) -> String {
    let mut defs = Vec::with_capacity(columns.len() + 1);
    if with_row_id {
        defs.push(row_id_ddl());
    }
    defs.extend(columns.iter().map(column_ddl));
    let columns = defs.join(",");

    if cstore {
        format!(
            "create foreign table if not exists {} ( {columns} ) server cstore_server options (compression 'pglz')",
            qualified(schema, table)
        )
    } else {
        format!(
            "create table if not exists {} ( {columns} )",
            qualified(schema, table)
        )
    }
}

pub fn drop_table(schema: &str, table: &str) -> String {
    format!("drop table if exists {}", qualified(schema, table))
}

pub fn drop_foreign_table(schema: &str, table: &str) -> String {
    format!("drop foreign table if exists {}", qualified(schema, table))
}

pub fn drop_view(schema: &str, view: &str) -> String {
    format!("drop view if exists {}", qualified(schema, view))
}

pub fn rename_table(schema: &str, from: &str, to: &str) -> String {
    format!(
        "alter table {} rename to {}",
        qualified(schema, from),
        quote_ident(to)
    )
}

pub fn analyze_table(schema: &str, table: &str) -> String {
    format!("analyze {}", qualified(schema, table))
}

/// Copy statement for one partition. The column list is the cleaned
/// destination names; rows stream in as CSV so that empty cells arrive as
/// nulls.
pub fn copy_in(schema: &str, table: &str, columns: &[&str]) -> String {
    let list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "copy {} ({list}) from stdin with (format csv)",
        qualified(schema, table)
    )
}

/// Union view over the partition tables of one logical schema: inner joins
/// on the row id, selecting the original columns in their original order
/// under the user-visible name.
pub fn create_view(schema: &str, view: &str, base: &str, plan: &PartitionPlan) -> String {
    let row_id = quote_ident(ROW_ID_COLUMN);

    let mut select = Vec::with_capacity(plan.column_count());
    for (i, part) in plan.partitions.iter().enumerate() {
        for column in &part.columns {
            select.push(format!("p{i}.{}", quote_ident(&column.name)));
        }
    }

    let mut from = qualified(schema, &plan.table_name(base, 0));
    from.push_str(" p0");
    for i in 1..plan.partitions.len() {
        from.push_str(&format!(
            " inner join {} p{i} on p0.{row_id} = p{i}.{row_id}",
            qualified(schema, &plan.table_name(base, i))
        ));
    }

    format!(
        "create view {} as select {} from {from}",
        qualified(schema, view),
        select.join(",")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{partition::PartitionPlan, schema::Schema};

    fn column(name: &str, sql_type: &'static str, unique: bool, nullable: bool) -> Column {
        Column {
            name: name.to_string(),
            sql_type,
            unique,
            nullable,
        }
    }

    #[test]
    fn identifiers_are_quoted_and_escaped() {
        assert_eq!(quote_ident("events"), "\"events\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(
            create_schema("public"),
            "create schema if not exists \"public\""
        );
    }

    #[test]
    fn column_ddl_emits_one_constraint() {
        assert_eq!(
            column_ddl(&column("id", "integer", true, false)),
            "\"id\" integer unique"
        );
        // Unique text columns are not indexed.
        assert_eq!(
            column_ddl(&column("name", "text", true, false)),
            "\"name\" text not null"
        );
        assert_eq!(
            column_ddl(&column("note", "text", false, true)),
            "\"note\" text"
        );
        assert_eq!(
            column_ddl(&column("dob", "date", false, false)),
            "\"dob\" date not null"
        );
    }

    #[test]
    fn create_table_renders_plain_and_cstore() {
        let columns = vec![
            column("id", "integer", true, false),
            column("name", "text", false, true),
        ];
        assert_eq!(
            create_table("public", "people", &columns, false, false),
            "create table if not exists \"public\".\"people\" ( \"id\" integer unique,\"name\" text )"
        );
        let cstore = create_table("public", "people", &columns, false, true);
        assert!(cstore.starts_with("create foreign table if not exists \"public\".\"people\""));
        assert!(cstore.ends_with("server cstore_server options (compression 'pglz')"));
    }

    #[test]
    fn partitioned_tables_lead_with_the_row_id() {
        let columns = vec![column("a", "text", false, true)];
        let ddl = create_table("public", "wide_0", &columns, true, false);
        assert_eq!(
            ddl,
            "create table if not exists \"public\".\"wide_0\" ( \"_row_id\" integer not null unique,\"a\" text )"
        );
    }

    #[test]
    fn copy_lists_the_cleaned_columns() {
        assert_eq!(
            copy_in("public", "people", &["_row_id", "id", "name"]),
            "copy \"public\".\"people\" (\"_row_id\",\"id\",\"name\") from stdin with (format csv)"
        );
    }

    #[test]
    fn maintenance_statements() {
        assert_eq!(
            drop_table("public", "people"),
            "drop table if exists \"public\".\"people\""
        );
        assert_eq!(
            drop_view("public", "people"),
            "drop view if exists \"public\".\"people\""
        );
        assert_eq!(
            drop_foreign_table("public", "people"),
            "drop foreign table if exists \"public\".\"people\""
        );
        assert_eq!(
            rename_table("public", "tmp", "people"),
            "alter table \"public\".\"tmp\" rename to \"people\""
        );
        assert_eq!(analyze_table("public", "people"), "analyze \"public\".\"people\"");
    }

    #[test]
    fn union_view_joins_partitions_in_order() {
        let schema = Schema {
            columns: vec![
                column("a", "text", false, true),
                column("b", "text", false, true),
                column("c", "text", false, true),
            ],
            cstore: false,
        };
        let plan = PartitionPlan::new(&schema, 2);
        let view = create_view("public", "wide", "tmp", &plan);
        assert_eq!(
            view,
            "create view \"public\".\"wide\" as select p0.\"a\",p0.\"b\",p1.\"c\" \
             from \"public\".\"tmp_0\" p0 \
             inner join \"public\".\"tmp_1\" p1 on p0.\"_row_id\" = p1.\"_row_id\""
        );
    }
}
