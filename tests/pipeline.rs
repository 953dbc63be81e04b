//! Library-level pipeline tests: source adapter → profiler → schema →
//! partition plan → rendered DDL, everything short of a live server.

use std::io::{BufReader, Write};

use csv2pg::{
    partition::PartitionPlan,
    profile::CsvProfiler,
    reader::{Compression, Source},
    schema::Schema,
    sql,
    types::ValueType,
};
use flate2::{Compression as GzLevel, write::GzEncoder};
use tempfile::tempdir;

fn profile_source(source: &Source) -> csv2pg::profile::Profile {
    CsvProfiler::default()
        .profile(BufReader::new(source.open().expect("open source")))
        .expect("profile")
}

#[test]
fn gzipped_crlf_input_profiles_like_plain_text() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("people.csv.gz");

    let mut enc = GzEncoder::new(Vec::new(), GzLevel::default());
    enc.write_all(b"\xef\xbb\xbfname,color,dob\r\n")
        .expect("header");
    enc.write_all(b"John,Blue,03/11/2013\r\n").expect("row");
    enc.write_all(b"Jane,Red,2008-2-24\r\n").expect("row");
    enc.write_all(b"Joe,,2010-02-11\r\n").expect("row");
    std::fs::write(&path, enc.finish().expect("gzip")).expect("write fixture");

    let source = Source::new(path.to_str().unwrap(), Some(Compression::Gzip)).expect("source");

    // Pass 1.
    let profile = profile_source(&source);
    assert_eq!(profile.record_count, 3);
    assert_eq!(profile.fields["name"].value_type, ValueType::String);
    assert_eq!(profile.fields["dob"].value_type, ValueType::Date);
    assert!(profile.fields["color"].nullable);

    // The source reopens for pass 2 with identical content.
    let again = profile_source(&source);
    assert_eq!(again.record_count, 3);

    // Schema and single-partition DDL.
    let schema = Schema::from_profile(&profile);
    let plan = PartitionPlan::new(&schema, 924);
    assert!(!plan.is_partitioned());

    let ddl = sql::create_table("public", "people", &plan.partitions[0].columns, false, false);
    assert_eq!(
        ddl,
        "create table if not exists \"public\".\"people\" ( \
         \"name\" text not null,\"color\" text,\"dob\" date unique )"
    );
}

#[test]
fn leading_zero_identifiers_load_as_text() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("scores.csv");
    std::fs::write(&path, "id,score\n007,10\n008,20\n").expect("write fixture");

    let source = Source::new(path.to_str().unwrap(), None).expect("source");
    let profile = profile_source(&source);
    let schema = Schema::from_profile(&profile);

    assert_eq!(schema.columns[0].name, "id");
    assert_eq!(schema.columns[0].sql_type, "text");
    assert_eq!(schema.columns[1].sql_type, "integer");
    assert!(schema.columns[1].unique);
}

#[test]
fn wide_schemas_get_partitioned_ddl_and_no_view_past_the_limit() {
    let header: Vec<String> = (0..2000).map(|i| format!("col{i}")).collect();
    let row: Vec<String> = (0..2000).map(|i| i.to_string()).collect();
    let mut data = header.join(",");
    data.push('\n');
    data.push_str(&row.join(","));
    data.push('\n');

    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("wide.csv");
    std::fs::write(&path, data).expect("write fixture");

    let source = Source::new(path.to_str().unwrap(), None).expect("source");
    let profile = profile_source(&source);
    let schema = Schema::from_profile(&profile);
    assert_eq!(schema.columns.len(), 2000);

    let plan = PartitionPlan::new(&schema, 924);
    assert_eq!(plan.partitions.len(), 3);
    assert!(!plan.view_eligible());

    // Every partition table leads with the row id.
    for (idx, part) in plan.partitions.iter().enumerate() {
        let ddl = sql::create_table(
            "public",
            &plan.table_name("wide", idx),
            &part.columns,
            true,
            false,
        );
        assert!(ddl.contains("\"_row_id\" integer not null unique"));
    }

    // A narrower schema within the target-list limit does get its view.
    let narrow = Schema {
        columns: schema.columns[..1000].to_vec(),
        cstore: false,
    };
    let plan = PartitionPlan::new(&narrow, 924);
    assert!(plan.is_partitioned());
    assert!(plan.view_eligible());
    let view = sql::create_view("public", "wide", "wide", &plan);
    assert!(view.starts_with("create view \"public\".\"wide\" as select p0.\"col0\""));
    assert!(view.contains("inner join \"public\".\"wide_1\" p1 on p0.\"_row_id\" = p1.\"_row_id\""));
    assert!(view.contains("p1.\"col999\""));
}

#[test]
fn malformed_rows_do_not_stop_profiling() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("messy.csv");
    std::fs::write(
        &path,
        "name,state\nJoe, \"GA\"\nSue,NJ\n\"Bob\",\"unterminated\n",
    )
    .expect("write fixture");

    let source = Source::new(path.to_str().unwrap(), None).expect("source");
    let profile = profile_source(&source);

    // Only the clean row profiles.
    assert_eq!(profile.record_count, 1);
    assert_eq!(profile.fields["name"].value_type, ValueType::String);
}
