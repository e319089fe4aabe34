use std::io::Write;

use rust_file_tables::PipelineError;
use rust_file_tables::pipeline::{CancellationFlag, CollectingSink, FetchOptions, fetch_table};
use rust_file_tables::schema::compile_source;
use rust_file_tables::spec::{ColumnSpec, SourceSpec, TableSpec};
use rust_file_tables::types::{DataSet, Value};

fn write_csv(contents: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    f
}

fn fetch(spec: &SourceSpec) -> Result<Vec<DataSet>, PipelineError> {
    let source = compile_source(spec)?;
    let sink = CollectingSink::new();
    fetch_table(&source, &sink, &CancellationFlag::new(), &FetchOptions::default())?;
    Ok(sink.into_datasets())
}

#[test]
fn fixture_spec_filters_transforms_and_types_rows() {
    let spec = SourceSpec::from_path("tests/fixtures/people_spec.yaml").unwrap();
    let source = compile_source(&spec).unwrap();
    let sink = CollectingSink::new();
    let stats = fetch_table(&source, &sink, &CancellationFlag::new(), &FetchOptions::default()).unwrap();

    assert_eq!(stats.rows_read, 4);
    assert_eq!(stats.rows_dropped, 1);
    assert_eq!(stats.rows_admitted, 3);
    assert_eq!(stats.rows_rejected, 1);
    assert_eq!(stats.relation_rows, 2);

    let people = sink.dataset("people").unwrap();
    assert_eq!(people.row_count(), 3);
    assert_eq!(
        people.rows[0],
        vec![Value::Int(1), Value::from("Ada"), Value::Int(36), Value::Bool(true)]
    );
    assert_eq!(people.column("id").unwrap(), vec![&Value::Int(1), &Value::Int(2), &Value::Int(5)]);
    assert_eq!(people.value(1, "active"), Some(&Value::Bool(true)));
    assert_eq!(people.value(2, "active"), Some(&Value::Bool(true)));

    let admins = sink.dataset("admins").unwrap();
    assert_eq!(admins.schema.parent.as_deref(), Some("people"));
    assert_eq!(admins.rows, vec![
        vec![Value::Int(1), Value::from("admin")],
        vec![Value::Int(5), Value::from("admin")],
    ]);
}

#[test]
fn rows_keep_only_declared_columns_in_schema_order() {
    let file = write_csv("c,b,a,extra\n3,2,1,x\n");
    let table = TableSpec::new(
        "t",
        vec![ColumnSpec::new("a", "int"), ColumnSpec::new("c", "int")],
    );
    let out = fetch(&SourceSpec::new(file.path(), "csv", table)).unwrap();
    assert_eq!(out[0].schema.columns.len(), 2);
    assert_eq!(out[0].rows, vec![vec![Value::Int(1), Value::Int(3)]]);
}

#[test]
fn custom_separator() {
    let file = write_csv("id|name\n1|ada\n2|grace\n");
    let table = TableSpec::new("t", vec![ColumnSpec::new("id", "i"), ColumnSpec::new("name", "s")]);
    let out = fetch(&SourceSpec::new(file.path(), "csv", table).with_separator("|")).unwrap();
    assert_eq!(out[0].row_count(), 2);
    assert_eq!(out[0].value(1, "name"), Some(&Value::from("grace")));
}

#[test]
fn empty_values_collapse_to_null_on_nullable_columns() {
    let file = write_csv("id,flag,count\n1,,0\n");
    let table = TableSpec::new(
        "t",
        vec![
            ColumnSpec::new("id", "int"),
            ColumnSpec::new("flag", "bool"),
            ColumnSpec::new("count", "int").not_null(),
        ],
    );
    let out = fetch(&SourceSpec::new(file.path(), "csv", table)).unwrap();
    assert_eq!(out[0].rows[0], vec![Value::Int(1), Value::Null, Value::Int(0)]);
}

#[test]
fn missing_value_on_required_column_aborts_the_fetch() {
    let file = write_csv("id,name\n1,ada\n2,grace\n");
    let table = TableSpec::new(
        "t",
        vec![ColumnSpec::new("id", "int"), ColumnSpec::new("email", "string").not_null()],
    );
    let err = fetch(&SourceSpec::new(file.path(), "csv", table)).unwrap_err();
    assert_eq!(err.to_string(), "invalid null value for non-nullable column email");
}

#[test]
fn unparseable_int_is_a_type_mismatch() {
    let file = write_csv("id\nabc\n");
    let table = TableSpec::new("t", vec![ColumnSpec::new("id", "int")]);
    let err = fetch(&SourceSpec::new(file.path(), "csv", table)).unwrap_err();
    assert!(matches!(err, PipelineError::TypeMismatch { ref column, .. } if column == "id"));
}

#[test]
fn undeclared_fields_are_not_visible_to_filters() {
    let file = write_csv("id,n\n1,5\n");
    let table = TableSpec::new("t", vec![ColumnSpec::new("id", "int")]).with_filter("_.n == nil");
    let out = fetch(&SourceSpec::new(file.path(), "csv", table)).unwrap();
    assert_eq!(out[0].row_count(), 1);
}

#[test]
fn text_literals_compare_against_raw_cells_of_typed_columns() {
    let file = write_csv("id,active\n1,true\n2,false\n3,false\n");
    let columns = vec![ColumnSpec::new("id", "int"), ColumnSpec::new("active", "bool")];
    let table = TableSpec::new("t", columns.clone()).with_filter(r#"_.active == "true""#);
    let out = fetch(&SourceSpec::new(file.path(), "csv", table)).unwrap();
    assert_eq!(out[0].rows, vec![vec![Value::Int(1), Value::Bool(true)]]);

    let table = TableSpec::new("t", columns).with_filter(r#"_.id != "2""#);
    let out = fetch(&SourceSpec::new(file.path(), "csv", table)).unwrap();
    assert_eq!(out[0].column("id").unwrap(), vec![&Value::Int(1), &Value::Int(3)]);
}

#[test]
fn fetching_twice_yields_identical_tables() {
    let spec = SourceSpec::from_path("tests/fixtures/people_spec.yaml").unwrap();
    let source = compile_source(&spec).unwrap();
    let run = || {
        let sink = CollectingSink::new();
        let stats = fetch_table(&source, &sink, &CancellationFlag::new(), &FetchOptions::default()).unwrap();
        (stats, sink.into_datasets())
    };

    let (first_stats, first) = run();
    let (second_stats, second) = run();
    assert_eq!(first_stats, second_stats);
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn broken_filter_admits_every_row() {
    let file = write_csv("id\n1\n2\n");
    let table = TableSpec::new("t", vec![ColumnSpec::new("id", "int")]).with_filter("_.id >>> 1");
    let out = fetch(&SourceSpec::new(file.path(), "csv", table)).unwrap();
    assert_eq!(out[0].row_count(), 2);
}

#[test]
fn filter_runtime_errors_reject_only_that_row() {
    let file = write_csv("id,n\n1,5\n2,oops\n3,7\n");
    let table = TableSpec::new("t", vec![ColumnSpec::new("id", "int"), ColumnSpec::new("n", "string")])
        .with_filter("int(_.n) > 0");
    let out = fetch(&SourceSpec::new(file.path(), "csv", table)).unwrap();
    assert_eq!(out[0].column("id").unwrap(), vec![&Value::Int(1), &Value::Int(3)]);
}

#[test]
fn transforms_can_read_sibling_fields() {
    let file = write_csv("first,last\nada,lovelace\n");
    let table = TableSpec::new(
        "t",
        vec![
            ColumnSpec::new("first", "string"),
            ColumnSpec::new("last", "string"),
            ColumnSpec::new("full", "string")
                .with_transform(r#"{{ printf "%s %s" .Row.first .Row.last | title }}"#),
        ],
    );
    let out = fetch(&SourceSpec::new(file.path(), "csv", table)).unwrap();
    assert_eq!(out[0].value(0, "full"), Some(&Value::from("Ada Lovelace")));
}

#[test]
fn transform_render_failure_aborts_the_fetch() {
    let file = write_csv("n\nx\n");
    let table = TableSpec::new(
        "t",
        vec![ColumnSpec::new("n", "int").with_transform("{{ .Value | atoi }}")],
    );
    let err = fetch(&SourceSpec::new(file.path(), "csv", table)).unwrap_err();
    assert!(matches!(err, PipelineError::TransformRender { ref column, .. } if column == "n"));
}

#[test]
fn header_only_file_yields_no_rows() {
    let file = write_csv("id,name\n");
    let table = TableSpec::new("t", vec![ColumnSpec::new("id", "int")]);
    let out = fetch(&SourceSpec::new(file.path(), "csv", table)).unwrap();
    assert!(out.is_empty());
}

#[test]
fn missing_file_is_an_io_error() {
    let table = TableSpec::new("t", vec![ColumnSpec::new("id", "int")]);
    let err = fetch(&SourceSpec::new("tests/fixtures/does_not_exist.csv", "csv", table)).unwrap_err();
    assert!(matches!(err, PipelineError::Io(_)));
}
