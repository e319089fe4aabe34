//! Table compilation.
//!
//! [`compile_table`] turns a declarative [`TableSpec`] into a [`CompiledTable`]: the typed
//! [`TableSchema`], the compiled transform templates and the compiled admission predicate.
//! Compilation happens once per table; the result is immutable and shared by every fetch
//! of that table.
//!
//! Template compile errors fail the build. Filter compile errors do not: they are logged and
//! the table admits every row.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::coerce::{coerce, conform};
use crate::error::{PipelineError, PipelineResult};
use crate::filter::{self, Predicate};
use crate::ingestion::{ReadOptions, SourceFormat};
use crate::spec::{ColumnSpec, SourceSpec, TableSpec};
use crate::transform::{self, Template, TemplateEngine, TextTemplateEngine};
use crate::types::{ColumnSchema, ColumnType, Row, TableRow, TableSchema, Value, default_column_description};

/// A table ready to be fetched.
#[derive(Debug, Clone)]
pub struct CompiledTable {
    schema: Arc<TableSchema>,
    templates: Vec<Option<Arc<dyn Template>>>,
    predicate: Option<Predicate>,
    relations: Vec<CompiledTable>,
}

impl CompiledTable {
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    pub fn columns(&self) -> &[ColumnSchema] {
        &self.schema.columns
    }

    /// The admission predicate; `None` when the table has no filter or it failed to compile.
    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    pub fn relations(&self) -> &[CompiledTable] {
        &self.relations
    }

    /// Whether `row` passes this table's filter.
    pub fn admit(&self, row: &Row) -> bool {
        filter::admit(self.name(), self.predicate.as_ref(), row)
    }

    /// Transform, coerce and type the value of column `index` for `row`.
    pub fn resolve_column(&self, index: usize, row: &Row) -> PipelineResult<Value> {
        let column = &self.schema.columns[index];
        let template = self.templates[index].as_deref();
        let value = transform::transform(column, template, row)?;
        let value = coerce(column, value)?;
        conform(column, value)
    }

    /// Resolve every column of `row`, in schema order.
    pub fn resolve_row(&self, row: &Row) -> PipelineResult<TableRow> {
        let values = (0..self.schema.columns.len())
            .map(|i| self.resolve_column(i, row))
            .collect::<PipelineResult<Vec<_>>>()?;
        Ok(TableRow {
            schema: Arc::clone(&self.schema),
            values,
        })
    }

    /// Names of the fields this table and its relations read from a raw row.
    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let all = self
            .schema
            .columns
            .iter()
            .chain(self.relations.iter().flat_map(|r| r.schema.columns.iter()));
        for column in all {
            if !names.contains(&column.name) {
                names.push(column.name.clone());
            }
        }
        names
    }
}

/// A source file bound to its compiled root table.
#[derive(Debug, Clone)]
pub struct CompiledSource {
    pub path: PathBuf,
    pub format: SourceFormat,
    pub read_options: ReadOptions,
    pub table: CompiledTable,
}

/// Compile `spec` with the built-in template engine.
pub fn compile_table(spec: &TableSpec) -> PipelineResult<CompiledTable> {
    compile_table_with(spec, &TextTemplateEngine)
}

/// Compile `spec` using `engine` for column transforms.
pub fn compile_table_with(spec: &TableSpec, engine: &dyn TemplateEngine) -> PipelineResult<CompiledTable> {
    let relations = spec
        .relations
        .iter()
        .map(|relation| {
            if !relation.relations.is_empty() {
                return Err(PipelineError::invalid_spec(format!(
                    "relation '{}' of table '{}' declares its own relations; only one level is supported",
                    relation.name, spec.name
                )));
            }
            debug!(table = %spec.name, relation = %relation.name, "adding relation");
            compile_one(relation, Some(&spec.name), engine)
        })
        .collect::<PipelineResult<Vec<_>>>()?;

    let mut table = compile_one(spec, None, engine)?;
    table.relations = relations;
    Ok(table)
}

/// Resolve the format and decoder options of `spec` and compile its table.
pub fn compile_source(spec: &SourceSpec) -> PipelineResult<CompiledSource> {
    compile_source_with(spec, &TextTemplateEngine)
}

pub fn compile_source_with(spec: &SourceSpec, engine: &dyn TemplateEngine) -> PipelineResult<CompiledSource> {
    let format = SourceFormat::from_tag(&spec.format)?;
    let separator = parse_separator(spec.separator.as_deref())?;
    if format != SourceFormat::Excel && !spec.sheets.is_empty() {
        warn!(file = %spec.file.display(), %format, "sheets are only used by spreadsheet sources, ignoring");
    }
    let table = compile_table_with(&spec.table, engine)?;
    let read_options = ReadOptions {
        separator,
        sheets: spec.sheets.clone(),
        fields: Some(table.field_names()),
    };
    Ok(CompiledSource {
        path: spec.file.clone(),
        format,
        read_options,
        table,
    })
}

fn parse_separator(separator: Option<&str>) -> PipelineResult<u8> {
    match separator {
        None | Some("") => Ok(b','),
        Some(s) if s.len() == 1 => Ok(s.as_bytes()[0]),
        Some(s) => Err(PipelineError::invalid_spec(format!(
            "csv separator must be a single byte, got {s:?}"
        ))),
    }
}

fn compile_one(spec: &TableSpec, parent: Option<&str>, engine: &dyn TemplateEngine) -> PipelineResult<CompiledTable> {
    if spec.name.trim().is_empty() {
        return Err(PipelineError::invalid_spec("table name must not be empty"));
    }

    let mut columns = Vec::with_capacity(spec.columns.len());
    let mut templates = Vec::with_capacity(spec.columns.len());
    let mut template_row = Row::with_capacity(spec.columns.len());

    for column in &spec.columns {
        if column.name.trim().is_empty() {
            return Err(PipelineError::invalid_spec(format!(
                "table '{}' has a column with an empty name",
                spec.name
            )));
        }
        if template_row.contains_key(&column.name) {
            return Err(PipelineError::invalid_spec(format!(
                "table '{}' declares column '{}' more than once",
                spec.name, column.name
            )));
        }

        let schema = column_schema(&spec.name, column);
        template_row.insert(column.name.as_str(), schema.data_type.zero_value());
        templates.push(compile_transform(engine, column)?);
        columns.push(schema);
    }

    let predicate = spec
        .filter
        .as_deref()
        .filter(|source| !source.trim().is_empty())
        .and_then(|source| match Predicate::compile(source, &template_row) {
            Ok(p) => {
                debug!(table = %spec.name, filter = source, "filter compiled");
                Some(p)
            }
            Err(err) => {
                error!(table = %spec.name, filter = source, error = %err, "error compiling filter, admitting all rows");
                None
            }
        });

    let description = spec
        .description
        .clone()
        .unwrap_or_else(|| format!("Table {:?}", spec.name));

    Ok(CompiledTable {
        schema: Arc::new(TableSchema {
            name: spec.name.clone(),
            description,
            parent: parent.map(str::to_string),
            columns,
        }),
        templates,
        predicate,
        relations: Vec::new(),
    })
}

fn column_schema(table: &str, column: &ColumnSpec) -> ColumnSchema {
    if !column.data_type.is_empty() && !ColumnType::is_known_alias(&column.data_type) {
        warn!(table, column = %column.name, declared = %column.data_type, "unknown column type, using string");
    }
    ColumnSchema {
        name: column.name.clone(),
        data_type: ColumnType::from_alias(&column.data_type),
        description: column
            .description
            .clone()
            .unwrap_or_else(|| default_column_description(&column.name)),
        primary_key: column.key,
        unique: column.unique,
        not_null: column.not_null,
    }
}

fn compile_transform(engine: &dyn TemplateEngine, column: &ColumnSpec) -> PipelineResult<Option<Arc<dyn Template>>> {
    let Some(source) = column.transform.as_deref() else {
        return Ok(None);
    };
    engine
        .compile(&column.name, source)
        .map(Some)
        .map_err(|source| PipelineError::TransformCompile {
            column: column.name.clone(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> TableSpec {
        TableSpec::new(
            "people",
            vec![
                ColumnSpec::new("id", "INT").primary_key().not_null(),
                ColumnSpec::new("name", "str"),
                ColumnSpec::new("active", "b"),
                ColumnSpec::new("born", "date"),
            ],
        )
    }

    #[test]
    fn builds_typed_schema_with_default_descriptions() {
        let table = compile_table(&people()).unwrap();
        let types: Vec<_> = table.columns().iter().map(|c| c.data_type).collect();
        assert_eq!(
            types,
            vec![ColumnType::Int, ColumnType::String, ColumnType::Bool, ColumnType::String]
        );
        assert!(table.columns()[0].primary_key && table.columns()[0].not_null);
        assert_eq!(table.schema().description, "Table \"people\"");
        assert_eq!(
            table.columns()[1].description,
            "The column mapping the \"name\" field from the input data"
        );
        assert!(table.predicate().is_none());
    }

    #[test]
    fn filter_compile_failure_disables_filter() {
        let table = compile_table(&people().with_filter("_.id ==")).unwrap();
        assert!(table.predicate().is_none());
        assert!(table.admit(&Row::new()));

        // mismatched literals are a compile error
        let table = compile_table(&people().with_filter("_.active && 1 == 'x'")).unwrap();
        assert!(table.predicate().is_none());
    }

    #[test]
    fn filter_is_typed_against_declared_columns() {
        let table = compile_table(&people().with_filter("_.id > 1 && _.active")).unwrap();
        assert!(table.predicate().is_some());
        // raw values are untyped, so comparing a declared int with text is decided per row
        let table = compile_table(&people().with_filter("_.id == 'x'")).unwrap();
        assert!(table.predicate().is_some());
        let table = compile_table(&people().with_filter("_.id")).unwrap();
        assert!(table.predicate().is_none());
    }

    #[test]
    fn transform_compile_failure_is_fatal() {
        let mut spec = people();
        spec.columns[1] = ColumnSpec::new("name", "string").with_transform("{{ .Value ");
        let err = compile_table(&spec).unwrap_err();
        assert!(matches!(err, PipelineError::TransformCompile { ref column, .. } if column == "name"));

        spec.columns[1] = ColumnSpec::new("name", "string").with_transform("{{ .Value\u{a0}-}}");
        let err = compile_table(&spec).unwrap_err();
        assert!(matches!(err, PipelineError::TransformCompile { ref column, .. } if column == "name"));
    }

    #[test]
    fn invalid_specs_are_rejected() {
        let mut dup = people();
        dup.columns.push(ColumnSpec::new("id", "int"));
        assert!(matches!(compile_table(&dup), Err(PipelineError::InvalidSpec { .. })));

        let unnamed = TableSpec::new(" ", vec![]);
        assert!(matches!(compile_table(&unnamed), Err(PipelineError::InvalidSpec { .. })));

        let nested = people().with_relation(
            TableSpec::new("r", vec![]).with_relation(TableSpec::new("rr", vec![])),
        );
        assert!(matches!(compile_table(&nested), Err(PipelineError::InvalidSpec { .. })));
    }

    #[test]
    fn relations_know_their_parent() {
        let spec = people().with_relation(TableSpec::new("admins", vec![ColumnSpec::new("role", "string")]));
        let table = compile_table(&spec).unwrap();
        assert_eq!(table.relations()[0].schema().parent.as_deref(), Some("people"));
        assert_eq!(table.field_names(), vec!["id", "name", "active", "born", "role"]);
    }

    #[test]
    fn resolve_row_runs_transform_coerce_conform() {
        let mut spec = people();
        spec.columns[1] = ColumnSpec::new("name", "string").with_transform("{{ .Value | upper }}");
        let table = compile_table(&spec).unwrap();
        let raw: Row = [
            ("id", Value::from("7")),
            ("name", Value::from("ada")),
            ("active", Value::from("")),
        ]
        .into_iter()
        .collect();
        let row = table.resolve_row(&raw).unwrap();
        assert_eq!(row.get("id"), Some(&Value::Int(7)));
        assert_eq!(row.get("name"), Some(&Value::from("ADA")));
        assert_eq!(row.get("active"), Some(&Value::Null));
        assert_eq!(row.get("born"), Some(&Value::Null));
    }

    #[test]
    fn source_compilation_checks_format_and_separator() {
        let spec = SourceSpec::new("x.parquet", "parquet", people());
        assert!(matches!(compile_source(&spec), Err(PipelineError::UnsupportedFormat(_))));

        let spec = SourceSpec::new("x.csv", "csv", people()).with_separator("::");
        assert!(matches!(compile_source(&spec), Err(PipelineError::InvalidSpec { .. })));

        let spec = SourceSpec::new("x.csv", "CSV", people()).with_separator(";");
        let source = compile_source(&spec).unwrap();
        assert_eq!(source.format, SourceFormat::Csv);
        assert_eq!(source.read_options.separator, b';');
    }
}
