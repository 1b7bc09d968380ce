//! Redshift -> Databricks built-in catalog
//!
//! Function rules distilled from production migration runs. Table rules here
//! are limited to system schemas that have no Databricks counterpart;
//! warehouse-specific table mappings belong in the runtime CSV datasets.

use crate::MappingSink;

/// (source, target, transform, notes)
const FUNCTIONS: &[(&str, &str, &str, &str)] = &[
    ("NVL", "COALESCE", "identity", ""),
    ("IFNULL", "COALESCE", "identity", ""),
    ("STRPOS", "INSTR", "identity", ""),
    ("GETDATE", "CURRENT_TIMESTAMP", "identity", ""),
    ("REGEXP_SUBSTR", "REGEXP_EXTRACT", "identity", ""),
    ("SPLIT_TO_ARRAY", "SPLIT", "identity", ""),
    ("STRING_TO_ARRAY", "SPLIT", "identity", ""),
    ("ARRAY_TO_STRING", "ARRAY_JOIN", "identity", ""),
    (
        "CHARINDEX",
        "INSTR",
        "reorder(2,1)",
        "CHARINDEX(substring, string) becomes INSTR(string, substring)",
    ),
    (
        "DATEDIFF",
        "DATEDIFF",
        "reorder(3,2)",
        "day-unit form; DATEDIFF(unit, start, end) becomes DATEDIFF(end, start)",
    ),
    (
        "MOD",
        "%",
        "template(({1} % {2}))",
        "MOD(a, b) becomes the % operator",
    ),
    (
        "TO_CHAR",
        "DATE_FORMAT",
        "template(DATE_FORMAT({1}, {2}))",
        "format tokens must be converted to Databricks datetime patterns",
    ),
    (
        "JSON_EXTRACT_PATH_TEXT",
        "GET_JSON_OBJECT",
        "template(GET_JSON_OBJECT({1}, {2}))",
        "path argument must be rewritten as a JSONPath expression ($.a.b)",
    ),
    (
        "JSON_PARSE",
        "FROM_JSON",
        "template(FROM_JSON({1}, '<provide_schema_here>'))",
        "FROM_JSON needs an explicit schema",
    ),
    (
        "IS_VALID_JSON",
        "FROM_JSON",
        "template(TRY(FROM_JSON({1}, 'map<string,string>')) IS NOT NULL)",
        "",
    ),
    (
        "IS_VALID_JSON_ARRAY",
        "FROM_JSON",
        "template(TRY(FROM_JSON({1}, 'array<string>')) IS NOT NULL)",
        "",
    ),
    (
        "LISTAGG",
        "CONCAT_WS",
        "template(CONCAT_WS({2}, COLLECT_LIST({1})))",
        "WITHIN GROUP ordering is dropped; verify aggregation context",
    ),
    (
        "CONVERT",
        "CAST",
        "template(CAST({2} AS {1}))",
        "verify the type name maps to a Databricks type",
    ),
];

/// System schemas with no Databricks counterpart; references are flagged
/// for manual review rather than rewritten.
const UNSUPPORTED_SCHEMAS: &[&str] = &["pg_catalog", "pg_internal"];

/// Register the full Redshift -> Databricks catalog into a sink
pub fn register<S: MappingSink>(sink: &mut S) {
    for (source, target, transform, notes) in FUNCTIONS {
        sink.function(source, target, transform, notes);
    }
    for schema in UNSUPPORTED_SCHEMAS {
        sink.table(schema, schema, "complex");
    }
}
