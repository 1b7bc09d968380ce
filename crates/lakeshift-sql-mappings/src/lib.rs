#![forbid(unsafe_code)]

//! Built-in mapping catalogs for `lakeshift-sql`.
//!
//! Organization-specific table mappings come from CSV datasets at runtime;
//! this crate carries the dialect-level rules that hold for every migration
//! off a given source warehouse, starting with Redshift -> Databricks.
//! Catalogs are emitted through the [`MappingSink`] abstraction so this crate
//! stays independent of `lakeshift-sql`.

pub mod redshift_databricks;

/// Sink used by this crate to emit built-in mapping catalogs.
///
/// Transform and category values use the same textual encoding as the CSV
/// datasets: categories are `direct`/`restructure`/`rename`/`complex`,
/// transforms are `identity`, `reorder(3,2)`, or `template(...)` with
/// `{1}`..`{n}` and `{*}` placeholders.
pub trait MappingSink {
    /// Register a table-reference rule
    fn table(&mut self, source: &str, target: &str, category: &str);

    /// Register a function rule
    fn function(&mut self, source: &str, target: &str, transform: &str, notes: &str);
}

#[cfg(test)]
pub(crate) mod test_sink {
    use super::MappingSink;

    /// Minimal sink that records registrations for assertions
    #[derive(Default)]
    pub struct TestSink {
        pub tables: Vec<(String, String, String)>,
        pub functions: Vec<(String, String, String, String)>,
    }

    impl MappingSink for TestSink {
        fn table(&mut self, source: &str, target: &str, category: &str) {
            self.tables
                .push((source.to_string(), target.to_string(), category.to_string()));
        }

        fn function(&mut self, source: &str, target: &str, transform: &str, notes: &str) {
            self.functions.push((
                source.to_string(),
                target.to_string(),
                transform.to_string(),
                notes.to_string(),
            ));
        }
    }
}
