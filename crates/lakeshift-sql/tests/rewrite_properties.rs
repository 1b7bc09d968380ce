//! Engine Property Tests
//!
//! End-to-end checks of the rewrite engine's observable guarantees: literal
//! safety, specificity precedence, fail-closed function handling, and
//! idempotence over its own output.

use lakeshift_sql::{
    rewrite_sql, ChangeStatus, FlagTag, MappingIndex, RuleKind,
};

fn test_index() -> MappingIndex {
    let tables = "\
source,target,category
analytics.users,main.analytics.users,direct
users,other.users,direct
legacy.events,legacy.events,complex
";
    let functions = "\
source,target,transform,notes
NVL,COALESCE,identity,
DATEDIFF,DATEDIFF,\"reorder(3,2)\",day-unit form
LISTAGG,CONCAT_WS,\"template(CONCAT_WS({2}, COLLECT_LIST({1})))\",ordering dropped
";
    MappingIndex::load(tables.as_bytes(), functions.as_bytes()).unwrap()
}

// ============================================================================
// Literal and comment safety
// ============================================================================

mod literal_safety {
    use super::*;

    #[test]
    fn test_string_literal_equal_to_mapped_table_is_never_rewritten() {
        let index = test_index();
        let result = rewrite_sql("SELECT * FROM t WHERE x = 'analytics.users'", &index).unwrap();
        assert!(result.text.contains("'analytics.users'"));
    }

    #[test]
    fn test_comment_contents_are_never_rewritten() {
        let index = test_index();
        let sql = "-- analytics.users\nSELECT 1 /* NVL(a, b) */";
        let result = rewrite_sql(sql, &index).unwrap();
        assert_eq!(result.text, sql);
        assert!(result.records.is_empty());
    }

    #[test]
    fn test_substring_of_longer_identifier_is_not_rewritten() {
        let index = test_index();
        let result = rewrite_sql("SELECT * FROM analytics.users_archive", &index).unwrap();
        assert_eq!(result.text, "SELECT * FROM analytics.users_archive");
        assert!(result.records.is_empty());
    }
}

// ============================================================================
// Specificity precedence
// ============================================================================

mod specificity {
    use super::*;

    #[test]
    fn test_qualified_reference_prefers_more_specific_rule() {
        let index = test_index();
        let result = rewrite_sql("SELECT * FROM analytics.users", &index).unwrap();
        assert_eq!(result.text, "SELECT * FROM main.analytics.users");
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].rule, RuleKind::TableMapping);
        assert_eq!(result.records[0].status, ChangeStatus::Applied);
    }

    #[test]
    fn test_unqualified_reference_takes_its_exact_rule() {
        let index = test_index();
        // A bare `users` has its own rule; the longer `analytics.users` rule
        // only wins for references with no exact match.
        let result = rewrite_sql("SELECT * FROM users", &index).unwrap();
        assert_eq!(result.text, "SELECT * FROM other.users");
    }

    #[test]
    fn test_underqualified_reference_resolves_by_suffix() {
        let tables = "\
source,target,category
prod.analytics.orders,main.analytics.orders,direct
";
        let functions = "source,target,transform,notes\n";
        let index = MappingIndex::load(tables.as_bytes(), functions.as_bytes()).unwrap();
        let result = rewrite_sql("SELECT * FROM analytics.orders", &index).unwrap();
        assert_eq!(result.text, "SELECT * FROM main.analytics.orders");
    }

    #[test]
    fn test_differently_qualified_reference_is_untouched() {
        let index = test_index();
        let result = rewrite_sql("SELECT * FROM sales.users", &index).unwrap();
        assert_eq!(result.text, "SELECT * FROM sales.users");
        assert!(result.records.is_empty());
    }
}

// ============================================================================
// Function rewrites
// ============================================================================

mod functions {
    use super::*;

    #[test]
    fn test_datediff_reorder_end_to_end() {
        let index = test_index();
        let result = rewrite_sql(
            "SELECT DATEDIFF('day', '2024-01-01', '2024-01-31')",
            &index,
        )
        .unwrap();
        assert_eq!(result.text, "SELECT DATEDIFF('2024-01-31', '2024-01-01')");
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].rule, RuleKind::FunctionMapping);
        assert_eq!(result.records[0].status, ChangeStatus::Applied);
    }

    #[test]
    fn test_arity_mismatch_is_always_flagged_never_guessed() {
        let index = test_index();
        let result = rewrite_sql("SELECT DATEDIFF('2024-01-01', '2024-01-31')", &index).unwrap();
        assert_eq!(
            result.text,
            "SELECT DATEDIFF('2024-01-01', '2024-01-31')"
        );
        let record = &result.records[0];
        assert_eq!(record.status, ChangeStatus::Flagged);
        assert_eq!(record.flag.as_ref().unwrap().tag, FlagTag::ArityMismatch);
    }

    #[test]
    fn test_unrecognized_function_passes_through_without_record() {
        let index = test_index();
        let result = rewrite_sql("SELECT CUSTOM_FN(a, b)", &index).unwrap();
        assert_eq!(result.text, "SELECT CUSTOM_FN(a, b)");
        assert!(result.records.is_empty());
    }

    #[test]
    fn test_restructure_applies_but_flags_for_review() {
        let index = test_index();
        let result = rewrite_sql("SELECT LISTAGG(name, ', ')", &index).unwrap();
        assert_eq!(
            result.text,
            "SELECT CONCAT_WS(', ', COLLECT_LIST(name))"
        );
        let record = &result.records[0];
        assert_eq!(record.status, ChangeStatus::Flagged);
        assert_eq!(record.flag.as_ref().unwrap().tag, FlagTag::Restructured);
    }

    #[test]
    fn test_case_insensitive_function_match() {
        let index = test_index();
        let result = rewrite_sql("SELECT nvl(a, b)", &index).unwrap();
        assert_eq!(result.text, "SELECT COALESCE(a, b)");
    }

    #[test]
    fn test_nested_calls_rewrite_inside_out() {
        let index = test_index();
        let result = rewrite_sql("SELECT DATEDIFF('day', NVL(a, b), c)", &index).unwrap();
        assert_eq!(result.text, "SELECT DATEDIFF(c, COALESCE(a, b))");
        assert_eq!(result.records.len(), 2);
    }
}

// ============================================================================
// Unsupported constructs
// ============================================================================

mod unsupported {
    use super::*;

    #[test]
    fn test_complex_mapping_is_flagged_not_rewritten() {
        let index = test_index();
        let result = rewrite_sql("SELECT * FROM legacy.events", &index).unwrap();
        assert_eq!(result.text, "SELECT * FROM legacy.events");
        let record = &result.records[0];
        assert_eq!(record.status, ChangeStatus::Flagged);
        assert_eq!(record.flag.as_ref().unwrap().tag, FlagTag::ComplexMapping);
    }

    #[test]
    fn test_qualify_is_flagged() {
        let index = test_index();
        let result = rewrite_sql(
            "SELECT * FROM t QUALIFY ROW_NUMBER() OVER (PARTITION BY id) = 1",
            &index,
        )
        .unwrap();
        let flagged: Vec<_> = result
            .records
            .iter()
            .filter(|r| r.status == ChangeStatus::Flagged)
            .collect();
        assert_eq!(flagged.len(), 1);
        assert_eq!(
            flagged[0].flag.as_ref().unwrap().tag,
            FlagTag::UnsupportedConstruct
        );
        assert_eq!(flagged[0].original, "QUALIFY");
    }

    #[test]
    fn test_equally_specific_conflicting_rules_are_flagged() {
        let tables = "\
source,target,category
analytics.orders,main.analytics.orders,direct
sales.orders,main.sales.orders,direct
";
        let functions = "source,target,transform,notes\n";
        let index = MappingIndex::load(tables.as_bytes(), functions.as_bytes()).unwrap();
        let result = rewrite_sql("SELECT * FROM orders", &index).unwrap();
        assert_eq!(result.text, "SELECT * FROM orders");
        assert_eq!(
            result.records[0].flag.as_ref().unwrap().tag,
            FlagTag::AmbiguousMapping
        );
    }
}

// ============================================================================
// Idempotence and ledger completeness
// ============================================================================

mod idempotence {
    use super::*;

    #[test]
    fn test_second_pass_applies_nothing() {
        let index = test_index();
        let sql = "SELECT NVL(a, b), DATEDIFF('day', s, e) FROM analytics.users";
        let first = rewrite_sql(sql, &index).unwrap();
        assert_eq!(
            first.records.iter().filter(|r| r.status == ChangeStatus::Applied).count(),
            3
        );

        let second = rewrite_sql(&first.text, &index).unwrap();
        assert_eq!(second.text, first.text);
        assert_eq!(
            second.records.iter().filter(|r| r.status == ChangeStatus::Applied).count(),
            0
        );
    }

    #[test]
    fn test_every_attempted_resolution_is_recorded() {
        let index = test_index();
        // Two applied (NVL, analytics.users), one flagged (bad DATEDIFF),
        // one out-of-scope pass-through (sales.users, no record).
        let sql = "SELECT NVL(a, b), DATEDIFF(x, y) FROM analytics.users, sales.users";
        let result = rewrite_sql(sql, &index).unwrap();
        let applied = result.records.iter().filter(|r| r.status == ChangeStatus::Applied).count();
        let flagged = result.records.iter().filter(|r| r.status == ChangeStatus::Flagged).count();
        assert_eq!(applied, 2);
        assert_eq!(flagged, 1);
        assert_eq!(result.records.len(), applied + flagged);
    }
}
