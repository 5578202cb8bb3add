//! Rendering of a [`ListQuery`] into Postgres SQL
//!
//! Field names come from request parameters, so they are never spliced into
//! SQL directly: each entity supplies a [`ColumnMap`] whitelist, and every
//! value is passed as a bind parameter typed by the column's [`FieldKind`].
//! Filter values are parsed exactly as [`FieldValue::matches_param`] parses
//! them, so Postgres and in-memory sources agree on what matches.

use sqlx::{Postgres, QueryBuilder};

use super::{DEFAULT_SORT_FIELD, FieldKind, FieldValue, ListQuery};

/// Wire field name to SQL column and kind,
/// e.g. `("trackingId", "tracking_id", FieldKind::Text)`
pub type ColumnMap = [(&'static str, &'static str, FieldKind)];

pub fn column(columns: &ColumnMap, field: &str) -> Option<(&'static str, FieldKind)> {
    columns
        .iter()
        .find(|(name, _, _)| *name == field)
        .map(|(_, column, kind)| (*column, *kind))
}

fn push_value<'args>(builder: &mut QueryBuilder<'args, Postgres>, value: FieldValue) {
    match value {
        FieldValue::Text(value) => builder.push_bind(value),
        FieldValue::Number(value) => builder.push_bind(value),
        FieldValue::Bool(value) => builder.push_bind(value),
        FieldValue::Timestamp(value) => builder.push_bind(value),
        FieldValue::Id(value) => builder.push_bind(value),
    };
}

/// Escape `%`, `_` and `\` so a search term matches literally inside ILIKE
pub fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Append ` WHERE ...` for the filter and search stages
///
/// Conditions on unmapped fields are skipped. A value that does not parse
/// as its column's kind matches nothing, as does a search with no mapped
/// text or id field.
pub fn push_predicate<'args>(
    builder: &mut QueryBuilder<'args, Postgres>,
    query: &ListQuery,
    columns: &ColumnMap,
) {
    builder.push(" WHERE TRUE");

    for condition in &query.conditions {
        let Some((column, kind)) = column(columns, &condition.field) else {
            continue;
        };
        match kind.parse(&condition.value) {
            Some(value) => {
                builder.push(" AND ");
                builder.push(column);
                builder.push(" = ");
                push_value(builder, value);
            }
            None => {
                builder.push(" AND FALSE");
            }
        }
    }

    if let Some(search) = &query.search {
        let searchable: Vec<&'static str> = search
            .fields
            .iter()
            .filter_map(|field| column(columns, field))
            .filter(|(_, kind)| matches!(kind, FieldKind::Text | FieldKind::Id))
            .map(|(column, _)| column)
            .collect();

        if searchable.is_empty() {
            builder.push(" AND FALSE");
        } else {
            let pattern = format!("%{}%", escape_like(&search.term));
            builder.push(" AND (");
            for (i, column) in searchable.iter().enumerate() {
                if i > 0 {
                    builder.push(" OR ");
                }
                builder.push("CAST(");
                builder.push(*column);
                builder.push(" AS TEXT) ILIKE ");
                builder.push_bind(pattern.clone());
            }
            builder.push(")");
        }
    }
}

/// Append ` ORDER BY ... LIMIT ... OFFSET ...` for the sort and page stages
pub fn push_order_and_page<'args>(
    builder: &mut QueryBuilder<'args, Postgres>,
    query: &ListQuery,
    columns: &ColumnMap,
) {
    if let Some(sort) = &query.sort {
        let sort_column = column(columns, &sort.field)
            .or_else(|| column(columns, DEFAULT_SORT_FIELD))
            .map(|(column, _)| column)
            .unwrap_or("created_at");
        builder.push(" ORDER BY ");
        builder.push(sort_column);
        builder.push(if sort.descending { " DESC" } else { " ASC" });
    }

    if let Some(page) = query.page {
        builder.push(" LIMIT ");
        builder.push_bind(i64::try_from(page.limit).unwrap_or(i64::MAX));
        builder.push(" OFFSET ");
        builder.push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Page, Search, SortKey};

    const COLUMNS: &ColumnMap = &[
        ("trackingId", "tracking_id", FieldKind::Text),
        ("status", "status", FieldKind::Text),
        ("weight", "weight", FieldKind::Number),
        ("createdAt", "created_at", FieldKind::Timestamp),
    ];

    fn render(query: &ListQuery) -> String {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT * FROM parcels");
        push_predicate(&mut builder, query, COLUMNS);
        push_order_and_page(&mut builder, query, COLUMNS);
        builder.sql().to_string()
    }

    #[test]
    fn renders_full_query_with_bind_parameters() {
        let query = ListQuery {
            search: Some(Search {
                term: "trk".to_string(),
                fields: vec!["trackingId".to_string(), "status".to_string()],
            }),
            sort: Some(SortKey::parse("weight")),
            page: Some(Page { page: 2, limit: 5 }),
            ..ListQuery::new().with_condition("status", "REQUESTED")
        };

        assert_eq!(
            render(&query),
            "SELECT * FROM parcels WHERE TRUE AND status = $1 \
             AND (CAST(tracking_id AS TEXT) ILIKE $2 OR CAST(status AS TEXT) ILIKE $3) \
             ORDER BY weight ASC LIMIT $4 OFFSET $5"
        );
    }

    #[test]
    fn typed_columns_bind_typed_values() {
        let query = ListQuery::new()
            .with_condition("createdAt", "2026-01-01T00:00:00Z")
            .with_condition("weight", "2.50");
        assert_eq!(
            render(&query),
            "SELECT * FROM parcels WHERE TRUE AND created_at = $1 AND weight = $2"
        );
    }

    #[test]
    fn unparsable_values_match_nothing() {
        let query = ListQuery {
            search: Some(Search {
                term: "2".to_string(),
                fields: vec!["weight".to_string()],
            }),
            ..ListQuery::new().with_condition("weight", "heavy")
        };
        assert_eq!(
            render(&query),
            "SELECT * FROM parcels WHERE TRUE AND FALSE AND FALSE"
        );
    }

    #[test]
    fn unmapped_fields_never_reach_sql() {
        let query = ListQuery {
            sort: Some(SortKey::parse("-name; DROP TABLE parcels")),
            ..ListQuery::new().with_condition("1=1 OR status", "x")
        };

        assert_eq!(
            render(&query),
            "SELECT * FROM parcels WHERE TRUE ORDER BY created_at DESC"
        );
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }
}
