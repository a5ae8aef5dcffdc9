//! Request normalization
//!
//! Turns raw query parameters into a [`TableDataRequest`]. Both sort
//! formats (JSON array and legacy `sort` + `order`) end up as one
//! [`SortSpec`], so the builder never sees wire-format details.

use std::collections::HashMap;

use serde::Deserialize;
use studio_core::{
    ColumnFilter, EngineError, EngineResult, FilterOperator, FilterSpec, PageLimits, PageRequest,
    SortDirection, SortKey, SortSpec, TableDataRequest, TableListOptions, Value,
};

pub const PARAM_PAGE: &str = "page";
pub const PARAM_PAGE_SIZE: &str = "pageSize";
pub const PARAM_SORT: &str = "sort";
pub const PARAM_ORDER: &str = "order";
pub const PARAM_FILTERS: &str = "filters";
pub const PARAM_DATABASE: &str = "database";
pub const PARAM_SCHEMA: &str = "schema";
pub const PARAM_SEARCH: &str = "search";

const DEFAULT_PAGE: i64 = 1;

/// Decodes an `application/x-www-form-urlencoded` query string.
///
/// A leading `?` is ignored; for repeated keys the last value wins.
pub fn parse_query_string(query: &str) -> HashMap<String, String> {
    let query = query.strip_prefix('?').unwrap_or(query);
    url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}

/// Builds a normalized table-data request from raw query parameters
pub fn parse_table_data_request(
    table: &str,
    params: &HashMap<String, String>,
    limits: &PageLimits,
) -> EngineResult<TableDataRequest> {
    let page = parse_int(params, PARAM_PAGE)?.unwrap_or(DEFAULT_PAGE);
    let page_size = parse_int(params, PARAM_PAGE_SIZE)?.unwrap_or(limits.default_page_size as i64);

    Ok(TableDataRequest {
        database: non_empty(params, PARAM_DATABASE),
        schema: non_empty(params, PARAM_SCHEMA),
        table: table.to_string(),
        page: PageRequest::new(page, page_size),
        sort: parse_sort(
            params.get(PARAM_SORT).map(String::as_str),
            params.get(PARAM_ORDER).map(String::as_str),
        )?,
        filters: parse_filters(params.get(PARAM_FILTERS).map(String::as_str))?,
    })
}

/// Options for the table listing
pub fn parse_table_list_options(params: &HashMap<String, String>) -> EngineResult<TableListOptions> {
    let page = parse_int(params, PARAM_PAGE)?;
    let page_size = parse_int(params, PARAM_PAGE_SIZE)?;

    let to_u32 = |name: &str, value: Option<i64>| -> EngineResult<Option<u32>> {
        value
            .map(|v| {
                u32::try_from(v)
                    .ok()
                    .filter(|v| *v >= 1)
                    .ok_or_else(|| EngineError::invalid_page(format!("{name} must be >= 1, got {v}")))
            })
            .transpose()
    };

    Ok(TableListOptions {
        search: non_empty(params, PARAM_SEARCH),
        page: to_u32(PARAM_PAGE, page)?,
        page_size: to_u32(PARAM_PAGE_SIZE, page_size)?,
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSortKey {
    column_name: String,
    #[serde(default)]
    direction: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFilter {
    column_name: String,
    operator: String,
    #[serde(default = "null_value")]
    value: Value,
}

fn null_value() -> Value {
    Value::Null
}

/// Normalizes the two accepted sort formats.
///
/// A value starting with `[` is a JSON array of `{columnName, direction}`;
/// anything else is a legacy single column name whose direction comes from
/// `order`.
pub fn parse_sort(sort: Option<&str>, order: Option<&str>) -> EngineResult<SortSpec> {
    let Some(sort) = sort.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(Vec::new());
    };

    if sort.starts_with('[') {
        let raw: Vec<RawSortKey> = serde_json::from_str(sort)
            .map_err(|e| EngineError::invalid_request(format!("Malformed sort parameter: {e}")))?;
        return raw
            .into_iter()
            .map(|key| {
                let direction = match key.direction.as_deref() {
                    Some(d) => parse_direction(d)?,
                    None => SortDirection::Asc,
                };
                Ok(SortKey::new(key.column_name, direction))
            })
            .collect();
    }

    let direction = match order.map(str::trim).filter(|o| !o.is_empty()) {
        Some(o) => parse_direction(o)?,
        None => SortDirection::Asc,
    };
    Ok(vec![SortKey::new(sort, direction)])
}

pub fn parse_direction(direction: &str) -> EngineResult<SortDirection> {
    match direction.trim().to_ascii_lowercase().as_str() {
        "asc" => Ok(SortDirection::Asc),
        "desc" => Ok(SortDirection::Desc),
        other => Err(EngineError::invalid_request(format!(
            "Unknown sort direction '{other}', expected 'asc' or 'desc'"
        ))),
    }
}

/// Parses the JSON-encoded filter array
pub fn parse_filters(filters: Option<&str>) -> EngineResult<FilterSpec> {
    let Some(filters) = filters.map(str::trim).filter(|f| !f.is_empty()) else {
        return Ok(Vec::new());
    };

    let raw: Vec<RawFilter> = serde_json::from_str(filters)
        .map_err(|e| EngineError::invalid_request(format!("Malformed filters parameter: {e}")))?;

    raw.into_iter()
        .map(|f| {
            Ok(ColumnFilter::new(
                f.column_name,
                parse_operator(&f.operator)?,
                f.value,
            ))
        })
        .collect()
}

/// Accepts operator names and their SQL spellings, case-insensitively
pub fn parse_operator(operator: &str) -> EngineResult<FilterOperator> {
    let normalized = operator
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase();

    let op = match normalized.as_str() {
        "eq" | "=" | "==" => FilterOperator::Eq,
        "neq" | "ne" | "!=" | "<>" => FilterOperator::Neq,
        "gt" | ">" => FilterOperator::Gt,
        "gte" | ">=" => FilterOperator::Gte,
        "lt" | "<" => FilterOperator::Lt,
        "lte" | "<=" => FilterOperator::Lte,
        "like" => FilterOperator::Like,
        "ilike" => FilterOperator::ILike,
        "in" => FilterOperator::In,
        "is_null" | "is null" | "isnull" => FilterOperator::IsNull,
        "is_not_null" | "is not null" | "notnull" => FilterOperator::IsNotNull,
        _ => {
            return Err(EngineError::invalid_request(format!(
                "Unknown filter operator '{operator}'"
            )))
        }
    };
    Ok(op)
}

fn parse_int(params: &HashMap<String, String>, name: &str) -> EngineResult<Option<i64>> {
    match params.get(name).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<i64>()
            .map(Some)
            .map_err(|_| EngineError::invalid_page(format!("{name} must be an integer, got '{raw}'"))),
    }
}

fn non_empty(params: &HashMap<String, String>, name: &str) -> Option<String> {
    params
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_when_params_missing() {
        let request =
            parse_table_data_request("users", &HashMap::new(), &PageLimits::default()).unwrap();
        assert_eq!(request.page, PageRequest::new(1, 50));
        assert!(request.sort.is_empty());
        assert!(request.filters.is_empty());
        assert_eq!(request.database, None);
    }

    #[test]
    fn test_json_sort_keeps_order() {
        let sort = parse_sort(
            Some(r#"[{"columnName":"last_name","direction":"DESC"},{"columnName":"id"}]"#),
            None,
        )
        .unwrap();
        assert_eq!(
            sort,
            vec![
                SortKey::new("last_name", SortDirection::Desc),
                SortKey::new("id", SortDirection::Asc),
            ]
        );
    }

    #[test]
    fn test_legacy_sort_uses_order_param() {
        let sort = parse_sort(Some("created_at"), Some("desc")).unwrap();
        assert_eq!(sort, vec![SortKey::new("created_at", SortDirection::Desc)]);

        let sort = parse_sort(Some("created_at"), None).unwrap();
        assert_eq!(sort[0].direction, SortDirection::Asc);
    }

    #[test]
    fn test_legacy_sort_keeps_suspicious_names_for_validation() {
        // Identifier checks happen in the builder, against catalog metadata.
        let sort = parse_sort(Some("droptable;--"), None).unwrap();
        assert_eq!(sort[0].column_name, "droptable;--");
    }

    #[test]
    fn test_malformed_sort_json_is_rejected() {
        let err = parse_sort(Some("[{\"columnName\":"), None).unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");

        let err = parse_sort(Some("id"), Some("sideways")).unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
    }

    #[test]
    fn test_filters_accept_names_and_symbols() {
        let filters = parse_filters(Some(
            r#"[
                {"columnName":"age","operator":">=","value":18},
                {"columnName":"email","operator":"ILIKE","value":"%@example.com"},
                {"columnName":"deleted_at","operator":"IS NULL"},
                {"columnName":"role","operator":"in","value":["admin","owner"]}
            ]"#,
        ))
        .unwrap();

        assert_eq!(filters.len(), 4);
        assert_eq!(filters[0].operator, FilterOperator::Gte);
        assert_eq!(filters[0].value, Value::Int(18));
        assert_eq!(filters[1].operator, FilterOperator::ILike);
        assert_eq!(filters[2].operator, FilterOperator::IsNull);
        assert!(filters[2].value.is_null());
        assert_eq!(
            filters[3].value,
            Value::Array(vec![Value::Text("admin".into()), Value::Text("owner".into())])
        );
    }

    #[test]
    fn test_unknown_operator_is_rejected() {
        let err = parse_filters(Some(r#"[{"columnName":"a","operator":"~~*","value":1}]"#))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest { .. }));
    }

    #[test]
    fn test_non_integer_page_is_invalid_page_request() {
        let err = parse_table_data_request(
            "users",
            &params(&[("page", "two")]),
            &PageLimits::default(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "INVALID_PAGE_REQUEST");
    }

    #[test]
    fn test_out_of_range_page_is_left_for_builder() {
        let request = parse_table_data_request(
            "users",
            &params(&[("page", "0"), ("pageSize", "-5")]),
            &PageLimits::default(),
        )
        .unwrap();
        assert_eq!(request.page, PageRequest::new(0, -5));
    }

    #[test]
    fn test_query_string_round_trip() {
        let raw = parse_query_string(
            "?page=2&pageSize=25&sort=%5B%7B%22columnName%22%3A%22id%22%2C%22direction%22%3A%22desc%22%7D%5D&database=analytics",
        );
        let request = parse_table_data_request("events", &raw, &PageLimits::default()).unwrap();
        assert_eq!(request.page, PageRequest::new(2, 25));
        assert_eq!(request.sort, vec![SortKey::new("id", SortDirection::Desc)]);
        assert_eq!(request.database.as_deref(), Some("analytics"));
    }

    #[test]
    fn test_table_list_options() {
        let options =
            parse_table_list_options(&params(&[("search", "user"), ("pageSize", "10")])).unwrap();
        assert_eq!(options.search.as_deref(), Some("user"));
        assert_eq!(options.page, None);
        assert_eq!(options.page_size, Some(10));

        assert!(parse_table_list_options(&params(&[("page", "0")])).is_err());
    }
}
