//! Table-data query builder
//!
//! Produces the page and count statements for one request. Table and column
//! names are only written into SQL text after an exact match against catalog
//! metadata; filter values are always bound as `$n` parameters.

use studio_core::{
    BindParam, ColumnDescriptor, ColumnFilter, EngineError, EngineResult, FilterOperator,
    PageLimits, PageStatements, SortKey, Statement, TableCatalog, TableDataRequest,
    TableIdentifier, Value,
};

/// Quote an identifier the way PostgreSQL expects it
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `"schema"."table"` for a resolved identifier
pub fn qualified_table(table: &TableIdentifier) -> String {
    format!("{}.{}", quote_ident(table.schema()), quote_ident(table.name()))
}

/// Builds the data and count statements for `request`.
///
/// `catalog` is the allow-list of tables in the target schema and `columns`
/// the descriptors of the requested table. The count statement carries the
/// same `WHERE` clause as the data statement, so totals describe the
/// filtered row set.
pub fn build_page_statements(
    request: &TableDataRequest,
    catalog: &TableCatalog,
    columns: &[ColumnDescriptor],
    limits: &PageLimits,
) -> EngineResult<PageStatements> {
    if let Some(schema) = request.schema.as_deref() {
        if schema != catalog.schema {
            return Err(EngineError::unknown_table(format!("{schema}.{}", request.table)));
        }
    }
    let table = catalog.resolve(&request.table)?;

    for key in &request.sort {
        find_column(columns, &key.column_name)?;
    }
    for filter in &request.filters {
        find_column(columns, &filter.column_name)?;
    }

    request.page.validate(limits)?;

    let mut params = Vec::new();
    let mut clauses = Vec::with_capacity(request.filters.len());
    for filter in &request.filters {
        let column = find_column(columns, &filter.column_name)?;
        clauses.push(render_filter(filter, column, &mut params)?);
    }

    let table_sql = qualified_table(&table);
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    let order_sql = render_order_by(&request.sort);

    let limit = request.page.page_size as u64;
    let offset = request.page.offset();

    let data = Statement {
        sql: format!(
            "SELECT * FROM {}{}{} LIMIT {} OFFSET {}",
            table_sql, where_sql, order_sql, limit, offset
        ),
        params: params.clone(),
    };
    let count = Statement {
        sql: format!("SELECT COUNT(*) FROM {}{}", table_sql, where_sql),
        params,
    };

    Ok(PageStatements {
        table,
        data,
        count,
        limit,
        offset,
    })
}

fn find_column<'a>(columns: &'a [ColumnDescriptor], name: &str) -> EngineResult<&'a ColumnDescriptor> {
    columns
        .iter()
        .find(|c| c.name.as_str() == name)
        .ok_or_else(|| EngineError::unknown_column(name))
}

fn render_order_by(sort: &[SortKey]) -> String {
    if sort.is_empty() {
        return String::new();
    }
    let keys: Vec<String> = sort
        .iter()
        .map(|key| format!("{} {}", quote_ident(&key.column_name), key.direction.as_sql()))
        .collect();
    format!(" ORDER BY {}", keys.join(", "))
}

fn render_filter(
    filter: &ColumnFilter,
    column: &ColumnDescriptor,
    params: &mut Vec<BindParam>,
) -> EngineResult<String> {
    let ident = quote_ident(&column.name);

    let comparison = match filter.operator {
        FilterOperator::IsNull => return Ok(format!("{} IS NULL", ident)),
        FilterOperator::IsNotNull => return Ok(format!("{} IS NOT NULL", ident)),
        FilterOperator::Eq if filter.value.is_null() => return Ok(format!("{} IS NULL", ident)),
        FilterOperator::Neq if filter.value.is_null() => {
            return Ok(format!("{} IS NOT NULL", ident))
        }
        FilterOperator::In => return render_in(filter, column, &ident, params),
        FilterOperator::Like | FilterOperator::ILike => {
            let keyword = if filter.operator == FilterOperator::Like {
                "LIKE"
            } else {
                "ILIKE"
            };
            params.push(BindParam::Scalar(Some(required_text(filter)?)));
            return Ok(format!("{}::text {} ${}", ident, keyword, params.len()));
        }
        FilterOperator::Eq => "=",
        FilterOperator::Neq => "<>",
        FilterOperator::Gt => ">",
        FilterOperator::Gte => ">=",
        FilterOperator::Lt => "<",
        FilterOperator::Lte => "<=",
    };

    params.push(BindParam::Scalar(Some(required_text(filter)?)));
    Ok(format!(
        "{} {} {}",
        ident,
        comparison,
        placeholder(params.len(), &column.cast_type, false)
    ))
}

fn render_in(
    filter: &ColumnFilter,
    column: &ColumnDescriptor,
    ident: &str,
    params: &mut Vec<BindParam>,
) -> EngineResult<String> {
    let items = match &filter.value {
        Value::Array(items) => items
            .iter()
            .map(bind_text)
            .collect::<EngineResult<Vec<_>>>()?,
        Value::Null => {
            return Err(EngineError::invalid_request(format!(
                "Filter on '{}' with operator 'in' requires a list value",
                filter.column_name
            )))
        }
        scalar => vec![bind_text(scalar)?],
    };

    if items.is_empty() {
        return Ok("FALSE".to_string());
    }

    params.push(BindParam::List(items));
    Ok(format!(
        "{} = ANY({})",
        ident,
        placeholder(params.len(), &column.cast_type, true)
    ))
}

fn placeholder(index: usize, cast_type: &str, array: bool) -> String {
    let cast = parameter_cast(cast_type);
    if cast.is_empty() {
        return format!("${}", index);
    }
    let suffix = if array { "[]" } else { "" };
    format!("${}::{}{}", index, cast, suffix)
}

/// Cast target for a bound value. Type modifiers are dropped, and the
/// fixed-length `character` and `bit` map to `bpchar` and `varbit`: a bare
/// `character` or `bit` cast means length 1 and would cut the value.
fn parameter_cast(cast_type: &str) -> String {
    let trimmed = cast_type.trim();
    let (base, array) = match trimmed.strip_suffix("[]") {
        Some(element) => (element, true),
        None => (trimmed, false),
    };

    let mut unmodified = String::with_capacity(base.len());
    let mut depth = 0usize;
    for ch in base.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => unmodified.push(ch),
            _ => {}
        }
    }
    let unmodified = unmodified.split_whitespace().collect::<Vec<_>>().join(" ");

    let mapped = match unmodified.as_str() {
        "character" | "char" => "bpchar",
        "bit" => "varbit",
        other => other,
    };
    if array {
        format!("{}[]", mapped)
    } else {
        mapped.to_string()
    }
}

fn required_text(filter: &ColumnFilter) -> EngineResult<String> {
    bind_text(&filter.value)?.ok_or_else(|| {
        EngineError::invalid_request(format!(
            "Filter on '{}' with operator '{:?}' requires a value",
            filter.column_name, filter.operator
        ))
    })
}

/// Renders a value in PostgreSQL text input syntax; `None` is SQL NULL
pub fn bind_text(value: &Value) -> EngineResult<Option<String>> {
    let text = match value {
        Value::Null => return Ok(None),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => {
            if f.is_nan() {
                "NaN".to_string()
            } else if f.is_infinite() {
                if *f > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
            } else {
                f.to_string()
            }
        }
        Value::Text(s) => s.clone(),
        Value::Bytes(b) => {
            let hex: String = b.iter().map(|byte| format!("{:02x}", byte)).collect();
            format!("\\x{}", hex)
        }
        Value::Json(j) => j.to_string(),
        Value::Array(_) => {
            return Err(EngineError::invalid_request(
                "List values are only supported by the 'in' operator",
            ))
        }
    };
    Ok(Some(text))
}
