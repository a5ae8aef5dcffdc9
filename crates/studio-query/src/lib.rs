//! Parameterized, sort/filter/paginate query building for table data.
//!
//! [`params`] normalizes raw request parameters; [`builder`] validates the
//! normalized request against catalog metadata and renders SQL.

pub mod builder;
pub mod params;

pub use builder::{bind_text, build_page_statements, qualified_table, quote_ident};
pub use params::{
    parse_filters, parse_operator, parse_query_string, parse_sort, parse_table_data_request,
    parse_table_list_options,
};
