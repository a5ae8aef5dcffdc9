//! Command line interface
//!
//! ```text
//! dbstudio data users --query 'page=2&pageSize=25&sort=email'
//! dbstudio tables --query 'search=order'
//! dbstudio describe orders
//! dbstudio databases
//! dbstudio metrics
//! ```
//!
//! Every subcommand prints the JSON body its command handler produces.

use clap::{Parser, Subcommand};
use serde::Serialize;
use studio_query::parse_query_string;

use crate::commands::{self, CommandResponse};
use crate::StudioState;

#[derive(Parser, Debug)]
#[command(
    name = "dbstudio",
    version,
    about = "Browse PostgreSQL tables with paginated, sorted and filtered reads"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print one page of rows of a table
    Data {
        table: String,
        /// Request parameters as a URL query string, e.g. `page=2&pageSize=25`
        #[arg(long, short, default_value = "")]
        query: String,
    },
    /// List the tables of a schema
    Tables {
        #[arg(long, short, default_value = "")]
        query: String,
    },
    /// Print the columns and keys of a table
    Describe {
        table: String,
        #[arg(long, short, default_value = "")]
        query: String,
    },
    /// List the configured databases
    Databases,
    /// Print the fetch metrics of this process
    Metrics,
}

/// Rendered result of one CLI command
#[derive(Debug)]
pub struct Outcome {
    pub status: u16,
    pub body: String,
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        if self.status < 400 {
            0
        } else {
            1
        }
    }
}

fn render<T: Serialize>(response: CommandResponse<T>) -> Outcome {
    let status = response.status();
    let body = serde_json::to_string_pretty(&response).unwrap_or_else(|e| {
        format!(
            r#"{{"error":{{"code":"INTERNAL","message":"Failed to serialize response: {}"}}}}"#,
            e
        )
    });
    Outcome { status, body }
}

/// Runs `command` against `state`
pub async fn execute(state: &StudioState, command: Command) -> Outcome {
    match command {
        Command::Data { table, query } => {
            let params = parse_query_string(&query);
            render(commands::table_data::get_table_data(state, &table, &params).await)
        }
        Command::Tables { query } => {
            let params = parse_query_string(&query);
            render(commands::table_data::list_tables(state, &params).await)
        }
        Command::Describe { table, query } => {
            let params = parse_query_string(&query);
            render(commands::table_data::describe_table(state, &table, &params).await)
        }
        Command::Databases => render(commands::table_data::list_databases(state)),
        Command::Metrics => render(commands::metrics::get_metrics()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data_command() {
        let cli = Cli::try_parse_from(["dbstudio", "data", "users", "--query", "page=2"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Data {
                table: "users".to_string(),
                query: "page=2".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_defaults_and_rejects_missing_table() {
        let cli = Cli::try_parse_from(["dbstudio", "tables"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Tables {
                query: String::new()
            }
        );

        assert!(Cli::try_parse_from(["dbstudio", "describe"]).is_err());
    }

    #[test]
    fn test_exit_code_follows_status() {
        let ok = render(CommandResponse::Ok(vec![1]));
        assert_eq!(ok.exit_code(), 0);

        let err = CommandResponse::<()>::from(Err(studio_core::EngineError::unknown_table("nope")));
        let rendered = render(err);
        assert_eq!(rendered.status, 404);
        assert_eq!(rendered.exit_code(), 1);
        assert!(rendered.body.contains("UNKNOWN_TABLE"));
    }
}
