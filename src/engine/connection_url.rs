//! Connection URL parsing
//!
//! Turns a `postgres://` / `postgresql://` URL into normalized connection
//! fields. Percent-encoded credentials and database names are decoded and
//! IPv6 hosts lose their brackets. `sslmode` wins over the plain `ssl`
//! flag; `sslrootcert` alone means `verify-ca`, any other `ssl*` option
//! means `require`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub const POSTGRES_SCHEMES: &[&str] = &["postgres", "postgresql"];
pub const POSTGRES_DEFAULT_PORT: u16 = 5432;

/// Fields that can be read from a connection URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartialConnectionConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub ssl_mode: Option<SslMode>,
    pub ssl_root_cert: Option<String>,
    pub options: HashMap<String, String>,
}

/// libpq `sslmode` values
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    Disable,
    Allow,
    #[default]
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Allow => "allow",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        }
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SslMode {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "disable" => Ok(SslMode::Disable),
            "allow" => Ok(SslMode::Allow),
            "prefer" => Ok(SslMode::Prefer),
            "require" => Ok(SslMode::Require),
            "verify-ca" => Ok(SslMode::VerifyCa),
            "verify-full" => Ok(SslMode::VerifyFull),
            _ => Err(ParseError::new(
                ParseErrorCode::InvalidParameter,
                format!("Unknown sslmode '{}'", value),
            )),
        }
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    pub code: ParseErrorCode,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParseErrorCode {
    InvalidUrl,
    UnsupportedScheme,
    MissingHost,
    InvalidUtf8,
    InvalidParameter,
}

impl ParseError {
    pub fn new(code: ParseErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Parses a PostgreSQL connection URL.
pub fn parse_connection_url(url_str: &str) -> ParseResult<PartialConnectionConfig> {
    let url = Url::parse(url_str)
        .map_err(|e| ParseError::new(ParseErrorCode::InvalidUrl, format!("Invalid URL: {}", e)))?;

    let scheme = url.scheme();
    if !POSTGRES_SCHEMES
        .iter()
        .any(|s| s.eq_ignore_ascii_case(scheme))
    {
        return Err(ParseError::new(
            ParseErrorCode::UnsupportedScheme,
            format!(
                "Unsupported URL scheme '{}'. Supported schemes: {}",
                scheme,
                POSTGRES_SCHEMES.join(", ")
            ),
        ));
    }

    parse_postgres(&url)
}

fn parse_postgres(url: &Url) -> ParseResult<PartialConnectionConfig> {
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .map(|h| {
            h.strip_prefix('[')
                .and_then(|h| h.strip_suffix(']'))
                .unwrap_or(h)
                .to_string()
        });

    if host.is_none() {
        return Err(ParseError::new(
            ParseErrorCode::MissingHost,
            "PostgreSQL URL must specify a host",
        ));
    }

    let port = url.port().or(Some(POSTGRES_DEFAULT_PORT));

    let username = if url.username().is_empty() {
        None
    } else {
        Some(
            percent_decode(url.username())
                .map_err(|_| ParseError::new(ParseErrorCode::InvalidUtf8, "Invalid username encoding"))?,
        )
    };

    let password = url
        .password()
        .map(percent_decode)
        .transpose()
        .map_err(|_| ParseError::new(ParseErrorCode::InvalidUtf8, "Invalid password encoding"))?;

    let database = url
        .path()
        .strip_prefix('/')
        .filter(|db| !db.is_empty())
        .map(|db| {
            percent_decode(db)
                .map_err(|_| ParseError::new(ParseErrorCode::InvalidUtf8, "Invalid database name encoding"))
        })
        .transpose()?;

    let mut options = HashMap::new();
    let mut ssl_mode = None;
    let mut ssl_flag = None;
    let mut ssl_root_cert = None;
    let mut ssl_implied = false;

    for (key, value) in url.query_pairs() {
        let key_lower = key.to_ascii_lowercase();

        match key_lower.as_str() {
            "sslmode" => ssl_mode = Some(value.parse::<SslMode>()?),
            "ssl" => ssl_flag = parse_bool_param(&value),
            "sslrootcert" => ssl_root_cert = Some(value.to_string()),
            other if other.starts_with("ssl") => ssl_implied = true,
            _ => {}
        }

        options.insert(key.into_owned(), value.into_owned());
    }

    let ssl_mode = ssl_mode
        .or(ssl_flag.map(|on| if on { SslMode::Require } else { SslMode::Disable }))
        .or_else(|| ssl_root_cert.as_ref().map(|_| SslMode::VerifyCa))
        .or(if ssl_implied { Some(SslMode::Require) } else { None });

    Ok(PartialConnectionConfig {
        host,
        port,
        username,
        password,
        database,
        ssl_mode,
        ssl_root_cert,
        options,
    })
}

fn percent_decode(s: &str) -> Result<String, std::str::Utf8Error> {
    percent_encoding::percent_decode_str(s)
        .decode_utf8()
        .map(|s| s.into_owned())
}

fn parse_bool_param(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}
