//! Lazily opened PostgreSQL connection and row-to-JSON conversion.

use crate::config::DatabaseSettings;
use crate::error::{ConfigError, Error};
use crate::sdk::Row;
use crate::state::Context;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow, PgSslMode};
use sqlx::ConnectOptions;
use std::str::FromStr;

/// An open connection that runs raw SQL.
#[async_trait]
pub trait Database: Send {
    async fn query(&mut self, sql: &str) -> Result<Vec<Row>, Error>;
}

/// Opens a [`Database`] from the `[database]` settings.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, settings: &DatabaseSettings) -> Result<Box<dyn Database>, Error>;
}

/// Holds at most one connection for the lifetime of its owner.
#[derive(Default)]
pub struct DatabaseSlot {
    open: Option<Box<dyn Database>>,
}

impl DatabaseSlot {
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// The connection, opened through the context's connector on first use.
    pub async fn get(&mut self, context: &Context) -> Result<&mut dyn Database, Error> {
        let db = match self.open.take() {
            Some(db) => db,
            None => {
                let settings = context.settings.database()?;
                context.connector.connect(&settings).await?
            }
        };
        Ok(&mut **self.open.insert(db))
    }
}

/// Connects with sqlx, bounded by `connect_timeout`.
#[derive(Clone, Copy, Debug, Default)]
pub struct PgConnector;

#[async_trait]
impl Connector for PgConnector {
    async fn connect(&self, settings: &DatabaseSettings) -> Result<Box<dyn Database>, Error> {
        let options = connect_options(settings)?;
        let conn = tokio::time::timeout(settings.connect_timeout, options.connect())
            .await
            .map_err(|_| Error::ConnectTimeout(settings.connect_timeout))??;
        tracing::debug!(host = %options.get_host(), "database connected");
        Ok(Box::new(PgDatabase { conn }))
    }
}

/// Accepts `postgres://` URLs and `pgsql:key=value;...` DSNs; explicit credentials win.
pub fn connect_options(settings: &DatabaseSettings) -> Result<PgConnectOptions, Error> {
    let mut options = match settings.dsn.strip_prefix("pgsql:") {
        Some(pairs) => parse_pgsql_dsn(pairs)?,
        None => PgConnectOptions::from_str(&settings.dsn)?,
    };
    if let Some(username) = &settings.username {
        options = options.username(username);
    }
    if let Some(password) = &settings.password {
        options = options.password(password);
    }
    Ok(options)
}

fn parse_pgsql_dsn(pairs: &str) -> Result<PgConnectOptions, Error> {
    let mut options = PgConnectOptions::new();
    for pair in pairs.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| invalid_dsn(format!("malformed segment: {}", pair)))?;
        let value = value.trim();
        options = match key.trim() {
            "host" => options.host(value),
            "port" => options.port(
                value
                    .parse()
                    .map_err(|_| invalid_dsn(format!("invalid port: {}", value)))?,
            ),
            "dbname" => options.database(value),
            "user" => options.username(value),
            "password" => options.password(value),
            "sslmode" => options.ssl_mode(PgSslMode::from_str(value)?),
            "application_name" => options.application_name(value),
            other => {
                tracing::warn!("dsn key {} is not supported, ignoring", other);
                options
            }
        };
    }
    Ok(options)
}

fn invalid_dsn(message: String) -> Error {
    Error::Config(ConfigError::Invalid {
        section: "database".into(),
        key: "dsn".into(),
        message,
    })
}

pub struct PgDatabase {
    conn: PgConnection,
}

#[async_trait]
impl Database for PgDatabase {
    /// Runs over the simple query protocol, so every cell arrives in text form.
    async fn query(&mut self, sql: &str) -> Result<Vec<Row>, Error> {
        tracing::debug!(sql = %sql, "query");
        use sqlx::Executor;
        let rows = (&mut self.conn).fetch_all(sqlx::raw_sql(sql)).await?;
        rows.iter().map(row_to_map).collect()
    }
}

fn row_to_map(row: &PgRow) -> Result<Row, Error> {
    use sqlx::Column;
    use sqlx::Row as _;
    let mut map = Row::new();
    for (i, col) in row.columns().iter().enumerate() {
        map.insert(col.name().to_string(), cell_to_value(row, i)?);
    }
    Ok(map)
}

fn cell_to_value(row: &PgRow, i: usize) -> Result<Value, Error> {
    use sqlx::Row as _;
    use sqlx::ValueRef;
    if row.try_get_raw(i)?.is_null() {
        return Ok(Value::Null);
    }
    if let Ok(n) = row.try_get::<i16, _>(i) {
        return Ok(Value::Number(n.into()));
    }
    if let Ok(n) = row.try_get::<i32, _>(i) {
        return Ok(Value::Number(n.into()));
    }
    if let Ok(n) = row.try_get::<i64, _>(i) {
        return Ok(Value::Number(n.into()));
    }
    if let Ok(n) = row.try_get::<f32, _>(i) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Ok(Value::Number(n));
        }
    }
    if let Ok(n) = row.try_get::<f64, _>(i) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Ok(Value::Number(n));
        }
    }
    if let Ok(b) = row.try_get::<bool, _>(i) {
        return Ok(Value::Bool(b));
    }
    if let Ok(u) = row.try_get::<uuid::Uuid, _>(i) {
        return Ok(Value::String(u.to_string()));
    }
    if let Ok(d) = row.try_get::<chrono::DateTime<chrono::Utc>, _>(i) {
        return Ok(Value::String(d.to_rfc3339()));
    }
    if let Ok(d) = row.try_get::<chrono::NaiveDateTime, _>(i) {
        return Ok(Value::String(d.format("%Y-%m-%d %H:%M:%S%.f").to_string()));
    }
    if let Ok(d) = row.try_get::<chrono::NaiveDate, _>(i) {
        return Ok(Value::String(d.format("%Y-%m-%d").to_string()));
    }
    if let Ok(j) = row.try_get::<serde_json::Value, _>(i) {
        return Ok(j);
    }
    // numeric, arrays, enums, intervals, inet, ...: the server's text rendering.
    Ok(Value::String(row.try_get_unchecked::<String, _>(i)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::mock::MockConnector;
    use serde_json::json;
    use std::time::Duration;

    fn settings(dsn: &str) -> DatabaseSettings {
        DatabaseSettings {
            dsn: dsn.into(),
            username: None,
            password: None,
            connect_timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn pgsql_dsn_is_translated() {
        let options = connect_options(&settings("pgsql:host=db.internal;port=6432;dbname=app")).unwrap();
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 6432);
        assert_eq!(options.get_database(), Some("app"));
    }

    #[test]
    fn explicit_username_overrides_dsn() {
        let mut s = settings("postgres://dsnuser@localhost/app");
        s.username = Some("app".into());
        assert_eq!(connect_options(&s).unwrap().get_username(), "app");
    }

    #[test]
    fn malformed_dsn_is_a_config_error() {
        for dsn in ["pgsql:host", "pgsql:port=abc"] {
            let err = connect_options(&settings(dsn)).unwrap_err();
            assert!(matches!(
                err,
                Error::Config(ConfigError::Invalid { ref section, ref key, .. }) if section == "database" && key == "dsn"
            ));
            assert_eq!(err.code(), 1);
        }
    }

    /// Needs a reachable server in `TAO_TEST_DSN`; skipped otherwise.
    #[tokio::test]
    async fn unmapped_column_types_come_back_as_text() {
        let Ok(dsn) = std::env::var("TAO_TEST_DSN") else {
            return;
        };
        let mut s = settings(&dsn);
        s.connect_timeout = Duration::from_secs(5);
        let mut db = PgConnector.connect(&s).await.unwrap();
        let rows = db
            .query(
                "SELECT 1::int AS id, 19.99::numeric AS price, ARRAY['a','b'] AS tags, \
                 NULL::numeric AS missing, true AS active, '{\"k\": 1}'::json AS meta, \
                 interval '90 minutes' AS span",
            )
            .await
            .unwrap();
        let row = &rows[0];
        let keys: Vec<&str> = row.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["id", "price", "tags", "missing", "active", "meta", "span"]);
        assert_eq!(row["id"], json!(1));
        assert_eq!(row["price"], json!("19.99"));
        assert_eq!(row["tags"], json!("{a,b}"));
        assert_eq!(row["missing"], Value::Null);
        assert_eq!(row["active"], json!(true));
        assert_eq!(row["meta"], json!({"k": 1}));
        assert_eq!(row["span"], json!("01:30:00"));
    }

    #[tokio::test]
    async fn slot_connects_once() {
        let connector = MockConnector::returning(vec![]);
        let context = Context::new(Settings::parse("[database]\ndsn = pgsql:host=x\n").unwrap())
            .with_connector(connector.clone());
        let mut slot = DatabaseSlot::default();
        assert!(!slot.is_open());
        slot.get(&context).await.unwrap().query("SELECT 1").await.unwrap();
        slot.get(&context).await.unwrap().query("SELECT 2").await.unwrap();
        assert!(slot.is_open());
        assert_eq!(connector.connects(), 1);
        assert_eq!(connector.statements(), vec!["SELECT 1", "SELECT 2"]);
    }

    #[tokio::test]
    async fn slot_stays_closed_without_settings() {
        let context = Context::new(Settings::default()).with_connector(MockConnector::returning(vec![json!({})]));
        let mut slot = DatabaseSlot::default();
        assert!(matches!(slot.get(&context).await, Err(Error::Config(_))));
        assert!(!slot.is_open());
    }
}
