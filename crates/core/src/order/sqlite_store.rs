//! SQLite-backed order store implementation.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;

use super::{is_valid_order_number, Order, OrderError, OrderStatus, OrderStore, PendingOrder};

/// SQLite-backed order store.
///
/// Every call runs on the blocking thread pool so the async callers (and their timeouts)
/// are never stalled by disk I/O.
pub struct SqliteOrderStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteOrderStore {
    /// Open (or create) the database file and the `orders` table.
    pub fn new(path: &Path) -> Result<Self, OrderError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory SQLite order store (useful for testing).
    pub fn in_memory() -> Result<Self, OrderError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), OrderError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                number TEXT PRIMARY KEY,
                login TEXT NOT NULL,
                status TEXT NOT NULL,
                accrual TEXT NOT NULL DEFAULT '0',
                uploaded_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_orders_login ON orders(login);
            CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);
            "#,
        )?;
        Ok(())
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, OrderError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, OrderError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| OrderError::Database("connection lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| OrderError::Database(format!("storage task failed: {}", e)))?
    }

    fn row_to_order(row: &rusqlite::Row) -> rusqlite::Result<Order> {
        let number: String = row.get(0)?;
        let login: String = row.get(1)?;
        let status_str: String = row.get(2)?;
        let accrual_str: String = row.get(3)?;
        let uploaded_at_str: String = row.get(4)?;
        let updated_at_str: String = row.get(5)?;

        let status = OrderStatus::from_str(&status_str)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
        let accrual = Decimal::from_str(&accrual_str)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

        Ok(Order {
            number,
            login,
            status,
            accrual,
            uploaded_at: parse_timestamp(4, &uploaded_at_str)?,
            updated_at: parse_timestamp(5, &updated_at_str)?,
        })
    }
}

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[async_trait]
impl OrderStore for SqliteOrderStore {
    async fn add_order(&self, login: &str, number: &str) -> Result<Order, OrderError> {
        if !is_valid_order_number(number) {
            return Err(OrderError::InvalidNumber(number.to_string()));
        }

        let login = login.to_string();
        let number = number.to_string();

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;

            let owner: Option<String> = tx
                .query_row(
                    "SELECT login FROM orders WHERE number = ?1",
                    params![number],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(owner) = owner {
                return Err(if owner == login {
                    OrderError::AlreadyUploaded(number)
                } else {
                    OrderError::UploadedByOtherUser(number)
                });
            }

            let now = Utc::now();
            tx.execute(
                "INSERT INTO orders (number, login, status, accrual, uploaded_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    number,
                    login,
                    OrderStatus::New.as_str(),
                    Decimal::ZERO.to_string(),
                    now.to_rfc3339(),
                    now.to_rfc3339(),
                ],
            )?;
            tx.commit()?;

            Ok(Order {
                number,
                login,
                status: OrderStatus::New,
                accrual: Decimal::ZERO,
                uploaded_at: now,
                updated_at: now,
            })
        })
        .await
    }

    async fn get_order(&self, number: &str) -> Result<Option<Order>, OrderError> {
        let number = number.to_string();
        self.with_conn(move |conn| {
            let order = conn
                .query_row(
                    "SELECT number, login, status, accrual, uploaded_at, updated_at FROM orders WHERE number = ?1",
                    params![number],
                    Self::row_to_order,
                )
                .optional()?;
            Ok(order)
        })
        .await
    }

    async fn get_orders(&self, login: &str) -> Result<Vec<Order>, OrderError> {
        let login = login.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT number, login, status, accrual, uploaded_at, updated_at FROM orders WHERE login = ?1 ORDER BY uploaded_at DESC",
            )?;
            let orders = stmt
                .query_map(params![login], Self::row_to_order)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(orders)
        })
        .await
    }

    async fn get_not_processed_orders(&self) -> Result<Vec<PendingOrder>, OrderError> {
        self.with_conn(|conn| {
            // INVALID is terminal as well, so there is nothing left to ask the accrual service.
            let mut stmt = conn.prepare(
                "SELECT number, status FROM orders WHERE status NOT IN (?1, ?2) ORDER BY uploaded_at",
            )?;
            let rows = stmt
                .query_map(
                    params![OrderStatus::Processed.as_str(), OrderStatus::Invalid.as_str()],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(number, status)| -> Result<PendingOrder, OrderError> {
                    let status: OrderStatus = status.parse()?;
                    Ok(PendingOrder::new(number, status))
                })
                .collect()
        })
        .await
    }

    async fn update_order(
        &self,
        number: &str,
        status: OrderStatus,
        accrual: Decimal,
    ) -> Result<(), OrderError> {
        let number = number.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;

            let current: Option<String> = tx
                .query_row(
                    "SELECT status FROM orders WHERE number = ?1",
                    params![number],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(current) = current else {
                return Err(OrderError::NotFound(number));
            };
            let current: OrderStatus = current.parse()?;

            if !current.can_transition_to(status) {
                return Err(OrderError::InvalidTransition {
                    number,
                    from: current,
                    to: status,
                });
            }

            tx.execute(
                "UPDATE orders SET status = ?1, accrual = ?2, updated_at = ?3 WHERE number = ?4",
                params![
                    status.as_str(),
                    accrual.to_string(),
                    Utc::now().to_rfc3339(),
                    number
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn health_check(&self) -> Result<(), OrderError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }
}
