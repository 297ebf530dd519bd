//! SQLite 访问：建表与查询
//!
//! 连接放在 std Mutex 里共享；方法都是同步的，工具层经 spawn_blocking 调用。

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Database connection poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Customer {
    pub customer_id: i64,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpendingEvent {
    pub event_id: i64,
    pub customer_id: i64,
    pub plan_name: String,
    pub billing_start: String,
    pub billing_end: String,
    pub amount_due: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElectricityPlan {
    pub plan_id: i64,
    pub plan_name: String,
    pub plan_description: String,
    pub selling_points: String,
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// 打开（或创建）数据库文件并确保表存在
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let conn = Connection::open(path.as_ref())?;
        let db = Self { conn: Mutex::new(conn) };
        db.init_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self, DataError> {
        let db = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        db.init_schema()?;
        Ok(db)
    }

    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, DataError> {
        let conn = self.conn.lock().map_err(|_| DataError::Poisoned)?;
        Ok(f(&conn)?)
    }

    pub fn init_schema(&self) -> Result<(), DataError> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS customers (
                    customer_id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    email TEXT UNIQUE
                );
                CREATE TABLE IF NOT EXISTS spending_events (
                    event_id INTEGER PRIMARY KEY AUTOINCREMENT,
                    customer_id INTEGER,
                    plan_name TEXT NOT NULL,
                    billing_start DATE NOT NULL,
                    billing_end DATE NOT NULL,
                    amount_due REAL,
                    FOREIGN KEY (customer_id) REFERENCES customers(customer_id)
                );
                CREATE TABLE IF NOT EXISTS electricity_plans (
                    plan_id INTEGER PRIMARY KEY AUTOINCREMENT,
                    plan_name TEXT NOT NULL,
                    plan_description TEXT NOT NULL,
                    selling_points TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_spending_customer ON spending_events(customer_id);",
            )
        })
    }

    pub fn customer_by_id(&self, customer_id: i64) -> Result<Option<Customer>, DataError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT customer_id, name, email FROM customers WHERE customer_id = ?1",
                [customer_id],
                |row| {
                    Ok(Customer {
                        customer_id: row.get(0)?,
                        name: row.get(1)?,
                        email: row.get(2)?,
                    })
                },
            )
            .optional()
        })
    }

    /// 邮箱匹配忽略大小写与首尾空白
    pub fn customer_by_email(&self, email: &str) -> Result<Option<Customer>, DataError> {
        let email = email.trim().to_lowercase();
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT customer_id, name, email FROM customers WHERE lower(email) = ?1",
                [email],
                |row| {
                    Ok(Customer {
                        customer_id: row.get(0)?,
                        name: row.get(1)?,
                        email: row.get(2)?,
                    })
                },
            )
            .optional()
        })
    }

    /// 账单事件，按 billing_end 倒序；months 限制条数，plan_name 过滤套餐
    pub fn spending_events(
        &self,
        customer_id: i64,
        months: Option<u32>,
        plan_name: Option<&str>,
    ) -> Result<Vec<SpendingEvent>, DataError> {
        let mut sql = String::from(
            "SELECT event_id, customer_id, plan_name, billing_start, billing_end, amount_due
             FROM spending_events WHERE customer_id = ?1",
        );
        if plan_name.is_some() {
            sql.push_str(" AND plan_name = ?2");
        }
        sql.push_str(" ORDER BY billing_end DESC");
        if let Some(m) = months {
            sql.push_str(&format!(" LIMIT {m}"));
        }

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let map = |row: &rusqlite::Row<'_>| {
                Ok(SpendingEvent {
                    event_id: row.get(0)?,
                    customer_id: row.get(1)?,
                    plan_name: row.get(2)?,
                    billing_start: row.get(3)?,
                    billing_end: row.get(4)?,
                    amount_due: row.get(5)?,
                })
            };
            let rows = match plan_name {
                Some(plan) => stmt.query_map(params![customer_id, plan], map)?,
                None => stmt.query_map(params![customer_id], map)?,
            };
            rows.collect()
        })
    }

    pub fn plan_names(&self) -> Result<Vec<String>, DataError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT plan_name FROM electricity_plans ORDER BY plan_id")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect()
        })
    }

    pub fn plan_by_name(&self, plan_name: &str) -> Result<Option<ElectricityPlan>, DataError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT plan_id, plan_name, plan_description, selling_points
                 FROM electricity_plans WHERE plan_name = ?1",
                [plan_name],
                |row| {
                    Ok(ElectricityPlan {
                        plan_id: row.get(0)?,
                        plan_name: row.get(1)?,
                        plan_description: row.get(2)?,
                        selling_points: row.get(3)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn insert_customer(&self, name: &str, email: Option<&str>) -> Result<i64, DataError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO customers (name, email) VALUES (?1, ?2)",
                params![name, email],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn insert_spending_event(
        &self,
        customer_id: i64,
        plan_name: &str,
        billing_start: &str,
        billing_end: &str,
        amount_due: f64,
    ) -> Result<i64, DataError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO spending_events (customer_id, plan_name, billing_start, billing_end, amount_due)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![customer_id, plan_name, billing_start, billing_end, amount_due],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn insert_plan(
        &self,
        plan_name: &str,
        plan_description: &str,
        selling_points: &str,
    ) -> Result<i64, DataError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO electricity_plans (plan_name, plan_description, selling_points) VALUES (?1, ?2, ?3)",
                params![plan_name, plan_description, selling_points],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spending_events_order_limit_and_filter() {
        let db = Database::open_in_memory().unwrap();
        let id = db.insert_customer("Carol", Some("carol@example.com")).unwrap();
        db.insert_spending_event(id, "Eco Plan", "2024-01-01", "2024-01-31", 40.0).unwrap();
        db.insert_spending_event(id, "Night Plan", "2024-02-01", "2024-02-29", 30.0).unwrap();
        db.insert_spending_event(id, "Eco Plan", "2024-03-01", "2024-03-31", 45.0).unwrap();

        let all = db.spending_events(id, None, None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].billing_end, "2024-03-31");

        let latest = db.spending_events(id, Some(1), None).unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].amount_due, Some(45.0));

        let eco = db.spending_events(id, None, Some("Eco Plan")).unwrap();
        assert!(eco.iter().all(|e| e.plan_name == "Eco Plan"));
        assert_eq!(eco.len(), 2);
    }

    #[test]
    fn test_customer_lookup_by_email_is_case_insensitive() {
        let db = Database::open_in_memory().unwrap();
        let id = db.insert_customer("Dan", Some("dan@example.com")).unwrap();
        let found = db.customer_by_email("  DAN@example.com ").unwrap().unwrap();
        assert_eq!(found.customer_id, id);
        assert!(db.customer_by_id(id + 100).unwrap().is_none());
    }

    #[test]
    fn test_open_file_creates_schema() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("data.db")).unwrap();
        assert!(db.plan_names().unwrap().is_empty());
    }
}
