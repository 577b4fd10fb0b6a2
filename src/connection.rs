//! Driver seam: one bulk insert per batch over a live database session.

use crate::error::{LoadError, Result};
use crate::producer::Batch;
use async_trait::async_trait;
use sqlx::postgres::PgConnection;
use sqlx::{Connection, QueryBuilder};
use tracing::debug;

/// A live database session that can swallow one batch per call.
///
/// The trait is the seam between the pipeline and the driver: production
/// uses [`PgBulkConnection`], tests substitute an in-memory recorder.
#[async_trait]
pub trait BulkConnection: Send + Sized + 'static {
    /// Execute a single parameterized multi-row insert for `batch`,
    /// naming exactly the batch's columns, and return rows affected.
    async fn insert_batch(&mut self, table: &str, batch: &Batch) -> Result<u64>;

    /// Close the underlying session.
    async fn close(self) -> Result<()>;
}

/// Narrowest bind type shared by every cell of a column within one batch.
///
/// CSV gives us text; the target table has real types. Columns are widened
/// per batch (int, then float, then bool, then text) so each placeholder is
/// bound with a type the server can assign to the column. An empty cell is
/// kept as a literal empty string, which forces the whole column to text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    Int,
    Float,
    Bool,
    Text,
}

/// Infer the bind type of each column across all rows of a batch.
pub fn infer_column_kinds(batch: &Batch) -> Vec<ColumnKind> {
    (0..batch.columns.len())
        .map(|idx| {
            let mut all_int = true;
            let mut all_float = true;
            let mut all_bool = true;
            for row in &batch.rows {
                let cell = row[idx].trim();
                if cell.is_empty() {
                    all_int = false;
                    all_float = false;
                    all_bool = false;
                    break;
                }
                if all_int && cell.parse::<i64>().is_err() {
                    all_int = false;
                }
                if all_float && cell.parse::<f64>().is_err() {
                    all_float = false;
                }
                if all_bool
                    && !cell.eq_ignore_ascii_case("true")
                    && !cell.eq_ignore_ascii_case("false")
                {
                    all_bool = false;
                }
                if !all_int && !all_float && !all_bool {
                    break;
                }
            }
            if all_int {
                ColumnKind::Int
            } else if all_float {
                ColumnKind::Float
            } else if all_bool {
                ColumnKind::Bool
            } else {
                ColumnKind::Text
            }
        })
        .collect()
}

/// PostgreSQL session owned exclusively by the pool or one in-flight job.
pub struct PgBulkConnection {
    conn: PgConnection,
}

impl PgBulkConnection {
    /// Establish a single connection; failure here is fatal to the run.
    pub async fn connect(url: &str) -> Result<Self> {
        let conn = PgConnection::connect(url).await?;
        Ok(Self { conn })
    }

    /// Establish the pool's fixed connection set up front.
    pub async fn connect_many(url: &str, count: usize) -> Result<Vec<Self>> {
        let mut connections = Vec::with_capacity(count);
        for _ in 0..count {
            connections.push(Self::connect(url).await?);
        }
        Ok(connections)
    }
}

#[async_trait]
impl BulkConnection for PgBulkConnection {
    async fn insert_batch(&mut self, table: &str, batch: &Batch) -> Result<u64> {
        let kinds = infer_column_kinds(batch);
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(format!(
            "INSERT INTO {} ({}) ",
            table,
            batch.columns.join(", ")
        ));
        builder.push_values(batch.rows.iter(), |mut binds, row| {
            for (cell, kind) in row.iter().zip(&kinds) {
                match kind {
                    ColumnKind::Int => {
                        binds.push_bind(cell.trim().parse::<i64>().unwrap_or_default());
                    }
                    ColumnKind::Float => {
                        binds.push_bind(cell.trim().parse::<f64>().unwrap_or_default());
                    }
                    ColumnKind::Bool => {
                        binds.push_bind(cell.trim().eq_ignore_ascii_case("true"));
                    }
                    ColumnKind::Text => {
                        binds.push_bind(cell.as_str());
                    }
                }
            }
        });
        // One statement, one implicit transaction: the batch commits or
        // fails as a unit, independent of every other batch.
        let result = builder
            .build()
            .execute(&mut self.conn)
            .await
            .map_err(|source| LoadError::Insert {
                table: table.to_string(),
                source,
            })?;
        debug!("Inserted {} rows into {}", result.rows_affected(), table);
        Ok(result.rows_affected())
    }

    async fn close(self) -> Result<()> {
        self.conn.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn batch(columns: &[&str], rows: &[&[&str]]) -> Batch {
        Batch {
            columns: Arc::new(columns.iter().map(|c| c.to_string()).collect()),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn test_infer_int_column() {
        let b = batch(&["n"], &[&["1"], &["-42"], &["0"]]);
        assert_eq!(infer_column_kinds(&b), vec![ColumnKind::Int]);
    }

    #[test]
    fn test_infer_widens_int_to_float() {
        let b = batch(&["n"], &[&["1"], &["2.5"]]);
        assert_eq!(infer_column_kinds(&b), vec![ColumnKind::Float]);
    }

    #[test]
    fn test_infer_bool_column() {
        let b = batch(&["flag"], &[&["true"], &["FALSE"]]);
        assert_eq!(infer_column_kinds(&b), vec![ColumnKind::Bool]);
    }

    #[test]
    fn test_infer_mixed_falls_back_to_text() {
        let b = batch(&["v"], &[&["1"], &["apple"]]);
        assert_eq!(infer_column_kinds(&b), vec![ColumnKind::Text]);
    }

    #[test]
    fn test_empty_cell_forces_text() {
        let b = batch(&["n"], &[&["1"], &[""]]);
        assert_eq!(infer_column_kinds(&b), vec![ColumnKind::Text]);
    }

    #[test]
    fn test_infer_per_column_independence() {
        let b = batch(
            &["id", "price", "name"],
            &[&["1", "9.99", "ham"], &["2", "12", "eggs"]],
        );
        assert_eq!(
            infer_column_kinds(&b),
            vec![ColumnKind::Int, ColumnKind::Float, ColumnKind::Text]
        );
    }
}
