//! A single load job: one batch, one borrowed connection, one insert.

use crate::connection::BulkConnection;
use crate::error::Result;
use crate::pool::ConnectionPool;
use crate::producer::Batch;
use std::sync::Arc;

/// Run one bulk insert against the target table.
///
/// Blocks on connection availability, executes the batch as a single
/// insert transaction, and returns the connection to the pool on the
/// success and failure paths alike. No automatic retry: the error carries
/// the driver fault for the scheduler to log. The batch is consumed here
/// and dropped on return.
pub async fn run_insert<C: BulkConnection>(
    batch: Batch,
    pool: Arc<ConnectionPool<C>>,
    table: String,
) -> Result<u64> {
    let mut conn = pool.acquire().await;
    let outcome = conn.insert_batch(&table, &batch).await;
    pool.release(conn).await;
    outcome
}
