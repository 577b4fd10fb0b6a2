//! Chunk producer: lazily partitions one CSV file into fixed-size row batches.
//!
//! Two-pass design: the scheduler needs the total batch count up front to
//! size waves and progress checkpoints, so pass one streams the whole file
//! counting rows without retaining them, and pass two re-opens the file and
//! yields batches in file order.

use crate::error::Result;
use csv::{ReaderBuilder, StringRecord};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// A fixed-size contiguous slice of a file's rows, processed as one insert.
///
/// Immutable once produced; owned by the job that inserts it and dropped
/// when that insert completes or fails.
#[derive(Clone, Debug)]
pub struct Batch {
    /// Column names from the file's header row, shared by every batch
    pub columns: Arc<Vec<String>>,

    /// Row values in file order; each row has exactly `columns.len()` cells
    pub rows: Vec<Vec<String>>,
}

/// Lazy, finite, non-restartable sequence of batches over one file.
pub struct ChunkProducer {
    reader: csv::Reader<File>,
    columns: Arc<Vec<String>>,
    batch_rows: usize,
    done: bool,
}

impl ChunkProducer {
    /// Pass one: count how many batches the file will produce.
    ///
    /// Streams every record into a reused buffer so nothing is retained.
    /// Returns 0 for an empty or header-only file.
    pub fn count_batches(path: &Path, batch_rows: usize) -> Result<u64> {
        assert!(batch_rows > 0, "batch_rows must be > 0");
        let mut reader = Self::make_reader(path)?;
        let mut record = StringRecord::new();
        let mut rows: u64 = 0;
        while reader.read_record(&mut record)? {
            rows += 1;
        }
        Ok(rows.div_ceil(batch_rows as u64))
    }

    /// Pass two: open the file for batch production.
    pub fn open(path: &Path, batch_rows: usize) -> Result<Self> {
        assert!(batch_rows > 0, "batch_rows must be > 0");
        let mut reader = Self::make_reader(path)?;
        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        Ok(Self {
            reader,
            columns: Arc::new(columns),
            batch_rows,
            done: false,
        })
    }

    fn make_reader(path: &Path) -> Result<csv::Reader<File>> {
        Ok(ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?)
    }

    /// Next batch in file order, or `None` once the file is exhausted.
    ///
    /// Exhaustion is a normal terminal condition, not an error. Short rows
    /// are padded with empty cells so every row matches the header width.
    pub fn next_batch(&mut self) -> Result<Option<Batch>> {
        if self.done {
            return Ok(None);
        }
        let mut rows = Vec::with_capacity(self.batch_rows);
        let mut record = StringRecord::new();
        while rows.len() < self.batch_rows {
            if self.reader.read_record(&mut record)? {
                let row: Vec<String> = (0..self.columns.len())
                    .map(|idx| record.get(idx).unwrap_or("").to_string())
                    .collect();
                rows.push(row);
            } else {
                self.done = true;
                break;
            }
        }
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(Batch {
            columns: Arc::clone(&self.columns),
            rows,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn write_file(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("bulkload_producer_test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_count_batches_rounds_up() {
        let path = write_file("five_rows.csv", "id,name\n1,a\n2,b\n3,c\n4,d\n5,e\n");
        assert_eq!(ChunkProducer::count_batches(&path, 2).unwrap(), 3);
        assert_eq!(ChunkProducer::count_batches(&path, 5).unwrap(), 1);
        assert_eq!(ChunkProducer::count_batches(&path, 100).unwrap(), 1);
    }

    #[test]
    fn test_count_batches_header_only() {
        let path = write_file("header_only.csv", "id,name\n");
        assert_eq!(ChunkProducer::count_batches(&path, 10).unwrap(), 0);
    }

    #[test]
    fn test_count_batches_empty_file() {
        let path = write_file("empty.csv", "");
        assert_eq!(ChunkProducer::count_batches(&path, 10).unwrap(), 0);
    }

    #[test]
    fn test_batches_cover_all_rows_in_order() {
        let path = write_file("seven_rows.csv", "id\n1\n2\n3\n4\n5\n6\n7\n");
        let mut producer = ChunkProducer::open(&path, 3).unwrap();
        let mut sizes = Vec::new();
        let mut cells = Vec::new();
        while let Some(batch) = producer.next_batch().unwrap() {
            assert_eq!(*batch.columns, vec!["id".to_string()]);
            sizes.push(batch.rows.len());
            for row in &batch.rows {
                cells.push(row[0].clone());
            }
        }
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(cells, vec!["1", "2", "3", "4", "5", "6", "7"]);
        // Exhaustion is terminal
        assert!(producer.next_batch().unwrap().is_none());
    }

    #[test]
    fn test_short_rows_padded_to_header_width() {
        let path = write_file("ragged.csv", "a,b,c\n1,2\n3,4,5\n");
        let mut producer = ChunkProducer::open(&path, 10).unwrap();
        let batch = producer.next_batch().unwrap().unwrap();
        assert_eq!(batch.rows[0], vec!["1", "2", ""]);
        assert_eq!(batch.rows[1], vec!["3", "4", "5"]);
    }

    #[test]
    fn test_empty_fields_stay_literal() {
        let path = write_file("empties.csv", "a,b\n,x\ny,\n");
        let mut producer = ChunkProducer::open(&path, 10).unwrap();
        let batch = producer.next_batch().unwrap().unwrap();
        assert_eq!(batch.rows[0], vec!["", "x"]);
        assert_eq!(batch.rows[1], vec!["y", ""]);
    }
}
