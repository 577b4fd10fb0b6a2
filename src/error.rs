use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Connection error: {0}")]
    Connect(#[from] sqlx::Error),

    #[error("Error inserting data into {table}: {source}")]
    Insert { table: String, source: sqlx::Error },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LoadError>;
