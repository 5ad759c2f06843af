pub mod history;

pub use history::{load_csv, read_csv, HistoryError};
