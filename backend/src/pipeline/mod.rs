//! The three stages and the row plumbing they share.
//!
//! - `generate`: synthetic students into a new workbook.
//! - `transform`: workbook into CSV, score + 10.
//! - `load`: CSV into the database in batches, score + 5.
//!
//! Every stage is a plain blocking function taking a [`progress::JobProgress`];
//! scheduling, status and failure handling belong to the job runner.

pub mod bulk;
pub mod delimited;
pub mod generate;
pub mod load;
pub mod progress;
pub mod row;
pub mod spreadsheet;
pub mod synthetic;
pub mod transform;
