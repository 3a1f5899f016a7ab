//! Resumable batch embedding pipeline.
//!
//! The locator selects records whose text is present but whose embedding is
//! still NULL, the generator runs them through the model, the writer stores
//! the vectors in one transaction per batch, and the publisher copies the
//! stored vectors into the vector index in parameter-bounded chunks. The
//! driver repeats this until the locator comes back empty.

mod context;
mod driver;
mod generator;
mod locator;
mod publisher;
mod run;
mod types;
mod writer;

pub use locator::{count_pending, count_unpublished};
pub use run::run;
pub use types::PipelineSummary;
