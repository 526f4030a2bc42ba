//! Sentiment ETL pipeline
//!
//! Collects forum posts, microblog posts and news headlines, normalizes them
//! into documents, scores sentiment, assigns topics and stores the results.

pub mod config;
pub mod enrich;
pub mod error;
pub mod ingester;
pub mod load;
pub mod normalize;
pub mod pipeline;
pub mod sentiment;
pub mod storage;
pub mod topic;
pub mod types;

#[cfg(test)]
mod error_tests;
