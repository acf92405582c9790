//! Terminal tables for command output.

pub mod tables;

pub use tables::{
    TableBuilder, create_cluster_table, create_hits_table, create_ingest_table,
    create_matches_table, create_stats_table, preview,
};
