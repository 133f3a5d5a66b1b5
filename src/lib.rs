pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod fastq;
pub mod matcher;
pub mod output;
pub mod record;
pub mod registry;
pub mod samplesheet;
pub mod sheets;
pub mod sink;
