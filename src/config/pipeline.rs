//! Pipeline, extraction, cleaning, and sink configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Stage sizing for the extraction pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of transform worker threads
    pub workers: usize,
    /// Capacity of the raw record channel
    pub input_capacity: usize,
    /// Capacity of the cleaned record channel
    pub output_capacity: usize,
    /// Monitor sampling interval (milliseconds)
    pub monitor_interval_ms: u64,
    /// Drop cleaned bodies shorter than this many characters
    pub min_body_length: usize,
}

impl PipelineConfig {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 15,
            input_capacity: 1000,
            output_capacity: 1000,
            monitor_interval_ms: 1000,
            min_body_length: 0,
        }
    }
}

/// Which pages the extractor emits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Namespaces to keep (0 = articles)
    pub namespaces: Vec<i32>,
    /// Keep every namespace, ignoring `namespaces`
    pub all_namespaces: bool,
    /// Drop redirect pages
    pub skip_redirects: bool,
    /// Stop after this many pages
    pub max_pages: Option<u64>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            namespaces: vec![0],
            all_namespaces: false,
            skip_redirects: false,
            max_pages: None,
        }
    }
}

/// Wikitext cleaning rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    /// Store bodies as extracted, without cleaning
    pub raw: bool,
    pub remove_refs: bool,
    pub remove_tables: bool,
    pub remove_categories: bool,
    pub remove_files: bool,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            raw: false,
            remove_refs: true,
            remove_tables: true,
            remove_categories: true,
            remove_files: true,
        }
    }
}

/// Output store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Tree holding the title -> text rows
    pub tree: String,
    /// Flush to disk after every inserted row
    pub sync_writes: bool,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            tree: "pages".to_string(),
            sync_writes: true,
        }
    }
}
