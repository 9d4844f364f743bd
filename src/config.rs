use serde_yaml::{self, Value};
use std::fs::File;

use crate::error::{ErrorCode, RuntimeError};

/// Interpreter settings
#[derive(Debug)]
pub struct Config {
    /// Maximum heap size in bytes, 0 for unbounded
    max_heap: usize,
    /// Number of undo states to retain
    undo_depth: usize,
    /// Enable logging
    logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_heap: 0,
            undo_depth: 3,
            logging: false,
        }
    }
}

impl Config {
    pub fn new(max_heap: usize, undo_depth: usize, logging: bool) -> Config {
        Config {
            max_heap,
            undo_depth,
            logging,
        }
    }

    pub fn from_file(file: File) -> Result<Config, RuntimeError> {
        match serde_yaml::from_reader::<File, Value>(file) {
            Ok(data) => {
                let max_heap = match data["max_heap"].as_u64() {
                    Some(v) => v as usize,
                    None => 0,
                };
                let undo_depth = match data["undo_depth"].as_u64() {
                    Some(v) => v as usize,
                    None => 3,
                };
                let logging = match data["logging"].as_str() {
                    Some(t) => t == "enabled",
                    None => false,
                };

                Ok(Config {
                    max_heap,
                    undo_depth,
                    logging,
                })
            }
            Err(e) => Err(RuntimeError::recoverable(
                ErrorCode::ConfigError,
                format!("{}", e),
            )),
        }
    }

    pub fn max_heap(&self) -> usize {
        self.max_heap
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_depth
    }

    pub fn logging(&self) -> bool {
        self.logging
    }
}
