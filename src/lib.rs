//! A Glulx virtual machine as a library
#[macro_use]
extern crate log;

pub mod config;
pub mod error;
pub mod files;
pub mod glulx;
pub mod iff;
pub mod instruction;

#[cfg(test)]
pub mod test_util;
