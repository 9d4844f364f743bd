//! Helper functions for host-side file handling
use std::path::Path;

use regex::Regex;

use crate::{
    error::{ErrorCode, RuntimeError},
    recoverable_error,
};

/// Find the first available filename.
///
/// File naming is `base`-`##`.`suffix`, starting at 01.  The first such filename that
/// doesn't exist in the current working directory is returned.
///
/// # Arguments
/// * `base` - base filename
/// * `suffix` - file type extension
///
/// # Returns
/// [Result] containing a filename or a [RuntimeError]
pub fn first_available(base: &str, suffix: &str) -> Result<String, RuntimeError> {
    let mut n = 1;
    loop {
        let filename = format!("{}-{:02}.{}", base, n, suffix);
        match Path::new(&filename).try_exists() {
            Ok(b) => {
                if !b {
                    return Ok(filename);
                }
            }
            Err(e) => return recoverable_error!(ErrorCode::FileError, "{}", e),
        }

        n += 1;
    }
}

/// Find the last existing filename.
///
/// File naming is `base`-`##`.`suffix`, starting at 01.  The last such filename that
/// exists in the current working directory is returned.
///
/// # Arguments
/// * `base` - base filename
/// * `suffix` - file type extension
///
/// # Returns
/// [Result] containing a filename or a [RuntimeError]
pub fn last_existing(base: &str, suffix: &str) -> Result<String, RuntimeError> {
    let mut n = 1;
    loop {
        let filename = format!("{}-{:02}.{}", base, n, suffix);
        match Path::new(&filename).try_exists() {
            Ok(b) => {
                if !b {
                    if n > 1 {
                        return Ok(format!("{}-{:02}.{}", base, n - 1, suffix));
                    } else {
                        return Ok(format!("{}.{}", base, suffix));
                    }
                }
            }
            Err(e) => return recoverable_error!(ErrorCode::FileError, "{}", e),
        }

        n += 1;
    }
}

/// Check that a filename is safe to write a save file to.
///
/// Filenames that end in a story-file extension are rejected so a save can
/// never clobber the program it was made from.
///
/// # Arguments
/// * `filename` - filename to check
///
/// # Returns
/// Empty [Result] or a [RuntimeError]
pub fn check_filename(filename: &str) -> Result<(), RuntimeError> {
    match Regex::new(r".*\.(ulx|blorb|gblorb)$") {
        Ok(r) => {
            if r.is_match(filename) {
                recoverable_error!(
                    ErrorCode::InvalidFilename,
                    "Filenames ending in '.ulx', '.blorb', or '.gblorb' are not allowed"
                )
            } else {
                Ok(())
            }
        }
        Err(e) => recoverable_error!(
            ErrorCode::Interpreter,
            "Internal error with regex checking filename: {}",
            e
        ),
    }
}

/// Locate a configuration file.
///
/// Looks in the `.plugh` directory under the user home directory.
///
/// # Arguments
/// * `name` - config file name
///
/// # Returns
/// [Option] with the full path to the file, if found
pub fn config_file(name: &str) -> Option<String> {
    if let Some(home) = dirs::home_dir() {
        let filename = format!("{}/.plugh/{}", home.to_str()?, name);
        match Path::new(&filename).try_exists() {
            Ok(b) => {
                if b {
                    Some(filename)
                } else {
                    None
                }
            }
            Err(e) => {
                info!(target: "app::trace", "Error checking existence of {}: {}", filename, e);
                None
            }
        }
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_filename() {
        assert!(check_filename("story-01.glksave").is_ok());
        assert!(check_filename("story.ulx").is_err());
        assert!(check_filename("story.blorb").is_err());
        assert!(check_filename("story.gblorb").is_err());
    }

    #[test]
    fn test_first_available() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("story").to_str().unwrap().to_string();
        let f = first_available(&base, "glksave");
        assert!(f.is_ok_and(|x| x == format!("{}-01.glksave", base)));
    }

    #[test]
    fn test_last_existing() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("story").to_str().unwrap().to_string();
        std::fs::write(format!("{}-01.glksave", base), b"x").unwrap();
        std::fs::write(format!("{}-02.glksave", base), b"x").unwrap();
        let f = last_existing(&base, "glksave");
        assert!(f.is_ok_and(|x| x == format!("{}-02.glksave", base)));
    }
}
