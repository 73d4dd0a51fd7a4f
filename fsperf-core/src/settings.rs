use std::collections::BTreeMap;
use std::fmt;

use crate::error::{PerfError, PerfResult};

/// The section holding settings shared by all tests.
pub const MAIN_SECTION: &str = "main";

/// Section/key lookup of configuration values.
pub trait Settings: fmt::Debug {
    /// Returns the value of `key` in `section`, if set.
    fn get(&self, section: &str, key: &str) -> Option<&str>;

    /// Returns the value of `key` in `section`, or an error if it is not set.
    fn require(&self, section: &str, key: &str) -> PerfResult<&str> {
        self.get(section, key).ok_or_else(|| PerfError::MissingSetting {
            section: section.to_owned(),
            key: key.to_owned(),
        })
    }

    /// The directory that benchmarks run in, `main.directory`.
    fn directory(&self) -> PerfResult<&str> {
        self.require(MAIN_SECTION, "directory")
    }
}

impl Settings for BTreeMap<String, BTreeMap<String, String>> {
    fn get(&self, section: &str, key: &str) -> Option<&str> {
        BTreeMap::get(self, section)?.get(key).map(String::as_str)
    }
}
