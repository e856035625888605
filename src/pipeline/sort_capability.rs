//! Availability check for the optional fragment sort utility
//!
//! Sorting is never required, so every failure here is a reason to fall back to unsorted output.
//!

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use regex::Regex;

use crate::os_utils::{find_executable, is_executable_file};

pub const SORT_EXE_NAME: &str = "novosort";
pub const SORT_LICENSE_FILENAME: &str = "novosort.lic";

#[derive(Debug, PartialEq)]
pub enum SortCapability {
    /// No sort executable found
    Unavailable,

    /// Sort executable found but not usable, with the reason
    Ineligible(String),

    Available(Utf8PathBuf),
}

/// Find the first YYYY-MM-DD date in license text, taken as the expiry date
///
pub fn parse_license_expiry(license_text: &str) -> Option<NaiveDate> {
    let date_re = Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").ok()?;
    date_re
        .captures_iter(license_text)
        .find_map(|caps| NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok())
}

/// Search the bundled helper directory first, then PATH
///
fn find_sort_exe(libexec_dir: &Utf8Path) -> Option<Utf8PathBuf> {
    let bundled = libexec_dir.join(SORT_EXE_NAME);
    if is_executable_file(&bundled) {
        return Some(bundled);
    }
    find_executable(SORT_EXE_NAME)
}

/// Check the license file stored next to the sort executable
///
fn check_sort_license(sort_exe: &Utf8Path, today: NaiveDate) -> Result<(), String> {
    let license = match sort_exe.parent() {
        Some(x) => x.join(SORT_LICENSE_FILENAME),
        None => return Err(format!("can't locate license for '{sort_exe}'")),
    };
    let text = match std::fs::read_to_string(&license) {
        Ok(x) => x,
        Err(_) => return Err(format!("license file is missing: '{license}'")),
    };
    match parse_license_expiry(&text) {
        Some(expiry) if expiry < today => Err(format!("license expired on {expiry}: '{license}'")),
        Some(_) => Ok(()),
        None => Err(format!("no expiry date found in license file: '{license}'")),
    }
}

pub fn check_sort_capability(libexec_dir: &Utf8Path, today: NaiveDate) -> SortCapability {
    let sort_exe = match find_sort_exe(libexec_dir) {
        Some(x) => x,
        None => return SortCapability::Unavailable,
    };
    match check_sort_license(&sort_exe, today) {
        Ok(_) => SortCapability::Available(sort_exe),
        Err(reason) => SortCapability::Ineligible(reason),
    }
}
