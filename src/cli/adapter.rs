//! Parsing for the adapter trimming option
//!

use regex::Regex;
use simple_error::{SimpleResult, bail, try_with};

/// Adapter option value before it is matched against the read input arity
#[derive(Debug, PartialEq)]
pub enum AdapterOption {
    Disabled,
    Single(String),
    Pair(String, String),
}

/// Parse the -a option value
///
/// `none` and `off` disable trimming, a single sequence is used for single-end reads, and a comma
/// separated pair is used for paired-end reads.
///
pub fn parse_adapter_option(value: &str) -> SimpleResult<AdapterOption> {
    if value == "none" || value == "off" {
        return Ok(AdapterOption::Disabled);
    }

    let single_re = try_with!(Regex::new(r"^[ATGCN]+$"), "Invalid adapter pattern");
    let pair_re = try_with!(
        Regex::new(r"^([ATGCN]+),([ATGCN]+)$"),
        "Invalid adapter pattern"
    );

    if single_re.is_match(value) {
        Ok(AdapterOption::Single(value.to_string()))
    } else if let Some(caps) = pair_re.captures(value) {
        Ok(AdapterOption::Pair(caps[1].to_string(), caps[2].to_string()))
    } else {
        bail!(
            "Invalid adapter sequence '{value}'. Use 'none' or 'off' to disable trimming, a sequence of [ATGCN] for single-end reads, or two such sequences separated by a comma for paired-end reads"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled() {
        assert_eq!(parse_adapter_option("none").unwrap(), AdapterOption::Disabled);
        assert_eq!(parse_adapter_option("off").unwrap(), AdapterOption::Disabled);
    }

    #[test]
    fn test_single() {
        assert_eq!(
            parse_adapter_option("AGATCGGAAG").unwrap(),
            AdapterOption::Single("AGATCGGAAG".to_string())
        );
    }

    #[test]
    fn test_pair() {
        assert_eq!(
            parse_adapter_option("AGATCGGAAG,NNAT").unwrap(),
            AdapterOption::Pair("AGATCGGAAG".to_string(), "NNAT".to_string())
        );
    }

    #[test]
    fn test_invalid() {
        assert!(parse_adapter_option("").is_err());
        assert!(parse_adapter_option("agatc").is_err());
        assert!(parse_adapter_option("ACGT,").is_err());
        assert!(parse_adapter_option("ACGT,ACGT,ACGT").is_err());
        assert!(parse_adapter_option("ACGT ACGT").is_err());
        assert!(parse_adapter_option("Off").is_err());
    }
}
