use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::LimsError;

pub const RUN_FOLDER_LENGTH: usize = 29;
pub const RUN_FOLDER_PATTERN: &str = r"(\d{6})_.+_(\d{4})_.+";

/// Sample ID prefixes of no-template and positive controls.
pub const CONTROL_PREFIXES: [&str; 2] = ["NTC", "PTC"];

const SAMPLE_ID_DELIMITER: char = '_';

static RUN_FOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(RUN_FOLDER_PATTERN).expect("run folder pattern is valid"));

/// Identity of one sequencing run, derived from its run folder name,
/// e.g. `200101_A00130_0001_AHABCDEFGH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunIdentity {
    folder: String,
    date: NaiveDate,
    number: u32,
}

impl RunIdentity {
    pub fn folder(&self) -> &str {
        &self.folder
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn year(&self) -> String {
        self.date.year().to_string()
    }

    /// Run date formatted as `YYYY-MM-DD`.
    pub fn timestamp(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

impl fmt::Display for RunIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.folder)
    }
}

impl FromStr for RunIdentity {
    type Err = LimsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let actual = value.chars().count();
        if actual != RUN_FOLDER_LENGTH {
            return Err(LimsError::RunFolderLength {
                name: value.to_string(),
                expected: RUN_FOLDER_LENGTH,
                actual,
            });
        }

        let captures = RUN_FOLDER_RE
            .captures(value)
            .ok_or_else(|| LimsError::RunFolderFormat {
                name: value.to_string(),
                pattern: RUN_FOLDER_PATTERN.to_string(),
            })?;
        let date_token = &captures[1];
        let number_token = &captures[2];

        let date = NaiveDate::parse_from_str(date_token, "%y%m%d").map_err(|_| {
            LimsError::RunFolderDate {
                name: value.to_string(),
                date: date_token.to_string(),
            }
        })?;
        let number = number_token
            .parse::<u32>()
            .map_err(|_| LimsError::RunFolderFormat {
                name: value.to_string(),
                pattern: RUN_FOLDER_PATTERN.to_string(),
            })?;

        Ok(Self {
            folder: value.to_string(),
            date,
            number,
        })
    }
}

/// Lab library identifier, the join key between sample sheets and the
/// tracking registry. Only the `L` and `LPRJ` families are recognised.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LibraryId(String);

impl LibraryId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Tracking sheet year the library was registered in.
    pub fn year(&self) -> String {
        let digits = if self.0.starts_with("LPRJ") {
            &self.0[4..6]
        } else {
            &self.0[1..3]
        };
        format!("20{digits}")
    }
}

impl fmt::Display for LibraryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LibraryId {
    type Err = LimsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let year_digits = if let Some(rest) = normalized.strip_prefix("LPRJ") {
            rest.get(..2)
        } else if let Some(rest) = normalized.strip_prefix('L') {
            rest.get(..2)
        } else {
            None
        };
        let is_valid = year_digits
            .map(|digits| digits.chars().all(|ch| ch.is_ascii_digit()))
            .unwrap_or(false);
        if !is_valid {
            return Err(LimsError::UnsupportedLibraryId(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

/// A compound sample ID split into its lab-internal and external parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitSampleId {
    pub internal: String,
    pub external: String,
}

pub fn is_control_sample(sample_id: &str) -> bool {
    CONTROL_PREFIXES
        .iter()
        .any(|prefix| sample_id.starts_with(prefix))
}

/// Control samples keep two tokens in the internal ID (`NTC_001`), all
/// other samples keep one (`PRJ200001`).
pub fn split_sample_id(sample_id: &str) -> SplitSampleId {
    let keep = if is_control_sample(sample_id) { 2 } else { 1 };
    let (internal, external) = split_at(sample_id, SAMPLE_ID_DELIMITER, keep);
    SplitSampleId { internal, external }
}

fn split_at(value: &str, delimiter: char, n: usize) -> (String, String) {
    let tokens = value.split(delimiter).collect::<Vec<_>>();
    let n = n.min(tokens.len());
    let separator = delimiter.to_string();
    (tokens[..n].join(&separator), tokens[n..].join(&separator))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn split_keeps_tokens_in_order() {
        assert_eq!(
            split_at("a_b_c_d", '_', 2),
            ("a_b".to_string(), "c_d".to_string())
        );
        assert_eq!(split_at("abc", '_', 1), ("abc".to_string(), String::new()));
        assert_eq!(split_at("", '_', 1), (String::new(), String::new()));
    }

    #[test]
    fn library_id_rejects_short_values() {
        let err = "L2".parse::<LibraryId>().unwrap_err();
        assert_matches!(err, LimsError::UnsupportedLibraryId(_));
        let err = "LPRJ".parse::<LibraryId>().unwrap_err();
        assert_matches!(err, LimsError::UnsupportedLibraryId(_));
    }
}
