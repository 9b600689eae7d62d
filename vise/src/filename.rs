//! File name parsing for machine and date extraction.
//!
//! Press exports are named after the machine that produced them, with the
//! export date embedded somewhere after the machine token, e.g.
//! `Presse1_2024-01-05.csv` or `Export Presse2 2024-03-18 (rev2).csv`.
//! The parser is independent of the sync logic so the convention can be
//! tested on its own.

use chrono::NaiveDate;

/// Machine token and export date parsed out of a file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFileName {
    /// The matched machine token, in its configured casing.
    pub machine: String,

    /// The ISO date embedded after the token.
    pub date: NaiveDate,
}

/// Parse a file name against the configured machine tokens.
///
/// Tokens match case-insensitively anywhere in the name; the date must be a
/// `YYYY-MM-DD` substring appearing after the token. Returns None when no
/// token matches or no date follows it.
pub fn parse_file_name(name: &str, tokens: &[String]) -> Option<ParsedFileName> {
    let lower = name.to_lowercase();
    for token in tokens {
        if token.is_empty() {
            continue;
        }
        let needle = token.to_lowercase();
        if let Some(pos) = lower.find(&needle) {
            // scan the case-folded tail; the date characters are ASCII
            if let Some(date) = find_iso_date(&lower[pos + needle.len()..]) {
                return Some(ParsedFileName {
                    machine: token.clone(),
                    date,
                });
            }
        }
    }
    None
}

/// First valid `YYYY-MM-DD` substring in `s`, if any.
fn find_iso_date(s: &str) -> Option<NaiveDate> {
    for (i, _) in s.char_indices() {
        if let Some(window) = s.get(i..i + 10) {
            if let Ok(date) = NaiveDate::parse_from_str(window, "%Y-%m-%d") {
                return Some(date);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens() -> Vec<String> {
        vec!["Presse1".to_string(), "Presse2".to_string()]
    }

    #[test]
    fn parses_simple_name() {
        let parsed = parse_file_name("Presse1_2024-01-05.csv", &tokens()).unwrap();
        assert_eq!(parsed.machine, "Presse1");
        assert_eq!(parsed.date, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
    }

    #[test]
    fn parses_token_and_date_separated_by_noise() {
        let parsed = parse_file_name("Export presse2 - run 2024-03-18 (rev2).csv", &tokens()).unwrap();
        assert_eq!(parsed.machine, "Presse2");
        assert_eq!(parsed.date, NaiveDate::from_ymd_opt(2024, 3, 18).unwrap());
    }

    #[test]
    fn rejects_name_without_token() {
        assert!(parse_file_name("Summary_2024-01-05.csv", &tokens()).is_none());
    }

    #[test]
    fn rejects_name_without_date() {
        assert!(parse_file_name("Presse1_latest.csv", &tokens()).is_none());
    }

    #[test]
    fn rejects_date_before_token() {
        // The convention puts the date after the machine token.
        assert!(parse_file_name("2024-01-05_Presse1.csv", &tokens()).is_none());
    }

    #[test]
    fn rejects_impossible_date() {
        assert!(parse_file_name("Presse1_2024-13-45.csv", &tokens()).is_none());
    }

    #[test]
    fn first_matching_token_wins() {
        let parsed = parse_file_name("Presse1_Presse2_2024-01-05.csv", &tokens()).unwrap();
        assert_eq!(parsed.machine, "Presse1");
    }
}
