use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Instant;
use tracing::{debug, info};

use crate::recipient::{is_valid_email, normalize_field, Recipient};
use crate::source::RawRow;

/// Why a row was kept out of the dispatch set. Rows are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowIssue {
    InvalidEmail {
        row: usize,
        email: String,
    },
    Duplicate {
        row: usize,
        first_row: usize,
        email: String,
    },
}

impl RowIssue {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, RowIssue::Duplicate { .. })
    }
}

impl fmt::Display for RowIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowIssue::InvalidEmail { row, email } => {
                write!(f, "Invalid email address at row {} ({}).", row, email)
            }
            RowIssue::Duplicate {
                row,
                first_row,
                email,
            } => write!(
                f,
                "Duplicate email at row {}. Exact match at record {} ({}).",
                row, first_row, email
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseResult {
    pub invalid_count: usize,
    pub duplicate_count: usize,
    pub raw_rows: Vec<RawRow>,
    pub recipients: Vec<Recipient>,
    pub validation_log: BTreeMap<usize, RowIssue>,
}

impl ParseResult {
    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
            && self.raw_rows.is_empty()
            && self.invalid_count == 0
            && self.duplicate_count == 0
            && self.validation_log.is_empty()
    }

    pub fn has_issues(&self) -> bool {
        !self.validation_log.is_empty()
    }

    pub fn reason(&self, row: usize) -> Option<String> {
        self.validation_log.get(&row).map(ToString::to_string)
    }
}

/// Classifies every row as a recipient, an invalid address or a duplicate.
///
/// Rows are processed strictly in input order, so the first valid
/// occurrence of an address wins and later copies point back at it.
/// Rows with fewer than two fields are treated as having an empty address.
pub fn validate(rows: Vec<RawRow>) -> ParseResult {
    let start_time = Instant::now();
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    let mut result = ParseResult::default();

    for (index, fields) in rows.iter().enumerate() {
        let row = index + 1;
        let name = fields.first().map(|f| normalize_field(f)).unwrap_or_default();
        let email = fields.get(1).map(|f| normalize_field(f)).unwrap_or_default();

        if !is_valid_email(&email) {
            debug!(action = "reject", component = "validator", row, email = %email, "Invalid email address");
            result.invalid_count += 1;
            result
                .validation_log
                .insert(row, RowIssue::InvalidEmail { row, email });
            continue;
        }

        if let Some(&first_row) = first_seen.get(&email) {
            debug!(action = "reject", component = "validator", row, first_row, email = %email, "Duplicate email address");
            result.duplicate_count += 1;
            result.validation_log.insert(
                row,
                RowIssue::Duplicate {
                    row,
                    first_row,
                    email,
                },
            );
            continue;
        }

        first_seen.insert(email.clone(), row);
        result.recipients.push(Recipient { name, email });
    }

    result.raw_rows = rows;

    info!(
        action = "complete",
        component = "validator",
        row_count = result.raw_rows.len(),
        recipient_count = result.recipients.len(),
        invalid_count = result.invalid_count,
        duplicate_count = result.duplicate_count,
        duration_ms = start_time.elapsed().as_millis(),
        "Validated records"
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &[&[&str]]) -> Vec<RawRow> {
        data.iter()
            .map(|r| r.iter().map(|f| f.to_string()).collect())
            .collect()
    }

    #[test]
    fn first_occurrence_wins_and_later_rows_reference_it() {
        let result = validate(rows(&[
            &["Alice", "alice@x.com"],
            &["Bob", "bob@x.com"],
            &["Alice again", "alice@x.com"],
            &["Alice thrice", "alice@x.com"],
        ]));

        assert_eq!(result.recipients.len(), 2);
        assert_eq!(result.recipients[0].name, "Alice");
        assert_eq!(result.duplicate_count, 2);
        assert_eq!(
            result.reason(3).as_deref(),
            Some("Duplicate email at row 3. Exact match at record 1 (alice@x.com).")
        );
        assert_eq!(
            result.validation_log.get(&4),
            Some(&RowIssue::Duplicate {
                row: 4,
                first_row: 1,
                email: "alice@x.com".to_string()
            })
        );
    }

    #[test]
    fn invalid_row_never_counts_as_duplicate() {
        let result = validate(rows(&[&["A", "bad"], &["B", "bad"]]));
        assert_eq!(result.invalid_count, 2);
        assert_eq!(result.duplicate_count, 0);
        assert_eq!(
            result.reason(2).as_deref(),
            Some("Invalid email address at row 2 (bad).")
        );
    }

    #[test]
    fn duplicates_are_detected_after_normalization() {
        let result = validate(rows(&[&["A", " x@y.com \r"], &["B", "x@y.com"]]));
        assert_eq!(result.recipients.len(), 1);
        assert_eq!(result.recipients[0].email, "x@y.com");
        assert_eq!(result.duplicate_count, 1);
    }

    #[test]
    fn comparison_is_case_sensitive() {
        let result = validate(rows(&[&["A", "Alice@x.com"], &["B", "alice@x.com"]]));
        assert_eq!(result.recipients.len(), 2);
        assert_eq!(result.duplicate_count, 0);
    }

    #[test]
    fn short_and_empty_rows_are_invalid() {
        let result = validate(vec![vec!["Only name".to_string()], vec![]]);
        assert_eq!(result.invalid_count, 2);
        assert!(result.recipients.is_empty());
        assert_eq!(
            result.reason(1).as_deref(),
            Some("Invalid email address at row 1 ().")
        );
    }

    #[test]
    fn trailing_fields_are_ignored() {
        let result = validate(rows(&[&["Carol", "carol@x.com", "extra", "more"]]));
        assert_eq!(
            result.recipients,
            vec![Recipient {
                name: "Carol".to_string(),
                email: "carol@x.com".to_string()
            }]
        );
        assert!(!result.has_issues());
    }

    #[test]
    fn empty_input_is_empty() {
        assert!(validate(Vec::new()).is_empty());
        assert!(!validate(rows(&[&["A", "bad"]])).is_empty());
    }
}
