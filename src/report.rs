use serde::Serialize;

use crate::dispatch::SendOutcome;
use crate::validate::ParseResult;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub sent_count: usize,
    pub failed_count: usize,
    pub invalid_count: usize,
    pub duplicate_count: usize,
    pub outcomes: Vec<SendOutcome>,
}

impl BatchReport {
    pub fn failures(&self) -> impl Iterator<Item = &SendOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded)
    }
}

/// Folds dispatch outcomes and validation counts into the final summary.
pub fn aggregate(parse: &ParseResult, outcomes: Vec<SendOutcome>) -> BatchReport {
    let sent_count = outcomes.iter().filter(|o| o.succeeded).count();

    BatchReport {
        sent_count,
        failed_count: outcomes.len() - sent_count,
        invalid_count: parse.invalid_count,
        duplicate_count: parse.duplicate_count,
        outcomes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipient::Recipient;
    use chrono::Utc;

    fn outcome(email: &str, succeeded: bool) -> SendOutcome {
        SendOutcome {
            recipient: Recipient {
                name: email.to_string(),
                email: email.to_string(),
            },
            succeeded,
            error: (!succeeded).then(|| "relay rejected".to_string()),
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn counts_come_from_outcomes_and_validation() {
        let parse = ParseResult {
            invalid_count: 2,
            duplicate_count: 1,
            ..Default::default()
        };
        let report = aggregate(
            &parse,
            vec![
                outcome("a@x.com", true),
                outcome("b@x.com", false),
                outcome("c@x.com", true),
            ],
        );

        assert_eq!(report.sent_count, 2);
        assert_eq!(report.failed_count, 1);
        assert_eq!(report.invalid_count, 2);
        assert_eq!(report.duplicate_count, 1);
        assert_eq!(report.outcomes.len(), 3);
        let failed: Vec<_> = report.failures().map(|o| o.recipient.email.as_str()).collect();
        assert_eq!(failed, vec!["b@x.com"]);
    }

    #[test]
    fn no_outcomes_means_nothing_sent_or_failed() {
        let report = aggregate(&ParseResult::default(), Vec::new());
        assert_eq!(report, BatchReport::default());
    }

    #[test]
    fn serializes_for_json_output() {
        let report = aggregate(&ParseResult::default(), vec![outcome("a@x.com", false)]);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["failed_count"], 1);
        assert_eq!(json["outcomes"][0]["error"], "relay rejected");
        assert_eq!(json["outcomes"][0]["recipient"]["email"], "a@x.com");
    }
}
