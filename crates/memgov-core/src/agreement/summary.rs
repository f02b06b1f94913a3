//! Human-readable agreement summaries for phase diffs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementCounts {
    pub proposed: usize,
    pub approved: usize,
    pub rejected: usize,
    pub pending: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementSummary {
    pub title: String,
    pub lines: Vec<String>,
    pub counts: AgreementCounts,
}

pub fn agreement_summary(counts: AgreementCounts) -> AgreementSummary {
    let lines = vec![
        format!("Proposals created count is {}.", counts.proposed),
        format!("Approved count is {}.", counts.approved),
        format!("Rejected count is {}.", counts.rejected),
        format!("Pending count is {}.", counts.pending),
    ];
    AgreementSummary {
        title: "Team agreement summary".to_string(),
        lines,
        counts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_lines() {
        let summary = agreement_summary(AgreementCounts {
            proposed: 3,
            approved: 1,
            rejected: 1,
            pending: 1,
        });
        assert_eq!(summary.lines[0], "Proposals created count is 3.");
        assert_eq!(summary.lines.len(), 4);
    }
}
