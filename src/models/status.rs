use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{EngineError, Result};

/// 发票与候选记录之间的匹配状态
///
/// 状态流转表：
///
/// | from            | to                                                         |
/// |-----------------|------------------------------------------------------------|
/// | NoCandidate     | AutoMatched, NeedsReview, Unmatched, ManuallyMatched, Rejected |
/// | NeedsReview     | ManuallyMatched, Rejected                                  |
/// | Unmatched       | ManuallyMatched, Rejected                                  |
/// | AutoMatched     | -                                                          |
/// | ManuallyMatched | -                                                          |
/// | Rejected        | -                                                          |
///
/// 第一行的前三项由引擎评估产生，其余流转由人工触发，由调用方执行。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    NoCandidate,
    AutoMatched,
    NeedsReview,
    Unmatched,
    ManuallyMatched,
    Rejected,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::NoCandidate => "no_candidate",
            MatchStatus::AutoMatched => "auto_matched",
            MatchStatus::NeedsReview => "needs_review",
            MatchStatus::Unmatched => "unmatched",
            MatchStatus::ManuallyMatched => "manually_matched",
            MatchStatus::Rejected => "rejected",
        }
    }

    pub fn can_transition_to(&self, next: MatchStatus) -> bool {
        use MatchStatus::*;
        match self {
            NoCandidate => next != NoCandidate,
            NeedsReview | Unmatched => matches!(next, ManuallyMatched | Rejected),
            AutoMatched | ManuallyMatched | Rejected => false,
        }
    }

    /// 校验并执行一次状态流转
    pub fn transition(self, next: MatchStatus) -> Result<MatchStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(EngineError::InvalidTransition { from: self, to: next })
        }
    }

    /// 关联仍然有效（未被拒绝、不是无匹配）
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            MatchStatus::AutoMatched | MatchStatus::NeedsReview | MatchStatus::ManuallyMatched
        )
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "no_candidate" => Ok(MatchStatus::NoCandidate),
            "auto_matched" => Ok(MatchStatus::AutoMatched),
            "needs_review" => Ok(MatchStatus::NeedsReview),
            "unmatched" => Ok(MatchStatus::Unmatched),
            "manually_matched" => Ok(MatchStatus::ManuallyMatched),
            "rejected" => Ok(MatchStatus::Rejected),
            other => Err(format!("unknown match status: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_matched_is_terminal() {
        for next in [
            MatchStatus::ManuallyMatched,
            MatchStatus::Rejected,
            MatchStatus::NeedsReview,
        ] {
            assert!(MatchStatus::AutoMatched.transition(next).is_err());
        }
    }

    #[test]
    fn review_can_be_resolved_by_a_human() {
        assert_eq!(
            MatchStatus::NeedsReview.transition(MatchStatus::ManuallyMatched).unwrap(),
            MatchStatus::ManuallyMatched
        );
        assert_eq!(
            MatchStatus::Unmatched.transition(MatchStatus::Rejected).unwrap(),
            MatchStatus::Rejected
        );
        assert!(MatchStatus::NeedsReview.transition(MatchStatus::AutoMatched).is_err());
    }

    #[test]
    fn round_trips_through_text() {
        for status in [
            MatchStatus::NoCandidate,
            MatchStatus::AutoMatched,
            MatchStatus::NeedsReview,
            MatchStatus::Unmatched,
            MatchStatus::ManuallyMatched,
            MatchStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<MatchStatus>().unwrap(), status);
        }
        assert!("approved".parse::<MatchStatus>().is_err());
    }
}
