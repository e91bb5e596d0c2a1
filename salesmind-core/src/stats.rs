use serde::{Deserialize, Serialize};

use crate::records::{CallOutcome, CallRecord};

/// Aggregate figures over the recorded calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CallStats {
    pub total_calls: usize,
    pub successful: usize,
    pub escalated: usize,
    /// Whole percent, rounded half up. Zero when nothing is recorded.
    pub success_rate: u64,
    /// Whole seconds, rounded half up.
    pub average_duration_seconds: u64,
    pub knowledge_entries: usize,
}

impl CallStats {
    pub fn from_records(calls: &[CallRecord], knowledge_entries: usize) -> Self {
        let total_calls = calls.len();
        let successful = calls
            .iter()
            .filter(|c| c.outcome == CallOutcome::Success)
            .count();
        let escalated = calls
            .iter()
            .filter(|c| c.outcome == CallOutcome::Escalated)
            .count();
        let total_seconds: u64 = calls.iter().map(|c| c.duration_seconds).sum();

        let n = total_calls as u64;
        Self {
            total_calls,
            successful,
            escalated,
            success_rate: rounded_ratio(successful as u64 * 100, n),
            average_duration_seconds: rounded_ratio(total_seconds, n),
            knowledge_entries,
        }
    }

    /// Average duration as `m:ss`.
    pub fn average_duration_label(&self) -> String {
        let secs = self.average_duration_seconds;
        format!("{}:{:02}", secs / 60, secs % 60)
    }
}

fn rounded_ratio(num: u64, den: u64) -> u64 {
    if den == 0 {
        return 0;
    }
    num.saturating_mul(2).saturating_add(den) / den.saturating_mul(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::NewCallRecord;
    use crate::types::ScriptKey;

    fn call(outcome: CallOutcome, duration_seconds: u64) -> CallRecord {
        CallRecord::assign(NewCallRecord {
            lead_name: "Sarah Chen".into(),
            lead_company: "MedTech Solutions".into(),
            agent_name: "Agent Alpha".into(),
            duration_seconds,
            outcome,
            script_key: ScriptKey::new("call1"),
        })
    }

    #[test]
    fn empty_store_reports_zeroes() {
        let stats = CallStats::from_records(&[], 0);
        assert_eq!(stats, CallStats::default());
        assert_eq!(stats.average_duration_label(), "0:00");
    }

    #[test]
    fn mixed_outcomes() {
        let calls = [
            call(CallOutcome::Success, 95),
            call(CallOutcome::Escalated, 130),
            call(CallOutcome::Ended, 12),
        ];
        let stats = CallStats::from_records(&calls, 4);
        assert_eq!(stats.total_calls, 3);
        assert_eq!(stats.successful, 1);
        assert_eq!(stats.escalated, 1);
        // 33.3%
        assert_eq!(stats.success_rate, 33);
        // 237 / 3 = 79
        assert_eq!(stats.average_duration_seconds, 79);
        assert_eq!(stats.average_duration_label(), "1:19");
        assert_eq!(stats.knowledge_entries, 4);
    }

    #[test]
    fn halves_round_up() {
        let calls = [call(CallOutcome::Success, 60), call(CallOutcome::Escalated, 61)];
        let stats = CallStats::from_records(&calls, 0);
        assert_eq!(stats.success_rate, 50);
        assert_eq!(stats.average_duration_seconds, 61);

        let calls = [
            call(CallOutcome::Success, 1),
            call(CallOutcome::Success, 1),
            call(CallOutcome::Ended, 1),
        ];
        assert_eq!(CallStats::from_records(&calls, 0).success_rate, 67);
    }
}
