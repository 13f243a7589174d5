// ABOUTME: Reduces a stack event log to the failure lines worth showing an operator.
// ABOUTME: Failures caused only by a cancelled sibling create are dropped as noise.

use chrono::{DateTime, Utc};

use super::services::StackEvent;

/// Reason the stack service gives resources whose creation was cancelled by a sibling failure.
pub const CANCELLED_REASON: &str = "Resource creation cancelled";

fn is_failure(event: &StackEvent) -> bool {
    event.status.ends_with("_FAILED")
}

fn is_cancellation(event: &StackEvent) -> bool {
    event.reason.as_deref().map(str::trim) == Some(CANCELLED_REASON)
}

/// `<STATUS> <ResourceType> [<LogicalId>] <Reason>` for every failure at or after `since`, oldest first.
pub fn failure_lines(events: &[StackEvent], since: Option<DateTime<Utc>>) -> Vec<String> {
    let mut failures: Vec<&StackEvent> = events
        .iter()
        .filter(|e| since.is_none_or(|since| e.timestamp >= since))
        .filter(|e| is_failure(e) && !is_cancellation(e))
        .collect();
    failures.sort_by_key(|e| e.timestamp);

    failures
        .into_iter()
        .map(|e| {
            let line = format!("{} {} [{}]", e.status, e.resource_type, e.logical_id);
            match e.reason.as_deref().filter(|r| !r.is_empty()) {
                Some(reason) => format!("{line} {reason}"),
                None => line,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(second: u32, id: &str, status: &str, reason: Option<&str>) -> StackEvent {
        StackEvent {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, second).unwrap(),
            logical_id: id.to_string(),
            resource_type: "AWS::EC2::Instance".to_string(),
            status: status.to_string(),
            reason: reason.map(str::to_string),
        }
    }

    #[test]
    fn keeps_real_failures_in_order() {
        let events = vec![
            event(3, "Worker", "CREATE_FAILED", Some(CANCELLED_REASON)),
            event(2, "Etcd0", "CREATE_FAILED", Some("instance limit exceeded")),
            event(1, "Vpc", "CREATE_COMPLETE", None),
            event(4, "Root", "ROLLBACK_IN_PROGRESS", Some("failed resources")),
            event(5, "Bucket", "DELETE_FAILED", None),
        ];
        assert_eq!(
            failure_lines(&events, None),
            vec![
                "CREATE_FAILED AWS::EC2::Instance [Etcd0] instance limit exceeded",
                "DELETE_FAILED AWS::EC2::Instance [Bucket]",
            ]
        );
    }

    #[test]
    fn events_before_the_operation_are_ignored() {
        let events = vec![
            event(1, "Old", "UPDATE_FAILED", Some("stale")),
            event(9, "New", "UPDATE_FAILED", Some("fresh")),
        ];
        let since = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 5).unwrap();
        assert_eq!(
            failure_lines(&events, Some(since)),
            vec!["UPDATE_FAILED AWS::EC2::Instance [New] fresh"]
        );
    }
}
