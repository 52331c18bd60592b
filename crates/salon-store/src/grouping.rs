//! Render-ready grouping of a store snapshot.
//!
//! Messages are bucketed by calendar day, and within each day folded into
//! runs of consecutive same-sender messages. The transform is a pure
//! function of its input and cheap enough to re-run from scratch on every
//! store mutation.

use chrono::NaiveDate;
use serde::Serialize;

use salon_shared::protocol::Message;
use salon_shared::types::UserId;

/// A maximal run of consecutive messages from one sender within a date
/// bucket. Recomputed on every store change, never persisted.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupMessage {
    pub sender_id: UserId,
    pub sender_name: String,
    pub is_mine: bool,
    pub messages: Vec<Message>,
}

/// All sender runs falling on one calendar day, in chronological position
/// relative to the other days.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DateGroup {
    pub date: NaiveDate,
    pub groups: Vec<GroupMessage>,
}

/// Group an id-ordered message sequence into date buckets of sender runs.
///
/// Bucket order is first-seen date order, tracked explicitly rather than
/// through map iteration order, so the result is fully deterministic.
/// Flattening the result date-by-date, run-by-run reproduces the input
/// sequence exactly.
pub fn group(messages: &[Message], my_id: UserId) -> Vec<DateGroup> {
    let mut buckets: Vec<DateGroup> = Vec::new();

    for msg in messages {
        let date = msg.created_at.date_naive();
        let index = match buckets.iter().position(|b| b.date == date) {
            Some(i) => i,
            None => {
                buckets.push(DateGroup {
                    date,
                    groups: Vec::new(),
                });
                buckets.len() - 1
            }
        };
        let bucket = &mut buckets[index];

        match bucket.groups.last_mut() {
            Some(run) if run.sender_id == msg.sender_id => {
                run.messages.push(msg.clone());
            }
            _ => {
                bucket.groups.push(GroupMessage {
                    sender_id: msg.sender_id,
                    sender_name: msg.sender_name.clone(),
                    is_mine: msg.sender_id == my_id,
                    messages: vec![msg.clone()],
                });
            }
        }
    }

    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Utc};
    use salon_shared::types::{MessageId, MessageType};

    fn msg(id: i64, sender: i64, name: &str, day: u32) -> Message {
        Message {
            id: MessageId(id),
            sender_id: UserId(sender),
            sender_name: name.into(),
            content: format!("message {id}"),
            message_type: MessageType::Text,
            created_at: Utc.with_ymd_and_hms(2025, 6, day, 10, 0, 0).unwrap(),
            read_count: 0,
        }
    }

    fn flatten(groups: &[DateGroup]) -> Vec<MessageId> {
        groups
            .iter()
            .flat_map(|d| d.groups.iter())
            .flat_map(|g| g.messages.iter())
            .map(|m| m.id)
            .collect()
    }

    #[test]
    fn test_empty_input() {
        assert!(group(&[], UserId(1)).is_empty());
    }

    #[test]
    fn test_single_message() {
        let messages = vec![msg(1, 7, "aria", 1)];
        let grouped = group(&messages, UserId(7));

        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].groups.len(), 1);
        assert_eq!(grouped[0].groups[0].messages.len(), 1);
        assert!(grouped[0].groups[0].is_mine);
    }

    #[test]
    fn test_consecutive_sender_runs() {
        // A, A, B on the same date folds into two runs
        let messages = vec![
            msg(1, 1, "aria", 1),
            msg(2, 1, "aria", 1),
            msg(3, 2, "benoit", 1),
        ];
        let grouped = group(&messages, UserId(1));

        assert_eq!(grouped.len(), 1);
        let runs = &grouped[0].groups;
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].sender_id, UserId(1));
        assert_eq!(runs[0].messages.len(), 2);
        assert!(runs[0].is_mine);
        assert_eq!(runs[1].sender_id, UserId(2));
        assert_eq!(runs[1].messages.len(), 1);
        assert!(!runs[1].is_mine);
    }

    #[test]
    fn test_sender_returning_starts_new_run() {
        let messages = vec![
            msg(1, 1, "aria", 1),
            msg(2, 2, "benoit", 1),
            msg(3, 1, "aria", 1),
        ];
        let grouped = group(&messages, UserId(9));

        assert_eq!(grouped[0].groups.len(), 3);
    }

    #[test]
    fn test_date_buckets_in_chronological_order() {
        let messages = vec![
            msg(1, 1, "aria", 1),
            msg(2, 1, "aria", 2),
            msg(3, 2, "benoit", 2),
            msg(4, 2, "benoit", 3),
        ];
        let grouped = group(&messages, UserId(1));

        let dates: Vec<u32> = grouped.iter().map(|d| d.date.day()).collect();
        assert_eq!(dates, vec![1, 2, 3]);
        // a run never spans a date boundary
        assert_eq!(grouped[1].groups.len(), 2);
        assert_eq!(grouped[2].groups.len(), 1);
    }

    #[test]
    fn test_flatten_reproduces_input_order() {
        // alternating senders across several days
        let mut messages = Vec::new();
        for id in 1..=60 {
            let sender = [1, 1, 2, 3, 3, 3][(id % 6) as usize];
            let day = 1 + (id / 25) as u32;
            messages.push(msg(id, sender, "someone", day));
        }

        let grouped = group(&messages, UserId(2));
        let expected: Vec<MessageId> = messages.iter().map(|m| m.id).collect();
        assert_eq!(flatten(&grouped), expected);
    }
}
