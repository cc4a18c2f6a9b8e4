//! Grouping of stored prompt records into per-session conversations.

use crate::extract::{collect_document_names, extract_sources};
use crate::models::{ChatMessage, PromptId, PromptRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// All prompt records sharing one LLM session, in conversational order.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct SessionGroup {
    pub session_id: String,
    pub prompts: Vec<PromptRecord>,
    pub documents: Vec<String>,
}

impl SessionGroup {
    /// Highest prompt id in the group. Records without an id count as 0.
    pub fn max_prompt_id(&self) -> PromptId {
        self.prompts
            .iter()
            .map(PromptRecord::order_key)
            .max()
            .unwrap_or(0)
    }
}

/// Buckets records by session id, keeping buckets in order of first sighting.
/// Each bucket is sorted by ascending prompt id and its document list is
/// scraped from the sorted responses.
pub fn group_by_session(records: Vec<PromptRecord>) -> Vec<SessionGroup> {
    let mut buckets: Vec<(String, Vec<PromptRecord>)> = Vec::new();
    for record in records {
        match buckets.iter_mut().find(|(id, _)| *id == record.session_id) {
            Some((_, prompts)) => prompts.push(record),
            None => buckets.push((record.session_id.clone(), vec![record])),
        }
    }

    buckets
        .into_iter()
        .map(|(session_id, mut prompts)| {
            sort_records(&mut prompts);
            let documents =
                collect_document_names(prompts.iter().map(|p| p.response_text.as_str()));
            SessionGroup {
                session_id,
                prompts,
                documents,
            }
        })
        .collect()
}

/// Stable ascending sort on prompt id.
pub fn sort_records(records: &mut [PromptRecord]) {
    records.sort_by_key(PromptRecord::order_key);
}

/// Most recent session first: the group holding the numerically highest
/// prompt id ranks highest. Equal maxima keep their relative order.
pub fn rank_sessions(mut groups: Vec<SessionGroup>) -> Vec<SessionGroup> {
    groups.sort_by(|a, b| b.max_prompt_id().cmp(&a.max_prompt_id()));
    groups
}

/// The session the workspace should resume. On a tie the earliest group in
/// `groups` wins.
pub fn latest_session(groups: &[SessionGroup]) -> Option<&SessionGroup> {
    let mut latest: Option<&SessionGroup> = None;
    for group in groups {
        match latest {
            Some(current) if group.max_prompt_id() <= current.max_prompt_id() => {}
            _ => latest = Some(group),
        }
    }
    latest
}

/// One user and one bot message per record, in record order. Bot messages
/// carry whatever citations can be recovered from the stored response.
pub fn to_messages(records: &[PromptRecord], now: DateTime<Utc>) -> Vec<ChatMessage> {
    records
        .iter()
        .flat_map(|record| {
            let sources = extract_sources(&record.response_text).into_sources();
            ChatMessage::pair_from_record(record, sources, now)
        })
        .collect()
}

#[cfg(test)]
pub(crate) fn record(prompt_id: Option<PromptId>, session_id: &str, response: &str) -> PromptRecord {
    PromptRecord {
        prompt_id,
        prompt_text: format!("question {}", prompt_id.unwrap_or(0)),
        response_text: response.to_string(),
        model_name: "llama3.2:latest".to_string(),
        temperature: 1.0,
        token_usage: 100,
        ws_id: 1,
        user_id: 7,
        session_id: session_id.to_string(),
        is_active: true,
        workspace: None,
        user: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageKind;

    #[test]
    fn groups_sort_by_prompt_id_within_a_session() {
        let groups = group_by_session(vec![
            record(Some(2), "a", "two"),
            record(Some(1), "a", "one"),
            record(Some(3), "a", "three"),
        ]);
        assert_eq!(groups.len(), 1);
        let ids: Vec<_> = groups[0].prompts.iter().map(|p| p.prompt_id).collect();
        assert_eq!(ids, vec![Some(1), Some(2), Some(3)]);

        let messages = to_messages(&groups[0].prompts, Utc::now());
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["question 1", "one", "question 2", "two", "question 3", "three"]
        );
    }

    #[test]
    fn grouping_is_independent_of_input_order() {
        let records = vec![
            record(Some(4), "b", "b4 from deck.pdf"),
            record(Some(1), "a", "a1"),
            record(Some(9), "b", "b9"),
            record(Some(5), "a", "a5 cites terms.pdf"),
            record(Some(2), "c", "c2"),
        ];
        let mut reversed = records.clone();
        reversed.reverse();

        let first = rank_sessions(group_by_session(records));
        let second = rank_sessions(group_by_session(reversed));
        assert_eq!(first, second);

        let order: Vec<_> = first.iter().map(|g| g.session_id.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[test]
    fn missing_prompt_ids_sort_first() {
        let groups = group_by_session(vec![record(Some(3), "a", "x"), record(None, "a", "y")]);
        assert_eq!(groups[0].prompts[0].prompt_id, None);
        assert_eq!(groups[0].max_prompt_id(), 3);
    }

    #[test]
    fn latest_session_is_the_one_with_the_highest_prompt_id() {
        let groups = group_by_session(vec![
            record(Some(5), "A", "a"),
            record(Some(9), "B", "b"),
            record(Some(2), "A", "a"),
        ]);
        assert_eq!(latest_session(&groups).unwrap().session_id, "B");
        assert!(latest_session(&[]).is_none());
    }

    #[test]
    fn latest_session_tie_keeps_first_sighting() {
        let groups = group_by_session(vec![record(None, "first", "x"), record(None, "second", "y")]);
        assert_eq!(latest_session(&groups).unwrap().session_id, "first");
    }

    #[test]
    fn group_documents_are_unique_in_first_appearance_order() {
        let groups = group_by_session(vec![
            record(Some(2), "s", "see pricing.pdf and invoice_March.pdf"),
            record(Some(1), "s", "from invoice_March.pdf"),
        ]);
        assert_eq!(
            groups[0].documents,
            vec!["invoice_March.pdf".to_string(), "pricing.pdf".to_string()]
        );
    }

    #[test]
    fn bot_messages_carry_recovered_sources() {
        let response = r#"{"answer":"x","sources":[{"source_id":"s1","summary":"t","file":"a.pdf","page":2}]}"#;
        let now = Utc::now();
        let messages = to_messages(&[record(Some(1), "s", response)], now);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].kind, MessageKind::User);
        assert!(messages[0].timestamp < messages[1].timestamp);
        assert_eq!(messages[1].kind, MessageKind::Bot);
        assert_eq!(messages[1].timestamp, now);
        let sources = messages[1].sources.as_ref().unwrap();
        assert_eq!(sources[0].file, "a.pdf");
        assert_eq!(sources[0].page, 2);
    }
}
