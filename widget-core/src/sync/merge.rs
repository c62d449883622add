use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use shared_types::{ViewState, VoicemailItem, VoicemailRecord};

use super::display;

/// Build the new list from a fetched page.
///
/// Records keep the view state they had in `previous` (matched by id); new
/// ids start from `ViewState::default()`. Ids missing from `fetched` drop out.
/// Duplicate ids in `fetched` keep their first occurrence, and soft-deleted
/// records are skipped.
pub fn merge_page(
    previous: &[VoicemailItem],
    fetched: Vec<VoicemailRecord>,
    now: DateTime<Utc>,
) -> Vec<VoicemailItem> {
    let prior: HashMap<&str, &ViewState> =
        previous.iter().map(|item| (item.id(), &item.view)).collect();
    let mut seen = HashSet::new();

    fetched
        .into_iter()
        .filter(|record| !record.deleted)
        .filter(|record| seen.insert(record.id.clone()))
        .map(|record| {
            let view = prior
                .get(record.id.as_str())
                .map(|view| (*view).clone())
                .unwrap_or_default();
            let display = display::derive(&record, now);
            VoicemailItem {
                record,
                view,
                display,
            }
        })
        .collect()
}

pub fn unread_count(items: &[VoicemailItem]) -> usize {
    items
        .iter()
        .filter(|item| !item.record.deleted && !item.record.read)
        .count()
}
