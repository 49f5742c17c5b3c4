//! Filters and statistics over an already-fetched list of memos.
//!
//! Everything here is a pure function of its inputs: the caller fetches the
//! memos and supplies "now", so the results are deterministic under test.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, TimeZone};
use shared::{
    domain::Memo,
    protocol::{MemoStats, MonthlyCount, TagCount},
};

pub const TOP_TAG_LIMIT: usize = 5;
pub const MONTH_WINDOW: usize = 6;

/// Memos whose title, block text or tags contain `keyword`, ignoring case.
/// An empty keyword keeps everything.
pub fn filter_by_keyword<'a>(memos: &'a [Memo], keyword: &str) -> Vec<&'a Memo> {
    if keyword.is_empty() {
        return memos.iter().collect();
    }
    let needle = keyword.to_lowercase();
    memos
        .iter()
        .filter(|memo| matches_keyword(memo, &needle))
        .collect()
}

fn matches_keyword(memo: &Memo, needle: &str) -> bool {
    let hit = |haystack: &str| haystack.to_lowercase().contains(needle);
    hit(&memo.title)
        || memo.blocks.iter().any(|block| {
            block.text.as_deref().is_some_and(|text| hit(text))
                || block.tags.iter().any(|tag| hit(tag))
        })
}

/// Memos with at least one block carrying exactly `tag`.
pub fn filter_by_tag<'a>(memos: &'a [Memo], tag: &str) -> Vec<&'a Memo> {
    memos.iter().filter(|memo| memo.has_tag(tag)).collect()
}

/// Dashboard figures relative to `now`. Calendar months are taken in `now`'s
/// time zone.
pub fn compute_stats<Tz: TimeZone>(memos: &[Memo], now: &DateTime<Tz>) -> MemoStats {
    let tz = now.timezone();
    let month_of = |memo: &Memo| {
        let local = memo.created_at.with_timezone(&tz);
        (local.year(), local.month())
    };
    let current = (now.year(), now.month());

    let months: Vec<(i32, u32)> = (0..MONTH_WINDOW)
        .rev()
        .map(|back| months_before(current, back as i32))
        .collect();
    let mut per_month = vec![0usize; MONTH_WINDOW];
    let mut current_month_count = 0;
    for memo in memos {
        let month = month_of(memo);
        if month == current {
            current_month_count += 1;
        }
        if let Some(slot) = months.iter().position(|m| *m == month) {
            per_month[slot] += 1;
        }
    }

    MemoStats {
        total_count: memos.len(),
        reflection_count: memos.iter().filter(|m| m.is_reflection()).count(),
        current_month_count,
        top_tags: top_tags(memos, TOP_TAG_LIMIT),
        monthly_counts: months
            .into_iter()
            .zip(per_month)
            .map(|((year, month), count)| MonthlyCount {
                month: format!("{year:04}-{month:02}"),
                count,
            })
            .collect(),
    }
}

/// Tag occurrences across every block, most frequent first. Equal counts keep
/// the order in which the tags were first seen.
pub fn top_tags(memos: &[Memo], limit: usize) -> Vec<TagCount> {
    let mut counts: Vec<TagCount> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for tag in memos.iter().flat_map(|m| &m.blocks).flat_map(|b| &b.tags) {
        match index.get(tag.as_str()) {
            Some(&slot) => counts[slot].count += 1,
            None => {
                index.insert(tag.as_str(), counts.len());
                counts.push(TagCount {
                    tag: tag.clone(),
                    count: 1,
                });
            }
        }
    }
    // sort_by is stable, so ties stay in first-seen order
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts.truncate(limit);
    counts
}

fn months_before((year, month): (i32, u32), back: i32) -> (i32, u32) {
    let absolute = year * 12 + (month as i32 - 1) - back;
    (absolute.div_euclid(12), absolute.rem_euclid(12) as u32 + 1)
}

#[cfg(test)]
#[path = "tests/aggregate_tests.rs"]
mod tests;
