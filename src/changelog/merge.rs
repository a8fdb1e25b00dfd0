use super::extract::{self, EmailDefaults, RawValues, TrackedField};
use super::filter::ChangelogFilter;
use super::model::{ChangelogData, IssueEmail, IssueNote};
use crate::config::CuraConfig;
use crate::core::{CuraError, RecordId, Result};
use crate::display::DisplayFormat;
use crate::expression::eval_ilike;
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use tracing::{Level, event, info_span};

const SYSTEM_NOTE_PATTERN: &str = "%<span%";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    Note,
    Email,
}

/// Carry-forward state of one tracked field on one row.
///
/// `changed` is what this row changed (empty when nothing, a single space
/// when the value was removed); `history` is the value in effect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub changed: String,
    pub history: String,
}

impl FieldChange {
    fn carry(raw: Option<&str>, prev: Option<&FieldChange>) -> Self {
        let prev_changed = prev.map(|p| p.changed.as_str()).unwrap_or("");
        let prev_history = prev.map(|p| p.history.as_str()).unwrap_or("");

        let mut changed = match raw {
            None => " ".to_string(),
            Some(value) if value.eq_ignore_ascii_case("none") => " ".to_string(),
            Some(value) => value.to_string(),
        };
        if raw.is_some_and(|value| value == prev_changed || value == prev_history) {
            changed.clear();
        }

        let history = [raw.unwrap_or(""), prev_changed, prev_history]
            .into_iter()
            .find(|candidate| !candidate.is_empty())
            .unwrap_or("")
            .trim()
            .to_string();

        Self { changed, history }
    }

    pub fn is_visible(&self) -> bool {
        !self.changed.trim().is_empty()
    }
}

/// One line of an issue's changelog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeRow {
    pub source: ChangeSource,
    pub id: u64,
    pub issue_id: u64,
    pub entry_date: NaiveDateTime,
    pub category: Option<i64>,
    pub note_type: Option<String>,
    pub raw_note: Option<String>,
    pub fields: BTreeMap<TrackedField, FieldChange>,
}

impl ChangeRow {
    pub fn field(&self, field: TrackedField) -> Option<&FieldChange> {
        self.fields.get(&field)
    }

    /// Rows where every changed value is blank are not shown.
    pub fn has_visible_change(&self) -> bool {
        self.fields.values().any(FieldChange::is_visible)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueChanges {
    pub issue_id: u64,
    /// `"<id> - <current title>"`
    pub label: String,
    pub changes: Vec<ChangeRow>,
}

/// Requested page of the issue list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    /// 1-based; anything below 1 is page 1
    Number(i64),
    All,
}

impl Page {
    fn slice<'a>(&self, ids: &'a [u64], page_size: usize) -> &'a [u64] {
        match *self {
            Page::All => ids,
            Page::Number(number) => {
                let number = usize::try_from(number.max(1)).unwrap_or(1);
                let start = (number - 1).saturating_mul(page_size).min(ids.len());
                let end = number.saturating_mul(page_size).min(ids.len());
                &ids[start..end]
            }
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Page::Number(1)
    }
}

impl FromStr for Page {
    type Err = CuraError;

    fn from_str(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("all") {
            return Ok(Page::All);
        }
        raw.parse::<i64>()
            .map(Page::Number)
            .map_err(|_| CuraError::MalformedInput(format!("Invalid page '{}'", raw)))
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Page::Number(number) => write!(f, "{}", number),
            Page::All => f.write_str("all"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangelogPage {
    /// Ascending by issue id
    pub issues: Vec<IssueChanges>,
    /// Matching issues across all pages
    pub total_issues: usize,
    pub page_count: usize,
    pub is_large_query: bool,
}

/// Runs the changelog search and merges the selected issues' notes and
/// emails into carry-forward rows.
pub fn run_report(
    data: &ChangelogData,
    filter: &ChangelogFilter,
    page: Page,
    config: &CuraConfig,
    display: &dyn DisplayFormat,
) -> Result<ChangelogPage> {
    let span = info_span!("changelog_report", page = %page);
    let _enter = span.enter();

    let selected = select_issues(data, filter)?;
    let total_issues = selected.len();
    let page_size = config.page_size.max(1);
    let page_ids = page.slice(&selected, page_size);

    let rows = collect_rows(data, page_ids, config, display)?;
    let issues = merge_rows(data, rows);

    event!(
        Level::DEBUG,
        total_issues,
        shown = issues.len(),
        "Changelog report built"
    );

    Ok(ChangelogPage {
        issues,
        total_issues,
        page_count: total_issues.div_ceil(page_size),
        is_large_query: total_issues > config.large_query_threshold,
    })
}

/// Ids of issues with a matching system note, or a matching received email
/// that predates their first note.
pub fn select_issues(data: &ChangelogData, filter: &ChangelogFilter) -> Result<Vec<u64>> {
    let patterns = filter.note_patterns();
    let mut ids = BTreeSet::new();

    for note in data.notes.iter().filter(|note| note.is_active) {
        if eval_ilike(&note.note, SYSTEM_NOTE_PATTERN)? && filter.note_matches(note, &patterns)? {
            ids.insert(note.issue);
        }
    }

    for email in data.emails.iter().filter(|e| e.is_active && e.was_received) {
        if precedes_first_note(data, email) && filter.email_matches(email) {
            ids.insert(email.issue);
        }
    }

    Ok(ids.into_iter().collect())
}

fn precedes_first_note(data: &ChangelogData, email: &IssueEmail) -> bool {
    data.first_note_date(email.issue)
        .is_some_and(|first| email.add_date < first)
}

/// A row before carry-forward.
struct SourceRow {
    source: ChangeSource,
    id: u64,
    issue_id: u64,
    entry_date: NaiveDateTime,
    category: Option<i64>,
    note_type: Option<String>,
    raw_note: Option<String>,
    values: RawValues,
}

impl SourceRow {
    fn sort_key(&self) -> (u64, NaiveDateTime, u64, bool, Option<i64>) {
        (
            self.issue_id,
            self.entry_date,
            self.id,
            self.category.is_none(),
            self.category,
        )
    }
}

fn truncate_to_minute(at: NaiveDateTime) -> NaiveDateTime {
    at.with_second(0)
        .and_then(|at| at.with_nanosecond(0))
        .unwrap_or(at)
}

fn collect_rows(
    data: &ChangelogData,
    issue_ids: &[u64],
    config: &CuraConfig,
    display: &dyn DisplayFormat,
) -> Result<Vec<SourceRow>> {
    let wanted: BTreeSet<u64> = issue_ids
        .iter()
        .copied()
        .filter(|id| data.issue(*id).is_some())
        .collect();

    let person_name = |id: RecordId| {
        data.person(id).map(|person| {
            display.person_name(person.first_name.as_deref(), person.last_name.as_deref())
        })
    };

    // Same minute and text: one note survives
    let mut notes: HashMap<(NaiveDateTime, &str), &IssueNote> = HashMap::new();
    for note in data.notes.iter().filter(|n| n.is_active && wanted.contains(&n.issue)) {
        if !eval_ilike(&note.note, SYSTEM_NOTE_PATTERN)? {
            continue;
        }
        let key = (truncate_to_minute(note.entry_date), note.note.as_str());
        let rank = |n: &IssueNote| (n.category.is_none(), n.category, n.id);
        notes
            .entry(key)
            .and_modify(|kept| {
                if rank(note) < rank(kept) {
                    *kept = note;
                }
            })
            .or_insert(note);
    }

    // Earliest email per issue per day
    let mut emails: HashMap<(u64, NaiveDate), &IssueEmail> = HashMap::new();
    for email in data.emails.iter().filter(|e| e.is_active && wanted.contains(&e.issue)) {
        if !precedes_first_note(data, email) {
            continue;
        }
        emails
            .entry((email.issue, email.add_date.date()))
            .and_modify(|kept| {
                if (email.add_date, email.id) < (kept.add_date, kept.id) {
                    *kept = email;
                }
            })
            .or_insert(email);
    }

    let defaults = EmailDefaults {
        project: config.email_project.clone(),
        issue_type: config.email_issue_type.clone(),
        disposition: config.email_disposition.clone(),
    };

    let mut rows = Vec::with_capacity(notes.len() + emails.len());
    for note in notes.into_values() {
        let reporter = note.issue_person.and_then(|id| person_name(id));
        rows.push(SourceRow {
            source: ChangeSource::Note,
            id: note.id,
            issue_id: note.issue,
            entry_date: note.entry_date,
            category: note.category,
            note_type: note.note_type.clone(),
            raw_note: extract::raw_note(&note.note)?,
            values: extract::note_values(note, reporter)?,
        });
    }
    for email in emails.into_values() {
        let sender = email.sender.and_then(|id| person_name(id));
        rows.push(SourceRow {
            source: ChangeSource::Email,
            id: email.id,
            issue_id: email.issue,
            entry_date: email.add_date,
            category: None,
            note_type: Some("Email".to_string()),
            raw_note: Some(email.body.clone()),
            values: extract::email_values(email, sender, &defaults)?,
        });
    }

    rows.sort_by_key(SourceRow::sort_key);
    Ok(rows)
}

fn merge_rows(data: &ChangelogData, rows: Vec<SourceRow>) -> Vec<IssueChanges> {
    let mut issues: BTreeMap<u64, IssueChanges> = BTreeMap::new();
    let mut prev: Option<ChangeRow> = None;

    for row in rows {
        if prev.as_ref().is_some_and(|p| p.issue_id != row.issue_id) {
            prev = None;
        }

        let fields = TrackedField::ALL
            .into_iter()
            .map(|field| {
                let raw = row.values.get(&field).cloned().flatten();
                let previous = prev.as_ref().and_then(|p| p.field(field));
                (field, FieldChange::carry(raw.as_deref(), previous))
            })
            .collect();

        let change = ChangeRow {
            source: row.source,
            id: row.id,
            issue_id: row.issue_id,
            entry_date: row.entry_date,
            category: row.category,
            note_type: row.note_type,
            raw_note: row.raw_note,
            fields,
        };

        if change.has_visible_change() {
            let issue_id = change.issue_id;
            issues
                .entry(issue_id)
                .or_insert_with(|| IssueChanges {
                    issue_id,
                    label: format!(
                        "{} - {}",
                        issue_id,
                        data.issue(issue_id)
                            .and_then(|issue| issue.title.as_deref())
                            .unwrap_or("")
                    ),
                    changes: Vec::new(),
                })
                .changes
                .push(change.clone());
        }

        // Suppressed rows still carry their values forward
        prev = Some(change);
    }

    issues.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn carry_all(raws: &[Option<&str>]) -> Vec<FieldChange> {
        let mut out: Vec<FieldChange> = Vec::new();
        for raw in raws {
            let next = FieldChange::carry(*raw, out.last());
            out.push(next);
        }
        out
    }

    #[test]
    fn test_carry_forward() {
        let rows = carry_all(&[Some("Open"), Some(""), Some("Open"), Some("Closed"), None]);

        assert_eq!(rows[0].changed, "Open");
        assert_eq!(rows[0].history, "Open");
        // unmentioned keeps the previous value as history
        assert_eq!(rows[1].changed, "");
        assert_eq!(rows[1].history, "Open");
        // repeating the current value is not a change
        assert_eq!(rows[2].changed, "");
        assert_eq!(rows[2].history, "Open");
        assert_eq!(rows[3].changed, "Closed");
        // removal shows as a single space
        assert_eq!(rows[4].changed, " ");
        assert_eq!(rows[4].history, "Closed");
    }

    #[test]
    fn test_literal_none_is_removal() {
        let first = FieldChange::carry(Some("None"), None);
        assert_eq!(first.changed, " ");
        assert!(!first.is_visible());
    }

    #[test]
    fn test_first_row_without_value_has_blank_history() {
        let first = FieldChange::carry(Some(""), None);
        assert_eq!(first, FieldChange::default());
    }

    #[test]
    fn test_page_parsing_and_slicing() {
        assert_eq!("all".parse::<Page>().unwrap(), Page::All);
        assert_eq!(" 3 ".parse::<Page>().unwrap(), Page::Number(3));
        assert!("x".parse::<Page>().is_err());

        let ids = [1, 2, 3, 4, 5];
        assert_eq!(Page::Number(0).slice(&ids, 2), &[1, 2]);
        assert_eq!(Page::Number(3).slice(&ids, 2), &[5]);
        assert!(Page::Number(9).slice(&ids, 2).is_empty());
        assert_eq!(Page::All.slice(&ids, 2), &ids);
    }
}
