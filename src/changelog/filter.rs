use super::model::{ChangelogData, IssueEmail, IssueNote};
use crate::core::{CuraError, RecordId, Result};
use crate::expression::pattern::eval_ilike;
use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::BTreeMap;

/// Search form of the changelog page. Every predicate is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangelogFilter {
    /// `Some(empty)` matches nothing
    pub issue_ids: Option<Vec<u64>>,
    pub change_date_start: Option<NaiveDate>,
    pub change_date_end: Option<NaiveDate>,
    pub issue_type: Option<String>,
    pub issue_disposition: Option<String>,
    pub project: Option<String>,
    pub related_person: Option<RelatedPerson>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelatedPerson {
    pub id: RecordId,
    /// `"First Last"`, as it appears in audit notes
    pub name: String,
}

impl ChangelogFilter {
    /// Parses query parameters, resolving lookup ids against `data`.
    /// Blank parameters are ignored.
    pub fn from_params(params: &BTreeMap<String, String>, data: &ChangelogData) -> Result<Self> {
        let param = |name: &str| {
            params
                .get(name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        let mut filter = ChangelogFilter::default();

        if let Some(raw) = param("issue_id") {
            filter.issue_ids = Some(
                raw.split_whitespace()
                    .filter(|word| word.bytes().all(|b| b.is_ascii_digit()))
                    .filter_map(|word| word.parse().ok())
                    .collect(),
            );
        }
        if let Some(raw) = param("change_date_start") {
            filter.change_date_start = Some(parse_date(raw)?);
        }
        if let Some(raw) = param("change_date_end") {
            filter.change_date_end = Some(parse_date(raw)?);
        }
        if let Some(raw) = param("issue_type") {
            filter.issue_type = Some(lookup(&data.issue_types, "issue_type", raw)?);
        }
        if let Some(raw) = param("issue_disposition") {
            filter.issue_disposition =
                Some(lookup(&data.issue_dispositions, "issue_disposition", raw)?);
        }
        if let Some(raw) = param("project") {
            filter.project = Some(lookup(&data.issue_projects, "issue_project", raw)?);
        }
        if let Some(raw) = param("related_to_relation") {
            if let Ok(id) = raw.parse::<u64>() {
                let person = data
                    .person(RecordId(id))
                    .ok_or_else(|| CuraError::not_found("person", id))?;
                filter.related_person = Some(RelatedPerson {
                    id: person.id,
                    name: person.full_name(),
                });
            }
        }

        Ok(filter)
    }

    pub fn with_issue_ids(mut self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.issue_ids = Some(ids.into_iter().collect());
        self
    }

    fn issue_matches(&self, issue: u64) -> bool {
        self.issue_ids
            .as_ref()
            .is_none_or(|ids| ids.contains(&issue))
    }

    fn date_matches(&self, at: NaiveDateTime) -> bool {
        let after_start = self
            .change_date_start
            .is_none_or(|start| at >= start.and_time(NaiveTime::MIN));
        let before_end = self.change_date_end.is_none_or(|end| {
            let limit = end.checked_add_days(Days::new(1)).unwrap_or(end);
            at < limit.and_time(NaiveTime::MIN)
        });
        after_start && before_end
    }

    /// ILIKE patterns a note must satisfy.
    pub fn note_patterns(&self) -> Vec<String> {
        let mut patterns = Vec::new();
        if let Some(name) = &self.issue_type {
            patterns.push(format!("%type%to %{}%", name));
        }
        if let Some(name) = &self.issue_disposition {
            patterns.push(format!("%disposition%to %{}%", name));
        }
        if let Some(name) = &self.project {
            patterns.push(format!("%project%to %{}%", name));
        }
        if let Some(person) = &self.related_person {
            patterns.push(format!("%reported by%to %{}%", person.name));
        }
        patterns
    }

    pub fn note_matches(&self, note: &IssueNote, patterns: &[String]) -> Result<bool> {
        if !(self.issue_matches(note.issue) && self.date_matches(note.entry_date)) {
            return Ok(false);
        }
        for pattern in patterns {
            if !eval_ilike(&note.note, pattern)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn email_matches(&self, email: &IssueEmail) -> bool {
        self.issue_matches(email.issue)
            && self.date_matches(email.add_date)
            && self
                .related_person
                .as_ref()
                .is_none_or(|person| email.sender == Some(person.id))
    }
}

/// `YYYY-MM-DD` or `MM/DD/YYYY`
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%m/%d/%Y"))
        .map_err(|_| CuraError::MalformedInput(format!("Invalid date '{}'", raw)))
}

fn lookup(table: &BTreeMap<u64, String>, kind: &str, raw: &str) -> Result<String> {
    raw.parse::<u64>()
        .ok()
        .and_then(|id| table.get(&id))
        .cloned()
        .ok_or_else(|| CuraError::not_found(kind, raw))
}
