use crate::core::{RecordId, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: u64,
    pub title: Option<String>,
}

/// An audit note attached to an issue. System notes wrap their change
/// lines in a `<span>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueNote {
    pub id: u64,
    pub issue: u64,
    pub entry_date: NaiveDateTime,
    #[serde(default)]
    pub category: Option<i64>,
    pub note: String,
    #[serde(default = "active")]
    pub is_active: bool,
    /// Person the issue was reported by when the note was written
    #[serde(default)]
    pub issue_person: Option<RecordId>,
    #[serde(default)]
    pub note_type: Option<String>,
}

/// Correspondence filed against an issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueEmail {
    pub id: u64,
    pub issue: u64,
    pub add_date: NaiveDateTime,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default = "active")]
    pub is_active: bool,
    #[serde(default)]
    pub was_received: bool,
    #[serde(default)]
    pub sender: Option<RecordId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: RecordId,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl Person {
    /// `"First Last"`
    pub fn full_name(&self) -> String {
        format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        )
    }
}

fn active() -> bool {
    true
}

/// Everything the changelog report reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangelogData {
    pub issues: Vec<Issue>,
    pub notes: Vec<IssueNote>,
    pub emails: Vec<IssueEmail>,
    pub people: Vec<Person>,
    /// id to type name
    pub issue_types: BTreeMap<u64, String>,
    /// id to disposition name
    pub issue_dispositions: BTreeMap<u64, String>,
    /// id to project name
    pub issue_projects: BTreeMap<u64, String>,
}

impl ChangelogData {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn issue(&self, id: u64) -> Option<&Issue> {
        self.issues.iter().find(|issue| issue.id == id)
    }

    pub fn person(&self, id: RecordId) -> Option<&Person> {
        self.people.iter().find(|person| person.id == id)
    }

    /// Earliest entry date among all of the issue's notes, active or not.
    pub fn first_note_date(&self, issue: u64) -> Option<NaiveDateTime> {
        self.notes
            .iter()
            .filter(|note| note.issue == issue)
            .map(|note| note.entry_date)
            .min()
    }
}
