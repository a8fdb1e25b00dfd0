//! Pulls tracked values out of audit note text and email subjects.

use super::model::{IssueEmail, IssueNote};
use crate::core::Result;
use crate::expression::cached_regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Issue attributes followed by the changelog, in carry-forward order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedField {
    Project,
    IssueType,
    IssueDisposition,
    ReportedBy,
    Tickets,
    Title,
}

impl TrackedField {
    pub const ALL: [TrackedField; 6] = [
        TrackedField::Project,
        TrackedField::IssueType,
        TrackedField::IssueDisposition,
        TrackedField::ReportedBy,
        TrackedField::Tickets,
        TrackedField::Title,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TrackedField::Project => "project",
            TrackedField::IssueType => "issue_type",
            TrackedField::IssueDisposition => "issue_disposition",
            TrackedField::ReportedBy => "reported_by",
            TrackedField::Tickets => "tickets",
            TrackedField::Title => "title",
        }
    }

    /// Regex whose first participating group holds the new value.
    fn note_pattern(&self) -> &'static str {
        match self {
            TrackedField::Title => r#"(?s).*[Tt]itle.*?to (?:&quot;|"|')(.+?)(?:&quot;|"|').*"#,
            TrackedField::Project => {
                r#"(?s).*[Ii]ssue [Pp]roject.*?to (?:&quot;|"|')(.+?)(?:&quot;|"|').*"#
            }
            TrackedField::IssueType => {
                r#"(?s).*[Ii]ssue [Tt]ype.*?to (?:&quot;|"|')(.+?)(?:&quot;|"|').*"#
            }
            TrackedField::IssueDisposition => {
                r#"(?s)(?:.*disposition of '(.+?)'.*)|(?:.*[Ii]ssue [Dd]isposition.*?to (?:&quot;|"|')(.+?)(?:&quot;|"|').*)"#
            }
            TrackedField::ReportedBy => {
                r#"(?s).*[Rr]eported [Bb]y.*?to (?:&quot;|"|')(.+?)(?:&quot;|"|').*"#
            }
            TrackedField::Tickets => r#"(?s).*[Tt]ickets.*?to (?:&quot;|"|')(.+?)(?:&quot;|"|').*"#,
        }
    }
}

impl fmt::Display for TrackedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw per-row values before carry-forward. `None` marks a removed value.
pub type RawValues = BTreeMap<TrackedField, Option<String>>;

/// Defaults an inbound email stands for.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailDefaults {
    pub project: String,
    pub issue_type: String,
    pub disposition: String,
}

/// Extracted value of `field` from a note; empty when the note does not
/// mention it.
pub fn extract_field(note: &str, field: TrackedField) -> Result<Option<String>> {
    let regex = cached_regex(field.note_pattern())?;
    Ok(regex
        .captures(note)
        .and_then(|caps| caps.iter().skip(1).flatten().next())
        .map(|group| group.as_str().replace('\n', " ").trim().to_string()))
}

/// Values a note carries. `reporter` stands in for an unmentioned
/// reported-by value.
pub fn note_values(note: &IssueNote, reporter: Option<String>) -> Result<RawValues> {
    let mut values = RawValues::new();
    for field in TrackedField::ALL {
        let value = match extract_field(&note.note, field)? {
            Some(value) => value,
            None if field == TrackedField::ReportedBy => reporter.clone().unwrap_or_default(),
            None => String::new(),
        };
        values.insert(field, Some(value));
    }
    Ok(values)
}

/// Values an email carries before the issue's first note.
pub fn email_values(
    email: &IssueEmail,
    sender: Option<String>,
    defaults: &EmailDefaults,
) -> Result<RawValues> {
    Ok(RawValues::from([
        (TrackedField::Project, Some(defaults.project.clone())),
        (TrackedField::IssueType, Some(defaults.issue_type.clone())),
        (
            TrackedField::IssueDisposition,
            Some(defaults.disposition.clone()),
        ),
        (TrackedField::ReportedBy, Some(sender.unwrap_or_default())),
        (TrackedField::Tickets, Some(String::new())),
        (TrackedField::Title, Some(email_title(&email.subject)?)),
    ]))
}

/// Subject of a ticket-tracker email without its `[zt N]` tag, or a blank.
pub fn email_title(subject: &str) -> Result<String> {
    let regex = cached_regex(r"(?s)\[zt [0-9]+\] (.+)")?;
    Ok(regex
        .captures(subject)
        .and_then(|caps| caps.get(1))
        .map(|title| title.as_str().trim().to_string())
        .unwrap_or_else(|| " ".to_string()))
}

/// Text inside a system note's `<span>`, unescaped to one line.
pub fn raw_note(note: &str) -> Result<Option<String>> {
    let regex = cached_regex(r"(?s)<span.*?>(.+)</span>")?;
    Ok(regex.captures(note).and_then(|caps| caps.get(1)).map(|inner| {
        inner
            .as_str()
            .replace('\n', " ")
            .replace("&quot;", "\"")
            .trim()
            .to_string()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOTE: &str = "<span style=\"color:#888; font-style:italic;\">\
        Changed Issue Type from \"Bug\" to \"Incident\"\n\
        Changed Title to &quot;Printer on\nfire&quot;\n\
        Changed Tickets from \"\" to '1234'</span>";

    #[test]
    fn test_extract_fields() {
        assert_eq!(
            extract_field(NOTE, TrackedField::IssueType).unwrap(),
            Some("Incident".to_string())
        );
        assert_eq!(
            extract_field(NOTE, TrackedField::Title).unwrap(),
            Some("Printer on fire".to_string())
        );
        assert_eq!(
            extract_field(NOTE, TrackedField::Tickets).unwrap(),
            Some("1234".to_string())
        );
        assert_eq!(extract_field(NOTE, TrackedField::Project).unwrap(), None);
    }

    #[test]
    fn test_disposition_forms() {
        let short = "<span>Set disposition of 'Closed' by rule</span>";
        assert_eq!(
            extract_field(short, TrackedField::IssueDisposition).unwrap(),
            Some("Closed".to_string())
        );
        let long = "<span>Changed Issue Disposition from \"Open\" to \"Pending\"</span>";
        assert_eq!(
            extract_field(long, TrackedField::IssueDisposition).unwrap(),
            Some("Pending".to_string())
        );
    }

    #[test]
    fn test_raw_note_and_email_title() {
        assert_eq!(
            raw_note(NOTE).unwrap().as_deref(),
            Some(
                "Changed Issue Type from \"Bug\" to \"Incident\" Changed Title to \"Printer on fire\" \
                 Changed Tickets from \"\" to '1234'"
            )
        );
        assert_eq!(raw_note("plain text").unwrap(), None);

        assert_eq!(email_title("Re: [zt 42] Printer down ").unwrap(), "Printer down");
        assert_eq!(email_title("Printer down").unwrap(), " ");
    }
}
