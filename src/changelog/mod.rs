// ============================================================================
// Issue Changelog
// ============================================================================
//
// Audit notes and early inbound email merged into one row per change, with
// every tracked issue attribute carried forward from the row before it.
//
// model    - issues, notes, emails and lookup tables as loaded
// filter   - search form and the predicates it implies
// extract  - values pulled out of note text and email subjects
// merge    - selection, pagination, dedupe and carry-forward
// export   - spreadsheet layout and CSV rendering
//
// ============================================================================

pub mod export;
pub mod extract;
pub mod filter;
pub mod merge;
pub mod model;

pub use export::{
    Border, Cell, CellStyle, CONTENT_TYPE, SheetRow, Workbook, content_disposition,
    render_workbook, write_csv,
};
pub use extract::TrackedField;
pub use filter::{ChangelogFilter, RelatedPerson};
pub use merge::{
    ChangeRow, ChangeSource, ChangelogPage, FieldChange, IssueChanges, Page, run_report,
    select_issues,
};
pub use model::{ChangelogData, Issue, IssueEmail, IssueNote, Person};
