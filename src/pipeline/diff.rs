//! Diff calculation between grade snapshots.
//!
//! Computes what changed for each subject between the stored report and a
//! fresh one, and renders the changes as one message per subject.
//!
//! Grade and exam lists are compared as multisets: only a net increase in the
//! occurrences of a value counts as new, so reordering is never reported.

use std::collections::HashMap;

use crate::models::{Report, SubjectRecord};
use crate::utils::format_average;

/// Absolute tolerance for average comparisons.
const AVERAGE_TOLERANCE: f64 = 1e-4;

/// A single detected change of one subject.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// A regular grade appeared in a period
    NewGrade { label: String, grade: String },
    /// A class test grade appeared in a period
    NewExam { label: String, grade: String },
    /// The final grade of a period was set or changed
    PeriodFinalGrade {
        label: String,
        position: usize,
        grade: u32,
    },
    /// The overall final grade changed without any period final change
    FinalGrade { grade: u32 },
    /// The year average moved
    YearAverage { old: Option<f64>, new: f64 },
}

impl Change {
    fn is_grade_related(&self) -> bool {
        matches!(self, Change::NewGrade { .. } | Change::NewExam { .. })
    }
}

/// All changes of one subject, in message order.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectChanges {
    pub subject: String,
    pub changes: Vec<Change>,
    /// Current year average, appended to grade messages when enabled
    pub year_average: Option<f64>,
}

impl SubjectChanges {
    /// Render every change as one line; lines joined with `\n`.
    pub fn render(&self, user: &str, show_year_average: bool) -> String {
        let subject = &self.subject;
        let suffix = match self.year_average {
            Some(avg) if show_year_average => {
                format!(" Damit stehst du jetzt {}", format_average(avg))
            }
            _ => String::new(),
        };

        self.changes
            .iter()
            .map(|change| match change {
                Change::NewGrade { label, grade } => {
                    format!("[{user}] Neue Note in {subject} ({label}): {grade}{suffix}")
                }
                Change::NewExam { label, grade } => format!(
                    "[{user}] Neue Klassenarbeitsnote in {subject} ({label}): {grade}{suffix}"
                ),
                Change::PeriodFinalGrade {
                    position, grade, ..
                } => format!("[{user}] Zeugnisnote (HJ{position}) in {subject} steht fest: {grade}"),
                Change::FinalGrade { grade } => {
                    format!("[{user}] Zeugnisnote in {subject} steht fest: {grade}")
                }
                Change::YearAverage { old, new } => {
                    let mut line = format!(
                        "[{user}] Jahresdurchschnitt in {subject} ist jetzt {}",
                        format_average(*new)
                    );
                    if let Some(old) = old {
                        line.push_str(&format!(" (vorher {})", format_average(*old)));
                    }
                    line
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Result of comparing two reports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffResult {
    /// Subjects with at least one change, in subject order
    pub subjects: Vec<SubjectChanges>,
}

impl DiffResult {
    /// Check if there are any changes.
    pub fn has_changes(&self) -> bool {
        !self.subjects.is_empty()
    }

    /// Get the total number of changes.
    pub fn change_count(&self) -> usize {
        self.subjects.iter().map(|s| s.changes.len()).sum()
    }

    /// One message per changed subject.
    pub fn messages(&self, user: &str, show_year_average: bool) -> Vec<String> {
        self.subjects
            .iter()
            .map(|s| s.render(user, show_year_average))
            .collect()
    }
}

/// Calculator for computing diffs between snapshots.
#[derive(Debug, Clone)]
pub struct DiffCalculator {
    /// Whether year-average changes are reported
    show_year_average: bool,
}

impl Default for DiffCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl DiffCalculator {
    /// Create a new diff calculator that reports year averages.
    pub fn new() -> Self {
        Self {
            show_year_average: true,
        }
    }

    /// Create a diff calculator that ignores year averages.
    pub fn without_year_average() -> Self {
        Self {
            show_year_average: false,
        }
    }

    pub fn show_year_average(&self) -> bool {
        self.show_year_average
    }

    /// Calculate the diff between previous and current reports.
    pub fn calculate(&self, previous: &Report, current: &Report) -> DiffResult {
        let labels = current.effective_period_labels();
        let empty = SubjectRecord::default();

        let subjects = current
            .subjects
            .iter()
            .filter_map(|(subject, record)| {
                let old = previous.subjects.get(subject).unwrap_or(&empty);
                let changes = self.subject_changes(&labels, old, record);
                (!changes.is_empty()).then(|| SubjectChanges {
                    subject: subject.clone(),
                    changes,
                    year_average: record.year_average,
                })
            })
            .collect();

        DiffResult { subjects }
    }

    fn subject_changes(
        &self,
        labels: &[String],
        old: &SubjectRecord,
        new: &SubjectRecord,
    ) -> Vec<Change> {
        let mut changes = Vec::new();

        for label in labels {
            for grade in multiset_diff(old.grades(label), new.grades(label)) {
                changes.push(Change::NewGrade {
                    label: label.clone(),
                    grade: grade.to_string(),
                });
            }
            for grade in multiset_diff(old.exams(label), new.exams(label)) {
                changes.push(Change::NewExam {
                    label: label.clone(),
                    grade: grade.to_string(),
                });
            }
        }
        let grade_related = changes.iter().any(Change::is_grade_related);

        let mut period_final = false;
        for (idx, label) in labels.iter().enumerate() {
            let new_final = new.final_grade_for(label);
            if let Some(grade) = new_final.filter(|_| new_final != old.final_grade_for(label)) {
                changes.push(Change::PeriodFinalGrade {
                    label: label.clone(),
                    position: idx + 1,
                    grade,
                });
                period_final = true;
            }
        }

        // Snapshots without per-period final grades still announce the overall one.
        if !period_final {
            if let Some(grade) = new.final_grade.filter(|_| new.final_grade != old.final_grade) {
                changes.push(Change::FinalGrade { grade });
            }
        }

        if self.show_year_average
            && !grade_related
            && value_changed(old.year_average, new.year_average)
        {
            if let Some(avg) = new.year_average {
                changes.push(Change::YearAverage {
                    old: old.year_average,
                    new: avg,
                });
            }
        }

        changes
    }
}

/// Items of `new` not matched by an occurrence in `old`, in `new` order.
pub fn multiset_diff<'a>(old: &[String], new: &'a [String]) -> Vec<&'a str> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for item in old {
        *counts.entry(item.as_str()).or_default() += 1;
    }

    let mut added = Vec::new();
    for item in new {
        match counts.get_mut(item.as_str()) {
            Some(count) if *count > 0 => *count -= 1,
            _ => added.push(item.as_str()),
        }
    }
    added
}

/// Whether an optional average changed beyond the comparison tolerance.
pub fn value_changed(old: Option<f64>, new: Option<f64>) -> bool {
    match (old, new) {
        (None, None) => false,
        (Some(old), Some(new)) => (old - new).abs() > AVERAGE_TOLERANCE,
        _ => true,
    }
}

/// Notification messages for one user, one per changed subject.
pub fn generate_notifications(
    user: &str,
    current: &Report,
    previous: &Report,
    show_year_average: bool,
) -> Vec<String> {
    let calculator = if show_year_average {
        DiffCalculator::new()
    } else {
        DiffCalculator::without_year_average()
    };
    calculator
        .calculate(previous, current)
        .messages(user, show_year_average)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn report(subjects: Vec<(&str, SubjectRecord)>) -> Report {
        let labels = vec!["H1".to_string(), "H2".to_string()];
        let subjects = subjects
            .into_iter()
            .map(|(name, mut record)| {
                record.ensure_periods(&labels);
                (name.to_string(), record)
            })
            .collect();
        Report {
            subjects,
            period_labels: labels,
            ..Report::default()
        }
    }

    fn subject(grades_h1: &[&str], exams_h1: &[&str], year_average: Option<f64>) -> SubjectRecord {
        let mut record = SubjectRecord::default();
        let h1 = record.period_mut("H1");
        h1.grades = tokens(grades_h1);
        h1.exams = tokens(exams_h1);
        record.year_average = year_average;
        record
    }

    #[test]
    fn test_multiset_diff() {
        let old = tokens(&["2", "3", "2"]);
        assert!(multiset_diff(&old, &tokens(&["3", "2", "2"])).is_empty());
        assert_eq!(multiset_diff(&old, &tokens(&["2", "3", "2", "2"])), vec!["2"]);
        assert_eq!(multiset_diff(&[], &tokens(&["1", "1"])), vec!["1", "1"]);
        assert!(multiset_diff(&old, &tokens(&["2"])).is_empty());
    }

    #[test]
    fn test_value_changed() {
        assert!(!value_changed(None, None));
        assert!(value_changed(None, Some(2.0)));
        assert!(value_changed(Some(2.0), None));
        assert!(!value_changed(Some(2.0), Some(2.00005)));
        assert!(value_changed(Some(2.0), Some(2.01)));
    }

    #[test]
    fn test_no_changes() {
        let current = report(vec![
            ("Deutsch", subject(&["2", "3"], &["1"], Some(2.1))),
            ("Mathe", subject(&[], &[], None)),
        ]);
        let previous = current.clone();

        let result = DiffCalculator::new().calculate(&previous, &current);
        assert!(!result.has_changes());
        assert_eq!(result.change_count(), 0);
        assert!(generate_notifications("Anna", &current, &previous, true).is_empty());
    }

    #[test]
    fn test_new_regular_grade() {
        let previous = report(vec![("Deutsch", SubjectRecord::default())]);
        let mut record = SubjectRecord::default();
        record.period_mut("H2").grades = tokens(&["4"]);
        let current = report(vec![("Deutsch", record)]);

        let messages = generate_notifications("Anna", &current, &previous, true);
        assert_eq!(messages, vec!["[Anna] Neue Note in Deutsch (H2): 4"]);
    }

    #[test]
    fn test_appended_and_reordered() {
        let previous = report(vec![("Bio", subject(&["2", "1"], &[], None))]);

        let appended = report(vec![("Bio", subject(&["2", "1", "2"], &[], None))]);
        let result = DiffCalculator::new().calculate(&previous, &appended);
        assert_eq!(result.change_count(), 1);
        assert_eq!(
            result.subjects[0].changes,
            vec![Change::NewGrade {
                label: "H1".into(),
                grade: "2".into()
            }]
        );

        let reordered = report(vec![("Bio", subject(&["1", "2"], &[], None))]);
        assert!(!DiffCalculator::new().calculate(&previous, &reordered).has_changes());
    }

    #[test]
    fn test_exam_wording_and_year_average_suffix() {
        let previous = report(vec![("Mathe", subject(&[], &[], Some(2.5)))]);
        let current = report(vec![("Mathe", subject(&["3"], &["1"], Some(2.25)))]);

        let messages = generate_notifications("Ben", &current, &previous, true);
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0],
            "[Ben] Neue Note in Mathe (H1): 3 Damit stehst du jetzt 2,25\n\
             [Ben] Neue Klassenarbeitsnote in Mathe (H1): 1 Damit stehst du jetzt 2,25"
        );

        let quiet = generate_notifications("Ben", &current, &previous, false);
        assert_eq!(
            quiet[0],
            "[Ben] Neue Note in Mathe (H1): 3\n[Ben] Neue Klassenarbeitsnote in Mathe (H1): 1"
        );
    }

    #[test]
    fn test_year_average_suppressed_by_grade() {
        let previous = report(vec![("Physik", subject(&["2"], &[], Some(2.0)))]);
        let current = report(vec![("Physik", subject(&["2", "1"], &[], Some(1.5)))]);

        let result = DiffCalculator::new().calculate(&previous, &current);
        assert_eq!(result.change_count(), 1);
        assert!(
            !result.subjects[0]
                .changes
                .iter()
                .any(|c| matches!(c, Change::YearAverage { .. }))
        );
    }

    #[test]
    fn test_year_average_change_alone() {
        let previous = report(vec![
            ("Kunst", subject(&["2"], &[], Some(2.0))),
            ("Musik", subject(&[], &[], None)),
        ]);
        let current = report(vec![
            ("Kunst", subject(&["2"], &[], Some(1.75))),
            ("Musik", subject(&[], &[], Some(1.0))),
        ]);

        let messages = generate_notifications("Cem", &current, &previous, true);
        assert_eq!(
            messages,
            vec![
                "[Cem] Jahresdurchschnitt in Kunst ist jetzt 1,75 (vorher 2,00)",
                "[Cem] Jahresdurchschnitt in Musik ist jetzt 1,00",
            ]
        );

        assert!(generate_notifications("Cem", &current, &previous, false).is_empty());
    }

    #[test]
    fn test_year_average_cleared_is_silent() {
        let previous = report(vec![("Kunst", subject(&[], &[], Some(2.0)))]);
        let current = report(vec![("Kunst", subject(&[], &[], None))]);
        assert!(generate_notifications("Cem", &current, &previous, true).is_empty());
    }

    #[test]
    fn test_period_final_grade_changes() {
        let mut old = SubjectRecord::default();
        old.period_mut("H1").final_grade = Some(3);
        let previous = report(vec![("Chemie", old.clone())]);

        let mut same = old.clone();
        same.final_grade = None;
        assert!(
            !DiffCalculator::new()
                .calculate(&previous, &report(vec![("Chemie", same)]))
                .has_changes()
        );

        let mut changed = old.clone();
        changed.period_mut("H1").final_grade = Some(2);
        changed.period_mut("H2").final_grade = Some(1);
        changed.final_grade = Some(1);
        let messages =
            generate_notifications("Dana", &report(vec![("Chemie", changed)]), &previous, true);
        assert_eq!(
            messages,
            vec![
                "[Dana] Zeugnisnote (HJ1) in Chemie steht fest: 2\n\
                 [Dana] Zeugnisnote (HJ2) in Chemie steht fest: 1"
            ]
        );
    }

    #[test]
    fn test_overall_final_grade_newly_set() {
        let previous = report(vec![("Physik", SubjectRecord::default())]);
        let mut record = SubjectRecord::default();
        record.final_grade = Some(2);
        let current = report(vec![("Physik", record)]);

        let messages = generate_notifications("Emil", &current, &previous, true);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("Zeugnisnote"));
        assert!(messages[0].contains('2'));
    }

    #[test]
    fn test_new_subject_against_empty_snapshot() {
        let current = report(vec![("Sport", subject(&["1"], &[], None))]);
        let messages = generate_notifications("Finn", &current, &Report::default(), true);
        assert_eq!(messages, vec!["[Finn] Neue Note in Sport (H1): 1"]);
    }

    #[test]
    fn test_labels_reconstructed_for_legacy_report() {
        let previous = Report::default();
        let mut current = report(vec![("Latein", subject(&["5"], &[], None))]);
        current.period_labels.clear();

        let messages = generate_notifications("Gül", &current, &previous, true);
        assert_eq!(messages, vec!["[Gül] Neue Note in Latein (H1): 5"]);
    }

    #[test]
    fn test_removed_subject_is_silent() {
        let previous = report(vec![("Religion", subject(&["1"], &[], Some(1.0)))]);
        let current = report(vec![]);
        assert!(generate_notifications("Hana", &current, &previous, true).is_empty());
    }
}
