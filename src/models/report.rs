//! Canonical grade report structures.
//!
//! A [`Report`] is built fresh from one portal page and diffed against the
//! previously stored one. The persisted JSON keeps the flat per-period key
//! layout of existing snapshot files (`H1Exams`, `H1Grades`, `H1GradesAverage`,
//! `H1Average`, `H1FinalGrade`, ..., `YearAverage`, `FinalGrade`), with every
//! optional value written as an explicit `null` and all keys sorted.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Label for the grading period at 1-based `position` (`H1`, `H2`, ...).
pub fn period_label(position: usize) -> String {
    format!("H{position}")
}

/// Numeric index of a period label (`"H12"` → `12`).
pub fn label_index(label: &str) -> Option<u32> {
    label.strip_prefix('H')?.parse().ok()
}

/// Sort period labels by their numeric index, unknown shapes last.
pub fn sort_labels(labels: &mut [String]) {
    labels.sort_by_key(|label| (label_index(label).unwrap_or(u32::MAX), label.clone()));
}

/// Grades of one subject in one period table, before merging.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeriodRecord {
    /// Class test tokens in document order
    pub tests: Vec<String>,
    /// Regular grade tokens in document order
    pub grades: Vec<String>,
    /// Average of the regular grades as printed by the portal
    pub grades_average: Option<f64>,
    /// Final average of the period
    pub average: Option<f64>,
}

/// Canonical per-period fields of a subject.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeriodGrades {
    pub exams: Vec<String>,
    pub grades: Vec<String>,
    pub grades_average: Option<f64>,
    pub average: Option<f64>,
    pub final_grade: Option<u32>,
}

impl From<PeriodRecord> for PeriodGrades {
    fn from(record: PeriodRecord) -> Self {
        Self {
            exams: record.tests,
            grades: record.grades,
            grades_average: record.grades_average,
            average: record.average,
            final_grade: None,
        }
    }
}

/// The per-period key suffixes of the persisted layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeriodField {
    Exams,
    Grades,
    GradesAverage,
    Average,
    FinalGrade,
}

impl PeriodField {
    const ALL: [PeriodField; 5] = [
        PeriodField::Exams,
        PeriodField::Grades,
        PeriodField::GradesAverage,
        PeriodField::Average,
        PeriodField::FinalGrade,
    ];

    fn suffix(self) -> &'static str {
        match self {
            PeriodField::Exams => "Exams",
            PeriodField::Grades => "Grades",
            PeriodField::GradesAverage => "GradesAverage",
            PeriodField::Average => "Average",
            PeriodField::FinalGrade => "FinalGrade",
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.suffix() == suffix)
    }
}

/// Split `"H2GradesAverage"` into `("H2", GradesAverage)`.
fn split_period_key(key: &str) -> Option<(&str, PeriodField)> {
    let rest = key.strip_prefix('H')?;
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let (label, suffix) = key.split_at(1 + digits);
    PeriodField::from_suffix(suffix).map(|field| (label, field))
}

fn value_tokens(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn value_decimal(value: &Value) -> Option<f64> {
    value.as_f64()
}

fn value_grade(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
            .and_then(|n| u32::try_from(n).ok()),
        _ => None,
    }
}

fn tokens_value(tokens: &[String]) -> Value {
    Value::Array(tokens.iter().cloned().map(Value::String).collect())
}

/// Canonical record of one subject for one user at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub struct SubjectRecord {
    periods: BTreeMap<String, PeriodGrades>,
    /// Last aggregate average of the school year
    pub year_average: Option<f64>,
    /// Most recent confirmed final grade
    pub final_grade: Option<u32>,
}

impl SubjectRecord {
    /// Fields of one period, if the record has that period.
    pub fn period(&self, label: &str) -> Option<&PeriodGrades> {
        self.periods.get(label)
    }

    /// Mutable fields of one period, created empty when missing.
    pub fn period_mut(&mut self, label: &str) -> &mut PeriodGrades {
        self.periods.entry(label.to_string()).or_default()
    }

    /// Exam tokens of a period (empty when the period is unknown).
    pub fn exams(&self, label: &str) -> &[String] {
        self.period(label).map_or(&[], |p| p.exams.as_slice())
    }

    /// Regular grade tokens of a period (empty when the period is unknown).
    pub fn grades(&self, label: &str) -> &[String] {
        self.period(label).map_or(&[], |p| p.grades.as_slice())
    }

    pub fn average(&self, label: &str) -> Option<f64> {
        self.period(label).and_then(|p| p.average)
    }

    pub fn final_grade_for(&self, label: &str) -> Option<u32> {
        self.period(label).and_then(|p| p.final_grade)
    }

    /// Labels of all periods this record carries.
    pub fn period_labels(&self) -> impl Iterator<Item = &str> {
        self.periods.keys().map(String::as_str)
    }

    /// Make sure every given period exists, with empty defaults.
    pub fn ensure_periods(&mut self, labels: &[String]) {
        for label in labels {
            self.period_mut(label);
        }
    }

    /// Flat persisted layout of this record.
    pub fn to_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        for (label, period) in &self.periods {
            for field in PeriodField::ALL {
                let value = match field {
                    PeriodField::Exams => tokens_value(&period.exams),
                    PeriodField::Grades => tokens_value(&period.grades),
                    PeriodField::GradesAverage => Value::from(period.grades_average),
                    PeriodField::Average => Value::from(period.average),
                    PeriodField::FinalGrade => Value::from(period.final_grade),
                };
                fields.insert(format!("{label}{}", field.suffix()), value);
            }
        }
        fields.insert("YearAverage".into(), Value::from(self.year_average));
        fields.insert("FinalGrade".into(), Value::from(self.final_grade));
        fields
    }
}

impl From<Value> for SubjectRecord {
    fn from(value: Value) -> Self {
        let mut record = SubjectRecord::default();
        let Value::Object(fields) = value else {
            return record;
        };

        for (key, value) in &fields {
            match key.as_str() {
                "YearAverage" => record.year_average = value_decimal(value),
                "FinalGrade" => record.final_grade = value_grade(value),
                _ => {
                    let Some((label, field)) = split_period_key(key) else {
                        continue;
                    };
                    let period = record.period_mut(label);
                    match field {
                        PeriodField::Exams => period.exams = value_tokens(value),
                        PeriodField::Grades => period.grades = value_tokens(value),
                        PeriodField::GradesAverage => period.grades_average = value_decimal(value),
                        PeriodField::Average => period.average = value_decimal(value),
                        PeriodField::FinalGrade => period.final_grade = value_grade(value),
                    }
                }
            }
        }
        record
    }
}

impl From<SubjectRecord> for Value {
    fn from(record: SubjectRecord) -> Self {
        Value::Object(record.to_fields())
    }
}

/// Canonical grade report of one user for one poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub struct Report {
    /// Subject name → record
    pub subjects: BTreeMap<String, SubjectRecord>,
    /// Period labels in discovery order (`H1`, `H2`, ...)
    pub period_labels: Vec<String>,
    /// Overall average from the aggregate table header
    pub final_average: Option<f64>,
    /// Remaining header summary values, persisted as `N1`, `N2`, ...
    pub summary_values: Vec<f64>,
}

impl Report {
    /// Number of subjects in the report.
    pub fn subject_count(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    /// Period labels to diff over.
    ///
    /// Uses the stored labels; reports without them (older snapshots) get the
    /// labels reconstructed from the subjects' period fields, sorted by number.
    pub fn effective_period_labels(&self) -> Vec<String> {
        if !self.period_labels.is_empty() {
            return self.period_labels.clone();
        }
        let detected: BTreeSet<&str> = self
            .subjects
            .values()
            .flat_map(SubjectRecord::period_labels)
            .collect();
        let mut labels: Vec<String> = detected.into_iter().map(str::to_string).collect();
        sort_labels(&mut labels);
        labels
    }
}

impl From<Value> for Report {
    fn from(value: Value) -> Self {
        let mut report = Report::default();
        let Value::Object(fields) = value else {
            return report;
        };

        let mut summary: Vec<(u32, f64)> = Vec::new();
        for (key, value) in fields {
            match key.as_str() {
                "subjects" => {
                    if let Value::Object(subjects) = value {
                        report.subjects = subjects
                            .into_iter()
                            .map(|(name, record)| (name, SubjectRecord::from(record)))
                            .collect();
                    }
                }
                "PeriodLabels" => report.period_labels = value_tokens(&value),
                "FinalAverage" => report.final_average = value_decimal(&value),
                _ => {
                    let index = key.strip_prefix('N').and_then(|n| n.parse::<u32>().ok());
                    if let (Some(index), Some(number)) = (index, value_decimal(&value)) {
                        summary.push((index, number));
                    }
                }
            }
        }
        summary.sort_by_key(|(index, _)| *index);
        report.summary_values = summary.into_iter().map(|(_, number)| number).collect();
        report
    }
}

impl From<Report> for Value {
    fn from(report: Report) -> Self {
        let mut fields = Map::new();
        fields.insert("FinalAverage".into(), Value::from(report.final_average));
        for (idx, number) in report.summary_values.into_iter().enumerate() {
            fields.insert(format!("N{}", idx + 1), Value::from(number));
        }
        fields.insert(
            "PeriodLabels".into(),
            Value::Array(report.period_labels.into_iter().map(Value::String).collect()),
        );
        let subjects: Map<String, Value> = report
            .subjects
            .into_iter()
            .map(|(name, record)| (name, Value::from(record)))
            .collect();
        fields.insert("subjects".into(), Value::Object(subjects));
        Value::Object(fields)
    }
}
