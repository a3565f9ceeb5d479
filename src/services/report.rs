// src/services/report.rs

//! Full grade page parsing.
//!
//! A grade page holds up to three kinds of tables:
//! - one table per grading period (`student_main_grades_table_<n>`)
//! - an aggregate table (`student_main_grades_table_all`) with one final
//!   average per period and the overall summary values in its header
//! - a final-grades table inside a `student_final_grades_container` block
//!
//! Any of them may be missing. Parsing never fails on page content; whatever
//! is present is merged into one [`Report`].

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::error::Result;
use crate::models::{PeriodGrades, PeriodRecord, Report, SubjectRecord, period_label};
use crate::services::cells::{StrayTextRescue, row_cells};
use crate::services::parse_selector;
use crate::services::semester::{FINAL_AVERAGE_CLASS, SemesterTableParser};
use crate::utils::{parse_digits, parse_locale_decimal};

const AVG_DISPLAY_CLASS: &str = "display_avg";
const FINAL_GRADE_DISPLAY_CLASS: &str = "display_final_grade";

/// Values read from the aggregate table.
#[derive(Debug, Default)]
struct Aggregate {
    /// Decimal values from the header, in order
    summary: Vec<f64>,
    /// Subject → parseable final averages, in column order
    finals: BTreeMap<String, Vec<f64>>,
}

/// Parser for a complete grade page.
#[derive(Debug, Clone)]
pub struct ReportParser {
    rescue: StrayTextRescue,
    semester: SemesterTableParser,
    period_tables: Selector,
    period_id: Regex,
    aggregate_table: Selector,
    header_cells: Selector,
    summary_number: Regex,
    body_rows: Selector,
    final_container: Selector,
    table: Selector,
}

impl ReportParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            rescue: StrayTextRescue::new()?,
            semester: SemesterTableParser::new()?,
            period_tables: parse_selector(r#"table[id^="student_main_grades_table_"]"#)?,
            period_id: Regex::new(r"^student_main_grades_table_(\d+)$")?,
            aggregate_table: parse_selector("table#student_main_grades_table_all")?,
            header_cells: parse_selector("th.text-center")?,
            summary_number: Regex::new(r"[0-9]+,[0-9]+")?,
            body_rows: parse_selector("tbody tr")?,
            final_container: parse_selector(r#"div[id*="student_final_grades_container"]"#)?,
            table: parse_selector("table")?,
        })
    }

    /// Parse a grade page into a normalized report.
    pub fn parse(&self, html: &str) -> Report {
        let markup = self.rescue.apply(html);
        let document = Html::parse_document(&markup);

        let tables = self.period_tables(&document);
        let labels: Vec<String> = (1..=tables.len()).map(period_label).collect();
        let periods: Vec<BTreeMap<String, PeriodRecord>> = tables
            .into_values()
            .map(|table| self.semester.parse(Some(table)))
            .collect();

        let aggregate = self.aggregate(&document);

        let mut names: BTreeSet<&str> = aggregate.finals.keys().map(String::as_str).collect();
        for period in &periods {
            names.extend(period.keys().map(String::as_str));
        }

        let mut subjects: BTreeMap<String, SubjectRecord> = BTreeMap::new();
        for name in names {
            let finals = aggregate
                .finals
                .get(name)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let record = merge_subject(name, &labels, &periods, finals);
            subjects.insert(name.to_string(), record);
        }

        self.apply_final_grades(&document, &labels, &mut subjects);

        for record in subjects.values_mut() {
            record.ensure_periods(&labels);
        }

        let mut summary = aggregate.summary;
        let final_average = summary.pop();

        log::debug!(
            "Parsed {} period tables, {} subjects, {} summary values",
            labels.len(),
            subjects.len(),
            summary.len() + usize::from(final_average.is_some())
        );

        Report {
            subjects,
            period_labels: labels,
            final_average,
            summary_values: summary,
        }
    }

    /// Period tables keyed by their numeric id suffix.
    ///
    /// Labels are assigned by position in this order, so gaps in the
    /// numbering do not produce gaps in the labels.
    fn period_tables<'a>(&self, document: &'a Html) -> BTreeMap<u64, ElementRef<'a>> {
        let mut tables = BTreeMap::new();
        for table in document.select(&self.period_tables) {
            let Some(id) = table.value().id() else {
                continue;
            };
            let Some(index) = self
                .period_id
                .captures(id)
                .and_then(|caps| caps[1].parse::<u64>().ok())
            else {
                continue;
            };
            if tables.insert(index, table).is_some() {
                log::warn!("Duplicate period table id '{id}', keeping the later one");
            }
        }
        tables
    }

    fn aggregate(&self, document: &Html) -> Aggregate {
        let Some(table) = document.select(&self.aggregate_table).next() else {
            log::debug!("No aggregate table on page");
            return Aggregate::default();
        };

        let header = table
            .select(&self.header_cells)
            .map(|th| {
                th.text()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join(" ");
        let summary = self
            .summary_number
            .find_iter(&header)
            .filter_map(|m| parse_locale_decimal(m.as_str()))
            .collect();

        let mut finals = BTreeMap::new();
        for row in table.select(&self.body_rows) {
            let cells = row_cells(row);
            let Some((first, rest)) = cells.split_first() else {
                continue;
            };
            if first.text.is_empty() {
                continue;
            }
            let values: Vec<f64> = rest
                .iter()
                .filter(|cell| cell.has_class(FINAL_AVERAGE_CLASS))
                .filter_map(|cell| parse_locale_decimal(&cell.text))
                .collect();
            finals.insert(first.text.clone(), values);
        }

        Aggregate { summary, finals }
    }

    /// Merge the final-grades table into the subjects.
    ///
    /// Period averages only fill gaps; year average and final grades come
    /// from the last non-empty value of the row. Subjects that exist only in
    /// this table are created.
    fn apply_final_grades(
        &self,
        document: &Html,
        labels: &[String],
        subjects: &mut BTreeMap<String, SubjectRecord>,
    ) {
        let Some(table) = document
            .select(&self.final_container)
            .next()
            .and_then(|container| container.select(&self.table).next())
        else {
            return;
        };

        for row in table.select(&self.body_rows) {
            let cells = row_cells(row);
            let Some((first, rest)) = cells.split_first() else {
                continue;
            };
            if first.text.is_empty() {
                continue;
            }

            let mut averages: Vec<Option<f64>> = Vec::new();
            let mut finals: Vec<Option<u32>> = Vec::new();
            for cell in rest {
                if cell.has_class(AVG_DISPLAY_CLASS) {
                    averages.push(parse_locale_decimal(&cell.text));
                }
                if cell.has_class(FINAL_GRADE_DISPLAY_CLASS) {
                    finals.push(parse_digits(&cell.text));
                }
            }

            let record = subjects.entry(first.text.clone()).or_default();
            for (label, average) in labels.iter().zip(&averages) {
                let period = record.period_mut(label);
                if period.average.is_none() {
                    period.average = *average;
                }
            }
            if let Some(last) = averages.iter().rev().find_map(|a| *a) {
                record.year_average = Some(last);
            }
            for (label, grade) in labels.iter().zip(&finals) {
                record.period_mut(label).final_grade = *grade;
            }
            record.final_grade = finals.iter().rev().find_map(|g| *g);
        }
    }
}

/// Build one subject from its period rows and aggregate finals.
fn merge_subject(
    name: &str,
    labels: &[String],
    periods: &[BTreeMap<String, PeriodRecord>],
    finals: &[f64],
) -> SubjectRecord {
    let mut record = SubjectRecord::default();
    for (label, table) in labels.iter().zip(periods) {
        *record.period_mut(label) = table
            .get(name)
            .cloned()
            .map(PeriodGrades::from)
            .unwrap_or_default();
    }
    for (label, average) in labels.iter().zip(finals) {
        let period = record.period_mut(label);
        if period.average.is_none() {
            period.average = Some(*average);
        }
    }
    if finals.len() > labels.len() {
        record.year_average = finals.last().copied();
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = include_str!("../../tests/fixtures/grades.html");

    fn parse(html: &str) -> Report {
        ReportParser::new().unwrap().parse(html)
    }

    fn tokens(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_fixture_labels_and_summary() {
        let report = parse(FIXTURE);
        assert_eq!(report.period_labels, vec!["H1", "H2"]);
        assert_eq!(report.final_average, Some(2.25));
        assert_eq!(report.summary_values, vec![2.31, 2.18]);
        let names: Vec<&str> = report.subjects.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec!["Biologie", "Deutsch", "Informatik", "Mathematik", "Sport"]
        );
    }

    #[test]
    fn test_fixture_period_fields() {
        let report = parse(FIXTURE);
        let bio = &report.subjects["Biologie"];
        assert_eq!(bio.exams("H1"), tokens(&["2"]));
        assert_eq!(bio.grades("H1"), tokens(&["1", "3"]));
        assert_eq!(bio.exams("H2"), tokens(&["1"]));
        assert_eq!(bio.grades("H2"), tokens(&["2"]));
        assert_eq!(bio.period("H2").unwrap().grades_average, Some(2.0));
        assert_eq!(bio.average("H2"), Some(1.5));
    }

    #[test]
    fn test_fixture_stray_grade_kept() {
        let report = parse(FIXTURE);
        let deutsch = &report.subjects["Deutsch"];
        assert_eq!(deutsch.exams("H1"), tokens(&["3"]));
        assert_eq!(deutsch.grades("H1"), tokens(&["2", "1", "2"]));
        assert_eq!(deutsch.period("H1").unwrap().grades_average, Some(1.67));
        assert!(deutsch.grades("H2").is_empty());
        assert_eq!(deutsch.year_average, None);
        assert_eq!(deutsch.final_grade, None);
    }

    #[test]
    fn test_fixture_backfill_and_final_table() {
        let report = parse(FIXTURE);

        let mathe = &report.subjects["Mathematik"];
        // empty final_average cell in the period table, filled from the aggregate
        assert_eq!(mathe.average("H1"), Some(3.0));
        // last non-empty display_avg overrides the aggregate year value
        assert_eq!(mathe.year_average, Some(3.0));
        assert_eq!(mathe.final_grade_for("H1"), Some(3));
        assert_eq!(mathe.final_grade_for("H2"), None);
        assert_eq!(mathe.final_grade, Some(3));

        let bio = &report.subjects["Biologie"];
        assert_eq!(bio.year_average, Some(1.6));
        assert_eq!(bio.final_grade_for("H2"), Some(2));
        assert_eq!(bio.final_grade, Some(2));
    }

    #[test]
    fn test_fixture_final_table_only_subject() {
        let report = parse(FIXTURE);
        let info = &report.subjects["Informatik"];
        assert_eq!(info.average("H1"), Some(1.3));
        assert_eq!(info.year_average, Some(1.3));
        assert_eq!(info.final_grade, Some(1));
        assert_eq!(info.period("H2"), Some(&PeriodGrades::default()));
    }

    #[test]
    fn test_every_subject_has_every_period() {
        let report = parse(FIXTURE);
        for (name, record) in &report.subjects {
            let labels: Vec<&str> = record.period_labels().collect();
            assert_eq!(labels, vec!["H1", "H2"], "subject {name}");
        }
        assert_eq!(report.subjects["Sport"].period("H2"), Some(&PeriodGrades::default()));
    }

    #[test]
    fn test_empty_page_is_empty_report() {
        let report = parse("<html><body><p>Wartungsarbeiten</p></body></html>");
        assert!(report.is_empty());
        assert!(report.period_labels.is_empty());
        assert_eq!(report.final_average, None);
        assert!(report.summary_values.is_empty());
    }

    #[test]
    fn test_parse_grades_final_extra_subject() {
        let html = r#"
            <div id="student_final_grades_container_1"><table><tbody>
            <tr><td>Physik</td><td class="score_display display_avg">2,3</td>
                <td class="score_display display_final_grade">2</td></tr>
            </tbody></table></div>
        "#;
        let report = parse(html);
        assert!(report.period_labels.is_empty());
        let physik = &report.subjects["Physik"];
        assert_eq!(physik.final_grade, Some(2));
        assert_eq!(physik.year_average, Some(2.3));
        assert_eq!(physik.period_labels().count(), 0);
    }

    #[test]
    fn test_labels_follow_sorted_ids_not_document_order() {
        let html = r#"
            <table id="student_main_grades_table_12"><tbody>
              <tr><td>Chemie</td><td></td><td></td><td>4</td><td>4,00</td></tr>
            </tbody></table>
            <table id="student_main_grades_table_2"><tbody>
              <tr><td>Chemie</td><td>1</td><td></td><td>2</td><td>2,00</td></tr>
            </tbody></table>
            <table id="student_main_grades_table_x"><tbody>
              <tr><td>Chemie</td><td>5</td><td></td><td>5</td><td>5,00</td></tr>
            </tbody></table>
        "#;
        let report = parse(html);
        assert_eq!(report.period_labels, vec!["H1", "H2"]);
        let chemie = &report.subjects["Chemie"];
        assert_eq!(chemie.grades("H1"), tokens(&["2"]));
        assert_eq!(chemie.grades("H2"), tokens(&["4"]));
    }

    #[test]
    fn test_aggregate_year_average_and_summary() {
        let html = r#"
            <table id="student_main_grades_table_all">
              <thead><tr><th>Fach</th><th class="text-center">Ø 1,5 / n.b.</th>
                <th class="text-center">Ø 2,0</th></tr></thead>
              <tbody>
                <tr><td>Musik</td><td class="final_average">1,0</td>
                    <td class="final_average">2,0</td></tr>
                <tr><td>Ethik</td></tr>
              </tbody>
            </table>
            <table id="student_main_grades_table_1"><tbody>
              <tr><td>Musik</td><td></td><td></td><td>1</td><td class="final_average"></td><td>1,00</td></tr>
            </tbody></table>
        "#;
        let report = parse(html);
        assert_eq!(report.summary_values, vec![1.5]);
        assert_eq!(report.final_average, Some(2.0));

        let musik = &report.subjects["Musik"];
        assert_eq!(musik.average("H1"), Some(1.0));
        assert_eq!(musik.year_average, Some(2.0));

        // listed in the aggregate table without any values
        let ethik = &report.subjects["Ethik"];
        assert_eq!(ethik.period("H1"), Some(&PeriodGrades::default()));
        assert_eq!(ethik.year_average, None);
    }

    #[test]
    fn test_stray_text_adds_exactly_one_grade() {
        let clean = r#"<table id="student_main_grades_table_1"><tbody>
            <tr><td>Kunst</td><td>2</td><td></td><td>1</td><td>2</td><td>1,50</td></tr>
            </tbody></table>"#;
        let stray = clean.replace("<td>1</td><td>2</td>", "<td>1</td>3<td>2</td>");

        let clean_report = parse(clean);
        let stray_report = parse(&stray);
        let before = clean_report.subjects["Kunst"].grades("H1");
        let after = stray_report.subjects["Kunst"].grades("H1");
        assert_eq!(after.len(), before.len() + 1);
        assert_eq!(after, tokens(&["1", "3", "2"]));
    }

    #[test]
    fn test_whitespace_entity_padding_adds_no_cell() {
        let clean = r#"<table id="student_main_grades_table_1"><tbody>
            <tr><td>Kunst</td><td>2</td><td>3</td><td>1</td><td>1,50</td></tr>
            </tbody></table>"#;
        let leading = clean.replace("<td>Kunst</td>", "<td>Kunst</td>&#160;");
        let trailing = clean.replace("</td></tr>", "</td>&#160;</tr>");

        let expected = parse(clean);
        let kunst = &expected.subjects["Kunst"];
        assert_eq!(kunst.exams("H1"), tokens(&["2", "3"]));
        assert_eq!(kunst.grades("H1"), tokens(&["1"]));
        assert_eq!(kunst.period("H1").unwrap().grades_average, Some(1.5));

        for padded in [leading, trailing] {
            assert_eq!(parse(&padded), expected, "{padded}");
        }
    }

    #[test]
    fn test_parse_is_deterministic() {
        let parser = ReportParser::new().unwrap();
        assert_eq!(parser.parse(FIXTURE), parser.parse(FIXTURE));
    }
}
