//! Merit list, tabulation sheet and result card projections.
//!
//! Everything here is a pure function of already-computed
//! `StudentMarksRecord`s. Rows whose student cannot be found are skipped with
//! a warning; an empty input is an empty report.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use crate::calc::{round_off_2_decimals, Student, StudentMarksRecord};
use crate::config::GradingPolicy;
use crate::grading::GradeBandTable;
use crate::ranking::{rank_competition, RankingKey};
use crate::subjects::{subject_display_name, SubjectMark, CANONICAL_CODES};

fn ranking_value(key: RankingKey, percentage: f64, total_obtained: f64) -> f64 {
    match key {
        RankingKey::Percentage => percentage,
        RankingKey::TotalObtained => total_obtained,
    }
}

/// One record per student; when a student has several, the most recently
/// updated wins. Output is ordered by student id.
fn latest_per_student(records: &[StudentMarksRecord]) -> Vec<&StudentMarksRecord> {
    let mut by_student: BTreeMap<&str, &StudentMarksRecord> = BTreeMap::new();
    for rec in records {
        let newer = by_student
            .get(rec.student_id.as_str())
            .map_or(true, |prev| prev.updated_at < rec.updated_at);
        if newer {
            by_student.insert(rec.student_id.as_str(), rec);
        }
    }
    by_student.into_values().collect()
}

fn roll_of(student: &Student, rec: &StudentMarksRecord) -> String {
    if !student.roll_no.trim().is_empty() {
        return student.roll_no.clone();
    }
    rec.class_roll.map(|r| r.to_string()).unwrap_or_default()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeritListEntry {
    pub position: usize,
    pub serial: usize,
    pub student_id: String,
    pub student_name: String,
    pub roll_no: String,
    pub class_name: String,
    pub section: Option<String>,
    pub total_marks: f64,
    pub obtained_marks: f64,
    pub percentage: f64,
    pub letter_grade: String,
    pub grade_point: f64,
}

pub fn build_merit_list(
    records: &[StudentMarksRecord],
    students: &HashMap<String, Student>,
    key: RankingKey,
    top_n: usize,
) -> Vec<MeritListEntry> {
    let mut cohort: Vec<(MeritListEntry, f64)> = Vec::new();
    for rec in latest_per_student(records) {
        let Some(student) = students.get(&rec.student_id) else {
            warn!(student_id = %rec.student_id, exam = %rec.exam_name, "merit list: student not found; row skipped");
            continue;
        };
        let value = ranking_value(key, rec.percentage, rec.grand_total_obtained);
        cohort.push((
            MeritListEntry {
                position: 0,
                serial: 0,
                student_id: rec.student_id.clone(),
                student_name: student.name.clone(),
                roll_no: roll_of(student, rec),
                class_name: rec.class_name.clone(),
                section: student.section.clone(),
                total_marks: rec.grand_total_full,
                obtained_marks: rec.grand_total_obtained,
                percentage: rec.percentage,
                letter_grade: rec.grade_letter.clone(),
                grade_point: rec.grade_point,
            },
            value,
        ));
    }

    rank_competition(cohort)
        .into_iter()
        .take(top_n)
        .enumerate()
        .map(|(i, ranked)| MeritListEntry {
            position: ranked.position,
            serial: i + 1,
            ..ranked.item
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectCell {
    pub subject_code: String,
    pub subject_name: String,
    pub continuous_marks: f64,
    pub aggregate_marks: f64,
    pub total_marks: f64,
    pub full_marks: f64,
    pub grade: String,
    pub grade_point: f64,
}

fn subject_cell(mark: &SubjectMark, bands: &GradeBandTable, policy: &GradingPolicy) -> SubjectCell {
    let full_marks = policy.subject_full_marks(&mark.subject_code);
    let pct = if full_marks > 0.0 {
        mark.total / full_marks * 100.0
    } else {
        0.0
    };
    let grade = bands.grade(round_off_2_decimals(pct));
    SubjectCell {
        subject_code: mark.subject_code.clone(),
        subject_name: subject_display_name(&mark.subject_code).to_string(),
        continuous_marks: mark.continuous_marks,
        aggregate_marks: mark.aggregate_marks,
        total_marks: mark.total,
        full_marks,
        grade: grade.letter,
        grade_point: grade.grade_point,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabulationRow {
    pub student_id: String,
    pub student_name: String,
    pub roll_no: String,
    pub section: Option<String>,
    pub subjects: BTreeMap<String, SubjectCell>,
    pub total_obtained_marks: f64,
    pub total_full_marks: f64,
    pub percentage: f64,
    pub letter_grade: String,
    pub grade_point: f64,
    pub remarks: String,
    pub class_position: usize,
    /// Position across every class of the combined sheet; set by
    /// [`combine_tabulations`].
    pub merit_position: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectColumnTotal {
    pub continuous_marks: f64,
    pub aggregate_marks: f64,
    pub total_marks: f64,
}

/// Column sums over a set of rows. Never ranked.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectTotalsRow {
    pub student_count: usize,
    pub subjects: BTreeMap<String, SubjectColumnTotal>,
    pub total_obtained_marks: f64,
}

fn subject_totals<'a>(rows: impl Iterator<Item = &'a TabulationRow>) -> SubjectTotalsRow {
    let mut subjects: BTreeMap<String, SubjectColumnTotal> = CANONICAL_CODES
        .iter()
        .map(|code| (code.to_string(), SubjectColumnTotal::default()))
        .collect();
    let mut student_count = 0;
    let mut total_obtained_marks = 0.0;
    for row in rows {
        student_count += 1;
        total_obtained_marks += row.total_obtained_marks;
        for (code, cell) in &row.subjects {
            let col = subjects.entry(code.clone()).or_default();
            col.continuous_marks += cell.continuous_marks;
            col.aggregate_marks += cell.aggregate_marks;
            col.total_marks += cell.total_marks;
        }
    }
    SubjectTotalsRow {
        student_count,
        subjects,
        total_obtained_marks,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassTabulation {
    pub class_name: String,
    pub exam_name: String,
    pub education_year: Option<String>,
    /// Ordered by class position.
    pub rows: Vec<TabulationRow>,
    pub class_total: SubjectTotalsRow,
}

/// Stage 1: one class's rows, ranked within the class, plus its column totals.
pub fn build_class_tabulation(
    class_name: &str,
    exam_name: &str,
    records: &[StudentMarksRecord],
    students: &HashMap<String, Student>,
    bands: &GradeBandTable,
    policy: &GradingPolicy,
    key: RankingKey,
) -> ClassTabulation {
    let mut cohort: Vec<(TabulationRow, f64)> = Vec::new();
    let mut education_year: Option<String> = None;

    for rec in latest_per_student(records) {
        let Some(student) = students.get(&rec.student_id) else {
            warn!(student_id = %rec.student_id, class = class_name, "tabulation: student not found; row skipped");
            continue;
        };
        if education_year.is_none() {
            education_year = rec.education_year.clone();
        }
        let subjects: BTreeMap<String, SubjectCell> = rec
            .subjects
            .iter()
            .map(|(code, mark)| (code.clone(), subject_cell(mark, bands, policy)))
            .collect();
        let value = ranking_value(key, rec.percentage, rec.grand_total_obtained);
        cohort.push((
            TabulationRow {
                student_id: rec.student_id.clone(),
                student_name: student.name.clone(),
                roll_no: roll_of(student, rec),
                section: student.section.clone(),
                subjects,
                total_obtained_marks: rec.grand_total_obtained,
                total_full_marks: rec.grand_total_full,
                percentage: rec.percentage,
                letter_grade: rec.grade_letter.clone(),
                grade_point: rec.grade_point,
                remarks: rec.remarks.clone(),
                class_position: 0,
                merit_position: None,
            },
            value,
        ));
    }

    let rows: Vec<TabulationRow> = rank_competition(cohort)
        .into_iter()
        .map(|ranked| TabulationRow {
            class_position: ranked.position,
            ..ranked.item
        })
        .collect();
    let class_total = subject_totals(rows.iter());
    debug!(class = class_name, rows = rows.len(), "built class tabulation");

    ClassTabulation {
        class_name: class_name.to_string(),
        exam_name: exam_name.to_string(),
        education_year,
        rows,
        class_total,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedTabulation {
    pub ranking_key: RankingKey,
    pub classes: Vec<ClassTabulation>,
    pub grand_total: SubjectTotalsRow,
}

/// Stage 2: merit positions across the union of all classes and grand column
/// totals over the full cohort. Class positions are left untouched.
pub fn combine_tabulations(classes: Vec<ClassTabulation>, key: RankingKey) -> CombinedTabulation {
    let mut classes = classes;
    let cohort: Vec<((usize, usize), f64)> = classes
        .iter()
        .enumerate()
        .flat_map(|(ci, class)| {
            class.rows.iter().enumerate().map(move |(ri, row)| {
                (
                    (ci, ri),
                    ranking_value(key, row.percentage, row.total_obtained_marks),
                )
            })
        })
        .collect();

    for ranked in rank_competition(cohort) {
        let (ci, ri) = ranked.item;
        classes[ci].rows[ri].merit_position = Some(ranked.position);
    }

    let grand_total = subject_totals(classes.iter().flat_map(|c| c.rows.iter()));
    CombinedTabulation {
        ranking_key: key,
        classes,
        grand_total,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamHistoryEntry {
    pub exam_name: String,
    pub exam_date: Option<String>,
    pub obtained_marks: f64,
    pub total_marks: f64,
    pub percentage: f64,
    pub letter_grade: String,
    pub grade_point: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultCard {
    pub student_id: String,
    pub student_name: String,
    pub class_name: String,
    pub class_roll: Option<i64>,
    pub exam_name: String,
    pub exam_date: Option<String>,
    pub subjects: Vec<SubjectCell>,
    pub main_subject_obtained: f64,
    pub main_subject_total: f64,
    pub optional_subject_obtained: f64,
    pub optional_subject_total: f64,
    pub total_obtained_marks: f64,
    pub total_full_marks: f64,
    pub percentage: f64,
    pub average_marks: f64,
    pub letter_grade: String,
    pub grade_point: f64,
    pub remarks: String,
    /// Earlier exams of the same student, oldest first.
    pub history: Vec<ExamHistoryEntry>,
}

fn date_key(d: &Option<String>) -> Option<&str> {
    d.as_deref().map(|s| s.get(..10).unwrap_or(s))
}

fn canonical_rank(code: &str) -> usize {
    CANONICAL_CODES
        .iter()
        .position(|c| *c == code)
        .unwrap_or(CANONICAL_CODES.len())
}

pub fn build_result_card(
    current: &StudentMarksRecord,
    student_records: &[StudentMarksRecord],
    bands: &GradeBandTable,
    policy: &GradingPolicy,
) -> ResultCard {
    let mut subjects: Vec<SubjectCell> = current
        .subjects
        .values()
        .map(|m| subject_cell(m, bands, policy))
        .collect();
    subjects.sort_by_key(|c| canonical_rank(&c.subject_code));

    let current_date = date_key(&current.exam_date);
    let mut prior: Vec<&StudentMarksRecord> = student_records
        .iter()
        .filter(|r| r.student_id == current.student_id && r.exam_name != current.exam_name)
        .filter(|r| match (date_key(&r.exam_date), current_date) {
            (Some(d), Some(cur)) => d <= cur,
            _ => true,
        })
        .collect();
    prior.sort_by(|a, b| date_key(&a.exam_date).cmp(&date_key(&b.exam_date)));

    let history = prior
        .into_iter()
        .map(|r| ExamHistoryEntry {
            exam_name: r.exam_name.clone(),
            exam_date: r.exam_date.clone(),
            obtained_marks: r.grand_total_obtained,
            total_marks: r.grand_total_full,
            percentage: r.percentage,
            letter_grade: r.grade_letter.clone(),
            grade_point: r.grade_point,
        })
        .collect();

    ResultCard {
        student_id: current.student_id.clone(),
        student_name: current.student_name.clone(),
        class_name: current.class_name.clone(),
        class_roll: current.class_roll,
        exam_name: current.exam_name.clone(),
        exam_date: current.exam_date.clone(),
        subjects,
        main_subject_obtained: current.main_subject_obtained,
        main_subject_total: current.main_subject_total,
        optional_subject_obtained: current.optional_subject_obtained,
        optional_subject_total: current.optional_subject_total,
        total_obtained_marks: current.grand_total_obtained,
        total_full_marks: current.grand_total_full,
        percentage: current.percentage,
        average_marks: current.average_marks,
        letter_grade: current.grade_letter.clone(),
        grade_point: current.grade_point,
        remarks: current.remarks.clone(),
        history,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::{compute_student_record, ExamSubmission};
    use crate::subjects::RawSubjectMark;

    fn student(student_id: &str, class: &str, roll: &str) -> Student {
        Student {
            id: format!("id-{student_id}"),
            student_id: student_id.to_string(),
            name: format!("Student {student_id}"),
            roll_no: roll.to_string(),
            student_class: class.to_string(),
            section: None,
            main_subject_count: 3,
            active: true,
        }
    }

    /// A record whose three main subjects and one optional subject all carry
    /// the given totals.
    fn record(s: &Student, exam: &str, date: &str, main: f64, optional: f64) -> StudentMarksRecord {
        let mut subjects: Vec<RawSubjectMark> = ["bn", "en", "ma"]
            .iter()
            .map(|code| RawSubjectMark {
                subject_code: Some(code.to_string()),
                subject_name: None,
                continuous_marks: Some(0.0),
                aggregate_marks: Some(main),
            })
            .collect();
        subjects.push(RawSubjectMark {
            subject_code: Some("art".to_string()),
            subject_name: None,
            continuous_marks: Some(optional),
            aggregate_marks: None,
        });
        compute_student_record(
            s,
            &ExamSubmission {
                exam_name: exam.to_string(),
                exam_date: Some(date.to_string()),
                subjects,
                ..Default::default()
            },
            &GradingPolicy::default(),
            &GradeBandTable::default(),
        )
    }

    fn index(students: &[Student]) -> HashMap<String, Student> {
        students
            .iter()
            .map(|s| (s.student_id.clone(), s.clone()))
            .collect()
    }

    #[test]
    fn merit_list_ranks_with_ties_and_truncates() {
        let studs = vec![
            student("1", "Fifth", "1"),
            student("2", "Fifth", "2"),
            student("3", "Fifth", "3"),
            student("4", "Fifth", "4"),
        ];
        let records = vec![
            record(&studs[0], "Annual", "2025-11-20", 80.0, 40.0),
            record(&studs[1], "Annual", "2025-11-20", 90.0, 40.0),
            record(&studs[2], "Annual", "2025-11-20", 80.0, 40.0),
            record(&studs[3], "Annual", "2025-11-20", 50.0, 10.0),
        ];
        let list = build_merit_list(&records, &index(&studs), RankingKey::Percentage, 3);
        assert_eq!(list.len(), 3);
        let ids: Vec<&str> = list.iter().map(|e| e.student_id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1", "3"]);
        assert_eq!(list.iter().map(|e| e.position).collect::<Vec<_>>(), vec![1, 2, 2]);
        assert_eq!(list.iter().map(|e| e.serial).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(list[0].total_marks, 450.0);
    }

    #[test]
    fn merit_list_skips_unknown_students_and_accepts_empty_input() {
        let known = student("1", "Fifth", "1");
        let ghost = student("9", "Fifth", "9");
        let records = vec![
            record(&known, "Annual", "2025-11-20", 70.0, 30.0),
            record(&ghost, "Annual", "2025-11-20", 99.0, 50.0),
        ];
        let list = build_merit_list(&records, &index(&[known]), RankingKey::Percentage, 10);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].student_id, "1");

        let empty = build_merit_list(&[], &HashMap::new(), RankingKey::Percentage, 10);
        assert!(empty.is_empty());
    }

    #[test]
    fn duplicate_records_keep_latest_update() {
        let s = student("1", "Fifth", "1");
        let mut old = record(&s, "Annual", "2025-11-20", 40.0, 10.0);
        old.updated_at = Some("2025-11-21T00:00:00Z".to_string());
        let mut new = record(&s, "Annual", "2025-11-20", 90.0, 10.0);
        new.updated_at = Some("2025-11-22T00:00:00Z".to_string());
        let list = build_merit_list(&[new, old], &index(&[s]), RankingKey::TotalObtained, 10);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].obtained_marks, 280.0);
    }

    #[test]
    fn class_and_merit_positions_are_independent() {
        let studs = vec![
            student("a1", "Fourth", "1"),
            student("a2", "Fourth", "2"),
            student("b1", "Fifth", "1"),
            student("b2", "Fifth", "2"),
        ];
        let idx = index(&studs);
        let policy = GradingPolicy::default();
        let bands = GradeBandTable::default();
        let fourth = vec![
            record(&studs[0], "Annual", "2025-11-20", 60.0, 20.0),
            record(&studs[1], "Annual", "2025-11-20", 50.0, 20.0),
        ];
        let fifth = vec![
            record(&studs[2], "Annual", "2025-11-20", 90.0, 20.0),
            record(&studs[3], "Annual", "2025-11-20", 60.0, 20.0),
        ];
        let key = RankingKey::TotalObtained;
        let c4 = build_class_tabulation("Fourth", "Annual", &fourth, &idx, &bands, &policy, key);
        let c5 = build_class_tabulation("Fifth", "Annual", &fifth, &idx, &bands, &policy, key);

        assert_eq!(c4.rows[0].student_id, "a1");
        assert_eq!(c4.rows[0].class_position, 1);
        assert_eq!(c4.class_total.subjects["bn"].total_marks, 110.0);
        assert_eq!(c4.class_total.subjects["art"].continuous_marks, 40.0);
        assert_eq!(c4.class_total.subjects["phy"], SubjectColumnTotal::default());
        assert_eq!(c4.class_total.student_count, 2);

        let combined = combine_tabulations(vec![c4, c5], key);
        let merit = |class: usize, row: usize| combined.classes[class].rows[row].merit_position;
        assert_eq!(merit(1, 0), Some(1)); // b1: 290
        assert_eq!(merit(0, 0), Some(2)); // a1: 200, tied with b2
        assert_eq!(merit(1, 1), Some(2));
        assert_eq!(merit(0, 1), Some(4)); // a2: 170
        assert_eq!(combined.classes[1].rows[1].class_position, 2);
        assert_eq!(combined.grand_total.student_count, 4);
        assert_eq!(combined.grand_total.subjects["bn"].total_marks, 260.0);
        assert_eq!(combined.grand_total.total_obtained_marks, 860.0);
    }

    #[test]
    fn subject_cells_grade_against_subject_full_marks() {
        let s = student("1", "Fifth", "1");
        let rec = record(&s, "Annual", "2025-11-20", 75.0, 40.0);
        let tab = build_class_tabulation(
            "Fifth",
            "Annual",
            &[rec],
            &index(&[s]),
            &GradeBandTable::default(),
            &GradingPolicy::default(),
            RankingKey::Percentage,
        );
        let row = &tab.rows[0];
        assert_eq!(row.subjects["bn"].grade, "A");
        assert_eq!(row.subjects["bn"].grade_point, 4.5);
        assert_eq!(row.subjects["art"].full_marks, 50.0);
        assert_eq!(row.subjects["art"].grade, "A+");
        assert_eq!(tab.education_year.as_deref(), Some("2025"));
    }

    #[test]
    fn result_card_lists_prior_exams_oldest_first() {
        let s = student("1", "Fifth", "1");
        let records = vec![
            record(&s, "Annual", "2025-11-20", 80.0, 40.0),
            record(&s, "Half Yearly", "2025-06-15", 60.0, 30.0),
            record(&s, "First Term", "2025-03-10", 50.0, 20.0),
            record(&s, "Next Year Test", "2026-03-01", 90.0, 45.0),
        ];
        let card = build_result_card(
            &records[0],
            &records,
            &GradeBandTable::default(),
            &GradingPolicy::default(),
        );
        let names: Vec<&str> = card.history.iter().map(|h| h.exam_name.as_str()).collect();
        assert_eq!(names, vec!["First Term", "Half Yearly"]);
        let codes: Vec<&str> = card.subjects.iter().map(|c| c.subject_code.as_str()).collect();
        assert_eq!(codes, vec!["bn", "en", "ma", "art"]);
        assert_eq!(card.total_obtained_marks, 280.0);
        assert_eq!(card.subjects[0].subject_name, "বাংলা");
    }
}
