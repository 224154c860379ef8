use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::GradingPolicy;
use crate::grading::GradeBandTable;
use crate::subjects::{classify_subjects, resolve_subject_marks, RawSubjectMark, SubjectMark};

/// Half-up 2-decimal rounding: `Int(100*x + 0.5) / 100`.
///
/// The 1e-9 nudge keeps values such as 1.005, stored as 1.00499.., on the
/// upper side.
pub fn round_off_2_decimals(x: f64) -> f64 {
    ((100.0 * x) + 0.5 + 1e-9).floor() / 100.0
}

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl std::fmt::Display for CalcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CalcError {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub student_id: String,
    pub name: String,
    pub roll_no: String,
    pub student_class: String,
    pub section: Option<String>,
    pub main_subject_count: usize,
    pub active: bool,
}

/// One exam's marks as submitted for a student.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamSubmission {
    pub exam_name: String,
    #[serde(default)]
    pub exam_date: Option<String>,
    #[serde(default)]
    pub education_year: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub class_roll: Option<i64>,
    #[serde(default)]
    pub subjects: Vec<RawSubjectMark>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkTotals {
    /// Main subjects that counted, best first.
    pub counted_main: Vec<String>,
    /// Optional subjects that counted, best first.
    pub counted_optional: Vec<String>,
    pub main_subject_obtained: f64,
    pub main_subject_total: f64,
    pub optional_subject_obtained: f64,
    pub optional_subject_total: f64,
    pub grand_total_obtained: f64,
    pub grand_total_full: f64,
    pub percentage: f64,
    pub average_marks: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentMarksRecord {
    /// Storage id; `None` until the record has been persisted.
    #[serde(default)]
    pub id: Option<String>,
    pub student_id: String,
    pub student_name: String,
    pub class_name: String,
    pub class_roll: Option<i64>,
    pub exam_name: String,
    pub exam_date: Option<String>,
    pub education_year: Option<String>,
    pub subjects: BTreeMap<String, SubjectMark>,
    pub main_subject_obtained: f64,
    pub main_subject_total: f64,
    pub optional_subject_obtained: f64,
    pub optional_subject_total: f64,
    pub grand_total_obtained: f64,
    pub grand_total_full: f64,
    pub percentage: f64,
    pub average_marks: f64,
    pub grade_point: f64,
    pub grade_letter: String,
    pub remarks: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

fn sorted_desc<'a>(mut marks: Vec<&'a SubjectMark>) -> Vec<&'a SubjectMark> {
    // Stable: equal totals keep code order.
    marks.sort_by(|a, b| b.total.total_cmp(&a.total));
    marks
}

/// Pure aggregation of resolved subject marks.
///
/// Only the best `main_subject_count` main subjects count; surplus main
/// subjects are ignored rather than moved to optional. Optional subjects
/// contribute their best `policy.optional_slots` totals; empty slots count 0.
pub fn aggregate_marks(
    main_subject_count: usize,
    subjects: &BTreeMap<String, SubjectMark>,
    policy: &GradingPolicy,
) -> MarkTotals {
    let (main, optional) = classify_subjects(subjects, policy);

    let counted_main: Vec<&SubjectMark> = sorted_desc(main)
        .into_iter()
        .take(main_subject_count)
        .collect();
    let main_subject_obtained: f64 = counted_main.iter().map(|m| m.total).sum();
    let main_subject_total = main_subject_count as f64 * policy.main_full_marks;

    let counted_optional: Vec<&SubjectMark> = sorted_desc(optional)
        .into_iter()
        .take(policy.optional_slots)
        .collect();
    // Unfilled slots score zero, so they add nothing to the sum.
    let optional_subject_obtained: f64 = counted_optional.iter().map(|m| m.total).sum();
    let optional_subject_total = policy.optional_subject_total();

    debug!(
        main = ?counted_main.iter().map(|m| (&m.subject_code, m.total)).collect::<Vec<_>>(),
        optional = ?counted_optional.iter().map(|m| (&m.subject_code, m.total)).collect::<Vec<_>>(),
        "selected counted subjects"
    );

    let grand_total_obtained = main_subject_obtained + optional_subject_obtained;
    let grand_total_full = main_subject_total + optional_subject_total;
    let percentage = if grand_total_full > 0.0 {
        round_off_2_decimals(grand_total_obtained / grand_total_full * 100.0)
    } else {
        0.0
    };
    let average_marks = if main_subject_count > 0 {
        round_off_2_decimals(main_subject_obtained / main_subject_count as f64)
    } else {
        0.0
    };

    MarkTotals {
        counted_main: counted_main.iter().map(|m| m.subject_code.clone()).collect(),
        counted_optional: counted_optional
            .iter()
            .map(|m| m.subject_code.clone())
            .collect(),
        main_subject_obtained,
        main_subject_total,
        optional_subject_obtained,
        optional_subject_total,
        grand_total_obtained,
        grand_total_full,
        percentage,
        average_marks,
    }
}

struct RecordHeader {
    id: Option<String>,
    student_id: String,
    student_name: String,
    class_name: String,
    class_roll: Option<i64>,
    exam_name: String,
    exam_date: Option<String>,
    education_year: Option<String>,
    created_at: Option<String>,
}

fn assemble_record(
    header: RecordHeader,
    main_subject_count: usize,
    subjects: BTreeMap<String, SubjectMark>,
    policy: &GradingPolicy,
    bands: &GradeBandTable,
) -> StudentMarksRecord {
    let totals = aggregate_marks(main_subject_count, &subjects, policy);
    let grade = bands.grade(totals.percentage);

    info!(
        student_id = %header.student_id,
        exam = %header.exam_name,
        main = %format!("{}/{}", totals.main_subject_obtained, totals.main_subject_total),
        optional = %format!("{}/{}", totals.optional_subject_obtained, totals.optional_subject_total),
        total = %format!("{}/{}", totals.grand_total_obtained, totals.grand_total_full),
        percentage = totals.percentage,
        grade = %grade.letter,
        grade_point = grade.grade_point,
        "computed exam result"
    );

    StudentMarksRecord {
        id: header.id,
        student_id: header.student_id,
        student_name: header.student_name,
        class_name: header.class_name,
        class_roll: header.class_roll,
        exam_name: header.exam_name,
        exam_date: header.exam_date,
        education_year: header.education_year,
        subjects,
        main_subject_obtained: totals.main_subject_obtained,
        main_subject_total: totals.main_subject_total,
        optional_subject_obtained: totals.optional_subject_obtained,
        optional_subject_total: totals.optional_subject_total,
        grand_total_obtained: totals.grand_total_obtained,
        grand_total_full: totals.grand_total_full,
        percentage: totals.percentage,
        average_marks: totals.average_marks,
        grade_point: grade.grade_point,
        grade_letter: grade.letter,
        remarks: grade.remarks,
        created_at: header.created_at,
        updated_at: None,
    }
}

/// Education year of an ISO exam date ("2025-11-20" or an RFC 3339 stamp).
pub fn education_year_of(exam_date: &str) -> Option<String> {
    let head = exam_date.trim().get(..10)?;
    chrono::NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .ok()
        .map(|d| chrono::Datelike::year(&d).to_string())
}

/// Full pass from a raw submission to a graded record (timestamps unset).
pub fn compute_student_record(
    student: &Student,
    submission: &ExamSubmission,
    policy: &GradingPolicy,
    bands: &GradeBandTable,
) -> StudentMarksRecord {
    let subjects = resolve_subject_marks(&submission.subjects);
    let class_name = submission
        .class_name
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(student.student_class.as_str())
        .to_string();
    let class_roll = submission
        .class_roll
        .or_else(|| student.roll_no.trim().parse::<i64>().ok());
    let education_year = submission
        .education_year
        .clone()
        .or_else(|| submission.exam_date.as_deref().and_then(education_year_of));

    assemble_record(
        RecordHeader {
            id: None,
            student_id: student.student_id.clone(),
            student_name: student.name.clone(),
            class_name,
            class_roll,
            exam_name: submission.exam_name.trim().to_string(),
            exam_date: submission.exam_date.clone(),
            education_year,
            created_at: None,
        },
        student.main_subject_count,
        subjects,
        policy,
        bands,
    )
}

/// Recompute a stored record from its stored subject marks, e.g. after the
/// band table or policy changed. Identity and `created_at` are preserved.
pub fn recompute_record(
    existing: &StudentMarksRecord,
    main_subject_count: usize,
    policy: &GradingPolicy,
    bands: &GradeBandTable,
) -> StudentMarksRecord {
    assemble_record(
        RecordHeader {
            id: existing.id.clone(),
            student_id: existing.student_id.clone(),
            student_name: existing.student_name.clone(),
            class_name: existing.class_name.clone(),
            class_roll: existing.class_roll,
            exam_name: existing.exam_name.clone(),
            exam_date: existing.exam_date.clone(),
            education_year: existing.education_year.clone(),
            created_at: existing.created_at.clone(),
        },
        main_subject_count,
        existing.subjects.clone(),
        policy,
        bands,
    )
}
