mod test_support;

use serde_json::json;
use test_support::{
    create_student, flat_subjects, open_workspace, request_err_code, request_ok, spawn_sidecar,
};

#[test]
fn result_card_shows_subject_grades_and_prior_exams() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = open_workspace(&mut stdin, &mut reader, "resultd-result-card");
    create_student(&mut stdin, &mut reader, "77", "Tania", "Fifth", 4, 3);

    let exams = [
        ("Annual", "2025-11-20", 80.0),
        ("First Term", "2025-03-10", 50.0),
        ("Half Yearly", "2025-06-15", 60.0),
        ("Next Session Test", "2026-02-01", 95.0),
    ];
    for (i, (exam, date, score)) in exams.iter().enumerate() {
        let mut subjects = flat_subjects(&["bn", "en", "ma"], *score);
        if let Some(list) = subjects.as_array_mut() {
            list.push(json!({ "subjectName": "Arts and Crafts", "continuousMarks": 20, "aggregateMarks": 20 }));
        }
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("save-{i}"),
            "marks.save",
            json!({
                "studentId": "77",
                "examName": exam,
                "examDate": date,
                "subjects": subjects,
            }),
        );
    }

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "card",
        "results.resultCard",
        json!({ "studentId": "77", "examName": "Annual" }),
    );
    let card = &result["card"];
    assert_eq!(card["studentName"].as_str(), Some("Tania"));
    assert_eq!(card["totalObtainedMarks"].as_f64(), Some(280.0));
    assert_eq!(card["totalFullMarks"].as_f64(), Some(450.0));

    let codes: Vec<&str> = card["subjects"]
        .as_array()
        .expect("subjects")
        .iter()
        .filter_map(|s| s["subjectCode"].as_str())
        .collect();
    assert_eq!(codes, vec!["bn", "en", "ma", "art"]);
    let art = &card["subjects"][3];
    assert_eq!(art["fullMarks"].as_f64(), Some(50.0));
    assert_eq!(art["grade"].as_str(), Some("A+"));

    let history: Vec<&str> = card["history"]
        .as_array()
        .expect("history")
        .iter()
        .filter_map(|h| h["examName"].as_str())
        .collect();
    assert_eq!(history, vec!["First Term", "Half Yearly"]);
    assert_eq!(card["history"][0]["obtainedMarks"].as_f64(), Some(190.0));

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "missing",
        "results.resultCard",
        json!({ "studentId": "77", "examName": "Pre-Test" }),
    );
    assert_eq!(code, "not_found");

    let _ = std::fs::remove_dir_all(workspace);
}
