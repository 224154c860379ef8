//! Subject code resolution and main/optional classification.
//!
//! Raw submissions arrive as numeric ids ("5"), prefixed ids ("subj_5"),
//! canonical short codes ("bwp"), or Bengali/transliterated/English names.
//! Everything is normalised to one of twelve canonical codes; anything that
//! cannot be resolved is dropped (with a warning) before aggregation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::config::GradingPolicy;

/// Canonical codes in numeric-id order: `"1"`/`"subj_1"` is `bn`, and so on.
pub const CANONICAL_CODES: [&str; 12] = [
    "bn", "en", "ma", "sc", "bwp", "ism", "hin", "sss", "mus", "art", "fa", "phy",
];

const DISPLAY_NAMES: [(&str, &str); 12] = [
    ("bn", "বাংলা"),
    ("en", "ইংরেজি"),
    ("ma", "গণিত"),
    ("sc", "বিজ্ঞান"),
    ("bwp", "বাংলাদেশ ও বিশ্ব পরিচয়"),
    ("ism", "ইসলাম ধর্ম শিক্ষা"),
    ("hin", "হিন্দু ধর্ম শিক্ষা"),
    ("sss", "সমন্বিত সামাজিক বিজ্ঞান"),
    ("mus", "সংগীত ও শারীরিক শিক্ষা"),
    ("art", "চারু ও কারুকলা"),
    ("fa", "শিল্পকলা"),
    ("phy", "শারীরিক শিক্ষা ও মানসিক স্বাস্থ্য সুরক্ষা"),
];

/// One keyword rule. The rule matches when every fragment of at least one
/// group occurs in the input and no `exclude` fragment does.
struct SubjectRule {
    code: &'static str,
    groups: &'static [&'static [&'static str]],
    exclude: &'static [&'static str],
}

// Order matters: several names contain another subject's keyword
// ("বাংলাদেশ" ⊃ "বাংলা", "social science" ⊃ "science", "fine art" ⊃ "art",
// the music name ⊃ "শারীরিক").
const SUBJECT_RULES: &[SubjectRule] = &[
    SubjectRule {
        code: "bwp",
        groups: &[
            &["বিশ্ব", "পরিচয়"],
            &["বিশ্বপরিচয়"],
            &["বাংলাদেশ"],
            &["bwp"],
            &["bishwo"],
            &["porichoy"],
            &["bangladesh"],
            &["global studies"],
        ],
        exclude: &[],
    },
    SubjectRule {
        code: "bn",
        groups: &[&["বাংলা"], &["bangla"], &["bengali"]],
        exclude: &[],
    },
    SubjectRule {
        code: "en",
        groups: &[&["ইংরেজি"], &["english"], &["ingreji"]],
        exclude: &[],
    },
    SubjectRule {
        code: "ma",
        groups: &[&["গণিত"], &["math"], &["gonit"]],
        exclude: &[],
    },
    SubjectRule {
        code: "sss",
        groups: &[&["সামাজিক"], &["social"], &["somajik"]],
        exclude: &[],
    },
    SubjectRule {
        code: "sc",
        groups: &[&["বিজ্ঞান"], &["science"], &["biggan"]],
        exclude: &["সামাজিক", "social"],
    },
    SubjectRule {
        code: "ism",
        groups: &[&["ইসলাম"], &["islam"]],
        exclude: &[],
    },
    SubjectRule {
        code: "hin",
        groups: &[&["হিন্দু"], &["hindu"]],
        exclude: &[],
    },
    SubjectRule {
        code: "mus",
        groups: &[&["সংগীত"], &["music"], &["sangeet"]],
        exclude: &[],
    },
    SubjectRule {
        code: "fa",
        groups: &[&["শিল্প"], &["fine art"], &["shilpo"]],
        exclude: &[],
    },
    SubjectRule {
        code: "art",
        groups: &[&["চারু"], &["কারুকলা"], &["art"], &["charu"]],
        exclude: &[],
    },
    SubjectRule {
        code: "phy",
        groups: &[&["শারীরিক"], &["physical"], &["sharirik"]],
        exclude: &[],
    },
];

impl SubjectRule {
    fn matches(&self, input: &str) -> bool {
        if self.exclude.iter().any(|x| input.contains(x)) {
            return false;
        }
        self.groups
            .iter()
            .any(|group| group.iter().all(|fragment| input.contains(fragment)))
    }
}

/// Resolve a raw subject identifier to its canonical code.
///
/// `None` means the input is not a known subject; callers skip it.
pub fn resolve_subject_code(raw: &str) -> Option<&'static str> {
    // Precomposed য় (U+09DF) and য + nukta are both typed in the wild.
    let input = raw
        .trim()
        .to_lowercase()
        .replace('\u{09DF}', "\u{09AF}\u{09BC}");
    if input.is_empty() {
        return None;
    }

    let numeric = input.strip_prefix("subj_").unwrap_or(&input);
    if let Ok(n) = numeric.parse::<usize>() {
        if (1..=CANONICAL_CODES.len()).contains(&n) && !numeric.starts_with('+') {
            return Some(CANONICAL_CODES[n - 1]);
        }
    }

    if let Some(code) = CANONICAL_CODES.iter().find(|c| **c == input) {
        return Some(*code);
    }

    SUBJECT_RULES
        .iter()
        .find(|rule| rule.matches(&input))
        .map(|rule| rule.code)
}

pub fn subject_display_name(code: &str) -> &'static str {
    DISPLAY_NAMES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
        .unwrap_or("")
}

/// A subject entry as submitted, before resolution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSubjectMark {
    #[serde(default)]
    pub subject_code: Option<String>,
    #[serde(default)]
    pub subject_name: Option<String>,
    #[serde(default)]
    pub continuous_marks: Option<f64>,
    #[serde(default)]
    pub aggregate_marks: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectMark {
    pub subject_code: String,
    pub continuous_marks: f64,
    pub aggregate_marks: f64,
    pub total: f64,
}

impl SubjectMark {
    pub fn new(subject_code: &str, continuous_marks: f64, aggregate_marks: f64) -> Self {
        let continuous_marks = continuous_marks.max(0.0);
        let aggregate_marks = aggregate_marks.max(0.0);
        Self {
            subject_code: subject_code.to_string(),
            continuous_marks,
            aggregate_marks,
            total: continuous_marks + aggregate_marks,
        }
    }
}

fn resolve_raw(raw: &RawSubjectMark) -> Option<&'static str> {
    let from_code = raw
        .subject_code
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .and_then(resolve_subject_code);
    from_code.or_else(|| {
        raw.subject_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .and_then(resolve_subject_code)
    })
}

/// Resolve every submitted subject and compute its total.
///
/// Entries with neither component present are not subjects the student sat;
/// unresolvable entries are logged and dropped. A repeated code keeps the
/// last submission.
pub fn resolve_subject_marks(raw: &[RawSubjectMark]) -> BTreeMap<String, SubjectMark> {
    let mut out: BTreeMap<String, SubjectMark> = BTreeMap::new();
    for entry in raw {
        let Some(code) = resolve_raw(entry) else {
            warn!(
                subject_code = entry.subject_code.as_deref().unwrap_or(""),
                subject_name = entry.subject_name.as_deref().unwrap_or(""),
                "skipping subject with unmappable code"
            );
            continue;
        };
        if entry.continuous_marks.is_none() && entry.aggregate_marks.is_none() {
            debug!(code, "subject has no marks; not counted");
            continue;
        }
        let mark = SubjectMark::new(
            code,
            entry.continuous_marks.unwrap_or(0.0),
            entry.aggregate_marks.unwrap_or(0.0),
        );
        if out.insert(code.to_string(), mark).is_some() {
            warn!(code, "subject submitted more than once; keeping the last entry");
        }
    }
    out
}

/// Split resolved marks into (main, optional) per `policy`.
pub fn classify_subjects<'a>(
    subjects: &'a BTreeMap<String, SubjectMark>,
    policy: &GradingPolicy,
) -> (Vec<&'a SubjectMark>, Vec<&'a SubjectMark>) {
    subjects
        .values()
        .partition(|mark| policy.is_main(&mark.subject_code))
}
