use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Keys closer than this are ties.
pub const TIE_EPSILON: f64 = 0.001;

/// Which stored value orders a cohort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RankingKey {
    Percentage,
    TotalObtained,
}

impl RankingKey {
    pub fn as_str(self) -> &'static str {
        match self {
            RankingKey::Percentage => "percentage",
            RankingKey::TotalObtained => "totalObtained",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "percentage" => Some(RankingKey::Percentage),
            "totalobtained" | "total" => Some(RankingKey::TotalObtained),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedEntry<T> {
    pub item: T,
    pub key: f64,
    pub position: usize,
}

/// Competition ranking ("1224"): sort by key descending and give tied entries
/// the position of the entry before them; the next distinct key takes its own
/// 1-based index, leaving a gap.
///
/// Ties are judged against the immediately preceding entry only. The sort is
/// stable, so equal keys keep their input order.
pub fn rank_competition<T>(cohort: Vec<(T, f64)>) -> Vec<RankedEntry<T>> {
    let mut sorted = cohort;
    sorted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    let mut out: Vec<RankedEntry<T>> = Vec::with_capacity(sorted.len());
    for (idx, (item, key)) in sorted.into_iter().enumerate() {
        let position = match out.last() {
            Some(prev) if (key - prev.key).abs() <= TIE_EPSILON => prev.position,
            _ => idx + 1,
        };
        out.push(RankedEntry {
            item,
            key,
            position,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positions(keys: &[f64]) -> Vec<usize> {
        let cohort = keys.iter().enumerate().map(|(i, k)| (i, *k)).collect();
        rank_competition(cohort)
            .into_iter()
            .map(|e| e.position)
            .collect()
    }

    #[test]
    fn ties_share_and_leave_gaps() {
        assert_eq!(positions(&[90.0, 90.0, 80.0]), vec![1, 1, 3]);
        assert_eq!(positions(&[90.0, 85.0, 85.0, 70.0]), vec![1, 2, 2, 4]);
    }

    #[test]
    fn unsorted_input_is_ordered_descending() {
        let ranked = rank_competition(vec![("c", 70.0), ("a", 90.0), ("b", 85.0)]);
        let items: Vec<&str> = ranked.iter().map(|e| e.item).collect();
        assert_eq!(items, vec!["a", "b", "c"]);
        assert_eq!(
            ranked.iter().map(|e| e.position).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn near_equal_keys_tie_within_epsilon() {
        assert_eq!(positions(&[80.0, 79.9995, 79.99]), vec![1, 1, 3]);
    }

    #[test]
    fn equal_keys_keep_input_order() {
        let ranked = rank_competition(vec![("first", 50.0), ("second", 50.0)]);
        assert_eq!(ranked[0].item, "first");
        assert_eq!(ranked[1].item, "second");
    }

    #[test]
    fn empty_cohort_ranks_to_empty() {
        assert!(rank_competition::<()>(Vec::new()).is_empty());
    }

    #[test]
    fn parse_ranking_key() {
        assert_eq!(RankingKey::parse("Percentage"), Some(RankingKey::Percentage));
        assert_eq!(RankingKey::parse("totalObtained"), Some(RankingKey::TotalObtained));
        assert_eq!(RankingKey::parse("gpa"), None);
    }
}
