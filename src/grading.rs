use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::calc::{round_off_2_decimals, CalcError};

pub const MAX_GRADE_POINT: f64 = 5.0;

const BOUNDARY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBand {
    pub letter: String,
    /// Grade point awarded at `range_min`.
    pub point_floor: f64,
    pub range_min: f64,
    pub range_max: f64,
    #[serde(default)]
    pub remarks: String,
}

impl GradeBand {
    fn new(letter: &str, point_floor: f64, range_min: f64, range_max: f64, remarks: &str) -> Self {
        Self {
            letter: letter.to_string(),
            point_floor,
            range_min,
            range_max,
            remarks: remarks.to_string(),
        }
    }
}

pub fn default_grade_bands() -> Vec<GradeBand> {
    vec![
        GradeBand::new("F", 0.0, 0.0, 33.0, "Fail"),
        GradeBand::new("D", 1.0, 33.0, 40.0, "Pass"),
        GradeBand::new("C", 2.0, 40.0, 50.0, "Satisfactory"),
        GradeBand::new("B", 3.0, 50.0, 60.0, "Good"),
        GradeBand::new("A-", 3.5, 60.0, 70.0, "Very Good"),
        GradeBand::new("A", 4.0, 70.0, 80.0, "Excellent"),
        GradeBand::new("A+", 5.0, 80.0, 100.0, "Outstanding"),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeOutcome {
    pub letter: String,
    pub grade_point: f64,
    pub remarks: String,
}

/// Read-only band table, sorted by `range_min` ascending.
///
/// Bands are lower-inclusive: a percentage on a shared boundary belongs to the
/// higher band. The top band also takes anything above its `range_max`.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeBandTable {
    bands: Vec<GradeBand>,
}

impl Default for GradeBandTable {
    fn default() -> Self {
        Self {
            bands: default_grade_bands(),
        }
    }
}

impl GradeBandTable {
    pub fn new(mut bands: Vec<GradeBand>) -> Result<Self, CalcError> {
        if bands.is_empty() {
            return Err(CalcError::new("invalid_bands", "grade band table is empty"));
        }
        bands.sort_by(|a, b| a.range_min.total_cmp(&b.range_min));

        for b in &bands {
            if b.letter.trim().is_empty() {
                return Err(CalcError::new("invalid_bands", "band letter must not be empty"));
            }
            if !(b.range_min < b.range_max) {
                return Err(CalcError::new(
                    "invalid_bands",
                    format!("band {} has rangeMin >= rangeMax", b.letter),
                ));
            }
            if !(0.0..=MAX_GRADE_POINT).contains(&b.point_floor) {
                return Err(CalcError::new(
                    "invalid_bands",
                    format!("band {} pointFloor must be within 0..=5", b.letter),
                ));
            }
        }
        let mut letters = HashSet::new();
        for b in &bands {
            if !letters.insert(b.letter.trim()) {
                return Err(CalcError::new(
                    "invalid_bands",
                    format!("band letter {} appears more than once", b.letter),
                )
                .with_details(serde_json::json!({ "letter": b.letter })));
            }
        }
        for pair in bands.windows(2) {
            let (lo, hi) = (&pair[0], &pair[1]);
            if (lo.range_max - hi.range_min).abs() > BOUNDARY_EPSILON {
                return Err(CalcError::new(
                    "invalid_bands",
                    format!("bands {} and {} are not contiguous", lo.letter, hi.letter),
                )
                .with_details(serde_json::json!({
                    "lower": { "letter": lo.letter, "rangeMax": lo.range_max },
                    "upper": { "letter": hi.letter, "rangeMin": hi.range_min },
                })));
            }
            if hi.point_floor < lo.point_floor {
                return Err(CalcError::new(
                    "invalid_bands",
                    format!("band {} has a lower pointFloor than {}", hi.letter, lo.letter),
                ));
            }
        }

        Ok(Self { bands })
    }

    pub fn bands(&self) -> &[GradeBand] {
        &self.bands
    }

    fn locate(&self, percentage: f64) -> Option<usize> {
        if percentage.is_nan() {
            return None;
        }
        let last = self.bands.len() - 1;
        (0..=last).rev().find(|&i| {
            let band = &self.bands[i];
            if percentage < band.range_min {
                return false;
            }
            i == last || percentage < self.bands[i + 1].range_min
        })
    }

    pub fn band_for(&self, percentage: f64) -> Option<&GradeBand> {
        self.locate(percentage).map(|i| &self.bands[i])
    }

    /// Continuous grade point for `percentage`.
    ///
    /// Interpolates linearly from this band's floor towards the next band's
    /// floor across the band's own width. The top band is flat, and so is a
    /// failing band (zero floor).
    pub fn grade_point(&self, percentage: f64) -> f64 {
        let Some(i) = self.locate(percentage) else {
            return 0.0;
        };
        let band = &self.bands[i];
        if band.point_floor <= 0.0 {
            return 0.0;
        }
        let Some(next) = self.bands.get(i + 1) else {
            return band.point_floor.min(MAX_GRADE_POINT);
        };
        let width = band.range_max - band.range_min;
        let gp = band.point_floor
            + ((percentage - band.range_min) / width) * (next.point_floor - band.point_floor);
        round_off_2_decimals(gp).clamp(0.0, MAX_GRADE_POINT)
    }

    pub fn grade(&self, percentage: f64) -> GradeOutcome {
        let band = self.band_for(percentage);
        GradeOutcome {
            letter: band.map(|b| b.letter.clone()).unwrap_or_default(),
            grade_point: self.grade_point(percentage),
            remarks: band.map(|b| b.remarks.clone()).unwrap_or_default(),
        }
    }
}
