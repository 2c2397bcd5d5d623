//! Education level buckets.

use polars::prelude::*;
use std::collections::BTreeMap;

use crate::data::{i64_values, str_values};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EducationBucket {
    HighSchoolOrBelow,
    CollegeOrAbove,
    Unknown,
}

impl EducationBucket {
    pub fn classify(label: &str) -> Self {
        let label = label.trim();
        if label.contains("대학") || label.contains("전문대") {
            return EducationBucket::CollegeOrAbove;
        }
        let school = ["고등학교", "중학교", "초등학교"]
            .iter()
            .any(|prefix| label.starts_with(prefix));
        if school || label == "불취학" {
            EducationBucket::HighSchoolOrBelow
        } else {
            EducationBucket::Unknown
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EducationBucket::HighSchoolOrBelow => "고졸 이하",
            EducationBucket::CollegeOrAbove => "대학 이상",
            EducationBucket::Unknown => "미상/기타",
        }
    }
}

/// Sum counts per bucket. Buckets come back in enum order.
pub fn education_buckets(edu: &DataFrame) -> PolarsResult<Vec<(EducationBucket, i64)>> {
    let labels = str_values(edu, "education")?;
    let counts = i64_values(edu, "count")?;

    let mut totals: BTreeMap<EducationBucket, i64> = BTreeMap::new();
    for (label, count) in labels.iter().zip(counts) {
        *totals.entry(EducationBucket::classify(label)).or_default() += count;
    }
    Ok(totals.into_iter().collect())
}
