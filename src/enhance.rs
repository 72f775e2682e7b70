//! Metadata overlay for parsed records. Pure field assignment: no
//! validation, no reordering, no row drops.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::records::{Difficulty, EnhancedRecord, QuizRecord};

/// Override maps applied by [`enhance`]. Every field is optional; an
/// omitted map leaves its column at the schema default. Positional maps
/// are keyed by 0-based record position.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhanceOptions {
    pub tag_mapping: Option<HashMap<String, String>>,
    pub chapter_no: Option<String>,
    pub chapter_title: Option<String>,
    pub difficulty_levels: Option<HashMap<usize, Difficulty>>,
    pub time_estimates: Option<HashMap<usize, u32>>,
}

/// Overlay `options` onto a copy of `records`.
///
/// Chapter values overwrite uniformly. A tag mapping rewrites `tag` only
/// for topics it actually contains; other records keep their tag. Rows
/// come back in input order, one output per input, always.
pub fn enhance(records: &[QuizRecord], options: &EnhanceOptions) -> Vec<EnhancedRecord> {
    records
        .iter()
        .cloned()
        .enumerate()
        .map(|(position, record)| {
            let mut enhanced = EnhancedRecord::from(record);
            if let Some(no) = &options.chapter_no {
                enhanced.record.chapter_no = no.clone();
            }
            if let Some(title) = &options.chapter_title {
                enhanced.record.chapter_title = title.clone();
            }
            if let Some(mapping) = &options.tag_mapping {
                if let Some(tag) = mapping.get(&enhanced.record.topic) {
                    enhanced.record.tag = tag.clone();
                }
            }
            if let Some(levels) = &options.difficulty_levels {
                if let Some(level) = levels.get(&position) {
                    enhanced.difficulty = *level;
                }
            }
            if let Some(estimates) = &options.time_estimates {
                if let Some(seconds) = estimates.get(&position) {
                    enhanced.time_estimate = *seconds;
                }
            }
            enhanced
        })
        .collect()
}

// ── Tests ──────────────────────────────────────────────────────────
