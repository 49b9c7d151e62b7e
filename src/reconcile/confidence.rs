// src/reconcile/confidence.rs
use crate::document::models::SegmentType;

/// Additive terms are kept in basis points so that summation is exact
/// and independent of event order.
const BP_PER_UNIT: f64 = 10_000.0;

/// Confidence thresholds for review decisions
pub mod thresholds {
    /// Base confidence for director and shareholding rows.
    pub const TABLE_ROW: f64 = 0.80;

    /// Base confidence for capital-structure rows.
    pub const CAPITAL_ROW: f64 = 0.85;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    /// Where the match was found. Headings earn a small bonus.
    SegmentContext(SegmentType),
    LlmUsed,
    CorroboratingSource,
    HumanEdited,
    MalformedRow,
    /// Explicit human entry or verification. Forces 1.00.
    ManualOverride,
}

impl Adjustment {
    fn delta_bp(&self) -> i64 {
        match self {
            Adjustment::SegmentContext(SegmentType::Heading) => 300,
            Adjustment::SegmentContext(_) => 0,
            Adjustment::LlmUsed => -500,
            Adjustment::CorroboratingSource => 500,
            Adjustment::HumanEdited => 1_000,
            Adjustment::MalformedRow => -1_000,
            Adjustment::ManualOverride => 0,
        }
    }
}

/// Folds a list of adjustment events into a confidence.
/// Additive terms are applied first, then the manual override, then the clamp.
pub fn reduce(base: f64, events: &[Adjustment]) -> f64 {
    let delta: i64 = events.iter().map(Adjustment::delta_bp).sum();
    if events.contains(&Adjustment::ManualOverride) {
        return 1.0;
    }
    clamp(base + delta as f64 / BP_PER_UNIT)
}

/// Clamps to [0, 1] and rounds to four decimals so threshold comparisons
/// are not at the mercy of float drift.
pub fn clamp(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    (value.clamp(0.0, 1.0) * BP_PER_UNIT).round() / BP_PER_UNIT
}

/// The flag form of an adjustment list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdjustmentSet {
    pub segment: Option<SegmentType>,
    pub llm_used: bool,
    pub extra_source_count: usize,
    pub is_manual: bool,
    pub is_human_edited: bool,
    pub malformed: bool,
}

impl AdjustmentSet {
    pub fn events(&self) -> Vec<Adjustment> {
        let mut events = Vec::new();
        if let Some(segment) = self.segment {
            events.push(Adjustment::SegmentContext(segment));
        }
        if self.llm_used {
            events.push(Adjustment::LlmUsed);
        }
        events.extend(std::iter::repeat(Adjustment::CorroboratingSource).take(self.extra_source_count));
        if self.is_human_edited {
            events.push(Adjustment::HumanEdited);
        }
        if self.malformed {
            events.push(Adjustment::MalformedRow);
        }
        if self.is_manual {
            events.push(Adjustment::ManualOverride);
        }
        events
    }
}

pub fn adjust(base: f64, adjustments: &AdjustmentSet) -> f64 {
    reduce(base, &adjustments.events())
}
