// src/extractors/patterns.rs

// --- Imports ---
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::document::models::{DocType, SegmentType};

// --- Constants ---
/// Bumped whenever a rule, base confidence or scope changes.
pub const PATTERN_LIBRARY_VERSION: u32 = 4;

pub mod field_names {
    pub const COMPANY_NAME: &str = "company_name";
    pub const CIN: &str = "cin";
    pub const COMPANY_TYPE: &str = "company_type";
    pub const DATE_OF_INCORPORATION: &str = "date_of_incorporation";
    pub const REGISTERED_OFFICE_ADDRESS: &str = "registered_office_address";
    pub const AUTHORIZED_SHARE_CAPITAL: &str = "authorized_share_capital";
    pub const MAIN_OBJECTS: &str = "main_objects";
    pub const INCLUSIVENESS_POLICY: &str = "inclusiveness_policy";
    pub const MOA_AOA_PRESENT: &str = "moa_aoa_present";
    pub const BOARD_LIST: &str = "board_list";
    pub const SHAREHOLDING_SCHEDULE: &str = "shareholding_schedule";
    pub const CAPITAL_STRUCTURE: &str = "capital_structure";
}

/// Fields whose absence is raised as `CriticalFieldMissing`.
pub const CRITICAL_FIELDS: &[&str] = &[field_names::COMPANY_NAME, field_names::CIN, field_names::COMPANY_TYPE];

/// Longest company name accepted by the extractor and the validator.
pub const MAX_COMPANY_NAME_CHARS: usize = 100;

/// Presence marker emitted for every MoA/AoA document.
pub const MOA_PRESENT_CONFIDENCE: f64 = 0.95;

const COI_AND_MOA: &[DocType] = &[DocType::CertificateOfIncorporation, DocType::MoaAoa];
const COI_ONLY: &[DocType] = &[DocType::CertificateOfIncorporation];
const MOA_ONLY: &[DocType] = &[DocType::MoaAoa];

static CIN_FORMAT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[UL]\d{5}[A-Z]{2}\d{4}[A-Z]{3}\d{6}$").expect("Failed to compile CIN_FORMAT_RE")
});

/// True for a 21-character Corporate Identity Number.
pub fn is_valid_cin(value: &str) -> bool {
    value.len() == 21 && CIN_FORMAT_RE.is_match(value)
}

// --- Data Structures ---

/// Which segments a rule is allowed to look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContextScope {
    Heading,
    Paragraph,
    Table,
    AnchorProximity,
}

impl ContextScope {
    pub fn applies_to(&self, segment_type: SegmentType) -> bool {
        match self {
            ContextScope::Heading => segment_type == SegmentType::Heading,
            ContextScope::Paragraph => segment_type != SegmentType::Table,
            ContextScope::Table => segment_type == SegmentType::Table,
            ContextScope::AnchorProximity => true,
        }
    }
}

/// How a field's matched text becomes a candidate value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    CompanyName,
    CompanyType,
    Cin,
    Date,
    Amount,
}

#[derive(Debug)]
pub enum Matcher {
    /// Capture group 1 is the value.
    Pattern(Regex),
    /// Case-insensitive anchor phrase; the value is the rest of the anchor
    /// line plus a look-ahead window of following lines.
    Anchor(&'static str),
}

#[derive(Debug)]
pub struct PatternRule {
    pub id: &'static str,
    pub matcher: Matcher,
    pub base_confidence: f64,
    pub scope: ContextScope,
}

#[derive(Debug)]
pub struct FieldRules {
    pub field_name: &'static str,
    pub doc_types: &'static [DocType],
    pub kind: ValueKind,
    /// Tried in declaration order.
    pub rules: Vec<PatternRule>,
}

impl FieldRules {
    /// `Unknown` documents are scanned with every rule.
    pub fn applies_to(&self, doc_type: DocType) -> bool {
        doc_type == DocType::Unknown || self.doc_types.contains(&doc_type)
    }
}

fn pattern(id: &'static str, re: &str, base_confidence: f64, scope: ContextScope) -> PatternRule {
    PatternRule {
        id,
        matcher: Matcher::Pattern(Regex::new(re).unwrap_or_else(|e| panic!("Failed to compile pattern {}: {}", id, e))),
        base_confidence,
        scope,
    }
}

fn anchor(id: &'static str, phrase: &'static str, base_confidence: f64) -> PatternRule {
    PatternRule { id, matcher: Matcher::Anchor(phrase), base_confidence, scope: ContextScope::AnchorProximity }
}

// Shared fragments
const CIN_TOKEN: &str = r"\b([UL]\d{5}[A-Z]{2}\d{4}[A-Z]{3}\d{6})\b";
const COMPANY_NAME_LABEL: &str =
    r#"(?i)(?:name\s+of\s+the\s+company|company\s+name)\s*(?:is|:|-)?\s*["“]?([^"”\n]+?)["”]?\s*\.?\s*(?:\n|$)"#;
const COMPANY_SUFFIX: &str = r"(?:private\s+limited|pvt\.?\s*ltd\.?|limited|ltd\.?)";
const MONTH_NAME: &str =
    r"(?:jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\b";
static DATE_FRAGMENT: Lazy<String> = Lazy::new(|| {
    format!(r"(\d{{1,2}}(?:st|nd|rd|th)?(?:\s+day\s+of)?\s+{}\.?,?\s+\d{{4}}|\d{{1,2}}[/-]\d{{1,2}}[/-]\d{{4}})", MONTH_NAME)
});

// --- Rule Table (Lazy Static) ---
pub static PATTERN_LIBRARY: Lazy<Vec<FieldRules>> = Lazy::new(|| {
    use field_names::*;
    use ContextScope::{Heading, Paragraph, Table};

    vec![
        FieldRules {
            field_name: COMPANY_NAME,
            doc_types: COI_AND_MOA,
            kind: ValueKind::CompanyName,
            rules: vec![
                pattern(
                    "company_name.heading",
                    &format!(r"(?i)^\s*(?:(?:memorandum|articles)\s+of\s+association\s+of\s+)?(?:m/s\.?\s+)?([a-z0-9][a-z0-9&.,()' -]*?\s{})\s*$", COMPANY_SUFFIX),
                    0.90,
                    Heading,
                ),
                pattern(
                    "company_name.certify",
                    &format!(r"(?i)hereby\s+certify\s+that\s+(.+?\s{})(?:[\s.,]|$)", COMPANY_SUFFIX),
                    0.90,
                    Paragraph,
                ),
                pattern("company_name.label", COMPANY_NAME_LABEL, 0.85, Paragraph),
                pattern("company_name.table", COMPANY_NAME_LABEL, 0.85, Table),
            ],
        },
        FieldRules {
            field_name: CIN,
            doc_types: COI_AND_MOA,
            kind: ValueKind::Cin,
            rules: vec![
                pattern("cin.strict", CIN_TOKEN, 0.95, Paragraph),
                pattern("cin.table", CIN_TOKEN, 0.95, Table),
                // Near misses (OCR slips, truncation) are kept as weak evidence.
                pattern(
                    "cin.labelled",
                    r"(?i)\b(?:CIN|corporate\s+identity\s+number)\b\s*(?:no\.?|number)?\s*(?:is)?\s*[:\-]?\s*([A-Z0-9]{5,30})\b",
                    0.40,
                    Paragraph,
                ),
            ],
        },
        FieldRules {
            field_name: COMPANY_TYPE,
            doc_types: COI_AND_MOA,
            kind: ValueKind::CompanyType,
            rules: vec![
                pattern(
                    "company_type.label",
                    r"(?i)(?:type|class)\s+of\s+company\s*[:\-]?\s*([a-z][a-z ]*?)\s*(?:\n|[.,;]|$)",
                    0.85,
                    Paragraph,
                ),
                pattern(
                    "company_type.keyword",
                    r"(?i)\b(one\s+person\s+company|private\s+limited|public\s+limited|limited\s+by\s+guarantee|unlimited\s+company)\b",
                    0.85,
                    Paragraph,
                ),
            ],
        },
        FieldRules {
            field_name: DATE_OF_INCORPORATION,
            doc_types: COI_ONLY,
            kind: ValueKind::Date,
            rules: vec![
                pattern(
                    "date_of_incorporation.incorporated_on",
                    &format!(r"(?i)incorporated\s+(?:on\s+)?(?:this\s+)?{}", *DATE_FRAGMENT),
                    0.90,
                    Paragraph,
                ),
                pattern(
                    "date_of_incorporation.label",
                    &format!(r"(?i)date\s+of\s+incorporation\s*[:\-]?\s*{}", *DATE_FRAGMENT),
                    0.90,
                    Paragraph,
                ),
                pattern("date_of_incorporation.any", &format!(r"(?i)\b{}", *DATE_FRAGMENT), 0.60, Paragraph),
            ],
        },
        FieldRules {
            field_name: REGISTERED_OFFICE_ADDRESS,
            doc_types: COI_AND_MOA,
            kind: ValueKind::Text,
            rules: vec![anchor("registered_office_address.anchor", "registered office", 0.80)],
        },
        FieldRules {
            field_name: AUTHORIZED_SHARE_CAPITAL,
            doc_types: MOA_ONLY,
            kind: ValueKind::Amount,
            rules: vec![
                pattern(
                    "authorized_share_capital.rupees",
                    r"(?i)authori[sz]ed\s+(?:share\s+)?capital[^\n]{0,60}?((?:rs\.?|inr|₹)\s*[\d,]+(?:\.\d+)?(?:\s*/-)?(?:\s*(?:lakhs?|lacs?|crores?))?)",
                    0.85,
                    Paragraph,
                ),
                pattern(
                    "authorized_share_capital.units",
                    r"(?i)authori[sz]ed\s+(?:share\s+)?capital[^\n]{0,60}?\b((?:one|two|three|four|five|six|seven|eight|nine|ten|\d+(?:\.\d+)?)\s+(?:lakhs?|lacs?|crores?))",
                    0.80,
                    Paragraph,
                ),
            ],
        },
        FieldRules {
            field_name: MAIN_OBJECTS,
            doc_types: MOA_ONLY,
            kind: ValueKind::Text,
            rules: vec![
                anchor("main_objects.main", "main objects", 0.90),
                anchor("main_objects.pursued", "objects to be pursued", 0.90),
                anchor("main_objects.of_company", "objects of the company", 0.85),
            ],
        },
        FieldRules {
            field_name: INCLUSIVENESS_POLICY,
            doc_types: MOA_ONLY,
            kind: ValueKind::Text,
            rules: vec![
                anchor("inclusiveness_policy.open", "membership shall be open", 0.75),
                anchor("inclusiveness_policy.admission", "admission of members", 0.75),
                anchor("inclusiveness_policy.eligible", "eligible to become members", 0.70),
            ],
        },
    ]
});

/// Field rule sets applicable to a document type, in library order.
pub fn rules_for(doc_type: DocType) -> impl Iterator<Item = &'static FieldRules> {
    PATTERN_LIBRARY.iter().filter(move |f| f.applies_to(doc_type))
}
