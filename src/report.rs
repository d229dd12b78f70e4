use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Report format v1: a right is a line whose trimmed form starts with an
/// integer followed by a period. The pattern is pinned here as the contract
/// with the engine's report generator; bump it together with the generator
/// rather than re-deriving it from formatting heuristics.
static RIGHT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.").expect("right-line pattern is valid"));

/// Amount cell of a report table row: "1,500 ₪" or a range "1,500–3,000 ₪".
static AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,3}(?:,\d{3})*)(?:–|-)?(\d{1,3}(?:,\d{3})*)?\s*₪")
        .expect("amount pattern is valid")
});

/// Extract the enumerable rights from a final report: exactly the trimmed
/// lines matching the v1 right-line format, in source order, duplicates kept.
pub fn extract_rights(report: &str) -> Vec<String> {
    report
        .lines()
        .map(str::trim)
        .filter(|line| RIGHT_LINE.is_match(line))
        .map(str::to_string)
        .collect()
}

/// Estimate the total value of unclaimed benefits listed in the report's
/// table rows. A row counts when it is a table row (contains `|`), carries a
/// ₪ amount, and is marked unrealized (contains "לא"); ranges contribute
/// their upper bound.
pub fn extract_unclaimed_value(report: &str) -> u64 {
    report
        .lines()
        .filter(|line| line.contains('|') && line.contains('₪') && line.contains("לא"))
        .filter_map(|line| {
            let caps = AMOUNT.captures(line)?;
            let low = parse_amount(caps.get(1)?.as_str())?;
            match caps.get(2) {
                Some(high) => parse_amount(high.as_str()),
                None => Some(low),
            }
        })
        .sum()
}

fn parse_amount(raw: &str) -> Option<u64> {
    raw.replace(',', "").parse().ok()
}

/// Contact details captured on the report page. Free text, never validated,
/// never transmitted anywhere; logging them is the whole feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
}
