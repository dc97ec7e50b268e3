//! Parser for the semi-structured holdings table.
//!
//! Two strategies are tried in order. Header labels locate the code, name and
//! weight columns when the table has a `<thead>`. Any column the headers do
//! not reveal is found per row from cell content instead: a bare six digit
//! cell is the code, a percent cell is the weight and the first remaining
//! cell is the name.

use super::snapshot::{Holding, MAX_HOLDINGS};
use super::text::strip_tags;
use regex::Regex;
use std::sync::LazyLock;

static HEADER_ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<thead.*?<tr.*?</tr>.*?</thead>").expect("header row regex")
});
static HEADER_CELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<th(?:\s[^>]*)?>(.*?)</th>").expect("header cell regex"));
static BODY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<tbody.*?</tbody>").expect("body regex"));
static ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<tr.*?</tr>").expect("row regex"));
static CELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<td(?:\s[^>]*)?>(.*?)</td>").expect("cell regex"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex"));
static SIX_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{6})").expect("code regex"));
static EXACT_SIX_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{6}$").expect("exact code regex"));
static PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?\s*%").expect("percent regex"));
static PERCENT_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\d.]+)\s*%").expect("percent value regex"));

const CODE_LABELS: [&str; 2] = ["股票代码", "证券代码"];
const NAME_LABELS: [&str; 2] = ["股票名称", "证券名称"];
const WEIGHT_LABELS: [&str; 2] = ["占净值比例", "占比"];

/// Column positions discovered from header labels.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Columns {
    pub code: Option<usize>,
    pub name: Option<usize>,
    pub weight: Option<usize>,
}

fn matches_any(label: &str, candidates: &[&str]) -> bool {
    candidates.iter().any(|c| label.contains(c))
}

pub fn detect_columns(html: &str) -> Columns {
    let mut columns = Columns::default();
    let Some(header) = HEADER_ROW.find(html) else {
        return columns;
    };

    for (i, cell) in HEADER_CELL.captures_iter(header.as_str()).enumerate() {
        let label = WHITESPACE.replace_all(&strip_tags(&cell[1]), "").to_string();
        if columns.code.is_none() && matches_any(&label, &CODE_LABELS) {
            columns.code = Some(i);
        }
        if columns.name.is_none() && matches_any(&label, &NAME_LABELS) {
            columns.name = Some(i);
        }
        if columns.weight.is_none() && matches_any(&label, &WEIGHT_LABELS) {
            columns.weight = Some(i);
        }
    }
    columns
}

fn data_rows(html: &str) -> Vec<&str> {
    let scope = BODY.find(html).map_or(html, |body| body.as_str());
    ROW.find_iter(scope).map(|m| m.as_str()).collect()
}

fn row_cells(row: &str) -> Vec<String> {
    CELL.captures_iter(row)
        .map(|cell| strip_tags(&cell[1]))
        .collect()
}

fn labelled<'a>(cells: &'a [String], index: Option<usize>) -> Option<&'a str> {
    index
        .and_then(|i| cells.get(i))
        .map(String::as_str)
        .filter(|text| !text.is_empty())
}

fn percent_text(text: &str) -> Option<String> {
    PERCENT_VALUE
        .captures(text)
        .map(|caps| format!("{}%", &caps[1]))
}

fn parse_row(cells: &[String], columns: &Columns) -> Holding {
    let code = match labelled(cells, columns.code) {
        Some(text) => SIX_DIGITS
            .captures(text)
            .map_or_else(|| text.to_string(), |caps| caps[1].to_string()),
        None => cells
            .iter()
            .find(|text| EXACT_SIX_DIGITS.is_match(text))
            .cloned()
            .unwrap_or_default(),
    };

    let name = match labelled(cells, columns.name) {
        Some(text) => text.to_string(),
        None if !code.is_empty() => cells
            .iter()
            .find(|text| !text.is_empty() && **text != code && !text.ends_with('%'))
            .cloned()
            .unwrap_or_default(),
        None => String::new(),
    };

    let weight = match labelled(cells, columns.weight) {
        Some(text) => percent_text(text).unwrap_or_else(|| text.to_string()),
        None => cells
            .iter()
            .find(|text| PERCENT.is_match(text))
            .and_then(|text| percent_text(text))
            .unwrap_or_default(),
    };

    Holding::new(code, name, weight)
}

/// Extracts at most [`MAX_HOLDINGS`] holdings in table order.
///
/// Rows without any usable code, name or weight are skipped; input without a
/// recognisable table gives an empty list.
pub fn parse_holdings(html: &str) -> Vec<Holding> {
    let columns = detect_columns(html);
    data_rows(html)
        .into_iter()
        .map(row_cells)
        .filter(|cells| !cells.is_empty())
        .map(|cells| parse_row(&cells, &columns))
        .filter(|h| !(h.code.is_empty() && h.name.is_empty() && h.weight.is_empty()))
        .take(MAX_HOLDINGS)
        .collect()
}
