use regex::{Regex, RegexBuilder};
use rust_decimal::Decimal;
use scraper::{Html, Selector};
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Mutex, OnceLock};

use crate::models::{ExtractionRule, SampleMeta};
use crate::utils::error::ExtractionError;

/// A price read from raw content.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub price: f64,
    pub in_stock: bool,
    pub extra: SampleMeta,
}

/// Schema.org and Open Graph availability values meaning "cannot buy".
const UNAVAILABLE_MARKERS: [&str; 4] = ["outofstock", "soldout", "discontinued", "out of stock"];

fn number_regex() -> &'static Regex {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    NUMBER.get_or_init(|| Regex::new(r"\d(?:[\d.,]*\d)?").expect("static number pattern"))
}

fn availability_selector() -> &'static Selector {
    static AVAILABILITY: OnceLock<Selector> = OnceLock::new();
    AVAILABILITY.get_or_init(|| {
        Selector::parse(r#"[itemprop="availability"], meta[property="product:availability"]"#)
            .expect("static availability selector")
    })
}

/// Compiles a configured pattern once and hands out cheap clones afterwards.
fn item_regex(pattern: &str, case_insensitive: bool) -> Result<Regex, ExtractionError> {
    static COMPILED: OnceLock<Mutex<HashMap<(String, bool), Regex>>> = OnceLock::new();
    let cache = COMPILED.get_or_init(|| Mutex::new(HashMap::new()));
    let key = (pattern.to_string(), case_insensitive);

    if let Some(re) = cache.lock().ok().and_then(|c| c.get(&key).cloned()) {
        return Ok(re);
    }

    let re = RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|e| ExtractionError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
    if let Ok(mut cache) = cache.lock() {
        cache.insert(key, re.clone());
    }
    Ok(re)
}

/// Reads a price out of an HTML page.
///
/// The first element matching the rule's CSS selector supplies the text (or a
/// named attribute), an optional cleanup pattern narrows it to the numeric part,
/// and the number is parsed with either `.` or `,` as the decimal separator.
pub fn extract_html(html: &str, rule: &ExtractionRule) -> Result<Extracted, ExtractionError> {
    let selector_str = rule.selector.as_deref().unwrap_or_default();
    let selector = Selector::parse(selector_str).map_err(|e| ExtractionError::InvalidSelector {
        selector: selector_str.to_string(),
        message: format!("{:?}", e),
    })?;

    let document = Html::parse_document(html);
    let element = document
        .select(&selector)
        .next()
        .ok_or_else(|| ExtractionError::NoMatch {
            selector: selector_str.to_string(),
        })?;

    let text = match rule.attr.as_deref() {
        Some(attr) => element
            .value()
            .attr(attr)
            .map(str::to_string)
            .ok_or_else(|| ExtractionError::MissingAttribute {
                selector: selector_str.to_string(),
                attr: attr.to_string(),
            })?,
        None => collapse_whitespace(&element.text().collect::<String>()),
    };

    let price = parse_price(&text, rule.pattern.as_deref())?;
    let in_stock = detect_in_stock(&document, rule.out_of_stock.as_deref())?;

    let mut extra = SampleMeta::new();
    extra.insert("raw_text".to_string(), Value::String(text));

    Ok(Extracted {
        price,
        in_stock,
        extra,
    })
}

/// Parses the JSON record printed by a command provider:
/// `{"price": number, "currency": string, "in_stock": bool, "extra": object?}`.
pub fn extract_command_output(
    stdout: &str,
    rule: &ExtractionRule,
) -> Result<Extracted, ExtractionError> {
    let record: Value = serde_json::from_str(stdout.trim())
        .map_err(|e| ExtractionError::MalformedOutput(e.to_string()))?;
    let object = record
        .as_object()
        .ok_or_else(|| ExtractionError::MalformedOutput("expected a JSON object".to_string()))?;

    let price = object
        .get("price")
        .and_then(Value::as_f64)
        .ok_or(ExtractionError::MissingPrice)?;
    if !price.is_finite() || price <= 0.0 {
        return Err(ExtractionError::NonPositive(price));
    }

    match object.get("currency") {
        None | Some(Value::Null) => {}
        Some(Value::String(found)) => {
            let found = found.trim();
            if !found.is_empty() && !found.eq_ignore_ascii_case(&rule.currency) {
                return Err(ExtractionError::CurrencyMismatch {
                    expected: rule.currency.clone(),
                    found: found.to_string(),
                });
            }
        }
        Some(other) => {
            return Err(ExtractionError::MalformedOutput(format!(
                "currency must be a string, got {other}"
            )));
        }
    }

    let in_stock = match object.get("in_stock") {
        None | Some(Value::Null) => true,
        Some(Value::Bool(flag)) => *flag,
        Some(other) => {
            return Err(ExtractionError::MalformedOutput(format!(
                "in_stock must be a boolean, got {other}"
            )));
        }
    };

    let extra = match object.get("extra") {
        None | Some(Value::Null) => SampleMeta::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(other) => {
            return Err(ExtractionError::MalformedOutput(format!(
                "extra must be an object, got {other}"
            )));
        }
    };

    Ok(Extracted {
        price,
        in_stock,
        extra,
    })
}

/// Isolates the numeric part of `text` and parses it.
///
/// With a pattern, the first match holding a digit is used: its first capture
/// group when the pattern has one, otherwise the whole match. Without a pattern
/// the first number-like run wins.
pub fn parse_price(text: &str, pattern: Option<&str>) -> Result<f64, ExtractionError> {
    let candidate = match pattern {
        Some(pattern) => {
            let re = item_regex(pattern, false)?;
            re.captures_iter(text)
                .filter_map(|captures| captures.get(1).or_else(|| captures.get(0)))
                .map(|m| m.as_str())
                .find(|candidate| candidate.chars().any(|c| c.is_ascii_digit()))
                .ok_or_else(|| ExtractionError::NoNumber {
                    text: text.to_string(),
                })?
        }
        None => number_regex()
            .find(text)
            .map(|m| m.as_str())
            .ok_or_else(|| ExtractionError::NoNumber {
                text: text.to_string(),
            })?,
    };

    let value = normalize_number(candidate)
        .and_then(|d| d.normalize().to_string().parse::<f64>().ok())
        .ok_or_else(|| ExtractionError::NoNumber {
            text: text.to_string(),
        })?;

    if value <= 0.0 {
        return Err(ExtractionError::NonPositive(value));
    }
    Ok(value)
}

/// Parses a locale-formatted number where `.` and `,` may each be either the
/// decimal or the thousands separator.
///
/// When both appear the last one is the decimal separator. A lone separator
/// kind that repeats, or that is followed by exactly three digits after a
/// non-zero integer part, groups thousands.
pub fn normalize_number(raw: &str) -> Option<Decimal> {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    let kept = kept.trim_end_matches(['.', ',']);
    if !kept.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let canonical = match (kept.rfind('.'), kept.rfind(',')) {
        (Some(dot), Some(comma)) => {
            let (decimal, thousands) = if dot > comma { ('.', ',') } else { (',', '.') };
            kept.replace(thousands, "").replace(decimal, ".")
        }
        (Some(_), None) => single_separator(kept, '.'),
        (None, Some(_)) => single_separator(kept, ','),
        (None, None) => kept.to_string(),
    };

    let canonical = if canonical.starts_with('.') {
        format!("0{canonical}")
    } else {
        canonical
    };
    Decimal::from_str(&canonical).ok()
}

fn single_separator(number: &str, separator: char) -> String {
    if number.matches(separator).count() > 1 {
        return number.replace(separator, "");
    }

    let (integer, fraction) = number.split_once(separator).unwrap_or((number, ""));
    let groups_thousands = fraction.len() == 3 && !integer.is_empty() && integer != "0";
    if groups_thousands {
        format!("{integer}{fraction}")
    } else {
        format!("{integer}.{fraction}")
    }
}

fn detect_in_stock(document: &Html, out_of_stock: Option<&str>) -> Result<bool, ExtractionError> {
    if let Some(pattern) = out_of_stock {
        let re = item_regex(pattern, true)?;
        let page_text = collapse_whitespace(&document.root_element().text().collect::<String>());
        if re.is_match(&page_text) {
            return Ok(false);
        }
    }

    for element in document.select(availability_selector()) {
        let value = element.value();
        let signal = value
            .attr("href")
            .or_else(|| value.attr("content"))
            .map(str::to_string)
            .unwrap_or_else(|| element.text().collect::<String>());
        let signal = signal.to_ascii_lowercase();
        if UNAVAILABLE_MARKERS.iter().any(|m| signal.contains(m)) {
            return Ok(false);
        }
    }

    Ok(true)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
