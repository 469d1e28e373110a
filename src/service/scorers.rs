//! 字段评分：城市、地址、地址/城市综合、供应商、金额
//!
//! 所有评分都在 0-100 之间，缺失输入返回 0 而不是错误。

use bigdecimal::{BigDecimal, Zero};

use super::similarity::{normalize, similarity};
use crate::models::{CandidateRecord, InvoiceMetadata};

pub use crate::models::parse_amount;

const ADDRESS_WEIGHT: f64 = 0.7;
const CITY_WEIGHT: f64 = 0.3;
const STREET_NUMBER_BONUS: u8 = 20;

const VENDOR_MATCH_SCORE: u8 = 80;
/// 有供应商信息但没有命中时的基础分
const VENDOR_BASELINE_SCORE: u8 = 20;

/// 城市评分：相等 100，包含 80，共享长度 > 2 的词 60
pub fn city_score(a: &str, b: &str) -> u8 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    if a == b {
        return 100;
    }
    if a.contains(b.as_str()) || b.contains(a.as_str()) {
        return 80;
    }

    let parts = |s: &str| -> Vec<String> {
        s.split(|c: char| c == ',' || c.is_whitespace())
            .map(str::trim)
            .filter(|p| p.chars().count() > 2)
            .map(String::from)
            .collect()
    };
    let parts_b = parts(&b);
    if parts(&a).iter().any(|p| parts_b.contains(p)) {
        return 60;
    }
    0
}

/// 地址评分：文本相似度，门牌号一致时加 20 分（上限 100）
pub fn address_score(a: &str, b: &str) -> u8 {
    if a.trim().is_empty() || b.trim().is_empty() {
        return 0;
    }

    let base = similarity(a, b);
    let numbers_b = numeric_tokens(b);
    let shares_number = numeric_tokens(a).iter().any(|n| numbers_b.contains(n));
    if shares_number {
        base.saturating_add(STREET_NUMBER_BONUS).min(100)
    } else {
        base
    }
}

fn numeric_tokens(s: &str) -> Vec<&str> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty() && t.chars().all(|c| c.is_ascii_digit()))
        .collect()
}

/// 两侧都有非空值时才可比较
fn comparable<'a>(a: Option<&'a str>, b: Option<&'a str>) -> Option<(&'a str, &'a str)> {
    match (a, b) {
        (Some(a), Some(b)) if !a.trim().is_empty() && !b.trim().is_empty() => Some((a, b)),
        _ => None,
    }
}

/// 地址/城市综合评分
///
/// 两项都可比较时按 地址 70% + 城市 30% 加权；只有一项时直接使用该项得分；
/// 都无法比较时返回 None。
pub fn location_score(invoice: &InvoiceMetadata, candidate: &CandidateRecord) -> Option<u8> {
    let address = comparable(invoice.address.as_deref(), candidate.address.as_deref())
        .map(|(a, b)| address_score(a, b));
    let city = comparable(invoice.city.as_deref(), candidate.city.as_deref())
        .map(|(a, b)| city_score(a, b));

    match (address, city) {
        (Some(address), Some(city)) => {
            let combined = address as f64 * ADDRESS_WEIGHT + city as f64 * CITY_WEIGHT;
            Some(combined.round().min(100.0) as u8)
        }
        (Some(address), None) => Some(address),
        (None, Some(city)) => Some(city),
        (None, None) => None,
    }
}

/// 供应商评分：供应商名出现在候选描述中 80；有供应商但未命中 20；无供应商 0
pub fn vendor_score(vendor: Option<&str>, candidate_text: Option<&str>) -> u8 {
    let vendor = match vendor.map(normalize) {
        Some(v) if !v.is_empty() => v,
        _ => return 0,
    };

    match candidate_text {
        Some(text) if text.to_lowercase().contains(vendor.as_str()) => VENDOR_MATCH_SCORE,
        _ => VENDOR_BASELINE_SCORE,
    }
}

/// 金额与预算比例评分
///
/// `pct = |invoice| / budget * 100`：<=10 -> 90，<=25 -> 80，<=50 -> 60，<=100 -> 40，其余 20。
/// 任一侧缺失或预算 <= 0 时返回 0。
pub fn amount_score(invoice_amount: Option<&BigDecimal>, budget: Option<&BigDecimal>) -> u8 {
    let (amount, budget) = match (invoice_amount, budget) {
        (Some(a), Some(b)) => (a, b),
        _ => return 0,
    };
    if budget <= &BigDecimal::zero() {
        return 0;
    }

    let pct = amount.abs() / budget * BigDecimal::from(100);
    if pct <= BigDecimal::from(10) {
        90
    } else if pct <= BigDecimal::from(25) {
        80
    } else if pct <= BigDecimal::from(50) {
        60
    } else if pct <= BigDecimal::from(100) {
        40
    } else {
        20
    }
}

/// 两侧币种都已知且不同时不可比较金额
pub fn currencies_compatible(invoice_currency: Option<&str>, candidate_currency: &str) -> bool {
    match invoice_currency.map(str::trim) {
        Some(c) if !c.is_empty() && !candidate_currency.trim().is_empty() => {
            c.eq_ignore_ascii_case(candidate_currency.trim())
        }
        _ => true,
    }
}
