//! 差异检测：重复发票、金额偏差、缺少采购订单、税号不一致
//!
//! 每条规则独立执行，最多产生一个标记。检测过程不访问存储，
//! 历史数据由调用方通过 `MatchContext` 传入。

use bigdecimal::{BigDecimal, Zero};
use indexmap::{IndexMap, IndexSet};
use serde_json::{json, Value};

use crate::models::{
    DiscrepancyReport, Flag, FlagType, Invoice, LineItem, MatchContext, PoMatch, Severity,
};

/// 参与税号比对的近期发票数量
pub const RECENT_INVOICE_LIMIT: usize = 5;

/// 金额偏差阈值（百分比，严格大于才标记）
const DEVIATION_PCT: i32 = 10;
const DEVIATION_HIGH_PCT: i32 = 15;
const DEVIATION_CRITICAL_PCT: i32 = 25;

/// 缺少采购订单的金额阈值
const MISSING_PO_AMOUNT: i32 = 5_000;
const MISSING_PO_HIGH_AMOUNT: i32 = 20_000;

/// 对一张发票执行全部规则
pub fn check_discrepancies(
    invoice: &Invoice,
    line_items: &[LineItem],
    context: &MatchContext,
) -> DiscrepancyReport {
    let amount = invoice_amount(invoice, line_items);

    let flags: Vec<Flag> = [
        duplicate_flag(invoice, &context.same_number_invoices),
        amount_mismatch_flag(invoice, amount.as_ref(), &context.po_matches),
        missing_po_flag(invoice, amount.as_ref(), &context.po_matches),
        tax_id_flag(invoice, &context.recent_vendor_invoices),
    ]
    .into_iter()
    .flatten()
    .collect();

    if !flags.is_empty() {
        tracing::info!(
            "Invoice {}: {} discrepancies ({})",
            invoice.id,
            flags.len(),
            flags
                .iter()
                .map(|f| f.flag_type.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    DiscrepancyReport::from_flags(flags)
}

/// 发票金额：优先用总金额，没有时用明细金额合计
pub fn invoice_amount(invoice: &Invoice, line_items: &[LineItem]) -> Option<BigDecimal> {
    if let Some(total) = &invoice.total_amount {
        return Some(total.clone());
    }

    let amounts: Vec<&BigDecimal> = line_items
        .iter()
        .filter(|li| li.invoice_id == invoice.id)
        .filter_map(|li| li.amount.as_ref())
        .collect();
    if amounts.is_empty() {
        return None;
    }
    Some(amounts.into_iter().fold(BigDecimal::zero(), |acc, a| acc + a))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// 税号历史按供应商归组时不区分大小写
fn same_vendor(a: Option<&str>, b: Option<&str>) -> bool {
    match (non_blank(a), non_blank(b)) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

fn duplicate_flag(invoice: &Invoice, same_number: &[Invoice]) -> Option<Flag> {
    let number = non_blank(invoice.invoice_number.as_deref())?;
    let vendor = non_blank(invoice.vendor_name.as_deref())?;

    let duplicate_ids: IndexSet<i64> = same_number
        .iter()
        .filter(|other| other.id != invoice.id)
        .filter(|other| non_blank(other.invoice_number.as_deref()) == Some(number))
        .filter(|other| non_blank(other.vendor_name.as_deref()) == Some(vendor))
        .map(|other| other.id)
        .collect();

    if duplicate_ids.is_empty() {
        return None;
    }

    let mut details = IndexMap::new();
    details.insert("invoiceNumber".to_string(), json!(number));
    details.insert("vendorName".to_string(), json!(vendor));
    details.insert(
        "duplicateInvoiceIds".to_string(),
        json!(duplicate_ids.iter().collect::<Vec<_>>()),
    );

    Some(Flag::new(
        invoice.id,
        FlagType::DuplicateInvoice,
        Severity::High,
        format!(
            "Invoice number {} from {} already exists ({} other invoice(s))",
            number,
            vendor,
            duplicate_ids.len()
        ),
        details,
    ))
}

fn deviation_severity(pct: &BigDecimal) -> Severity {
    if pct > &BigDecimal::from(DEVIATION_CRITICAL_PCT) {
        Severity::Critical
    } else if pct > &BigDecimal::from(DEVIATION_HIGH_PCT) {
        Severity::High
    } else {
        Severity::Medium
    }
}

fn amount_mismatch_flag(
    invoice: &Invoice,
    amount: Option<&BigDecimal>,
    po_matches: &[PoMatch],
) -> Option<Flag> {
    let amount = amount?;
    let threshold = BigDecimal::from(DEVIATION_PCT);

    let mut worst: Option<(BigDecimal, &PoMatch)> = None;
    let mut mismatches = Vec::new();

    for po in po_matches.iter().filter(|m| m.is_active()) {
        let po_amount = match &po.po_amount {
            Some(a) if a > &BigDecimal::zero() => a,
            _ => continue,
        };

        let pct = (amount - po_amount).abs() / po_amount * BigDecimal::from(100);
        if pct <= threshold {
            continue;
        }

        mismatches.push(json!({
            "purchaseOrderId": po.purchase_order_id,
            "poNumber": po.po_number,
            "poAmount": po_amount.to_string(),
            "deviationPct": pct.round(2).to_string(),
        }));

        let is_worse = worst.as_ref().map_or(true, |(w, _)| &pct > w);
        if is_worse {
            worst = Some((pct, po));
        }
    }

    let (worst_pct, worst_po) = worst?;

    let mut details = IndexMap::new();
    details.insert("invoiceAmount".to_string(), json!(amount.to_string()));
    details.insert("mismatches".to_string(), Value::Array(mismatches));

    let po_label = worst_po
        .po_number
        .clone()
        .unwrap_or_else(|| worst_po.purchase_order_id.to_string());

    Some(Flag::new(
        invoice.id,
        FlagType::AmountMismatch,
        deviation_severity(&worst_pct),
        format!(
            "Invoice amount {} deviates {}% from purchase order {}",
            amount,
            worst_pct.round(2),
            po_label
        ),
        details,
    ))
}

fn missing_po_flag(
    invoice: &Invoice,
    amount: Option<&BigDecimal>,
    po_matches: &[PoMatch],
) -> Option<Flag> {
    let amount = amount?;
    if amount <= &BigDecimal::from(MISSING_PO_AMOUNT) {
        return None;
    }
    if po_matches.iter().any(|m| m.is_active()) {
        return None;
    }

    let severity = if amount > &BigDecimal::from(MISSING_PO_HIGH_AMOUNT) {
        Severity::High
    } else {
        Severity::Medium
    };

    let mut details = IndexMap::new();
    details.insert("invoiceAmount".to_string(), json!(amount.to_string()));
    details.insert("threshold".to_string(), json!(MISSING_PO_AMOUNT));

    Some(Flag::new(
        invoice.id,
        FlagType::MissingPoMatch,
        severity,
        format!(
            "Invoice amount {} exceeds {} but no purchase order is matched",
            amount, MISSING_PO_AMOUNT
        ),
        details,
    ))
}

/// 税号比较前去掉空白和连字符并转大写
fn normalize_tax_id(tax_id: &str) -> String {
    tax_id
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect::<String>()
        .to_uppercase()
}

fn tax_id_flag(invoice: &Invoice, recent: &[Invoice]) -> Option<Flag> {
    let current_raw = non_blank(invoice.tax_id.as_deref())?;
    let current = normalize_tax_id(current_raw);
    let vendor = non_blank(invoice.vendor_name.as_deref())?;

    let mut history: Vec<&Invoice> = recent
        .iter()
        .filter(|other| other.id != invoice.id)
        .filter(|other| same_vendor(other.vendor_name.as_deref(), Some(vendor)))
        .collect();
    history.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
    history.truncate(RECENT_INVOICE_LIMIT);

    let mut conflicting_values: IndexSet<String> = IndexSet::new();
    let mut conflicting_ids: Vec<i64> = Vec::new();
    for other in history {
        let Some(raw) = non_blank(other.tax_id.as_deref()) else {
            continue;
        };
        if normalize_tax_id(raw) != current {
            conflicting_values.insert(raw.to_string());
            conflicting_ids.push(other.id);
        }
    }

    if conflicting_values.is_empty() {
        return None;
    }

    let mut details = IndexMap::new();
    details.insert("vendorName".to_string(), json!(vendor));
    details.insert("currentTaxId".to_string(), json!(current_raw));
    details.insert(
        "conflictingTaxIds".to_string(),
        json!(conflicting_values.iter().collect::<Vec<_>>()),
    );
    details.insert("conflictingInvoiceIds".to_string(), json!(conflicting_ids));

    Some(Flag::new(
        invoice.id,
        FlagType::TaxIdMismatch,
        Severity::Medium,
        format!(
            "Tax id {} differs from recent invoices of {} ({})",
            current_raw,
            vendor,
            conflicting_values
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        ),
        details,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MatchStatus;
    use chrono::{TimeZone, Utc};
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn invoice(id: i64) -> Invoice {
        Invoice {
            id,
            invoice_number: Some("INV-100".into()),
            vendor_name: Some("Globex".into()),
            tax_id: Some("DE123456789".into()),
            total_amount: Some(dec("1000")),
            currency: Some("EUR".into()),
            issued_at: None,
            project_name_hint: None,
            address: None,
            city: None,
        }
    }

    fn po(id: i64, amount: &str, status: MatchStatus) -> PoMatch {
        PoMatch {
            id,
            invoice_id: 1,
            purchase_order_id: 100 + id,
            po_number: Some(format!("PO-{}", id)),
            po_amount: Some(dec(amount)),
            status,
        }
    }

    #[test]
    fn clean_invoice_has_no_flags() {
        let ctx = MatchContext {
            po_matches: vec![po(1, "1000", MatchStatus::AutoMatched)],
            ..Default::default()
        };
        let report = check_discrepancies(&invoice(1), &[], &ctx);
        assert!(!report.has_discrepancies);
        assert!(report.flags.is_empty());
    }

    #[test]
    fn duplicate_lists_all_other_ids() {
        let mut other_vendor = invoice(4);
        other_vendor.vendor_name = Some("Initech".into());
        let ctx = MatchContext {
            same_number_invoices: vec![invoice(1), invoice(2), invoice(3), other_vendor],
            ..Default::default()
        };
        let report = check_discrepancies(&invoice(1), &[], &ctx);
        let flag = report.flag(FlagType::DuplicateInvoice).unwrap();
        assert_eq!(flag.severity, Severity::High);
        assert_eq!(flag.details["duplicateInvoiceIds"], json!([2, 3]));
        assert!(!flag.resolved);
    }

    #[test]
    fn duplicate_vendor_compares_exactly_after_trim() {
        let mut padded = invoice(2);
        padded.vendor_name = Some("  Globex ".into());
        let mut lowercase = invoice(3);
        lowercase.vendor_name = Some("globex".into());
        let ctx = MatchContext {
            same_number_invoices: vec![padded, lowercase],
            ..Default::default()
        };

        let report = check_discrepancies(&invoice(1), &[], &ctx);
        let flag = report.flag(FlagType::DuplicateInvoice).unwrap();
        assert_eq!(flag.details["duplicateInvoiceIds"], json!([2]));
    }

    #[test]
    fn duplicate_needs_number_and_vendor() {
        let mut current = invoice(1);
        current.invoice_number = None;
        let ctx = MatchContext {
            same_number_invoices: vec![invoice(2)],
            ..Default::default()
        };
        assert!(check_discrepancies(&current, &[], &ctx)
            .flag(FlagType::DuplicateInvoice)
            .is_none());
    }

    #[test]
    fn deviation_severity_tiers() {
        let severity = |amount: &str| {
            let mut current = invoice(1);
            current.total_amount = Some(dec(amount));
            let ctx = MatchContext {
                po_matches: vec![po(1, "1000", MatchStatus::ManuallyMatched)],
                ..Default::default()
            };
            check_discrepancies(&current, &[], &ctx)
                .flag(FlagType::AmountMismatch)
                .map(|f| f.severity)
        };

        assert_eq!(severity("1100"), None);
        assert_eq!(severity("900"), None);
        assert_eq!(severity("1100.1"), Some(Severity::Medium));
        assert_eq!(severity("1150"), Some(Severity::Medium));
        assert_eq!(severity("1150.01"), Some(Severity::High));
        assert_eq!(severity("1250"), Some(Severity::High));
        assert_eq!(severity("1300"), Some(Severity::Critical));
        assert_eq!(severity("600"), Some(Severity::Critical));
    }

    #[test]
    fn mismatch_uses_worst_active_po_and_skips_rejected() {
        let ctx = MatchContext {
            po_matches: vec![
                po(1, "900", MatchStatus::AutoMatched),   // 11.1%
                po(2, "700", MatchStatus::NeedsReview),   // 42.9%
                po(3, "100", MatchStatus::Rejected),      // ignored
                po(4, "0", MatchStatus::ManuallyMatched), // ignored
            ],
            ..Default::default()
        };
        let report = check_discrepancies(&invoice(1), &[], &ctx);
        let flag = report.flag(FlagType::AmountMismatch).unwrap();
        assert_eq!(flag.severity, Severity::Critical);
        assert_eq!(flag.details["mismatches"].as_array().unwrap().len(), 2);
        assert!(flag.message.contains("PO-2"));
    }

    #[test]
    fn missing_po_thresholds() {
        let severity = |amount: &str, matches: Vec<PoMatch>| {
            let mut current = invoice(1);
            current.total_amount = Some(dec(amount));
            let ctx = MatchContext {
                po_matches: matches,
                ..Default::default()
            };
            check_discrepancies(&current, &[], &ctx)
                .flag(FlagType::MissingPoMatch)
                .map(|f| f.severity)
        };

        assert_eq!(severity("5000", vec![]), None);
        assert_eq!(severity("5000.01", vec![]), Some(Severity::Medium));
        assert_eq!(severity("20000", vec![]), Some(Severity::Medium));
        assert_eq!(severity("20000.01", vec![]), Some(Severity::High));
        assert_eq!(
            severity("9000", vec![po(1, "100", MatchStatus::Rejected)]),
            Some(Severity::Medium)
        );
        assert_eq!(severity("9000", vec![po(1, "9000", MatchStatus::AutoMatched)]), None);
    }

    #[test]
    fn amount_falls_back_to_line_items() {
        let mut current = invoice(1);
        current.total_amount = None;
        let items = vec![
            LineItem {
                id: 1,
                invoice_id: 1,
                description: Some("Concrete".into()),
                quantity: None,
                amount: Some(dec("4000")),
            },
            LineItem {
                id: 2,
                invoice_id: 1,
                description: Some("Rebar".into()),
                quantity: None,
                amount: Some(dec("2500")),
            },
            LineItem {
                id: 3,
                invoice_id: 1,
                description: None,
                quantity: None,
                amount: None,
            },
        ];
        assert_eq!(invoice_amount(&current, &items), Some(dec("6500")));

        let report = check_discrepancies(&current, &items, &MatchContext::default());
        assert_eq!(
            report.flag(FlagType::MissingPoMatch).unwrap().severity,
            Severity::Medium
        );
        assert_eq!(invoice_amount(&current, &[]), None);
    }

    #[test]
    fn tax_id_conflicts_within_recent_window() {
        let dated = |id: i64, day: u32, tax_id: Option<&str>| {
            let mut inv = invoice(id);
            inv.issued_at = Some(Utc.with_ymd_and_hms(2024, 5, day, 0, 0, 0).unwrap());
            inv.tax_id = tax_id.map(String::from);
            inv
        };

        let recent = vec![
            dated(2, 20, Some("de 123-456-789")), // 归一化后相同
            dated(3, 19, Some("DE999999999")),
            dated(4, 18, None),
            dated(5, 17, Some("DE999999999")),
            dated(6, 16, Some("DE123456789")),
            dated(7, 1, Some("DE000000000")), // 超出最近 5 张
            dated(1, 28, Some("XX")),         // 当前发票本身
        ];
        let ctx = MatchContext {
            recent_vendor_invoices: recent,
            ..Default::default()
        };
        let report = check_discrepancies(&invoice(1), &[], &ctx);
        let flag = report.flag(FlagType::TaxIdMismatch).unwrap();
        assert_eq!(flag.severity, Severity::Medium);
        assert_eq!(flag.details["conflictingTaxIds"], json!(["DE999999999"]));
        assert_eq!(flag.details["conflictingInvoiceIds"], json!([3, 5]));
    }

    #[test]
    fn tax_id_check_skipped_without_current_id() {
        let mut current = invoice(1);
        current.tax_id = None;
        let mut other = invoice(2);
        other.tax_id = Some("DE999999999".into());
        let ctx = MatchContext {
            recent_vendor_invoices: vec![other],
            ..Default::default()
        };
        assert!(check_discrepancies(&current, &[], &ctx)
            .flag(FlagType::TaxIdMismatch)
            .is_none());
    }
}
