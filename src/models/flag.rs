use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagType {
    DuplicateInvoice,
    AmountMismatch,
    MissingPoMatch,
    TaxIdMismatch,
}

impl FlagType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagType::DuplicateInvoice => "duplicate_invoice",
            FlagType::AmountMismatch => "amount_mismatch",
            FlagType::MissingPoMatch => "missing_po_match",
            FlagType::TaxIdMismatch => "tax_id_mismatch",
        }
    }
}

impl FromStr for FlagType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "duplicate_invoice" => Ok(FlagType::DuplicateInvoice),
            "amount_mismatch" => Ok(FlagType::AmountMismatch),
            "missing_po_match" => Ok(FlagType::MissingPoMatch),
            "tax_id_mismatch" => Ok(FlagType::TaxIdMismatch),
            other => Err(format!("unknown flag type: {}", other)),
        }
    }
}

/// 严重程度，按声明顺序可比较 (Low < Critical)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

/// 异常标记
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flag {
    pub invoice_id: i64,
    pub flag_type: FlagType,
    pub severity: Severity,
    pub message: String,
    pub details: IndexMap<String, Value>,
    pub resolved: bool,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Flag {
    /// 新建未处理的标记
    pub fn new(
        invoice_id: i64,
        flag_type: FlagType,
        severity: Severity,
        message: impl Into<String>,
        details: IndexMap<String, Value>,
    ) -> Self {
        Self {
            invoice_id,
            flag_type,
            severity,
            message: message.into(),
            details,
            resolved: false,
            resolved_by: None,
            resolved_at: None,
        }
    }

    /// 人工处理标记。已处理过的标记保持第一次处理的信息不变。
    pub fn resolve(&mut self, resolved_by: impl Into<String>, at: DateTime<Utc>) -> bool {
        if self.resolved {
            return false;
        }
        self.resolved = true;
        self.resolved_by = Some(resolved_by.into());
        self.resolved_at = Some(at);
        true
    }
}

/// 差异检测输出
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscrepancyReport {
    pub has_discrepancies: bool,
    pub flags: Vec<Flag>,
}

impl DiscrepancyReport {
    pub fn from_flags(flags: Vec<Flag>) -> Self {
        Self {
            has_discrepancies: !flags.is_empty(),
            flags,
        }
    }

    pub fn flag(&self, flag_type: FlagType) -> Option<&Flag> {
        self.flags.iter().find(|f| f.flag_type == flag_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn resolve_keeps_first_resolution() {
        let mut flag = Flag::new(
            7,
            FlagType::MissingPoMatch,
            Severity::Medium,
            "no PO",
            IndexMap::new(),
        );
        assert!(!flag.resolved);

        let first = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        assert!(flag.resolve("alice", first));
        assert!(!flag.resolve("bob", Utc::now()));

        assert!(flag.resolved);
        assert_eq!(flag.resolved_by.as_deref(), Some("alice"));
        assert_eq!(flag.resolved_at, Some(first));
    }

    #[test]
    fn stored_names_parse_back() {
        for flag_type in [
            FlagType::DuplicateInvoice,
            FlagType::AmountMismatch,
            FlagType::MissingPoMatch,
            FlagType::TaxIdMismatch,
        ] {
            assert_eq!(flag_type.as_str().parse::<FlagType>(), Ok(flag_type));
        }
        assert_eq!("critical".parse::<Severity>(), Ok(Severity::Critical));
        assert!("urgent".parse::<Severity>().is_err());
    }

    #[test]
    fn severity_orders_by_impact() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }
}
