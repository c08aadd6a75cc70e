//! Keyword-rule case classification.
//!
//! Maps free text onto a closed vocabulary of regulatory case branches.
//! Rules are an explicit ordered list evaluated top to bottom; the
//! first matching rule wins, so rule order is part of the contract and
//! is covered by tests. No rule matches the bare stem "блок", because
//! "меня заблокировали" alone says nothing about *who* blocked what.

use serde::{Deserialize, Serialize};

use crate::text::normalize;

/// Coarse classification of a user's case into a regulatory category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseBranch {
    /// 115-FZ: the bank flagged a suspicious or dubious operation.
    AmlSuspiciousActivity,
    /// ZSK ("know your client") platform risk level.
    RiskScoring,
    /// 161-FZ payment-law blocks (fraud, drop accounts).
    PaymentLaw,
    /// Tax-authority suspension of account operations.
    TaxAuthority,
    /// Bailiff arrest or enforcement proceedings.
    EnforcementAgency,
    /// The bank gave no reason at all.
    Unexplained,
}

impl CaseBranch {
    /// Stable wire tag, matching the serialized representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseBranch::AmlSuspiciousActivity => "AML_SUSPICIOUS_ACTIVITY",
            CaseBranch::RiskScoring => "RISK_SCORING",
            CaseBranch::PaymentLaw => "PAYMENT_LAW",
            CaseBranch::TaxAuthority => "TAX_AUTHORITY",
            CaseBranch::EnforcementAgency => "ENFORCEMENT_AGENCY",
            CaseBranch::Unexplained => "UNEXPLAINED",
        }
    }
}

impl std::fmt::Display for CaseBranch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered rule list. Keywords are lowercase substrings matched against
/// the normalized text. First match wins.
const RULES: &[(&[&str], CaseBranch)] = &[
    (
        &["115", "под/фт", "пфтк", "подозрительн", "сомнительн", "росфин", "легализ"],
        CaseBranch::AmlSuspiciousActivity,
    ),
    (
        &[
            "зск",
            "светофор",
            "красная зона",
            "красный уровень",
            "желтая зона",
            "жёлтая зона",
            "знай своего клиента",
        ],
        CaseBranch::RiskScoring,
    ),
    (
        &["161-фз", "161 фз", "дроппер", "дропов", "мошеннич", "фрод"],
        CaseBranch::PaymentLaw,
    ),
    (
        &["фнс", "налогов", "приостановление операций", "инкассов"],
        CaseBranch::TaxAuthority,
    ),
    (
        &["пристав", "фссп", "исполнительн", "арест"],
        CaseBranch::EnforcementAgency,
    ),
    (
        &["без объяснени", "без причин", "не объясн", "отказался объяснять"],
        CaseBranch::Unexplained,
    ),
];

/// Classify free text into a case branch, or `None` when no rule
/// matches. Pure: never consults or mutates conversation state.
pub fn classify(text: &str) -> Option<CaseBranch> {
    let normalized = normalize(text);
    if normalized.is_empty() {
        return None;
    }
    RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| normalized.contains(k)))
        .map(|(_, branch)| *branch)
}
