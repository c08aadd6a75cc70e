//! Per-user conversational state machine.
//!
//! The dialogue logic is implicit in [`UserConversationState`] rather
//! than a single state enum: a user moves from "branch unknown" through
//! scripted clarifying questions into free-form answering, with an
//! orthogonal "awaiting comment" sub-state entered and left
//! independently. Two guarantees are enforced here:
//!
//! - a clarifying question id, once asked, is never asked again to the
//!   same user;
//! - the bot never emits the same normalized response three times in a
//!   row — the third attempt is replaced by a fixed escalation message.
//!
//! All operations are pure functions over `&mut UserConversationState`;
//! persistence belongs to a [`StateStore`](crate::store::StateStore).

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::classify::{classify, CaseBranch};
use crate::text::normalize;

/// Consecutive-repeat count at which the escalation message replaces
/// the produced answer.
pub const REPEAT_THRESHOLD: u32 = 2;

/// Fixed message substituted when the bot is about to repeat itself a
/// third time. Deliberately a different set of clarifying questions.
pub const ESCALATION_MESSAGE: &str = "Похоже, я повторяюсь 🙃 Давайте иначе.\n\n\
✅ 1) Что именно ограничено: счёт, карта или ДБО?\n\
✅ 2) Формулировка банка (2–3 слова) или «без объяснений»?\n\
✅ 3) Вы — ИП, ООО или физлицо?";

/// Correlation keys for a produced answer, consumed by the external
/// feedback/logging collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerMetadata {
    pub answer_id: String,
    pub query_fingerprint: String,
    pub rag_used: bool,
    pub llm_used: bool,
}

/// One record per user id. Created lazily on first message, mutated
/// only by this module, never deleted except by explicit operator
/// action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserConversationState {
    #[serde(default)]
    pub branch: Option<CaseBranch>,
    /// Facts collected from answers to clarifying questions, keyed by
    /// question id.
    #[serde(default)]
    pub case_facts: BTreeMap<String, String>,
    #[serde(default)]
    pub asked_question_ids: BTreeSet<String>,
    #[serde(default)]
    pub last_bot_utterance_normalized: String,
    #[serde(default)]
    pub repeat_count: u32,
    /// Stable per-user conversation identifier, minted on first
    /// interaction and never reassigned.
    pub thread_id: String,
    #[serde(default)]
    pub awaiting_comment_for_answer_id: Option<String>,
    /// The clarifying question the next user message answers.
    #[serde(default)]
    pub pending_question_id: Option<String>,
    #[serde(default)]
    pub last_answer_metadata: Option<AnswerMetadata>,
    /// Unix seconds of the last mutation; feeds the retention policy.
    #[serde(default)]
    pub updated_at: i64,
}

impl UserConversationState {
    pub fn new() -> Self {
        Self {
            branch: None,
            case_facts: BTreeMap::new(),
            asked_question_ids: BTreeSet::new(),
            last_bot_utterance_normalized: String::new(),
            repeat_count: 0,
            thread_id: Uuid::new_v4().to_string(),
            awaiting_comment_for_answer_id: None,
            pending_question_id: None,
            last_answer_metadata: None,
            updated_at: Utc::now().timestamp(),
        }
    }
}

impl Default for UserConversationState {
    fn default() -> Self {
        Self::new()
    }
}

/// A scripted clarifying question with a stable id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClarifyingQuestion {
    pub id: &'static str,
    pub text: &'static str,
}

const fn q(id: &'static str, text: &'static str) -> ClarifyingQuestion {
    ClarifyingQuestion { id, text }
}

/// Questions asked regardless of branch, in order.
const GENERIC_QUESTIONS: &[ClarifyingQuestion] = &[
    q(
        "when_what",
        "Когда заблокировали (сегодня/вчера/дата) и что именно: счёт, карта или ДБО?",
    ),
    q(
        "bank_reason",
        "Что банк указал как причину (1–2 фразы из уведомления)?",
    ),
    q("entity_type", "Вы — ИП, ООО или физлицо?"),
];

const AML_QUESTIONS: &[ClarifyingQuestion] = &[
    q(
        "aml_operation",
        "Какая операция вызвала вопросы банка (сумма, контрагент, назначение платежа)?",
    ),
    q(
        "aml_documents",
        "Какие документы по этой операции у вас есть (договор, акты, платёжки)?",
    ),
];

const ZSK_QUESTIONS: &[ClarifyingQuestion] = &[q(
    "zsk_level",
    "Какой уровень риска указан (красный/жёлтый/зелёный) и кто его сообщил?",
)];

const PAYMENT_QUESTIONS: &[ClarifyingQuestion] = &[q(
    "payment_channel",
    "Платёж был физлицу или компании, и через какой канал (перевод, СБП, карта)?",
)];

const TAX_QUESTIONS: &[ClarifyingQuestion] = &[q(
    "tax_decision",
    "Есть ли решение ФНС о приостановлении операций (номер и дата)?",
)];

const FSSP_QUESTIONS: &[ClarifyingQuestion] = &[q(
    "fssp_case",
    "Известен ли номер исполнительного производства и сумма взыскания?",
)];

const UNEXPLAINED_QUESTIONS: &[ClarifyingQuestion] = &[q(
    "unexplained_contact",
    "Обращались ли вы в банк письменно за разъяснением причины?",
)];

fn branch_questions(branch: CaseBranch) -> &'static [ClarifyingQuestion] {
    match branch {
        CaseBranch::AmlSuspiciousActivity => AML_QUESTIONS,
        CaseBranch::RiskScoring => ZSK_QUESTIONS,
        CaseBranch::PaymentLaw => PAYMENT_QUESTIONS,
        CaseBranch::TaxAuthority => TAX_QUESTIONS,
        CaseBranch::EnforcementAgency => FSSP_QUESTIONS,
        CaseBranch::Unexplained => UNEXPLAINED_QUESTIONS,
    }
}

/// The first not-yet-asked clarifying question for the user's current
/// branch: branch-specific questions first, then the generic script.
pub fn next_question(state: &UserConversationState) -> Option<ClarifyingQuestion> {
    let branch_specific: &[ClarifyingQuestion] =
        state.branch.map(branch_questions).unwrap_or(&[]);
    branch_specific
        .iter()
        .chain(GENERIC_QUESTIONS)
        .find(|question| !state.asked_question_ids.contains(question.id))
        .copied()
}

/// What the surrounding application should do with an inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum NextAction {
    /// The message was consumed as a feedback comment for an earlier
    /// answer; classification was bypassed.
    CommentRecorded { answer_id: String, comment: String },
    /// Ask the given scripted question. Its id is now marked asked and
    /// will never be emitted again for this user.
    AskClarifyingQuestion { question_id: String, question: String },
    /// No scripted question remains: hand off to free-form answering.
    DelegateToFreeForm {
        text: String,
        branch: Option<CaseBranch>,
        case_facts: BTreeMap<String, String>,
    },
}

/// Advance the dialogue with an inbound user message.
pub fn on_incoming_message(state: &mut UserConversationState, text: &str) -> NextAction {
    state.updated_at = Utc::now().timestamp();

    if let Some(answer_id) = state.awaiting_comment_for_answer_id.take() {
        return NextAction::CommentRecorded {
            answer_id,
            comment: text.trim().to_string(),
        };
    }

    if let Some(question_id) = state.pending_question_id.take() {
        state.case_facts.insert(question_id, text.trim().to_string());
    }

    // A non-null classification overwrites a differing stored branch;
    // a null classification never clears one.
    if let Some(branch) = classify(text) {
        if state.branch != Some(branch) {
            state.branch = Some(branch);
        }
    }

    if let Some(question) = next_question(state) {
        state.asked_question_ids.insert(question.id.to_string());
        state.pending_question_id = Some(question.id.to_string());
        return NextAction::AskClarifyingQuestion {
            question_id: question.id.to_string(),
            question: question.text.to_string(),
        };
    }

    NextAction::DelegateToFreeForm {
        text: text.to_string(),
        branch: state.branch,
        case_facts: state.case_facts.clone(),
    }
}

/// Outcome of the repeat-loop guard for a produced answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepeatDecision {
    /// Deliver the answer as produced.
    Deliver(String),
    /// The answer would have been the third identical response in a
    /// row; deliver the fixed escalation message instead.
    Escalate(String),
}

impl RepeatDecision {
    /// The text that actually goes to the user.
    pub fn into_text(self) -> String {
        match self {
            RepeatDecision::Deliver(text) | RepeatDecision::Escalate(text) => text,
        }
    }
}

/// Run the anti-loop guard over a produced answer.
///
/// Equal normalized text increments the repeat counter; different text
/// resets it and becomes the new last utterance. At
/// [`REPEAT_THRESHOLD`] the escalation message is substituted, the
/// counter resets, and the escalation itself is recorded as the last
/// utterance so the guard stays consistent on repeated triggering.
pub fn on_answer_produced(state: &mut UserConversationState, answer_text: &str) -> RepeatDecision {
    state.updated_at = Utc::now().timestamp();

    let normalized = normalize(answer_text);
    if !normalized.is_empty() && normalized == state.last_bot_utterance_normalized {
        state.repeat_count += 1;
    } else {
        state.repeat_count = 0;
        state.last_bot_utterance_normalized = normalized;
    }

    if state.repeat_count >= REPEAT_THRESHOLD {
        state.repeat_count = 0;
        state.last_bot_utterance_normalized = normalize(ESCALATION_MESSAGE);
        return RepeatDecision::Escalate(ESCALATION_MESSAGE.to_string());
    }
    RepeatDecision::Deliver(answer_text.to_string())
}

/// Store the correlation keys for the answer just sent.
pub fn record_answer_metadata(state: &mut UserConversationState, metadata: AnswerMetadata) {
    state.updated_at = Utc::now().timestamp();
    state.last_answer_metadata = Some(metadata);
}

/// Enter the "awaiting comment" sub-state: the next message from this
/// user is consumed as a comment on `answer_id`.
pub fn await_comment(state: &mut UserConversationState, answer_id: &str) {
    state.updated_at = Utc::now().timestamp();
    state.awaiting_comment_for_answer_id = Some(answer_id.to_string());
}

/// Fingerprint of the originating query, for feedback correlation.
pub fn query_fingerprint(query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize(query).as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_user_gets_first_generic_question_without_branch() {
        let mut state = UserConversationState::new();
        let action = on_incoming_message(&mut state, "меня заблокировали");
        assert_eq!(state.branch, None);
        match action {
            NextAction::AskClarifyingQuestion { question_id, .. } => {
                assert_eq!(question_id, "when_what");
            }
            other => panic!("expected question, got {:?}", other),
        }
    }

    #[test]
    fn test_branch_set_then_different_question() {
        let mut state = UserConversationState::new();
        on_incoming_message(&mut state, "меня заблокировали");

        let action = on_incoming_message(&mut state, "115-ФЗ подозрительная операция");
        assert_eq!(state.branch, Some(CaseBranch::AmlSuspiciousActivity));
        match action {
            NextAction::AskClarifyingQuestion { question_id, .. } => {
                assert_ne!(question_id, "when_what");
                assert_eq!(question_id, "aml_operation");
            }
            other => panic!("expected question, got {:?}", other),
        }
    }

    #[test]
    fn test_every_branch_leads_with_its_own_question() {
        let branches = [
            (CaseBranch::AmlSuspiciousActivity, "aml_operation"),
            (CaseBranch::RiskScoring, "zsk_level"),
            (CaseBranch::PaymentLaw, "payment_channel"),
            (CaseBranch::TaxAuthority, "tax_decision"),
            (CaseBranch::EnforcementAgency, "fssp_case"),
            (CaseBranch::Unexplained, "unexplained_contact"),
        ];
        for (branch, first_id) in branches {
            let mut state = UserConversationState::new();
            state.branch = Some(branch);
            let question = next_question(&state).unwrap();
            assert_eq!(question.id, first_id, "branch {:?}", branch);
        }
    }

    #[test]
    fn test_question_ids_never_repeat() {
        let mut state = UserConversationState::new();
        let mut seen = std::collections::BTreeSet::new();
        // Keep sending branch-matching text; every emitted question id
        // must be new until the script is exhausted.
        loop {
            match on_incoming_message(&mut state, "подозрительная операция по 115-ФЗ") {
                NextAction::AskClarifyingQuestion { question_id, .. } => {
                    assert!(seen.insert(question_id), "question id re-asked");
                }
                NextAction::DelegateToFreeForm { .. } => break,
                other => panic!("unexpected action {:?}", other),
            }
        }
        // Once exhausted, it stays delegated.
        assert!(matches!(
            on_incoming_message(&mut state, "подозрительная операция по 115-ФЗ"),
            NextAction::DelegateToFreeForm { .. }
        ));
    }

    #[test]
    fn test_answers_to_questions_become_case_facts() {
        let mut state = UserConversationState::new();
        on_incoming_message(&mut state, "меня заблокировали");
        on_incoming_message(&mut state, "вчера, заблокировали счёт");
        assert_eq!(
            state.case_facts.get("when_what").map(String::as_str),
            Some("вчера, заблокировали счёт")
        );
    }

    #[test]
    fn test_branch_overwritten_by_different_classification() {
        let mut state = UserConversationState::new();
        on_incoming_message(&mut state, "банк сослался на 115-ФЗ");
        assert_eq!(state.branch, Some(CaseBranch::AmlSuspiciousActivity));

        on_incoming_message(&mut state, "оказалось, это приставы наложили арест");
        assert_eq!(state.branch, Some(CaseBranch::EnforcementAgency));

        // Null classification never clears the branch.
        on_incoming_message(&mut state, "что мне делать дальше?");
        assert_eq!(state.branch, Some(CaseBranch::EnforcementAgency));
    }

    #[test]
    fn test_awaiting_comment_bypasses_classification() {
        let mut state = UserConversationState::new();
        await_comment(&mut state, "ans-1");

        let action = on_incoming_message(&mut state, "115-ФЗ — это было полезно");
        match action {
            NextAction::CommentRecorded { answer_id, comment } => {
                assert_eq!(answer_id, "ans-1");
                assert_eq!(comment, "115-ФЗ — это было полезно");
            }
            other => panic!("expected comment, got {:?}", other),
        }
        // The flag is cleared and classification was skipped.
        assert!(state.awaiting_comment_for_answer_id.is_none());
        assert_eq!(state.branch, None);
    }

    #[test]
    fn test_third_identical_answer_escalates_and_resets() {
        let mut state = UserConversationState::new();
        let answer = "Уточните, что написал банк?";

        assert!(matches!(
            on_answer_produced(&mut state, answer),
            RepeatDecision::Deliver(_)
        ));
        assert!(matches!(
            on_answer_produced(&mut state, answer),
            RepeatDecision::Deliver(_)
        ));

        match on_answer_produced(&mut state, answer) {
            RepeatDecision::Escalate(text) => {
                assert_eq!(text, ESCALATION_MESSAGE);
                assert_ne!(normalize(&text), normalize(answer));
            }
            RepeatDecision::Deliver(_) => panic!("expected escalation"),
        }
        assert_eq!(state.repeat_count, 0);
        assert_eq!(
            state.last_bot_utterance_normalized,
            normalize(ESCALATION_MESSAGE)
        );
    }

    #[test]
    fn test_different_answer_resets_counter() {
        let mut state = UserConversationState::new();
        on_answer_produced(&mut state, "ответ один");
        on_answer_produced(&mut state, "ответ один");
        assert_eq!(state.repeat_count, 1);

        on_answer_produced(&mut state, "совсем другой ответ");
        assert_eq!(state.repeat_count, 0);
        assert_eq!(state.last_bot_utterance_normalized, "совсем другой ответ");
    }

    #[test]
    fn test_repeat_comparison_ignores_whitespace_and_case() {
        let mut state = UserConversationState::new();
        on_answer_produced(&mut state, "Уточните детали");
        on_answer_produced(&mut state, "уточните   детали");
        assert_eq!(state.repeat_count, 1);
    }

    #[test]
    fn test_metadata_recorded() {
        let mut state = UserConversationState::new();
        let metadata = AnswerMetadata {
            answer_id: "ans-7".to_string(),
            query_fingerprint: query_fingerprint("почему заблокировали счёт"),
            rag_used: true,
            llm_used: false,
        };
        record_answer_metadata(&mut state, metadata.clone());
        assert_eq!(state.last_answer_metadata, Some(metadata));
    }

    #[test]
    fn test_query_fingerprint_normalizes() {
        assert_eq!(
            query_fingerprint("Почему  заблокировали"),
            query_fingerprint("почему заблокировали")
        );
        assert_ne!(query_fingerprint("а"), query_fingerprint("б"));
    }

    #[test]
    fn test_thread_id_minted_once() {
        let state = UserConversationState::new();
        assert!(!state.thread_id.is_empty());
        let json = serde_json::to_string(&state).unwrap();
        let roundtrip: UserConversationState = serde_json::from_str(&json).unwrap();
        assert_eq!(roundtrip.thread_id, state.thread_id);
    }
}
