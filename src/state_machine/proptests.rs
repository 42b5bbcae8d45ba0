//! Property-based tests for the transition engine and the sequencer
//!
//! These tests verify key invariants hold across all possible inputs.

use super::*;
use crate::conversation::{Conversation, SequenceError};
use crate::joule::{BotExecInfo, CodeInfo, Joule, JouleState, JouleType, StopReason};
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_stop_reason() -> impl Strategy<Value = Option<StopReason>> {
    prop_oneof![
        Just(Some(StopReason::EndTurn)),
        Just(Some(StopReason::ConfirmCode)),
        Just(None),
    ]
}

fn arb_settled_state() -> impl Strategy<Value = JouleState> {
    prop_oneof![
        4 => Just(JouleState::Complete),
        1 => Just(JouleState::Error),
    ]
}

fn arb_code_info() -> impl Strategy<Value = CodeInfo> {
    proptest::option::of("[0-9a-f]{7}").prop_map(|commit| CodeInfo {
        commit,
        diff_info: None,
    })
}

/// Knobs used to build a joule of a given type
#[derive(Debug, Clone)]
struct JouleSeed {
    message: String,
    stop_reason: Option<StopReason>,
    confirmed: bool,
    code_info: CodeInfo,
    state: JouleState,
}

fn arb_seed() -> impl Strategy<Value = JouleSeed> {
    (
        "[a-zA-Z ]{0,20}",
        arb_stop_reason(),
        any::<bool>(),
        arb_code_info(),
        arb_settled_state(),
    )
        .prop_map(|(message, stop_reason, confirmed, code_info, state)| JouleSeed {
            message,
            stop_reason,
            confirmed,
            code_info,
            state,
        })
}

fn arb_joule_type() -> impl Strategy<Value = JouleType> {
    prop_oneof![
        Just(JouleType::HumanChat),
        Just(JouleType::HumanConfirmCode),
        Just(JouleType::BotChat),
        Just(JouleType::BotCode),
    ]
}

fn build(joule_type: JouleType, seed: &JouleSeed) -> Joule {
    let joule = match joule_type {
        JouleType::HumanChat => Joule::human_chat(seed.message.clone(), None),
        JouleType::HumanConfirmCode => Joule::human_confirm_code(seed.confirmed),
        JouleType::BotChat => {
            Joule::bot_chat(seed.message.clone(), seed.stop_reason, BotExecInfo::default())
        }
        JouleType::BotCode => Joule::bot_code(
            seed.message.clone(),
            seed.code_info.clone(),
            BotExecInfo::default(),
        ),
    };
    // Only bot joules fail in practice
    if joule_type.is_bot() {
        joule.with_state(seed.state)
    } else {
        joule
    }
}

/// Drive a conversation by always building the expected joule type
fn legal_conversation(seeds: &[JouleSeed]) -> Conversation {
    let mut conv = Conversation::default();
    for seed in seeds {
        let joule = build(conv.expected_next_type(), seed);
        conv.append(joule).expect("expected joule type must be accepted");
    }
    conv
}

fn type_path(conv: &Conversation) -> Vec<JouleType> {
    conv.joules().iter().map(Joule::joule_type).collect()
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // The committed type sequence is exactly the path the engine generates
    #[test]
    fn prop_history_follows_engine(seeds in proptest::collection::vec(arb_seed(), 0..30)) {
        let conv = legal_conversation(&seeds);

        let mut expected = next_joule_type(None);
        for joule in conv.joules() {
            prop_assert_eq!(joule.joule_type(), expected);
            expected = decide(Some(joule)).unwrap();
        }
        prop_assert_eq!(conv.expected_next_type(), expected);
    }

    // Exactly one joule type is legal at every point
    #[test]
    fn prop_exactly_one_type_accepted(
        seeds in proptest::collection::vec(arb_seed(), 0..20),
        seed in arb_seed(),
    ) {
        let conv = legal_conversation(&seeds);
        let accepted: Vec<JouleType> = [
            JouleType::HumanChat,
            JouleType::HumanConfirmCode,
            JouleType::BotChat,
            JouleType::BotCode,
        ]
        .into_iter()
        .filter(|t| conv.clone().append(build(*t, &seed)).is_ok())
        .collect();

        prop_assert_eq!(accepted, vec![conv.expected_next_type()]);
    }

    // A rejected append never mutates history
    #[test]
    fn prop_rejected_append_is_noop(
        seeds in proptest::collection::vec(arb_seed(), 0..20),
        candidate_type in arb_joule_type(),
        seed in arb_seed(),
    ) {
        let mut conv = legal_conversation(&seeds);
        let before = conv.clone();
        let expected = conv.expected_next_type();

        match conv.append(build(candidate_type, &seed)) {
            Ok(_) => prop_assert_eq!(candidate_type, expected),
            Err(SequenceError::ProtocolViolation { expected: e, actual }) => {
                prop_assert_eq!(e, expected);
                prop_assert_eq!(actual, candidate_type);
                prop_assert_eq!(&conv, &before);
            }
            Err(other) => prop_assert!(false, "unexpected error: {:?}", other),
        }
    }

    // HumanConfirmCode only ever follows a completed BotChat asking for confirmation
    #[test]
    fn prop_confirm_follows_confirm_request(seeds in proptest::collection::vec(arb_seed(), 0..30)) {
        let conv = legal_conversation(&seeds);
        for pair in conv.joules().windows(2) {
            if pair[1].joule_type() == JouleType::HumanConfirmCode {
                prop_assert_eq!(pair[0].state(), JouleState::Complete);
                prop_assert!(
                    matches!(
                        pair[0].body(),
                        crate::joule::JouleBody::BotChat {
                            stop_reason: Some(StopReason::ConfirmCode),
                            ..
                        }
                    ),
                    "confirmation after {:?}",
                    pair[0]
                );
            }
        }
    }

    // Error joules always hand the turn back to the human
    #[test]
    fn prop_error_joule_expects_human_chat(joule_type in arb_joule_type(), seed in arb_seed()) {
        let joule = build(joule_type, &seed).with_state(JouleState::Error);
        prop_assert_eq!(decide(Some(&joule)), Ok(JouleType::HumanChat));
    }

    // Partial tails never influence the next decision
    #[test]
    fn prop_partial_tail_is_transparent(seeds in proptest::collection::vec(arb_seed(), 0..20)) {
        let mut conv = legal_conversation(&seeds);
        let expected = conv.expected_next_type();
        let last_complete = conv.last_complete_joule().cloned();

        let partial = match expected {
            JouleType::BotChat => Some(Joule::partial_bot_chat()),
            JouleType::BotCode => Some(Joule::partial_bot_code()),
            JouleType::HumanChat | JouleType::HumanConfirmCode => None,
        };

        if let Some(partial) = partial {
            conv.append(partial).unwrap();
            prop_assert_eq!(conv.expected_next_type(), expected);
            prop_assert_eq!(conv.last_complete_joule().cloned(), last_complete);
        }
    }

    // Rollback restores the decision that followed the kept joule
    #[test]
    fn prop_rollback_restores_expectation(
        seeds in proptest::collection::vec(arb_seed(), 1..20),
        index in any::<prop::sample::Index>(),
    ) {
        let mut conv = legal_conversation(&seeds);
        let keep = index.index(conv.len());
        let target = conv.joules()[keep].clone();
        let expected_after_target = decide(Some(&target)).unwrap();

        let removed = conv.rollback(target.id()).unwrap();
        prop_assert_eq!(removed, seeds.len() - keep - 1);
        prop_assert_eq!(conv.len(), keep + 1);
        prop_assert_eq!(conv.expected_next_type(), expected_after_target);
    }

    // Serialization round-trips order and every field
    #[test]
    fn prop_serde_round_trip(seeds in proptest::collection::vec(arb_seed(), 0..20)) {
        let conv = legal_conversation(&seeds);
        let json = serde_json::to_string(&conv).unwrap();
        let restored: Conversation = serde_json::from_str(&json).unwrap();

        prop_assert_eq!(type_path(&restored), type_path(&conv));
        prop_assert_eq!(&restored, &conv);
        prop_assert_eq!(
            Conversation::restore(restored.base().clone(), restored.joules().to_vec()),
            Ok(conv)
        );
    }
}
