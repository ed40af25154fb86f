//! Voting contract — one vote per address over a fixed candidate list

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ContractLogic;
use crate::normalizer::{names_match, normalize_name};
use crate::{Error, Result};

/// `code` identifier of the voting contract.
pub const VOTING_CODE: &str = "voting";

/// One entry of the candidate list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub name: String,
    #[serde(alias = "vote")]
    pub vote_count: u64,
}

/// Contract-defined `variable` of a voting account.
///
/// `voters` keeps first-vote order so the encoded state is reproducible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingState {
    #[serde(alias = "candidate")]
    pub candidates: Vec<Candidate>,
    #[serde(default, alias = "voter")]
    pub voters: Vec<String>,
}

/// Payload of a vote call: `{"candidateName": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotePayload {
    pub candidate_name: String,
}

impl VotePayload {
    pub fn new(candidate_name: impl Into<String>) -> Self {
        VotePayload {
            candidate_name: candidate_name.into(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "candidateName": self.candidate_name })
    }

    /// Decode and validate a call payload.
    pub fn from_json(payload: &serde_json::Value) -> Result<Self> {
        let decoded: VotePayload = serde_json::from_value(payload.clone())
            .map_err(|e| Error::Validation(format!("invalid vote payload: {}", e)))?;
        if decoded.candidate_name.trim().is_empty() {
            return Err(Error::Validation("candidateName must not be empty".into()));
        }
        Ok(decoded)
    }
}

impl VotingState {
    /// Fresh state with every candidate at zero votes.
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let candidates: Vec<Candidate> = names
            .into_iter()
            .map(|name| Candidate {
                name: name.into(),
                vote_count: 0,
            })
            .collect();
        let state = VotingState {
            candidates,
            voters: Vec::new(),
        };
        state.validate()?;
        Ok(state)
    }

    pub fn has_voted(&self, address: &str) -> bool {
        self.voters.iter().any(|voter| voter == address)
    }

    /// Index of the candidate selected by a submitted name.
    pub fn find_candidate(&self, submitted: &str) -> Option<usize> {
        self.candidates
            .iter()
            .position(|candidate| names_match(&candidate.name, submitted))
    }

    /// Record `caller`'s vote for `candidate_name`.
    ///
    /// Returns a new state; `self` is never modified. Fails with
    /// `DuplicateVoter` if `caller` has voted before, otherwise with
    /// `UnknownCandidate` if no candidate matches.
    pub fn apply(&self, caller: &str, candidate_name: &str) -> Result<VotingState> {
        if caller.is_empty() {
            return Err(Error::Validation("caller address must not be empty".into()));
        }
        if self.has_voted(caller) {
            return Err(Error::DuplicateVoter {
                address: caller.to_string(),
            });
        }
        let chosen = self
            .find_candidate(candidate_name)
            .ok_or_else(|| Error::UnknownCandidate {
                candidate: candidate_name.to_string(),
            })?;

        let selected = &self.candidates[chosen];
        let bumped = selected.vote_count.checked_add(1).ok_or_else(|| {
            Error::Validation(format!("vote count of '{}' would overflow", selected.name))
        })?;
        let mut candidates = self.candidates.clone();
        candidates[chosen].vote_count = bumped;
        let mut voters = self.voters.clone();
        voters.push(caller.to_string());

        Ok(VotingState { candidates, voters })
    }

    /// `(name, voteCount)` pairs in candidate order.
    pub fn tally(&self) -> Vec<(&str, u64)> {
        self.candidates
            .iter()
            .map(|candidate| (candidate.name.as_str(), candidate.vote_count))
            .collect()
    }

    /// Sum of all vote counts. Fails with `Validation` if it does not fit
    /// in a `u64`.
    pub fn total_votes(&self) -> Result<u64> {
        self.candidates.iter().try_fold(0u64, |total, candidate| {
            total
                .checked_add(candidate.vote_count)
                .ok_or_else(|| Error::Validation("vote total overflows u64".into()))
        })
    }

    /// Check the state invariants: non-empty, case-insensitively unique
    /// candidate names; non-empty, unique voters; one vote per voter.
    pub fn validate(&self) -> Result<()> {
        if self.candidates.is_empty() {
            return Err(Error::Validation(
                "voting contract needs at least one candidate".into(),
            ));
        }
        let mut seen = BTreeSet::new();
        for candidate in &self.candidates {
            if candidate.name.trim().is_empty() {
                return Err(Error::Validation("candidate name must not be empty".into()));
            }
            if !seen.insert(normalize_name(&candidate.name)) {
                return Err(Error::Validation(format!(
                    "duplicate candidate '{}'",
                    candidate.name
                )));
            }
        }
        let mut voters = BTreeSet::new();
        for voter in &self.voters {
            if voter.is_empty() {
                return Err(Error::Validation("voter address must not be empty".into()));
            }
            if !voters.insert(voter.as_str()) {
                return Err(Error::Validation(format!(
                    "address '{}' recorded as voter more than once",
                    voter
                )));
            }
        }
        let total = self.total_votes()?;
        if total != self.voters.len() as u64 {
            return Err(Error::Validation(format!(
                "vote total {} does not match {} recorded voters",
                total,
                self.voters.len()
            )));
        }
        Ok(())
    }

    fn from_variable(variable: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(variable.clone())
            .map_err(|e| Error::Validation(format!("invalid voting state: {}", e)))
    }

    fn to_variable(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self)
            .map_err(|e| Error::Validation(format!("failed to encode voting state: {}", e)))
    }
}

/// [`ContractLogic`] adapter for [`VotingState`].
#[derive(Debug, Clone, Copy, Default)]
pub struct VotingContract;

impl ContractLogic for VotingContract {
    fn code(&self) -> &'static str {
        VOTING_CODE
    }

    fn apply(
        &self,
        variable: &serde_json::Value,
        caller: &str,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let state = VotingState::from_variable(variable)?;
        let vote = VotePayload::from_json(payload)?;
        let next = state.apply(caller, &vote.candidate_name)?;
        debug!(
            caller,
            candidate = %vote.candidate_name,
            voters = next.voters.len(),
            "vote recorded"
        );
        next.to_variable()
    }

    fn validate_state(&self, variable: &serde_json::Value) -> Result<()> {
        VotingState::from_variable(variable)?.validate()
    }

    fn check_transition(
        &self,
        before: &serde_json::Value,
        after: &serde_json::Value,
    ) -> Result<()> {
        let before = VotingState::from_variable(before)?;
        let after = VotingState::from_variable(after)?;
        let names_before: Vec<&str> = before.candidates.iter().map(|c| c.name.as_str()).collect();
        let names_after: Vec<&str> = after.candidates.iter().map(|c| c.name.as_str()).collect();
        if names_before != names_after {
            return Err(Error::Validation("candidate list changed after deployment".into()));
        }
        if !after.voters.starts_with(&before.voters) {
            return Err(Error::Validation("recorded voters were removed or reordered".into()));
        }
        for (old, new) in before.candidates.iter().zip(&after.candidates) {
            if new.vote_count < old.vote_count {
                return Err(Error::Validation(format!(
                    "vote count of '{}' decreased",
                    new.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state0() -> VotingState {
        VotingState::new(["Dung", "Tuan", "Thanh", "Cuong"]).unwrap()
    }

    fn counts(state: &VotingState) -> Vec<u64> {
        state.candidates.iter().map(|c| c.vote_count).collect()
    }

    #[test]
    fn test_new_state_starts_at_zero() {
        let state = state0();
        assert_eq!(counts(&state), vec![0, 0, 0, 0]);
        assert!(state.voters.is_empty());
        assert_eq!(state.total_votes().unwrap(), 0);
    }

    #[test]
    fn test_new_rejects_duplicate_candidates() {
        let err = VotingState::new(["Tuan", "tuan"]).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_new_rejects_empty_candidate_list() {
        let err = VotingState::new(Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_concrete_scenario() {
        let state0 = state0();

        let state1 = state0.apply("addrA", "Tuan").unwrap();
        assert_eq!(counts(&state1), vec![0, 1, 0, 0]);
        assert_eq!(state1.voters, vec!["addrA"]);

        let err = state1.apply("addrA", "Tuan").unwrap_err();
        assert_eq!(
            err,
            Error::DuplicateVoter {
                address: "addrA".into()
            }
        );

        let err = state1.apply("addrB", "Zorro").unwrap_err();
        assert_eq!(
            err,
            Error::UnknownCandidate {
                candidate: "Zorro".into()
            }
        );

        let state2 = state1.apply("addrB", "Tuan").unwrap();
        assert_eq!(counts(&state2), vec![0, 2, 0, 0]);
        assert_eq!(state2.voters, vec!["addrA", "addrB"]);

        // Prior snapshots are untouched
        assert_eq!(counts(&state0), vec![0, 0, 0, 0]);
        assert_eq!(counts(&state1), vec![0, 1, 0, 0]);
    }

    #[test]
    fn test_one_vote_invariant() {
        let mut state = state0();
        state = state.apply("addrA", "Dung").unwrap();
        for candidate in ["Dung", "Tuan", "Thanh", "Cuong", "Zorro"] {
            let err = state.apply("addrA", candidate).unwrap_err();
            assert!(matches!(err, Error::DuplicateVoter { .. }));
        }
        assert_eq!(state.voters.len(), 1);
        assert_eq!(state.total_votes().unwrap(), 1);
    }

    #[test]
    fn test_duplicate_voter_checked_before_candidate() {
        let state = state0().apply("addrA", "Dung").unwrap();
        let err = state.apply("addrA", "Zorro").unwrap_err();
        assert!(matches!(err, Error::DuplicateVoter { .. }));
    }

    #[test]
    fn test_tally_correctness() {
        let mut state = state0();
        for i in 0..25 {
            state = state.apply(&format!("addr{}", i), "Thanh").unwrap();
        }
        assert_eq!(counts(&state), vec![0, 0, 25, 0]);
        assert_eq!(state.voters.len(), 25);
        state.validate().unwrap();
    }

    #[test]
    fn test_unknown_candidate_leaves_state_identical() {
        let state = state0().apply("addrA", "Tuan").unwrap();
        let before = serde_json::to_string(&state).unwrap();
        assert!(state.apply("addrB", "Zorro").is_err());
        assert_eq!(serde_json::to_string(&state).unwrap(), before);
    }

    #[test]
    fn test_candidate_match_is_case_insensitive() {
        let state = state0().apply("addrA", "  tUAN ").unwrap();
        assert_eq!(counts(&state), vec![0, 1, 0, 0]);
        // Stored spelling is preserved
        assert_eq!(state.candidates[1].name, "Tuan");
    }

    #[test]
    fn test_empty_caller_is_validation_error() {
        let err = state0().apply("", "Tuan").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_wire_shape() {
        let state = state0().apply("addrA", "Tuan").unwrap();
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["candidates"][1], serde_json::json!({"name": "Tuan", "voteCount": 1}));
        assert_eq!(json["voters"], serde_json::json!(["addrA"]));
    }

    #[test]
    fn test_decodes_legacy_field_names() {
        let legacy = serde_json::json!({
            "candidate": [{"name": "Dung", "vote": 2}],
            "voter": ["a", "b"]
        });
        let state: VotingState = serde_json::from_value(legacy).unwrap();
        assert_eq!(state.candidates[0].vote_count, 2);
        assert_eq!(state.voters, vec!["a", "b"]);
    }

    #[test]
    fn test_validate_detects_repeated_voter() {
        let state = VotingState {
            candidates: vec![Candidate {
                name: "Dung".into(),
                vote_count: 2,
            }],
            voters: vec!["a".into(), "a".into()],
        };
        assert!(state.validate().is_err());
    }

    #[test]
    fn test_validate_detects_tally_mismatch() {
        let state = VotingState {
            candidates: vec![Candidate {
                name: "Dung".into(),
                vote_count: 3,
            }],
            voters: vec!["a".into()],
        };
        assert!(state.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_overflowing_total() {
        // Wrapping would sum to 1 and match the single voter
        let state = VotingState {
            candidates: vec![
                Candidate {
                    name: "Dung".into(),
                    vote_count: u64::MAX,
                },
                Candidate {
                    name: "Tuan".into(),
                    vote_count: 2,
                },
            ],
            voters: vec!["a".into()],
        };
        assert!(matches!(state.total_votes(), Err(Error::Validation(_))));
        assert!(matches!(state.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_apply_rejects_count_overflow() {
        let state = VotingState {
            candidates: vec![Candidate {
                name: "Dung".into(),
                vote_count: u64::MAX,
            }],
            voters: vec![],
        };
        let result = state.apply("addrA", "Dung");
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_payload_validation() {
        assert!(VotePayload::from_json(&serde_json::json!({"candidateName": "Tuan"})).is_ok());
        assert!(matches!(
            VotePayload::from_json(&serde_json::json!({"candidate": "Tuan"})),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            VotePayload::from_json(&serde_json::json!({"candidateName": "  "})),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_contract_logic_rejects_malformed_state() {
        let err = VotingContract
            .apply(
                &serde_json::json!({"nothing": true}),
                "addrA",
                &VotePayload::new("Tuan").to_json(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_check_transition_rejects_candidate_change() {
        let before = serde_json::to_value(state0()).unwrap();
        let after = serde_json::to_value(VotingState::new(["Dung", "Tuan"]).unwrap()).unwrap();
        assert!(VotingContract.check_transition(&before, &after).is_err());

        let voted = serde_json::to_value(state0().apply("addrA", "Dung").unwrap()).unwrap();
        assert!(VotingContract.check_transition(&before, &voted).is_ok());
        assert!(VotingContract.check_transition(&voted, &before).is_err());
    }

    #[test]
    fn test_apply_determinism_100_iterations() {
        let state = state0();
        let first = state.apply("addrA", "Cuong").unwrap();
        for i in 0..100 {
            let next = state.apply("addrA", "Cuong").unwrap();
            assert_eq!(first, next, "Non-determinism at iteration {}", i);
        }
    }
}
