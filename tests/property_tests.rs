//! Property-based tests for the guard, the unit patcher, and the listing filters.
//!
//! These tests use proptest to verify properties hold across
//! many randomly generated inputs.

use chrono::Utc;
use cryptprep::host::systemd::{matching_mountpoints, matching_units};
use cryptprep::host::DistroInfo;
use cryptprep::states::insert_kill_mode;
use cryptprep::testing::TestHost;
use cryptprep::{EncryptionError, EncryptionState, PrereqState, StateHistory, StateOutcome, StateTransition};
use proptest::prelude::*;

prop_compose! {
    fn arbitrary_outcome()(variant in 0..3u8) -> StateOutcome {
        match variant {
            0 => StateOutcome::Skipped,
            1 => StateOutcome::Completed,
            _ => StateOutcome::Incomplete,
        }
    }
}

prop_compose! {
    fn unsupported_distro()(
        family in "[A-Za-z]{3,10}",
        version in "[0-9]{2}\\.[0-9]{2}",
    ) -> DistroInfo {
        DistroInfo::new(family, version)
    }
}

fn unit_body() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(
        prop_oneof![
            Just("[Service]".to_string()),
            Just("[Unit]".to_string()),
            Just("[Install]".to_string()),
            "[A-Za-z]{1,8}=[a-z0-9/ ]{0,12}",
        ],
        0..12,
    )
}

proptest! {
    #[test]
    fn should_enter_is_deterministic(marker_present in any::<bool>(), calls in 1..5usize) {
        let host = TestHost::new();
        if marker_present {
            host.fs.insert(host.config.markers_dir.join("PrereqState"), "");
        }
        let state = PrereqState::new(host.context());

        let answers: Vec<bool> = (0..calls).map(|_| state.should_enter()).collect();

        prop_assert!(answers.iter().all(|answer| *answer == !marker_present));
        prop_assert!(host.journal.events().is_empty());
    }

    #[test]
    fn kill_mode_added_once_per_service_header(lines in unit_body()) {
        let unit = lines.iter().map(|line| format!("{line}\n")).collect::<String>();
        let headers = unit.matches("[Service]\n").count();
        let before = unit.matches("KillMode=process").count();

        let patched = insert_kill_mode(&unit);

        prop_assert_eq!(patched.matches("KillMode=process").count(), before + headers);
        prop_assert_eq!(patched.replace("KillMode=process\n", ""), unit.replace("KillMode=process\n", ""));
    }

    #[test]
    fn unsupported_distros_never_mutate(distro in unsupported_distro()) {
        prop_assume!(distro.family.to_lowercase() != "ubuntu" || distro.version != "20.04");
        let host = TestHost::with_distro(distro);
        host.seed_prerequisites("[Service]\nType=simple\n");
        let mut state = PrereqState::new(host.context());

        let result = state.enter();

        let is_unsupported = matches!(result, Err(EncryptionError::UnsupportedDistro { .. }));
        prop_assert!(is_unsupported);
        prop_assert!(host.journal.events().is_empty());
    }

    #[test]
    fn matching_units_only_returns_filtered_lines(
        units in prop::collection::vec("[a-z]{1,6}(-[a-z0-9]{1,4})?\\.(service|mount|socket)", 0..10),
        filter in "[a-z]{1,3}",
    ) {
        let listing = units
            .iter()
            .map(|unit| format!("{unit} enabled enabled\n"))
            .collect::<String>();

        let matched = matching_units(&listing, &filter);

        let expected: Vec<&String> = units.iter().filter(|unit| unit.contains(filter.as_str())).collect();
        prop_assert_eq!(matched.len(), expected.len());
        for (found, unit) in matched.iter().zip(expected) {
            prop_assert_eq!(found, unit);
        }
    }

    #[test]
    fn matching_mountpoints_never_yields_blank_lines(
        mounts in prop::collection::vec("(/[a-z0-9]{1,6}){0,3}|\\s*", 0..10),
    ) {
        let listing = mounts.join("\n");

        let matched = matching_mountpoints(&listing, "/");

        prop_assert!(matched.iter().all(|mount| !mount.is_empty() && mount.contains('/')));
    }

    #[test]
    fn history_counts_only_entered_attempts(outcomes in prop::collection::vec(arbitrary_outcome(), 0..10)) {
        let history = outcomes.iter().enumerate().fold(StateHistory::new(), |history, (i, outcome)| {
            history.record(StateTransition {
                state: "PrereqState".to_string(),
                outcome: *outcome,
                timestamp: Utc::now(),
                attempt: i + 1,
            })
        });

        let entered = outcomes.iter().filter(|o| **o != StateOutcome::Skipped).count();
        prop_assert_eq!(history.attempts("PrereqState"), entered);
        prop_assert_eq!(history.transitions().len(), outcomes.len());
    }

    #[test]
    fn history_roundtrip_serialization(outcomes in prop::collection::vec(arbitrary_outcome(), 0..10)) {
        let history = outcomes.iter().fold(StateHistory::new(), |history, outcome| {
            history.record(StateTransition {
                state: "PrereqState".to_string(),
                outcome: *outcome,
                timestamp: Utc::now(),
                attempt: 1,
            })
        });

        let json = serde_json::to_string(&history).unwrap();
        let decoded: StateHistory = serde_json::from_str(&json).unwrap();

        prop_assert_eq!(history, decoded);
    }
}
