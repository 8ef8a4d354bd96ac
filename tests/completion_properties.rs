// tests/completion_properties.rs

mod common;

use common::*;
use nomad_pipeline::completion::is_done;
use nomad_pipeline::nomad::model::AllocationStub;
use proptest::prelude::*;

const STAGES: [&str; 4] = ["A", "B", "C", "D"];

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Succeeded,
    Failed,
    Running,
}

fn outcome_strategy() -> impl Strategy<Value = Outcome> {
    prop_oneof![
        Just(Outcome::Succeeded),
        Just(Outcome::Failed),
        Just(Outcome::Running),
    ]
}

/// Up to 3 replicas per stage, each with a random outcome.
fn snapshot_strategy() -> impl Strategy<Value = Vec<AllocationStub>> {
    proptest::collection::vec((0..STAGES.len(), 0u32..3, outcome_strategy()), 0..12).prop_map(
        |entries| {
            let mut allocs: Vec<AllocationStub> = Vec::new();
            for (stage, slot, outcome) in entries {
                let group = STAGES[stage];
                let id = format!("{group}-{slot}");
                if allocs.iter().any(|a| a.id == id) {
                    continue;
                }
                let state = match outcome {
                    Outcome::Succeeded => succeeded(),
                    Outcome::Failed => failed(),
                    Outcome::Running => running(),
                };
                allocs.push(
                    AllocBuilder::new(&id, group)
                        .slot(slot)
                        .state("main", state)
                        .build(),
                );
            }
            allocs
        },
    )
}

fn stages_strategy() -> impl Strategy<Value = Vec<&'static str>> {
    proptest::sample::subsequence(STAGES.to_vec(), 1..=STAGES.len())
}

/// Reference model: every requested stage has allocations and all of them
/// succeeded.
fn expected(allocs: &[AllocationStub], stages: &[&str]) -> bool {
    stages.iter().all(|stage| {
        let mine: Vec<_> = allocs.iter().filter(|a| a.task_group == *stage).collect();
        !mine.is_empty()
            && mine.iter().all(|a| {
                a.task_states
                    .values()
                    .all(|s| s.is_terminal() && !s.failed)
            })
    })
}

proptest! {
    #[test]
    fn matches_reference_model(allocs in snapshot_strategy(), stages in stages_strategy()) {
        prop_assert_eq!(is_done(&allocs, &stages, true), expected(&allocs, &stages));
    }

    #[test]
    fn insensitive_to_input_order(allocs in snapshot_strategy(), stages in stages_strategy()) {
        let mut reversed = allocs.clone();
        reversed.reverse();

        for require_success in [true, false] {
            prop_assert_eq!(
                is_done(&allocs, &stages, require_success),
                is_done(&reversed, &stages, require_success)
            );
        }
    }

    #[test]
    fn insensitive_to_duplicates(allocs in snapshot_strategy(), stages in stages_strategy()) {
        let mut doubled = allocs.clone();
        doubled.extend(allocs.iter().cloned());

        prop_assert_eq!(is_done(&allocs, &stages, true), is_done(&doubled, &stages, true));
    }

    #[test]
    fn empty_inputs_are_false(allocs in snapshot_strategy(), stages in stages_strategy()) {
        let none: [&str; 0] = [];
        prop_assert!(!is_done(&allocs, &none, true));
        prop_assert!(!is_done(&[], &stages, false));
    }
}
