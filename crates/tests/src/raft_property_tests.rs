//! Property tests for Raft safety under random schedules.
//!
//! Nodes are driven by hand (no timers): each step starts an election, runs one
//! replication round, proposes, or partitions a node. After every step the checks below
//! must hold:
//! - at most one leader is ever elected per term
//! - a node's commit index never decreases and committed entries never change
//! - logs that agree on an entry's term agree on the whole prefix before it

use crate::mock_infrastructure::{fast_raft_config, vote, verdict, TEST_TARGET};
use proptest::prelude::*;
use std::{collections::HashMap, sync::Arc};
use vigil_core::{
    raft::{Command, LocalNetwork, LogEntry, MemoryStorage, NodeId, RaftNode, RaftRole},
    types::VoteStatus,
};

const CLUSTER: u64 = 5;

#[derive(Debug, Clone)]
enum Step {
    Elect(NodeId),
    Replicate(NodeId),
    Propose(NodeId),
    Isolate(NodeId),
    Heal(NodeId),
}

fn step_strategy() -> impl Strategy<Value = Step> {
    let node = 1..=CLUSTER;
    prop_oneof![
        3 => node.clone().prop_map(Step::Elect),
        5 => node.clone().prop_map(Step::Replicate),
        3 => node.clone().prop_map(Step::Propose),
        1 => node.clone().prop_map(Step::Isolate),
        2 => node.prop_map(Step::Heal),
    ]
}

fn build_cluster() -> (Arc<LocalNetwork>, Vec<Arc<RaftNode>>) {
    let network = LocalNetwork::new();
    let ids: Vec<NodeId> = (1..=CLUSTER).collect();
    let nodes: Vec<Arc<RaftNode>> = ids
        .iter()
        .map(|&id| {
            let node = RaftNode::new(
                id,
                ids.clone(),
                fast_raft_config(),
                Arc::new(network.transport(id)),
                Arc::new(MemoryStorage::new()),
            )
            .expect("valid raft config");
            let node = Arc::new(node);
            network.register(&node);
            node
        })
        .collect();
    (network, nodes)
}

fn check_log_matching(nodes: &[Arc<RaftNode>]) -> Result<(), TestCaseError> {
    let logs: Vec<Vec<LogEntry>> = nodes.iter().map(|n| n.log_entries()).collect();
    for a in 0..logs.len() {
        for b in (a + 1)..logs.len() {
            let shared = logs[a].len().min(logs[b].len());
            for i in (0..shared).rev() {
                if logs[a][i].term == logs[b][i].term {
                    prop_assert_eq!(&logs[a][..=i], &logs[b][..=i], "logs of {} and {} diverge", a + 1, b + 1);
                    break;
                }
            }
        }
    }
    Ok(())
}

fn run_schedule(steps: Vec<Step>) -> Result<(), TestCaseError> {
    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().expect("runtime");

    rt.block_on(async move {
        let (network, nodes) = build_cluster();
        let mut leaders_by_term: HashMap<u64, NodeId> = HashMap::new();
        let mut committed: Vec<Vec<LogEntry>> = vec![Vec::new(); nodes.len()];

        for step in steps {
            match step {
                Step::Elect(id) => nodes[(id - 1) as usize].start_election().await,
                Step::Replicate(id) => nodes[(id - 1) as usize].replicate_once().await,
                Step::Propose(id) => {
                    let status = if id % 2 == 0 { VoteStatus::Down } else { VoteStatus::Up };
                    let command = Command::Verdict(verdict(TEST_TARGET, status, vec![vote(id, status)]));
                    let _ = nodes[(id - 1) as usize].propose(command);
                }
                Step::Isolate(id) => network.isolate(id),
                Step::Heal(id) => network.heal(id),
            }

            for (slot, node) in nodes.iter().enumerate() {
                if node.role() == RaftRole::Leader {
                    let term = node.current_term();
                    let leader = *leaders_by_term.entry(term).or_insert(node.id());
                    prop_assert_eq!(leader, node.id(), "two leaders in term {}", term);
                }

                let now = node.committed_entries();
                let before = &committed[slot];
                prop_assert!(now.len() >= before.len(), "commit index of {} went backwards", node.id());
                prop_assert_eq!(&now[..before.len()], &before[..], "committed entries of {} changed", node.id());
                committed[slot] = now;
            }
            check_log_matching(&nodes)?;
        }
        Ok(())
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_raft_safety_under_random_schedules(steps in prop::collection::vec(step_strategy(), 1..80)) {
        run_schedule(steps)?;
    }
}

#[test]
fn test_scripted_schedule_commits_on_majority() {
    let steps = vec![
        Step::Elect(1),
        Step::Propose(1),
        Step::Replicate(1),
        Step::Replicate(1),
        Step::Isolate(1),
        Step::Elect(2),
        Step::Propose(2),
        Step::Replicate(2),
        Step::Heal(1),
        Step::Replicate(2),
        Step::Replicate(2),
    ];
    run_schedule(steps).expect("safety holds");
}
