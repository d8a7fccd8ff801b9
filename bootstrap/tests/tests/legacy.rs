use crate::fixture::TestNode;
use rsban_bootstrap::{
    attempts::FrontierTarget,
    stats::{DetailType, StatType},
    transport::test_endpoint,
    BootstrapInitiatorExt,
};
use rsban_core::{BlockHash, TestAccountChain};
use std::time::Duration;
use test_helpers::{assert_timely, assert_timely_eq};

fn target(chain: &TestAccountChain, end: BlockHash) -> FrontierTarget {
    FrontierTarget {
        account: chain.account(),
        head: chain.frontier(),
        end,
    }
}

#[test]
fn pulls_missing_account_chains() {
    let node = TestNode::new(1);
    let chain = node.serve_chain(5);

    node.initiator
        .bootstrap(false, String::new(), vec![target(&chain, BlockHash::zero())]);

    assert_timely(Duration::from_secs(10), || node.has_blocks(chain.blocks()));
    assert_timely(Duration::from_secs(10), || !node.initiator.in_progress());
    assert_eq!(node.stat(StatType::BootstrapPull, DetailType::BlocksReceived), 5);
    assert_eq!(node.stat(StatType::BootstrapPull, DetailType::PullCompleted), 1);
}

#[test]
fn pulls_only_blocks_above_local_frontier() {
    let node = TestNode::new(1);
    let chain = node.serve_chain(6);
    for block in &chain.blocks()[..2] {
        node.ledger.add_block(block.hash());
    }
    let blocks_before = node.ledger.block_count();

    node.initiator
        .bootstrap(false, String::new(), vec![target(&chain, chain.block(2).hash())]);

    assert_timely(Duration::from_secs(10), || node.has_blocks(chain.blocks()));
    assert_timely(Duration::from_secs(10), || !node.initiator.in_progress());
    assert_eq!(node.ledger.block_count(), blocks_before + 4);
    assert_eq!(node.stat(StatType::BootstrapPull, DetailType::BlocksReceived), 4);
}

#[test]
fn pulls_many_accounts_from_several_peers() {
    let node = TestNode::new(3);
    let chains: Vec<_> = (0..20).map(|i| node.serve_chain(1 + i % 4)).collect();
    let targets = chains
        .iter()
        .map(|c| target(c, BlockHash::zero()))
        .collect();

    node.initiator.bootstrap(false, String::new(), targets);

    assert_timely(Duration::from_secs(20), || {
        chains.iter().all(|c| node.has_blocks(c.blocks()))
    });
    assert_timely(Duration::from_secs(10), || !node.initiator.in_progress());
    assert_eq!(node.stat(StatType::BootstrapPull, DetailType::PullCompleted), 20);
}

#[test]
fn bootstrap_with_given_peer() {
    let node = TestNode::new(0);
    let connects = node.connector.track_connects();
    let chain = node.serve_chain(3);

    node.initiator.bootstrap_with_peer(
        test_endpoint(42),
        String::new(),
        vec![target(&chain, BlockHash::zero())],
    );

    assert_timely(Duration::from_secs(10), || node.has_blocks(chain.blocks()));
    assert_eq!(connects.output()[0], test_endpoint(42));
}

#[test]
fn excluded_peer_is_not_used_for_bootstrap_with_peer() {
    let node = TestNode::new(0);
    let connects = node.connector.track_connects();
    node.peers.peer_misbehaved(&test_endpoint(42));
    node.peers.peer_misbehaved(&test_endpoint(42));

    node.initiator
        .bootstrap_with_peer(test_endpoint(42), String::new(), Vec::new());

    assert_timely(Duration::from_secs(10), || !node.initiator.in_progress());
    assert!(connects.output().is_empty());
}

#[test]
fn failed_pull_is_retried_and_given_up() {
    let node = TestNode::new(1);
    let unknown = TestAccountChain::with_height(2);

    node.initiator
        .bootstrap(false, String::new(), vec![target(&unknown, BlockHash::zero())]);

    assert_timely(Duration::from_secs(10), || !node.initiator.in_progress());
    assert_timely_eq(
        Duration::from_secs(5),
        || node.stat(StatType::Bootstrap, DetailType::BulkPullFailedAccount),
        1,
    );
    assert!(node.stat(StatType::BootstrapPull, DetailType::RequeuedPull) >= 2);
    assert_eq!(node.stat(StatType::BootstrapPull, DetailType::PullCompleted), 0);
}
