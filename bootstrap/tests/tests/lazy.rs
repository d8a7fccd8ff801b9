use crate::fixture::TestNode;
use rsban_bootstrap::{
    config::BootstrapConfig,
    stats::{DetailType, Direction, StatType},
    BootstrapInitiatorExt,
};
use std::time::Duration;
use test_helpers::assert_timely;

#[test]
fn pulls_chain_below_start_hash() {
    let node = TestNode::new(1);
    let chain = node.serve_chain(3);

    assert!(node
        .initiator
        .bootstrap_lazy(chain.frontier().into(), false, String::new()));

    assert_timely(Duration::from_secs(10), || node.has_blocks(chain.blocks()));
    assert_timely(Duration::from_secs(10), || !node.initiator.in_progress());
    assert_eq!(
        node.stats
            .count(StatType::Bootstrap, DetailType::InitiateLazy, Direction::Out),
        1
    );
}

#[test]
fn follows_receive_sources_into_other_chains() {
    let node = TestNode::new(1);
    let sender = node.serve_chain(2);
    let receiver = node.serve_chain_receiving_from(2, sender.frontier());

    node.initiator
        .bootstrap_lazy(receiver.frontier().into(), false, String::new());

    assert_timely(Duration::from_secs(10), || {
        node.has_blocks(receiver.blocks()) && node.has_blocks(sender.blocks())
    });
    assert_timely(Duration::from_secs(10), || !node.initiator.in_progress());
}

#[test]
fn start_from_account_when_legacy_bootstrap_is_disabled() {
    let mut config = BootstrapConfig::new_test_instance();
    config.disable_legacy_bootstrap = true;
    let node = TestNode::with_config(1, config);
    let chain = node.serve_chain(3);

    node.initiator
        .bootstrap_lazy(chain.account().into(), false, String::new());

    assert_timely(Duration::from_secs(10), || node.has_blocks(chain.blocks()));
    assert_timely(Duration::from_secs(10), || !node.initiator.in_progress());
}

#[test]
fn additional_keys_join_running_attempt() {
    let node = TestNode::new(1);
    let first = node.serve_chain(2);
    let second = node.serve_chain(2);

    node.initiator
        .bootstrap_lazy(first.frontier().into(), false, String::new());
    node.initiator
        .bootstrap_lazy(second.frontier().into(), false, String::new());

    assert_timely(Duration::from_secs(10), || {
        node.has_blocks(first.blocks()) && node.has_blocks(second.blocks())
    });
    assert_timely(Duration::from_secs(10), || !node.initiator.in_progress());
}
