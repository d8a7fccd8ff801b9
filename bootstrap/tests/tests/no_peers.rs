use crate::fixture::TestNode;
use rsban_bootstrap::{
    stats::{DetailType, StatType},
    transport::test_endpoint,
    BootstrapInitiatorExt,
};
use rsban_core::HashOrAccount;
use std::time::Duration;
use test_helpers::{assert_always_eq, assert_timely};

#[test]
fn legacy_attempt_stops_without_peers() {
    let node = TestNode::new(0);

    node.initiator.bootstrap(false, String::new(), Vec::new());

    assert_timely(Duration::from_secs(5), || !node.initiator.in_progress());
    assert!(node.stat(StatType::BootstrapConnections, DetailType::NoPeers) >= 1);
}

#[test]
fn lazy_attempt_stops_without_peers() {
    let node = TestNode::new(0);

    assert!(node
        .initiator
        .bootstrap_lazy(HashOrAccount::from(1), false, String::new()));

    assert_timely(Duration::from_secs(5), || !node.initiator.in_progress());
}

#[test]
fn stop_interrupts_attempt_waiting_for_peer() {
    let node = TestNode::new(1);
    node.connector.set_unreachable(test_endpoint(1));

    node.initiator.bootstrap(false, String::new(), Vec::new());
    assert_always_eq(
        Duration::from_millis(500),
        || node.initiator.in_progress(),
        true,
    );

    node.initiator.stop();

    assert!(!node.initiator.in_progress());
    assert!(node.stat(StatType::BootstrapConnections, DetailType::ConnectFailed) >= 1);
}
