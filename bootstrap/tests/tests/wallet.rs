use crate::fixture::TestNode;
use rsban_bootstrap::BootstrapInitiatorExt;
use std::time::Duration;
use test_helpers::assert_timely;

#[test]
fn pulls_wallet_account_chains() {
    let node = TestNode::new(2);
    let first = node.serve_chain(3);
    let second = node.serve_chain(1);

    node.initiator
        .bootstrap_wallet([first.account(), second.account()].into());

    assert_timely(Duration::from_secs(10), || {
        node.has_blocks(first.blocks()) && node.has_blocks(second.blocks())
    });
    assert_timely(Duration::from_secs(10), || !node.initiator.in_progress());
}
