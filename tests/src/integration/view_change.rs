//! Validator timeout and view change through the consensus actor: a silent
//! proposer trips the timeout, the committee votes, the next proposer takes
//! over, and the silent one loses reputation.

#[cfg(test)]
mod tests {
    use crate::harness::Harness;
    use lc_consensus::BftEvent;
    use lc_telemetry::metrics;
    use node_runtime::actors::{spawn_chain_actor, spawn_consensus_actor, ConsensusCommand};
    use lc_mempool::{MempoolConfig, SharedMempool};
    use shared_bus::InMemoryEventBus;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::watch;
    use tokio::time::timeout;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_silent_proposer_view_change() {
        let mut harness = Harness::new(Harness::test_config(3));
        harness.register_validators(4);
        let committee: Vec<_> = harness.chain.validators().committee().to_vec();
        assert_eq!(committee.len(), 4);

        let bus = Arc::new(InMemoryEventBus::new());
        let mempool = Arc::new(SharedMempool::new(MempoolConfig::default()));
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let chain_handle = spawn_chain_actor(
            harness.chain,
            Arc::clone(&bus),
            Arc::clone(&mempool),
            shutdown_rx.clone(),
        );

        // Short proposal timeout so the test runs in about a second.
        let (commands, mut events) =
            spawn_consensus_actor(chain_handle.clone(), 0.5, 8, shutdown_rx);

        let view_changes_before = metrics::VIEW_CHANGES.get();
        commands
            .send(ConsensusCommand::StartRound {
                committee: committee.clone(),
                quorum: 3,
                height: 1,
                last_committed: 0,
            })
            .await
            .unwrap();

        // The proposer for view 0 stays silent; the round votes for view 1.
        let event = timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timeout waiting for view change vote")
            .expect("actor alive");
        let BftEvent::BroadcastViewChange { new_view, .. } = event else {
            panic!("expected a view-change vote, got {event:?}");
        };
        assert_eq!(new_view, 1);

        // Quorum of votes (3 of 4 committee members) moves the view.
        for validator in committee.iter().take(3) {
            commands
                .send(ConsensusCommand::ViewChange {
                    new_view: 1,
                    validator: *validator,
                })
                .await
                .unwrap();
        }
        // The round may keep voting on its timer until the quorum lands;
        // skip those repeats and wait for the new view itself.
        let (view, proposer, silent_proposer) = loop {
            let event = timeout(Duration::from_secs(5), events.recv())
                .await
                .expect("timeout waiting for new view")
                .expect("actor alive");
            match event {
                BftEvent::NewView {
                    view,
                    proposer,
                    silent_proposer,
                } => break (view, proposer, silent_proposer),
                BftEvent::BroadcastViewChange { .. } => continue,
                other => panic!("expected the new view, got {other:?}"),
            }
        };
        assert_eq!(view, 1);
        assert_eq!(silent_proposer, committee[0]);
        assert_eq!(proposer, committee[1]);

        // The metric ticked and the silent proposer's reputation dropped.
        assert!(metrics::VIEW_CHANGES.get() >= view_changes_before + 1.0);

        // Fault reporting is async; give the chain actor a moment.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let account = chain_handle
            .account(committee[0])
            .await
            .unwrap()
            .expect("faulted validator has an account");
        assert!(account.reputation < 0.5);
    }
}
