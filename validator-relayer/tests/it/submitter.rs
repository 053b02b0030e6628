use std::time::Duration;

use alloy::primitives::TxHash;
use validator_relayer::{
    shutdown,
    submitter::{FailureReason, SubmissionOutcome, Submitter},
};

use crate::{
    FakeDestination, FakeOracle, LogCapture, ReceiptMode, executor, executor_with_options, options,
    triggered, tx_hash_for, untriggered,
};

#[tokio::test]
async fn accepted_submission() {
    let oracle = FakeOracle::new(Some(7), 7, true);
    let destination = FakeDestination::new(ReceiptMode::Accepted);
    let mut executor = executor(&oracle, &destination, false);

    let outcome = executor.submit_for_era(8, &mut untriggered()).await.unwrap();

    let broadcasts = destination.broadcasts();
    assert_eq!(broadcasts.len(), 1);
    assert_eq!(broadcasts[0].target_era, 8);
    assert_eq!(broadcasts[0].execution_fee, 1_000);
    assert_eq!(broadcasts[0].relayer_fee, 100);
    assert_eq!(broadcasts[0].value(), 1_100);
    assert!(matches!(outcome, SubmissionOutcome::Accepted { tx_hash } if tx_hash != TxHash::ZERO));

    let retry = executor.retry_state().unwrap();
    assert_eq!(retry.attempt, 0);
    assert!(retry.last_tx_hash.is_some());
}

#[tokio::test]
async fn window_closed_is_failure() {
    let oracle = FakeOracle::new(Some(8), 7, true);
    let destination = FakeDestination::new(ReceiptMode::Accepted);
    let mut executor = executor(&oracle, &destination, false);

    let outcome = executor.submit_for_era(8, &mut untriggered()).await.unwrap();

    assert_eq!(
        outcome,
        SubmissionOutcome::Failed(FailureReason::WindowClosed)
    );
    assert!(destination.broadcasts().is_empty());
}

#[tokio::test]
async fn already_confirmed_is_not_an_error() {
    let oracle = FakeOracle::new(Some(7), 8, true);
    let destination = FakeDestination::new(ReceiptMode::Accepted);
    let mut executor = executor(&oracle, &destination, false);

    let outcome = executor.submit_for_era(8, &mut untriggered()).await.unwrap();

    assert_eq!(outcome, SubmissionOutcome::AlreadyConfirmed);
    assert!(destination.broadcasts().is_empty());
    assert!(executor.retry_state().is_none());
}

#[tokio::test]
async fn reverted_transaction_fails() {
    let oracle = FakeOracle::new(Some(7), 7, true);
    let destination = FakeDestination::new(ReceiptMode::Reverted);
    let mut executor = executor(&oracle, &destination, false);

    let outcome = executor.submit_for_era(8, &mut untriggered()).await.unwrap();

    assert_eq!(outcome, SubmissionOutcome::Failed(FailureReason::Reverted));
    assert_eq!(destination.broadcasts().len(), 1);
}

#[tokio::test]
async fn success_without_acceptance_event_fails() {
    let oracle = FakeOracle::new(Some(7), 7, true);
    let destination = FakeDestination::new(ReceiptMode::NotAccepted);
    let mut executor = executor(&oracle, &destination, false);

    let outcome = executor.submit_for_era(8, &mut untriggered()).await.unwrap();

    assert_eq!(outcome, SubmissionOutcome::Failed(FailureReason::NotAccepted));
    assert_eq!(destination.broadcasts().len(), 1);
}

#[tokio::test]
async fn waits_for_inclusion() {
    let oracle = FakeOracle::new(Some(7), 7, true);
    let destination = FakeDestination::new(ReceiptMode::Accepted);
    destination.state.lock().inclusion_delay = 3;
    let mut executor = executor(&oracle, &destination, false);

    let outcome = executor.submit_for_era(8, &mut untriggered()).await.unwrap();

    assert!(matches!(outcome, SubmissionOutcome::Accepted { .. }));
    assert_eq!(destination.state.lock().inclusion_queries, 4);
}

#[tokio::test]
async fn receipt_timeout_leaves_transaction_in_flight() {
    let oracle = FakeOracle::new(Some(7), 7, true);
    let destination = FakeDestination::new(ReceiptMode::Never);
    let mut executor = executor(&oracle, &destination, false);

    let outcome = executor.submit_for_era(8, &mut untriggered()).await.unwrap();

    assert_eq!(
        outcome,
        SubmissionOutcome::InFlight {
            tx_hash: tx_hash_for(0)
        }
    );
    assert_eq!(destination.broadcasts().len(), 1);
}

#[tokio::test]
async fn cancelled_while_waiting_for_inclusion() {
    let oracle = FakeOracle::new(Some(7), 7, true);
    let destination = FakeDestination::new(ReceiptMode::Never);
    let mut options = options(false);
    options.receipt_timeout = Duration::from_secs(3600);
    let mut executor = executor_with_options(&oracle, &destination, options);

    let (trigger, mut shutdown) = shutdown::channel();
    let submission = tokio::spawn(async move {
        let outcome = executor.submit_for_era(8, &mut shutdown).await;
        (outcome, executor)
    });
    while destination.broadcasts().is_empty() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    trigger.trigger();

    let (outcome, executor) = tokio::time::timeout(Duration::from_secs(5), submission)
        .await
        .expect("inclusion wait did not observe shutdown")
        .unwrap();
    assert_eq!(
        outcome.unwrap(),
        SubmissionOutcome::Failed(FailureReason::Cancelled)
    );
    assert_eq!(destination.broadcasts().len(), 1);
    let retry = executor.retry_state().unwrap();
    assert_eq!(retry.attempt, 0);
    assert_eq!(retry.last_tx_hash, Some(tx_hash_for(0)));
}

#[tokio::test]
async fn cancelled_before_broadcast() {
    let oracle = FakeOracle::new(Some(7), 7, true);
    let destination = FakeDestination::new(ReceiptMode::Accepted);
    let mut executor = executor(&oracle, &destination, false);

    let outcome = executor.submit_for_era(8, &mut triggered()).await.unwrap();

    assert_eq!(outcome, SubmissionOutcome::Failed(FailureReason::Cancelled));
    assert!(destination.broadcasts().is_empty());
    // Nothing was sent, so no fee escalation step is used up.
    assert!(executor.retry_state().is_none());
}

#[tokio::test]
async fn dry_run_never_broadcasts() {
    let logs = LogCapture::default();
    let _guard = logs.install();
    let oracle = FakeOracle::new(Some(7), 7, true);
    let destination = FakeDestination::new(ReceiptMode::Accepted);
    let mut executor = executor(&oracle, &destination, true);

    for expected in 1..=3 {
        let outcome = executor.submit_for_era(8, &mut untriggered()).await.unwrap();
        assert_eq!(
            outcome,
            SubmissionOutcome::Accepted {
                tx_hash: TxHash::ZERO
            }
        );
        assert_eq!(destination.simulations().len(), expected);
    }
    assert!(destination.broadcasts().is_empty());
    assert_eq!(destination.state.lock().inclusion_queries, 0);
    assert_eq!(logs.count("payload=0x0000000000000008"), 3);
}

#[tokio::test]
async fn failed_simulation_still_logs_payload() {
    let logs = LogCapture::default();
    let _guard = logs.install();
    let oracle = FakeOracle::new(Some(7), 7, true);
    let destination = FakeDestination::new(ReceiptMode::Accepted);
    destination.state.lock().simulation_error = Some("execution reverted".to_owned());
    let mut executor = executor(&oracle, &destination, true);

    let outcome = executor.submit_for_era(8, &mut untriggered()).await.unwrap();

    assert_eq!(
        outcome,
        SubmissionOutcome::Failed(FailureReason::SimulationFailed)
    );
    assert_eq!(destination.simulations().len(), 1);
    assert!(destination.broadcasts().is_empty());
    let logs = logs.contents();
    let logged: Vec<_> = logs
        .lines()
        .filter(|line| line.contains("payload=0x0000000000000008"))
        .collect();
    assert_eq!(logged.len(), 1);
    assert!(logged[0].contains("execution reverted"));
}

#[tokio::test]
async fn retries_escalate_fees() {
    let oracle = FakeOracle::new(Some(7), 7, true);
    let destination = FakeDestination::new(ReceiptMode::NotAccepted);
    let mut executor = executor(&oracle, &destination, false);

    for _ in 0..4 {
        executor.submit_for_era(8, &mut untriggered()).await.unwrap();
    }

    let fees: Vec<_> = destination
        .broadcasts()
        .iter()
        .map(|call| (call.execution_fee, call.relayer_fee))
        .collect();
    // 10% per attempt, capped at twice the base fee.
    assert_eq!(
        fees,
        vec![(1_000, 100), (1_100, 110), (1_210, 121), (1_331, 133)]
    );
    assert_eq!(executor.retry_state().unwrap().attempt, 3);

    // A new era starts from the base fees again.
    oracle.update(|state| {
        state.active_era = Some(8);
        state.external_index = 8;
    });
    executor.submit_for_era(9, &mut untriggered()).await.unwrap();
    let last = *destination.broadcasts().last().unwrap();
    assert_eq!(last.target_era, 9);
    assert_eq!((last.execution_fee, last.relayer_fee), (1_000, 100));
}

#[tokio::test]
async fn query_failure_is_an_error() {
    let oracle = FakeOracle::new(Some(7), 7, true);
    oracle.update(|state| state.unreachable = true);
    let destination = FakeDestination::new(ReceiptMode::Accepted);
    let mut executor = executor(&oracle, &destination, false);

    assert!(executor.submit_for_era(8, &mut untriggered()).await.is_err());
    assert!(destination.broadcasts().is_empty());
}
