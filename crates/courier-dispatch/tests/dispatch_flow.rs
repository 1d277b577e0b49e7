// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the dispatch loop.
//!
//! Each test builds an isolated TestHarness with temp SQLite and a scripted
//! channel. Tests are independent and order-insensitive.

use std::time::Duration;

use courier_config::model::{DispatchConfig, QuotaConfig};
use courier_core::types::{PauseState, Recipient};
use courier_core::{
    ConnectionStatus, CourierError, FailureKind, MessageStatus, Outcome, PauseReason, PauseScope,
    Probe, SessionStatus, StorageAdapter,
};
use courier_dispatch::condition::{Candidate, Condition, Template, TemplateSet};
use courier_dispatch::{DispatchWorker, Eligibility};
use courier_test_utils::TestHarness;
use tokio_util::sync::CancellationToken;

fn zero_delay() -> DispatchConfig {
    DispatchConfig {
        min_delay_ms: 0,
        max_delay_ms: 0,
        waiting_retry_delay_ms: 0,
        ..DispatchConfig::default()
    }
}

// ---- Happy path and ordering ----

#[tokio::test]
async fn sends_every_message_and_completes_session() {
    let harness = TestHarness::new().await.unwrap();
    let session = harness.queue("acc", "clinic-a", 3).await.unwrap();

    let report = harness.engine.process_queued(10).await.unwrap();
    assert_eq!(report.selected, 3);
    assert_eq!(report.sent, 3);

    let session = harness.session(&session.id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.counters.sent, 3);
    assert_eq!(session.counters.ongoing, 0);
    assert!(session.end_time.is_some());
    for message in harness.messages(&session.id).await.unwrap() {
        assert_eq!(message.status, MessageStatus::Sent);
        assert!(message.provider_id.is_some());
        assert_eq!(message.attempts, 1);
    }
}

#[tokio::test]
async fn older_sessions_are_sent_first() {
    let harness = TestHarness::new().await.unwrap();
    let first = harness.queue("acc", "clinic-a", 2).await.unwrap();
    let second = harness.queue("acc", "clinic-b", 2).await.unwrap();

    harness.engine.process_queued(10).await.unwrap();

    let expected: Vec<String> = harness
        .messages(&first.id)
        .await
        .unwrap()
        .into_iter()
        .chain(harness.messages(&second.id).await.unwrap())
        .map(|m| m.content)
        .collect();
    let sent: Vec<String> = harness
        .channel
        .calls()
        .await
        .into_iter()
        .map(|c| c.content)
        .collect();
    assert_eq!(sent, expected);
}

#[tokio::test]
async fn batch_size_caps_selection() {
    let harness = TestHarness::new().await.unwrap();
    let session = harness.queue("acc", "clinic-a", 5).await.unwrap();

    let report = harness.engine.process_queued(2).await.unwrap();
    assert_eq!(report.selected, 2);
    assert_eq!(harness.channel.send_count().await, 2);

    let session = harness.session(&session.id).await.unwrap();
    assert_eq!(session.counters.sent, 2);
    assert_eq!(session.counters.ongoing, 3);
    assert_eq!(session.status, SessionStatus::Active);
}

#[tokio::test]
async fn nothing_eligible_is_a_noop() {
    let harness = TestHarness::new().await.unwrap();
    let report = harness.engine.process_queued(10).await.unwrap();
    assert!(report.is_noop());

    let session = harness.queue("acc", "clinic-a", 1).await.unwrap();
    harness.engine.process_queued(10).await.unwrap();
    let before = harness.session(&session.id).await.unwrap();

    let report = harness.engine.process_queued(10).await.unwrap();
    assert!(report.is_noop());
    assert_eq!(harness.session(&session.id).await.unwrap(), before);
    assert_eq!(harness.channel.send_count().await, 1);
}

#[tokio::test]
async fn accounts_are_dispatched_independently() {
    let harness = TestHarness::builder()
        .with_accounts(&["north", "south"])
        .build()
        .await
        .unwrap();
    harness.queue("north", "q", 2).await.unwrap();
    harness.queue("south", "q", 3).await.unwrap();
    harness
        .channel
        .push_send(Outcome::PendingNet("tunnel down".into()))
        .await;

    let report = harness.engine.process_queued(10).await.unwrap();
    assert_eq!(report.selected, 5);
    assert_eq!(report.interrupted_accounts, 1);

    let calls = harness.channel.calls().await;
    let north = calls.iter().filter(|c| c.account_id == "north").count();
    let south = calls.iter().filter(|c| c.account_id == "south").count();
    // Exactly one account took the scripted PendingNET on its first send.
    assert!((north == 1 && south == 3) || (north == 2 && south == 1));
}

// ---- Interruptions ----

#[tokio::test]
async fn operator_global_pause_holds_remaining_messages_until_resumed() {
    let harness = TestHarness::new().await.unwrap();
    let session = harness.queue("acc", "clinic-a", 5).await.unwrap();
    let coordinator = harness.engine.coordinator();

    assert_eq!(harness.engine.process_queued(2).await.unwrap().sent, 2);
    coordinator
        .pause_global("acc", PauseReason::AuthRequired, Some("ops"))
        .await
        .unwrap();

    let third = harness.messages(&session.id).await.unwrap()[2].clone();
    assert_eq!(
        harness.engine.eligibility(third.id).await.unwrap(),
        Eligibility::Blocked {
            scope: PauseScope::Global,
            reason: PauseReason::AuthRequired,
        }
    );
    assert!(harness.engine.process_queued(10).await.unwrap().is_noop());
    assert_eq!(harness.channel.send_count().await, 2);

    coordinator.resume_global("acc").await.unwrap();
    let report = harness.engine.process_queued(10).await.unwrap();
    assert_eq!(report.sent, 3);

    let session = harness.session(&session.id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.counters.sent, 5);
    assert_eq!(session.counters.failed, 0);
    for message in harness.messages(&session.id).await.unwrap() {
        assert_eq!(message.status, MessageStatus::Sent);
        assert_eq!(message.attempts, 1);
    }
}

#[tokio::test]
async fn auth_loss_pauses_account_and_fails_rest_of_batch() {
    let harness = TestHarness::new().await.unwrap();
    let session = harness.queue("acc", "clinic-a", 5).await.unwrap();
    harness
        .channel
        .push_sends([
            Outcome::Success {
                provider_id: "p-1".into(),
            },
            Outcome::Success {
                provider_id: "p-2".into(),
            },
            Outcome::PendingQr("scan the code".into()),
        ])
        .await;

    let report = harness.engine.process_queued(10).await.unwrap();
    assert_eq!(report.sent, 2);
    assert_eq!(report.requeued, 1);
    assert_eq!(report.short_circuited, 2);
    assert_eq!(harness.channel.send_count().await, 3);

    let messages = harness.messages(&session.id).await.unwrap();
    assert_eq!(messages[0].status, MessageStatus::Sent);
    assert_eq!(messages[1].status, MessageStatus::Sent);
    assert_eq!(messages[2].status, MessageStatus::Queued);
    assert_eq!(messages[2].attempts, 1);
    for skipped in &messages[3..] {
        assert_eq!(skipped.status, MessageStatus::Failed);
        assert_eq!(skipped.failure_kind, Some(FailureKind::Auth));
        assert_eq!(skipped.attempts, 0);
        assert_eq!(
            skipped.error_message.as_deref(),
            Some("PendingQR: scan the code")
        );
    }

    let channel = harness.storage.get_channel("acc").await.unwrap().unwrap();
    assert_eq!(channel.connection, ConnectionStatus::Pending);
    assert_eq!(channel.pause.reason(), Some(&PauseReason::AuthRequired));

    let counters = harness.session(&session.id).await.unwrap().counters;
    assert_eq!(
        (counters.total, counters.sent, counters.failed, counters.ongoing),
        (5, 2, 2, 1)
    );

    // Paused account: nothing is selected.
    assert!(harness.engine.process_queued(10).await.unwrap().is_noop());
}

#[tokio::test]
async fn account_resumes_only_after_reauthentication() {
    let harness = TestHarness::new().await.unwrap();
    let session = harness.queue("acc", "clinic-a", 3).await.unwrap();
    harness
        .channel
        .push_send(Outcome::PendingQr(String::new()))
        .await;
    harness.engine.process_queued(10).await.unwrap();

    let coordinator = harness.engine.coordinator();
    assert!(matches!(
        coordinator.resume_global("acc").await,
        Err(CourierError::NotResumable {
            scope: PauseScope::Global,
            ..
        })
    ));

    coordinator.mark_authenticated("acc").await.unwrap();
    coordinator.resume_global("acc").await.unwrap();

    let report = harness.engine.process_queued(10).await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(harness.engine.retry_failed(10).await.unwrap(), 2);
    let report = harness.engine.process_queued(10).await.unwrap();
    assert_eq!(report.sent, 2);

    let session = harness.session(&session.id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.counters.sent, 3);
}

#[tokio::test]
async fn network_loss_short_circuits_without_calling_channel() {
    let harness = TestHarness::new().await.unwrap();
    let session = harness.queue("acc", "clinic-a", 3).await.unwrap();
    harness
        .channel
        .push_sends([
            Outcome::Success {
                provider_id: "p-1".into(),
            },
            Outcome::PendingNet("ECONNRESET".into()),
        ])
        .await;

    let report = harness.engine.process_queued(10).await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.short_circuited, 1);
    // The third item never reached the channel.
    assert_eq!(harness.channel.send_count().await, 2);

    let messages = harness.messages(&session.id).await.unwrap();
    assert_eq!(messages[1].status, MessageStatus::Failed);
    assert_eq!(messages[1].failure_kind, Some(FailureKind::Network));
    assert_eq!(messages[1].attempts, 1);
    assert_eq!(messages[2].status, MessageStatus::Failed);
    assert_eq!(messages[2].failure_kind, Some(FailureKind::Network));
    assert_eq!(messages[2].attempts, 0);

    assert!(harness.engine.coordinator().network_paused("acc").await);
    // Network pauses live in memory only.
    let channel = harness.storage.get_channel("acc").await.unwrap().unwrap();
    assert!(!channel.pause.is_paused());

    harness.engine.retry_failed(10).await.unwrap();
    let report = harness.engine.process_queued(10).await.unwrap();
    assert_eq!(report.sent, 0);
    assert_eq!(report.not_attempted, 2);
}

#[tokio::test]
async fn health_probe_between_sends_can_interrupt() {
    let harness = TestHarness::builder()
        .probe_between_sends()
        .build()
        .await
        .unwrap();
    let session = harness.queue("acc", "clinic-a", 3).await.unwrap();
    harness
        .channel
        .push_probe(Outcome::PendingQr("logged out".into()))
        .await;

    let report = harness.engine.process_queued(10).await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(report.short_circuited, 2);
    assert_eq!(harness.channel.send_count().await, 1);
    assert_eq!(harness.channel.probe_count().await, 1);

    let messages = harness.messages(&session.id).await.unwrap();
    for skipped in &messages[1..] {
        assert_eq!(skipped.failure_kind, Some(FailureKind::Interrupted));
    }
    let channel = harness.storage.get_channel("acc").await.unwrap().unwrap();
    assert_eq!(channel.pause.reason(), Some(&PauseReason::AuthRequired));
}

#[tokio::test]
async fn healthy_probes_do_not_disturb_the_batch() {
    let harness = TestHarness::builder()
        .probe_between_sends()
        .build()
        .await
        .unwrap();
    harness.queue("acc", "clinic-a", 3).await.unwrap();

    let report = harness.engine.process_queued(10).await.unwrap();
    assert_eq!(report.sent, 3);
    assert_eq!(harness.channel.probe_count().await, 2);
    let channel = harness.storage.get_channel("acc").await.unwrap().unwrap();
    assert!(!channel.pause.is_paused());
}

// ---- Failures and retry ----

#[tokio::test]
async fn adapter_error_fails_one_message_and_continues() {
    let harness = TestHarness::new().await.unwrap();
    let session = harness.queue("acc", "clinic-a", 2).await.unwrap();
    harness.channel.push_send_error("driver crashed").await;

    let report = harness.engine.process_queued(10).await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.sent, 1);

    let messages = harness.messages(&session.id).await.unwrap();
    assert_eq!(messages[0].failure_kind, Some(FailureKind::Fatal));
    assert!(
        messages[0]
            .error_message
            .as_deref()
            .is_some_and(|e| e.starts_with("Failure: ") && e.contains("driver crashed"))
    );
    assert_eq!(messages[1].status, MessageStatus::Sent);
}

#[tokio::test]
async fn provider_failures_retry_up_to_the_cap() {
    let harness = TestHarness::builder()
        .with_dispatch(DispatchConfig {
            max_attempts: 2,
            ..zero_delay()
        })
        .build()
        .await
        .unwrap();
    let session = harness.queue("acc", "clinic-a", 1).await.unwrap();
    harness
        .channel
        .push_sends([
            Outcome::Failure("number not on channel".into()),
            Outcome::Failure("number not on channel".into()),
        ])
        .await;

    harness.engine.process_queued(10).await.unwrap();
    assert_eq!(harness.engine.retry_failed(10).await.unwrap(), 1);
    harness.engine.process_queued(10).await.unwrap();
    assert_eq!(harness.engine.retry_failed(10).await.unwrap(), 0);

    let message = &harness.messages(&session.id).await.unwrap()[0];
    assert_eq!(message.status, MessageStatus::Failed);
    assert_eq!(message.attempts, 2);
    assert_eq!(message.failed_attempts, 2);
    assert_eq!(message.failure_kind, Some(FailureKind::Provider));

    let session = harness.session(&session.id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.counters.failed, 1);
}

#[tokio::test]
async fn waiting_is_resent_within_the_same_attempt() {
    let harness = TestHarness::new().await.unwrap();
    let session = harness.queue("acc", "clinic-a", 1).await.unwrap();
    harness
        .channel
        .push_sends([
            Outcome::Waiting("typing".into()),
            Outcome::Waiting("typing".into()),
        ])
        .await;

    let report = harness.engine.process_queued(10).await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(harness.channel.send_count().await, 3);
    let message = &harness.messages(&session.id).await.unwrap()[0];
    assert_eq!(message.attempts, 1);
}

#[tokio::test]
async fn endless_waiting_requeues_the_message() {
    let harness = TestHarness::builder()
        .with_dispatch(DispatchConfig {
            max_waiting_retries: 1,
            ..zero_delay()
        })
        .build()
        .await
        .unwrap();
    let session = harness.queue("acc", "clinic-a", 1).await.unwrap();
    harness
        .channel
        .push_sends([
            Outcome::Waiting("busy".into()),
            Outcome::Waiting("busy".into()),
        ])
        .await;

    let report = harness.engine.process_queued(10).await.unwrap();
    assert_eq!(report.requeued, 1);
    assert_eq!(harness.channel.send_count().await, 2);

    let message = &harness.messages(&session.id).await.unwrap()[0];
    assert_eq!(message.status, MessageStatus::Queued);
    assert_eq!(message.error_message.as_deref(), Some("Waiting: busy"));

    let report = harness.engine.process_queued(10).await.unwrap();
    assert_eq!(report.sent, 1);
}

#[tokio::test]
async fn waiting_requeue_does_not_spend_the_retry_cap() {
    let harness = TestHarness::builder()
        .with_dispatch(DispatchConfig {
            max_attempts: 2,
            max_waiting_retries: 0,
            ..zero_delay()
        })
        .build()
        .await
        .unwrap();
    let session = harness.queue("acc", "clinic-a", 1).await.unwrap();
    harness
        .channel
        .push_sends([
            Outcome::Waiting("busy".into()),
            Outcome::Failure("rejected".into()),
        ])
        .await;

    assert_eq!(harness.engine.process_queued(10).await.unwrap().requeued, 1);
    assert_eq!(harness.engine.process_queued(10).await.unwrap().failed, 1);

    let message = &harness.messages(&session.id).await.unwrap()[0];
    assert_eq!(message.attempts, 2);
    assert_eq!(message.failed_attempts, 1);
    assert_eq!(harness.engine.retry_failed(10).await.unwrap(), 1);

    let report = harness.engine.process_queued(10).await.unwrap();
    assert_eq!(report.sent, 1);
    let message = &harness.messages(&session.id).await.unwrap()[0];
    assert_eq!(message.status, MessageStatus::Sent);
    assert_eq!(message.attempts, 3);
}

// ---- Pauses and eligibility ----

#[tokio::test]
async fn retried_messages_of_completed_session_obey_session_pause() {
    let harness = TestHarness::new().await.unwrap();
    let session = harness.queue("acc", "clinic-a", 2).await.unwrap();
    harness
        .channel
        .push_send(Outcome::Failure("rejected".into()))
        .await;
    harness.engine.process_queued(10).await.unwrap();
    assert_eq!(
        harness.session(&session.id).await.unwrap().status,
        SessionStatus::Completed
    );

    assert_eq!(harness.engine.retry_failed(10).await.unwrap(), 1);
    let coordinator = harness.engine.coordinator();
    coordinator
        .pause_session(&session.id, PauseReason::Manual, Some("ops"))
        .await
        .unwrap();

    let retried = harness.messages(&session.id).await.unwrap()[0].clone();
    assert_eq!(
        harness.engine.eligibility(retried.id).await.unwrap(),
        Eligibility::Blocked {
            scope: PauseScope::Session,
            reason: PauseReason::Manual,
        }
    );
    assert!(harness.engine.process_queued(10).await.unwrap().is_noop());

    coordinator.resume_session(&session.id).await.unwrap();
    assert_eq!(harness.engine.process_queued(10).await.unwrap().sent, 1);
    let session = harness.session(&session.id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.counters.sent, 2);
    assert_eq!(session.counters.ongoing, 0);
}

#[tokio::test]
async fn paused_session_is_skipped_others_proceed() {
    let harness = TestHarness::new().await.unwrap();
    let held = harness.queue("acc", "clinic-a", 2).await.unwrap();
    let open = harness.queue("acc", "clinic-b", 2).await.unwrap();
    let coordinator = harness.engine.coordinator();
    coordinator
        .pause_session(&held.id, PauseReason::Manual, Some("ops"))
        .await
        .unwrap();

    let report = harness.engine.process_queued(10).await.unwrap();
    assert_eq!(report.sent, 2);
    assert_eq!(
        harness.session(&open.id).await.unwrap().status,
        SessionStatus::Completed
    );

    let held_message = harness.messages(&held.id).await.unwrap()[0].clone();
    assert_eq!(
        harness.engine.eligibility(held_message.id).await.unwrap(),
        Eligibility::Blocked {
            scope: PauseScope::Session,
            reason: PauseReason::Manual,
        }
    );

    coordinator.resume_session(&held.id).await.unwrap();
    assert!(
        harness
            .engine
            .eligibility(held_message.id)
            .await
            .unwrap()
            .is_eligible()
    );
    assert_eq!(harness.engine.process_queued(10).await.unwrap().sent, 2);
}

#[tokio::test]
async fn global_pause_outranks_lower_scopes() {
    let harness = TestHarness::new().await.unwrap();
    let session = harness.queue("acc", "clinic-a", 1).await.unwrap();
    let message = harness.messages(&session.id).await.unwrap()[0].clone();
    let coordinator = harness.engine.coordinator();

    coordinator
        .pause_message(message.id, PauseReason::Manual, None)
        .await
        .unwrap();
    coordinator
        .pause_global("acc", PauseReason::Other("maintenance".into()), Some("ops"))
        .await
        .unwrap();

    assert_eq!(
        harness.engine.eligibility(message.id).await.unwrap(),
        Eligibility::Blocked {
            scope: PauseScope::Global,
            reason: PauseReason::Other("maintenance".into()),
        }
    );

    coordinator.resume_global("acc").await.unwrap();
    assert_eq!(
        harness.engine.eligibility(message.id).await.unwrap(),
        Eligibility::Blocked {
            scope: PauseScope::Message,
            reason: PauseReason::Manual,
        }
    );
    assert!(harness.engine.process_queued(10).await.unwrap().is_noop());
}

#[tokio::test]
async fn cancelled_and_deleted_messages_are_never_sent() {
    let harness = TestHarness::new().await.unwrap();
    let cancelled = harness.queue("acc", "clinic-a", 2).await.unwrap();
    let trimmed = harness.queue("acc", "clinic-b", 2).await.unwrap();
    harness.storage.cancel_session(&cancelled.id).await.unwrap();
    let deleted = harness.messages(&trimmed.id).await.unwrap()[0].clone();
    harness.storage.soft_delete_message(deleted.id).await.unwrap();

    let report = harness.engine.process_queued(10).await.unwrap();
    assert_eq!(report.sent, 1);

    let first = harness.messages(&cancelled.id).await.unwrap()[0].clone();
    assert_eq!(
        harness.engine.eligibility(first.id).await.unwrap(),
        Eligibility::SessionCancelled
    );
    assert_eq!(
        harness.engine.eligibility(deleted.id).await.unwrap(),
        Eligibility::Deleted
    );
    let trimmed = harness.session(&trimmed.id).await.unwrap();
    assert_eq!(trimmed.counters.total, 1);
    assert_eq!(trimmed.status, SessionStatus::Completed);
}

// ---- Quota ----

#[tokio::test]
async fn admission_respects_remaining_quota() {
    let harness = TestHarness::builder()
        .with_quota(QuotaConfig {
            default_message_limit: 2,
            ..QuotaConfig::default()
        })
        .build()
        .await
        .unwrap();

    assert!(matches!(
        harness.queue("acc", "clinic-a", 3).await,
        Err(CourierError::QuotaExceeded {
            requested: 3,
            remaining: 2,
            ..
        })
    ));
    harness.queue("acc", "clinic-a", 2).await.unwrap();
}

#[tokio::test]
async fn exhausted_quota_stops_the_batch() {
    let harness = TestHarness::new().await.unwrap();
    let session = harness.queue("acc", "clinic-a", 3).await.unwrap();
    harness.storage.set_quota_limits("acc", 2, -1).await.unwrap();

    let report = harness.engine.process_queued(10).await.unwrap();
    assert_eq!(report.sent, 2);
    assert_eq!(report.not_attempted, 1);

    let last = harness.messages(&session.id).await.unwrap()[2].clone();
    assert_eq!(last.status, MessageStatus::Queued);
    assert_eq!(
        harness.engine.eligibility(last.id).await.unwrap(),
        Eligibility::Blocked {
            scope: PauseScope::Global,
            reason: PauseReason::QuotaExhausted,
        }
    );
}

// ---- Planning ----

#[tokio::test]
async fn planned_admission_renders_by_position() {
    let harness = TestHarness::new().await.unwrap();
    let candidates: Vec<Candidate> = (1..=4)
        .map(|position| Candidate {
            recipient: Recipient {
                name: format!("P{position}"),
                phone: format!("77700{position}"),
                country_code: "+1".into(),
            },
            position,
        })
        .collect();
    let templates = TemplateSet::new(vec![
        Template {
            id: "next".into(),
            condition: Condition::Equal { value: 1 },
            content: "{name}, you are next".into(),
        },
        Template {
            id: "later".into(),
            condition: Condition::Default,
            content: "{name}, {offset} ahead of you".into(),
        },
    ])
    .unwrap();

    // Position 2 is being served: only 3 and 4 are selectable.
    let session = harness
        .engine
        .admit_planned("acc", "clinic-a", &candidates, Some(2), &templates)
        .await
        .unwrap();
    let contents: Vec<String> = harness
        .messages(&session.id)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(contents, vec!["P3, you are next", "P4, 2 ahead of you"]);
}

// ---- Probes and worker ----

#[tokio::test]
async fn manual_probe_restores_previous_pause() {
    let harness = TestHarness::new().await.unwrap();
    let coordinator = harness.engine.coordinator();
    coordinator
        .pause_global("acc", PauseReason::Manual, Some("ops"))
        .await
        .unwrap();

    let outcome = harness
        .engine
        .probe(
            "acc",
            &Probe::Reachability {
                phone: "5550100".into(),
                country_code: "1".into(),
            },
        )
        .await
        .unwrap();
    assert!(!outcome.is_interruption());

    let channel = harness.storage.get_channel("acc").await.unwrap().unwrap();
    assert_eq!(channel.pause.reason(), Some(&PauseReason::Manual));
}

#[tokio::test]
async fn channel_check_waits_for_the_send_in_flight() {
    let harness = TestHarness::new().await.unwrap();
    let session = harness.queue("acc", "clinic-a", 1).await.unwrap();
    let gate = harness.channel.hold_next_send().await;

    let dispatch = tokio::spawn({
        let engine = harness.engine.clone();
        async move { engine.process_queued(10).await }
    });
    gate.entered().await;

    let probe = tokio::spawn({
        let engine = harness.engine.clone();
        async move { engine.probe("acc", &Probe::Health).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!probe.is_finished());
    assert_eq!(harness.channel.probe_count().await, 0);
    let channel = harness.storage.get_channel("acc").await.unwrap().unwrap();
    assert!(!channel.pause.is_paused());

    gate.release();
    assert_eq!(dispatch.await.unwrap().unwrap().sent, 1);
    let outcome = probe.await.unwrap().unwrap();
    assert!(!outcome.is_interruption());
    assert_eq!(harness.channel.probe_count().await, 1);

    let message = &harness.messages(&session.id).await.unwrap()[0];
    assert_eq!(message.status, MessageStatus::Sent);
    let channel = harness.storage.get_channel("acc").await.unwrap().unwrap();
    assert_eq!(channel.pause, PauseState::NotPaused);
}

#[tokio::test]
async fn worker_drains_queue_until_cancelled() {
    let harness = TestHarness::new().await.unwrap();
    let session = harness.queue("acc", "clinic-a", 3).await.unwrap();

    let worker = DispatchWorker::new(harness.engine.clone())
        .with_poll_interval(Duration::from_millis(10));
    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { worker.run(cancel).await }
    });

    tokio::time::timeout(Duration::from_secs(5), async {
        while harness.session(&session.id).await.unwrap().status != SessionStatus::Completed {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    cancel.cancel();
    handle.await.unwrap();
    assert_eq!(harness.channel.send_count().await, 3);
}
