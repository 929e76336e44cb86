//! Swap answers racing between the two parties.
//!
//! Each party runs on its own harness over shared tables, so both sides
//! hold a pending copy of the swap when they act.

mod common;

use std::time::Duration;

use common::{listed_item, pending_swap, settle, user, Harness};
use swapsync::application::views::{propose_swap, SwapProposal};
use swapsync::domain::notification::NotificationType;
use swapsync::domain::swap::{SwapAction, SwapStatus};
use swapsync::domain::sync::SyncError;
use swapsync::ports::SwapRepository;

#[tokio::test(start_paused = true)]
async fn only_the_receiver_can_answer() {
    let h = Harness::new();
    let (alice, bob) = (user("alice"), user("bob"));
    let lamp = listed_item(&alice, "Lamp");
    let swap = pending_swap(&bob, &lamp);
    h.backend.insert_item(lamp);
    h.backend.insert_swap(swap.clone());
    h.sign_in(&bob);

    let inbox = h.context().swap_inbox();
    inbox.refresh().await.unwrap();
    assert_eq!(inbox.outgoing().len(), 1);

    assert!(matches!(inbox.accept(swap.id).await, Err(SyncError::Forbidden(_))));
    assert!(matches!(inbox.decline(swap.id).await, Err(SyncError::Forbidden(_))));
    assert_eq!(h.backend.calls("swaps.transition"), 0);
    assert!(h.confirm.asked().is_empty());

    // The backend guard holds even without the client-side check
    let direct = h
        .backend
        .transition(swap.id, &bob, SwapAction::Accept)
        .await
        .unwrap();
    assert!(direct.is_none());
    assert_eq!(h.backend.swap(swap.id).unwrap().status, SwapStatus::Pending);
}

#[tokio::test(start_paused = true)]
async fn receiver_accepts_and_sender_is_notified() {
    let h = Harness::new();
    let (alice, bob) = (user("alice"), user("bob"));
    let lamp = listed_item(&alice, "Lamp");
    let swap = pending_swap(&bob, &lamp);
    h.backend.insert_item(lamp);
    h.backend.insert_swap(swap.clone());
    h.sign_in(&alice);

    let inbox = h.context().swap_inbox();
    inbox.refresh().await.unwrap();
    assert_eq!(inbox.awaiting_response(), 1);
    assert!(matches!(inbox.cancel(swap.id).await, Err(SyncError::Forbidden(_))));

    let accepted = inbox.accept(swap.id).await.unwrap().applied().unwrap();
    assert_eq!(accepted.status, SwapStatus::Accepted);
    assert_eq!(inbox.get(swap.id).unwrap().swap.status, SwapStatus::Accepted);
    assert_eq!(inbox.awaiting_response(), 0);

    let to_bob = h.backend.notifications_for(&bob);
    assert_eq!(to_bob.len(), 1);
    assert_eq!(to_bob[0].kind, NotificationType::TradeAccepted);
    assert_eq!(to_bob[0].swap_id(), Some(swap.id));
}

#[tokio::test(start_paused = true)]
async fn answering_an_already_canceled_swap_is_a_conflict() {
    let h = Harness::new();
    let (alice, bob) = (user("alice"), user("bob"));
    let lamp = listed_item(&alice, "Lamp");
    let swap = pending_swap(&bob, &lamp);
    h.backend.insert_item(lamp);
    h.backend.insert_swap(swap.clone());
    h.sign_in(&alice);

    let detail = h.context().swap_detail(swap.id);
    detail.refresh().await.unwrap();
    assert!(detail.can(SwapAction::Accept));

    // Bob cancels from his own device before Alice answers
    h.backend
        .resolve_swap(swap.id, &bob, SwapAction::Cancel)
        .unwrap();

    match detail.accept().await {
        Err(SyncError::Conflict { current_state, .. }) => {
            assert_eq!(current_state.as_deref(), Some("canceled"));
        }
        other => panic!("expected a conflict, got {:?}", other),
    }
    assert_eq!(detail.swap().unwrap().swap.status, SwapStatus::Canceled);
    assert!(!detail.can(SwapAction::Accept));
    assert_eq!(h.backend.swap(swap.id).unwrap().status, SwapStatus::Canceled);
    assert!(h.backend.notifications_for(&bob).is_empty());

    assert!(matches!(
        detail.accept().await,
        Err(SyncError::InvalidTransition(_))
    ));
    assert_eq!(h.backend.calls("swaps.transition"), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_accept_and_cancel_resolve_to_one_winner() {
    let receiver = Harness::new();
    let sender = Harness::sharing(&receiver);
    let (alice, bob) = (user("alice"), user("bob"));
    let lamp = listed_item(&alice, "Lamp");
    let swap = pending_swap(&bob, &lamp);
    receiver.backend.insert_item(lamp);
    receiver.backend.insert_swap(swap.clone());
    receiver.sign_in(&alice);
    sender.sign_in(&bob);

    let alice_view = receiver.context().swap_detail(swap.id);
    let bob_view = sender.context().swap_detail(swap.id);
    alice_view.refresh().await.unwrap();
    bob_view.refresh().await.unwrap();
    receiver.backend.set_latency(Duration::from_millis(20));

    let (accepted, canceled) = tokio::join!(alice_view.accept(), bob_view.cancel());

    let final_status = receiver.backend.swap(swap.id).unwrap().status;
    match (accepted, canceled) {
        (Ok(outcome), Err(SyncError::Conflict { current_state, .. })) => {
            assert!(outcome.is_applied());
            assert_eq!(final_status, SwapStatus::Accepted);
            assert_eq!(current_state.as_deref(), Some("accepted"));
        }
        (Err(SyncError::Conflict { current_state, .. }), Ok(outcome)) => {
            assert!(outcome.is_applied());
            assert_eq!(final_status, SwapStatus::Canceled);
            assert_eq!(current_state.as_deref(), Some("canceled"));
        }
        other => panic!("expected exactly one winner, got {:?}", other),
    }

    // Both views converge on the stored status
    assert_eq!(alice_view.swap().unwrap().swap.status, final_status);
    assert_eq!(bob_view.swap().unwrap().swap.status, final_status);
}

#[tokio::test(start_paused = true)]
async fn dismissed_confirmation_sends_nothing() {
    let h = Harness::with_answers([false]);
    let (alice, bob) = (user("alice"), user("bob"));
    let lamp = listed_item(&alice, "Lamp");
    let swap = pending_swap(&bob, &lamp);
    h.backend.insert_item(lamp);
    h.backend.insert_swap(swap.clone());
    h.sign_in(&alice);

    let detail = h.context().swap_detail(swap.id);
    detail.refresh().await.unwrap();

    assert!(!detail.decline().await.unwrap().is_applied());
    assert_eq!(h.confirm.asked().len(), 1);
    assert_eq!(h.backend.calls("swaps.transition"), 0);
    assert_eq!(detail.swap().unwrap().swap.status, SwapStatus::Pending);
}

#[tokio::test(start_paused = true)]
async fn proposal_reaches_the_owner_live() {
    let owner = Harness::new();
    let proposer = Harness::sharing(&owner);
    let (alice, bob) = (user("alice"), user("bob"));
    let lamp = listed_item(&alice, "Lamp");
    let bike = listed_item(&bob, "Bike");
    owner.backend.insert_item(lamp.clone());
    owner.backend.insert_item(bike.clone());
    owner.sign_in(&alice);
    proposer.sign_in(&bob);

    let ctx = owner.context();
    ctx.start();
    settle().await;

    let swap = propose_swap(
        &proposer.services,
        SwapProposal {
            requested_item: lamp.id,
            offered_item: Some(bike.id),
            message: Some("  Fancy a trade?  ".into()),
        },
    )
    .await
    .unwrap();
    assert_eq!(swap.status, SwapStatus::Pending);
    assert_eq!(swap.receiver_id, alice);
    assert_eq!(swap.message.as_deref(), Some("Fancy a trade?"));
    settle().await;

    let center = ctx.notifications();
    assert_eq!(center.unread_count(), 1);
    assert_eq!(center.notifications()[0].kind, NotificationType::TradeOffered);

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn proposing_on_own_or_delisted_items_is_rejected() {
    let h = Harness::new();
    let (alice, bob) = (user("alice"), user("bob"));
    let own = listed_item(&alice, "Lamp");
    let mut gone = listed_item(&bob, "Bike");
    gone.archived_at = Some(swapsync::domain::foundation::Timestamp::now());
    h.backend.insert_item(own.clone());
    h.backend.insert_item(gone.clone());
    h.sign_in(&alice);

    let on_own = propose_swap(
        &h.services,
        SwapProposal {
            requested_item: own.id,
            offered_item: None,
            message: None,
        },
    )
    .await;
    assert!(matches!(on_own, Err(SyncError::Forbidden(_))));

    let on_gone = propose_swap(
        &h.services,
        SwapProposal {
            requested_item: gone.id,
            offered_item: None,
            message: None,
        },
    )
    .await;
    assert!(matches!(on_gone, Err(SyncError::NotFound(_))));
    assert_eq!(h.backend.calls("swaps.create"), 0);
}
