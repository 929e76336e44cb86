//! Swap inbox, swap detail, and proposing a swap.
//!
//! Accept, decline and cancel share one path: client-side precondition,
//! confirmation, optimistic status, guarded update. A guarded update that
//! matches no row means the other party resolved the swap first; the local
//! status is rolled back, the authoritative row re-fetched, and a conflict
//! reported.

use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::application::sync::{perform_optimistic_update, RefetchOnChange};
use crate::domain::foundation::{ItemId, SwapId, UserId};
use crate::domain::swap::{NewSwap, Swap, SwapAction, SwapRole, SwapStatus, SwapWithItems};
use crate::domain::sync::{ChangeTopic, SyncError};
use crate::ports::ConfirmRequest;

use super::{refetch_on, ActionOutcome, Services};

/// Runs `action` on `current` and keeps the caller's cache in step via
/// `set_status`.
async fn perform_swap_action<S>(
    services: &Services,
    actor: &UserId,
    current: &Swap,
    action: SwapAction,
    set_status: S,
) -> Result<ActionOutcome<Swap>, SyncError>
where
    S: Fn(SwapStatus) -> SwapStatus,
{
    let target = current.check_action(actor, action)?;

    let request = ConfirmRequest::new(action.prompt_title(), action.prompt_message())
        .confirm_label(action.confirm_label());
    let request = if matches!(action, SwapAction::Accept) {
        request
    } else {
        request.destructive()
    };
    if !services.confirm(request).await {
        return Ok(ActionOutcome::Dismissed);
    }

    let id = current.id;
    let result = perform_optimistic_update(
        || set_status(target),
        || async {
            match services.swaps.transition(id, actor, action).await {
                Ok(Some(updated)) => Ok(updated),
                Ok(None) => Err(SyncError::conflict("This offer", None)),
                Err(e) => Err(SyncError::from(e)),
            }
        },
        |previous| {
            set_status(previous);
        },
    )
    .await;

    match result {
        Ok(updated) => {
            set_status(updated.status);
            info!(swap_id = %id, status = %updated.status, "swap {}", action);
            services.emit(ChangeTopic::SwapsChanged);
            Ok(ActionOutcome::Applied(updated))
        }
        Err(err) => {
            let authoritative = match services.swaps.find(id).await {
                Ok(found) => found.map(|row| row.swap.status),
                Err(e) => {
                    debug!(swap_id = %id, error = %e, "re-fetch after failed transition failed");
                    None
                }
            };
            if let Some(status) = authoritative {
                set_status(status);
            }
            warn!(swap_id = %id, error = %err, "swap {} rolled back", action);
            Err(match err {
                SyncError::Conflict { resource, .. } => SyncError::Conflict {
                    resource,
                    current_state: authoritative.map(|s| s.to_string()),
                },
                other => other,
            })
        }
    }
}

/// Every swap the signed-in user takes part in.
pub struct SwapInboxView {
    services: Services,
    rows: Mutex<Vec<SwapWithItems>>,
    _refetch: RefetchOnChange,
}

impl SwapInboxView {
    pub fn new(services: Services) -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let refetch = refetch_on(
                &services,
                "swap_inbox",
                &[ChangeTopic::SwapsChanged],
                weak,
                |view: Arc<SwapInboxView>| async move { view.refresh().await },
            );
            Self {
                services,
                rows: Mutex::new(Vec::new()),
                _refetch: refetch,
            }
        })
    }

    fn rows(&self) -> MutexGuard<'_, Vec<SwapWithItems>> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn refresh(&self) -> Result<(), SyncError> {
        let user = match self.services.require_user() {
            Ok(user) => user,
            Err(e) => {
                self.rows().clear();
                return Err(e);
            }
        };
        debug!(user = %user, "refreshing swaps");
        let rows = self.services.swaps.list_for_user(&user).await?;
        *self.rows() = rows;
        Ok(())
    }

    pub fn swaps(&self) -> Vec<SwapWithItems> {
        self.rows().clone()
    }

    pub fn get(&self, id: SwapId) -> Option<SwapWithItems> {
        self.rows().iter().find(|r| r.swap.id == id).cloned()
    }

    /// Swaps where the signed-in user is the receiver.
    pub fn incoming(&self) -> Vec<SwapWithItems> {
        self.by_role(SwapRole::Receiver)
    }

    /// Swaps the signed-in user sent.
    pub fn outgoing(&self) -> Vec<SwapWithItems> {
        self.by_role(SwapRole::Sender)
    }

    /// Incoming swaps still waiting for an answer.
    pub fn awaiting_response(&self) -> usize {
        self.incoming()
            .iter()
            .filter(|r| r.swap.status.is_pending())
            .count()
    }

    fn by_role(&self, role: SwapRole) -> Vec<SwapWithItems> {
        let Some(user) = self.services.auth.current_user() else {
            return Vec::new();
        };
        self.rows()
            .iter()
            .filter(|r| r.swap.role_of(&user) == Some(role))
            .cloned()
            .collect()
    }

    pub async fn accept(&self, id: SwapId) -> Result<ActionOutcome<Swap>, SyncError> {
        self.act(id, SwapAction::Accept).await
    }

    pub async fn decline(&self, id: SwapId) -> Result<ActionOutcome<Swap>, SyncError> {
        self.act(id, SwapAction::Decline).await
    }

    pub async fn cancel(&self, id: SwapId) -> Result<ActionOutcome<Swap>, SyncError> {
        self.act(id, SwapAction::Cancel).await
    }

    async fn act(&self, id: SwapId, action: SwapAction) -> Result<ActionOutcome<Swap>, SyncError> {
        let actor = self.services.require_user()?;
        let current = self
            .get(id)
            .map(|row| row.swap)
            .ok_or_else(|| SyncError::not_found("Swap"))?;

        perform_swap_action(&self.services, &actor, &current, action, |status| {
            let mut rows = self.rows();
            match rows.iter_mut().find(|r| r.swap.id == id) {
                Some(row) => std::mem::replace(&mut row.swap.status, status),
                None => status,
            }
        })
        .await
    }
}

/// One swap, opened from a list or a notification.
pub struct SwapDetailView {
    services: Services,
    id: SwapId,
    row: Mutex<Option<SwapWithItems>>,
    _refetch: RefetchOnChange,
}

impl SwapDetailView {
    pub fn new(services: Services, id: SwapId) -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let refetch = refetch_on(
                &services,
                "swap_detail",
                &[ChangeTopic::SwapsChanged],
                weak,
                |view: Arc<SwapDetailView>| async move { view.refresh().await },
            );
            Self {
                services,
                id,
                row: Mutex::new(None),
                _refetch: refetch,
            }
        })
    }

    fn row(&self) -> MutexGuard<'_, Option<SwapWithItems>> {
        self.row.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn id(&self) -> SwapId {
        self.id
    }

    /// Loads the swap. Only participants can see it.
    pub async fn refresh(&self) -> Result<(), SyncError> {
        let user = self.services.require_user()?;
        let found = self
            .services
            .swaps
            .find(self.id)
            .await?
            .filter(|row| row.swap.is_participant(&user));

        match found {
            Some(row) => {
                *self.row() = Some(row);
                Ok(())
            }
            None => {
                *self.row() = None;
                Err(SyncError::not_found("Swap"))
            }
        }
    }

    pub fn swap(&self) -> Option<SwapWithItems> {
        self.row().clone()
    }

    /// Whether the signed-in user may take `action` right now.
    pub fn can(&self, action: SwapAction) -> bool {
        match (self.services.auth.current_user(), self.row().as_ref()) {
            (Some(user), Some(row)) => row.swap.allows(&user, action),
            _ => false,
        }
    }

    pub async fn accept(&self) -> Result<ActionOutcome<Swap>, SyncError> {
        self.act(SwapAction::Accept).await
    }

    pub async fn decline(&self) -> Result<ActionOutcome<Swap>, SyncError> {
        self.act(SwapAction::Decline).await
    }

    pub async fn cancel(&self) -> Result<ActionOutcome<Swap>, SyncError> {
        self.act(SwapAction::Cancel).await
    }

    async fn act(&self, action: SwapAction) -> Result<ActionOutcome<Swap>, SyncError> {
        let actor = self.services.require_user()?;
        let current = self
            .swap()
            .map(|row| row.swap)
            .ok_or_else(|| SyncError::not_found("Swap"))?;

        perform_swap_action(&self.services, &actor, &current, action, |status| {
            let mut row = self.row();
            match row.as_mut() {
                Some(row) => std::mem::replace(&mut row.swap.status, status),
                None => status,
            }
        })
        .await
    }
}

/// What the signed-in user wants to offer for someone else's item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapProposal {
    pub requested_item: ItemId,
    pub offered_item: Option<ItemId>,
    pub message: Option<String>,
}

/// Creates a pending swap on `proposal.requested_item`.
///
/// The requested item must be listed and owned by someone else; an offered
/// item must be listed and owned by the sender.
pub async fn propose_swap(services: &Services, proposal: SwapProposal) -> Result<Swap, SyncError> {
    let sender = services.require_user()?;

    let requested = services
        .items
        .find(proposal.requested_item)
        .await?
        .filter(|item| item.is_listed())
        .ok_or_else(|| SyncError::not_found("Item"))?;
    if requested.owner_id == sender {
        return Err(SyncError::Forbidden(
            "you cannot send an offer on your own item".into(),
        ));
    }

    if let Some(offered_id) = proposal.offered_item {
        let offered = services
            .items
            .find(offered_id)
            .await?
            .filter(|item| item.is_listed())
            .ok_or_else(|| SyncError::not_found("Offered item"))?;
        if offered.owner_id != sender {
            return Err(SyncError::Forbidden("you can only offer your own items".into()));
        }
    }

    let new_swap = NewSwap::new(
        sender,
        requested.owner_id.clone(),
        requested.id,
        proposal.offered_item,
        proposal.message,
    )
    .map_err(|e| SyncError::InvalidTransition(e.to_string()))?;

    let swap = services.swaps.create(&new_swap).await?;
    info!(swap_id = %swap.id, item_id = %requested.id, "swap proposed");
    services.emit(ChangeTopic::SwapsChanged);
    Ok(swap)
}
