use log::warn;
use uuid::Uuid;

use crate::domain::activity::OutboxEvent;
use crate::domain::errors::DomainError;
use crate::domain::ports::OrderStore;
use crate::domain::store::Store;

/// Load a store that can still be talked to.
pub(crate) fn active_store(store: &dyn OrderStore, store_id: Uuid) -> Result<Store, DomainError> {
    let found = store
        .transaction(|tx| tx.find_store(store_id))?
        .ok_or_else(|| DomainError::not_found(format!("store {store_id}")))?;
    if !found.is_active() {
        return Err(DomainError::validation(format!("store {} is uninstalled", found.shop_domain)));
    }
    Ok(found)
}

/// Pass a platform call result through, flagging the store for
/// re-authentication when its credentials were rejected.
///
/// The owner notification is queued only on the first rejection; a store
/// already flagged stays quiet until it is reconnected.
pub(crate) fn guard<T>(
    store: &dyn OrderStore,
    target: &Store,
    result: Result<T, DomainError>,
) -> Result<T, DomainError> {
    if let Err(DomainError::Authentication(reason)) = &result {
        warn!("{} store {} rejected credentials: {}", target.platform, target.shop_domain, reason);
        let flagged = store.transaction(|tx| {
            let Some(mut current) = tx.find_store(target.id)? else {
                return Ok(false);
            };
            if current.needs_reauth {
                return Ok(false);
            }
            current.needs_reauth = true;
            tx.update_store(&current)?;
            tx.enqueue(&OutboxEvent::store_reauthentication_required(
                current.id,
                current.owner_user_id,
                current.platform.as_str(),
                reason,
            ))?;
            Ok(true)
        });
        match flagged {
            Ok(true) => warn!("store {} flagged for re-authentication", target.shop_domain),
            Ok(false) => {}
            Err(e) => warn!(
                "could not flag store {} for re-authentication: {}",
                target.shop_domain, e
            ),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::Fixture;

    #[test]
    fn credential_rejection_flags_store_once() {
        let fx = Fixture::new();
        let store: &dyn OrderStore = &*fx.memory;
        let rejected = || -> Result<(), DomainError> {
            Err(DomainError::Authentication("401 invalid token".into()))
        };

        assert!(guard(store, &fx.store, rejected()).is_err());
        assert!(guard(store, &fx.store, rejected()).is_err());

        fx.memory.read(|s| {
            assert!(s.stores[&fx.store.id].needs_reauth);
            let events: Vec<_> = s
                .outbox
                .iter()
                .filter(|e| e.event_type == "StoreReauthenticationRequired")
                .collect();
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].payload["owner_user_id"], fx.store.owner_user_id.to_string());
        });
    }

    #[test]
    fn other_failures_leave_store_alone() {
        let fx = Fixture::new();
        let store: &dyn OrderStore = &*fx.memory;
        let result: Result<(), DomainError> = Err(DomainError::validation("bad order id"));

        assert!(guard(store, &fx.store, result).is_err());
        fx.memory.read(|s| {
            assert!(!s.stores[&fx.store.id].needs_reauth);
            assert!(s.outbox.is_empty());
        });
    }

    #[test]
    fn uninstalled_store_is_not_usable() {
        let fx = Fixture::new();
        fx.memory.seed(|s| {
            if let Some(st) = s.stores.get_mut(&fx.store.id) {
                st.uninstalled_at = Some(chrono::Utc::now());
            }
        });
        let store: &dyn OrderStore = &*fx.memory;
        assert!(matches!(active_store(store, fx.store.id), Err(DomainError::Validation(_))));
        assert!(matches!(active_store(store, Uuid::new_v4()), Err(DomainError::NotFound(_))));
    }
}
