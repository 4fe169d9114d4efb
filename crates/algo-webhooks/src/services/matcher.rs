//! Resolves which subscriptions receive a triggered event.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::WebhookError;
use crate::models::{ScopeId, Subscription};
use crate::store::SubscriptionStore;

/// Whether `subscription` should receive `event` triggered in `scope`.
///
/// Exact event-name membership only; no prefix or wildcard matching.
#[must_use]
pub fn matches(subscription: &Subscription, event: &str, scope: Option<ScopeId>) -> bool {
    subscription.active && subscription.subscribes_to(event) && subscription.accepts_scope(scope)
}

/// Subscription lookup in front of a [`SubscriptionStore`].
#[derive(Clone)]
pub struct SubscriptionMatcher {
    store: Arc<dyn SubscriptionStore>,
}

impl SubscriptionMatcher {
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self { store }
    }

    /// Active subscriptions matching `event` in `scope`, one entry per id.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::MatchLookup` if the store query fails.
    pub async fn find_matches(
        &self,
        event: &str,
        scope: Option<ScopeId>,
    ) -> Result<Vec<Subscription>, WebhookError> {
        let candidates = self
            .store
            .find_active_by_event(event, scope)
            .await
            .map_err(|e| WebhookError::MatchLookup(e.to_string()))?;

        let mut seen = HashSet::new();
        Ok(candidates
            .into_iter()
            .filter(|s| matches(s, event, scope))
            .filter(|s| seen.insert(s.id))
            .collect())
    }
}
