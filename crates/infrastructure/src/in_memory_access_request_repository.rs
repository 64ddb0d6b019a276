use std::collections::HashMap;

use async_trait::async_trait;
use rolegate_application::{AccessRequestRepository, ExpiryCursor};
use rolegate_core::{AppError, AppResult};
use rolegate_domain::{AccessRequest, RequestStatus};
use tokio::sync::RwLock;

/// In-memory access request table with per-user back-reference lists.
#[derive(Default)]
pub struct InMemoryAccessRequestRepository {
    requests: RwLock<HashMap<String, AccessRequest>>,
    user_requests: RwLock<HashMap<String, Vec<String>>>,
}

impl InMemoryAccessRequestRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn is_pending_for(request: &AccessRequest, requester: &str, target_key: &str) -> bool {
    request.status == RequestStatus::Pending
        && request.requester == requester
        && request.target.target_key() == target_key
}

#[async_trait]
impl AccessRequestRepository for InMemoryAccessRequestRepository {
    async fn insert_request(&self, request: &AccessRequest) -> AppResult<()> {
        let mut requests = self.requests.write().await;
        if requests.contains_key(request.request_id.as_str()) {
            return Err(AppError::Conflict(format!(
                "access request '{}' already exists",
                request.request_id
            )));
        }

        let target_key = request.target.target_key();
        if let Some(existing) = requests
            .values()
            .find(|existing| is_pending_for(existing, &request.requester, &target_key))
        {
            return Err(AppError::Conflict(format!(
                "access request '{}' for '{target_key}' is already pending",
                existing.request_id
            )));
        }

        requests.insert(request.request_id.clone(), request.clone());
        Ok(())
    }

    async fn save_request(&self, request: &AccessRequest) -> AppResult<()> {
        let mut requests = self.requests.write().await;
        if !requests.contains_key(request.request_id.as_str()) {
            return Err(AppError::NotFound(format!(
                "access request '{}' does not exist",
                request.request_id
            )));
        }
        requests.insert(request.request_id.clone(), request.clone());
        Ok(())
    }

    async fn find_request(&self, request_id: &str) -> AppResult<Option<AccessRequest>> {
        Ok(self.requests.read().await.get(request_id).cloned())
    }

    async fn find_pending_for(
        &self,
        requester: &str,
        target_key: &str,
    ) -> AppResult<Option<AccessRequest>> {
        Ok(self
            .requests
            .read()
            .await
            .values()
            .find(|request| is_pending_for(request, requester, target_key))
            .cloned())
    }

    async fn find_requests(&self, request_ids: &[String]) -> AppResult<Vec<AccessRequest>> {
        let requests = self.requests.read().await;
        Ok(request_ids
            .iter()
            .filter_map(|request_id| requests.get(request_id).cloned())
            .collect())
    }

    async fn list_pending(&self, limit: usize) -> AppResult<Vec<AccessRequest>> {
        let mut pending: Vec<AccessRequest> = self
            .requests
            .read()
            .await
            .values()
            .filter(|request| request.status == RequestStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|left, right| {
            left.request_time
                .cmp(&right.request_time)
                .then_with(|| left.request_id.cmp(&right.request_id))
        });
        pending.truncate(limit);
        Ok(pending)
    }

    async fn list_expired_approvals(
        &self,
        now: i64,
        after: Option<ExpiryCursor<'_>>,
        limit: usize,
    ) -> AppResult<Vec<AccessRequest>> {
        let mut due: Vec<AccessRequest> = self
            .requests
            .read()
            .await
            .values()
            .filter(|request| request.is_past_expiry(now))
            .filter(|request| {
                after.is_none_or(|cursor| {
                    (request.expires_at.unwrap_or_default(), request.request_id.as_str())
                        > (cursor.expires_at, cursor.request_id)
                })
            })
            .cloned()
            .collect();
        due.sort_by(|left, right| {
            left.expires_at
                .cmp(&right.expires_at)
                .then_with(|| left.request_id.cmp(&right.request_id))
        });
        due.truncate(limit);
        Ok(due)
    }

    async fn append_user_request(&self, user: &str, request_id: &str) -> AppResult<()> {
        self.user_requests
            .write()
            .await
            .entry(user.to_owned())
            .or_default()
            .push(request_id.to_owned());
        Ok(())
    }

    async fn list_user_request_ids(&self, user: &str) -> AppResult<Vec<String>> {
        Ok(self
            .user_requests
            .read()
            .await
            .get(user)
            .cloned()
            .unwrap_or_default())
    }
}
