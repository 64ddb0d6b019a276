use crate::access_request_ports::ExpiryCursor;

use super::*;

impl AccessRequestService {
    /// Expires approved memberships past their expiry and removes the member.
    ///
    /// Returns the number of requests moved to `expired`, at most
    /// `batch_size`. A request whose removal fails stays approved and is
    /// retried on the next sweep; the sweep pages past it so later due
    /// requests are still expired.
    pub async fn expire_due_requests(&self, batch_size: usize) -> AppResult<u64> {
        let now = self.now();
        let limit = batch_size.max(1);
        let mut cursor: Option<(i64, String)> = None;
        let mut expired = 0_usize;
        let mut skipped = 0_usize;

        loop {
            let after = cursor.as_ref().map(|(expires_at, request_id)| ExpiryCursor {
                expires_at: *expires_at,
                request_id: request_id.as_str(),
            });
            let page = self
                .repository
                .list_expired_approvals(now, after, limit)
                .await?;
            let page_len = page.len();

            for request in page {
                cursor = Some((
                    request.expires_at.unwrap_or_default(),
                    request.request_id.clone(),
                ));
                if self.expire_request(request, now).await? {
                    expired = expired.saturating_add(1);
                    if expired >= limit {
                        return Ok(u64::try_from(expired).unwrap_or(u64::MAX));
                    }
                } else {
                    skipped = skipped.saturating_add(1);
                }
            }

            if page_len < limit {
                break;
            }
        }

        if skipped > 0 {
            warn!(skipped, expired, "expiry sweep left requests approved");
        }

        Ok(u64::try_from(expired).unwrap_or(u64::MAX))
    }

    /// Expires one request. Returns false when the membership could not be
    /// removed and the request stays approved.
    async fn expire_request(&self, mut request: AccessRequest, now: i64) -> AppResult<bool> {
        if !request.is_past_expiry(now) {
            return Ok(false);
        }

        if let Err(error) = self.remove_membership(&request).await {
            warn!(
                request_id = %request.request_id,
                error = %error,
                "failed to remove expired membership"
            );
            return Ok(false);
        }

        request.status = RequestStatus::Expired;
        request.updated_by = SYSTEM_ACTOR.to_owned();
        request.last_updated = now;
        request.reviewer_comments = Some("membership expired".to_owned());
        self.repository.save_request(&request).await?;

        info!(
            request_id = %request.request_id,
            requester = %request.requester,
            "access request expired"
        );
        self.emit(&request, Some(RequestStatus::Approved)).await;
        Ok(true)
    }
}
