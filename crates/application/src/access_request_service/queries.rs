use super::*;

impl AccessRequestService {
    /// Returns one request visible to the requester, its reviewers and admins.
    pub async fn get_request(
        &self,
        identity: &PrincipalIdentity,
        request_id: &str,
    ) -> AppResult<AccessRequest> {
        let request = self.require_request(request_id).await?;
        if identity.user().eq_ignore_ascii_case(request.requester.as_str()) {
            return Ok(request);
        }

        let route = self.authorization.approval_route(&request.target).await?;
        if !self.can_review(identity, &request, &route) {
            return Err(AppError::Forbidden(format!(
                "'{}' may not view access request '{request_id}'",
                identity.user()
            )));
        }

        Ok(request)
    }

    /// Lists the caller's own requests, newest first.
    pub async fn list_requests_for_user(
        &self,
        identity: &PrincipalIdentity,
    ) -> AppResult<Vec<AccessRequest>> {
        let mut request_ids = self.repository.list_user_request_ids(identity.user()).await?;
        request_ids.reverse();

        let mut requests = self.repository.find_requests(&request_ids).await?;
        requests.sort_by(|left, right| {
            right
                .request_time
                .cmp(&left.request_time)
                .then_with(|| right.request_id.cmp(&left.request_id))
        });
        Ok(requests)
    }

    /// Lists pending requests the caller may approve or reject, oldest first.
    pub async fn list_pending_for_reviewer(
        &self,
        identity: &PrincipalIdentity,
        limit: usize,
    ) -> AppResult<Vec<AccessRequest>> {
        if limit == 0 {
            return Err(AppError::Validation(
                "pending listing limit must be positive".to_owned(),
            ));
        }

        let mut reviewable = Vec::new();
        for request in self.repository.list_pending(limit.min(500)).await? {
            let route = match self.authorization.approval_route(&request.target).await {
                Ok(route) => route,
                Err(AppError::NotFound(_)) => continue,
                Err(error) => return Err(error),
            };

            if self.can_review(identity, &request, &route) {
                reviewable.push(request);
            }
        }

        Ok(reviewable)
    }
}
