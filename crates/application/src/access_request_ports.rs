use async_trait::async_trait;
use rolegate_core::AppResult;
use rolegate_domain::{AccessRequest, RequestStatus, RequestTarget};
use serde::{Deserialize, Serialize};

/// Input payload for submitting an access request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitAccessRequestInput {
    /// Requested resource.
    pub target: RequestTarget,
    /// Business justification.
    pub justification: String,
    /// Optional membership expiry in epoch seconds, group targets only.
    #[serde(default)]
    pub expires_at: Option<i64>,
}

/// Input payload for a status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequestStatusInput {
    /// Desired status.
    pub status: RequestStatus,
    /// Optional reviewer comment.
    #[serde(default)]
    pub reviewer_comments: Option<String>,
}

/// Event emitted after every committed status change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRequestEvent {
    /// Request id.
    pub request_id: String,
    /// Status before the change, `None` on creation.
    pub previous_status: Option<RequestStatus>,
    /// Status after the change.
    pub new_status: RequestStatus,
    /// Requesting user.
    pub requester: String,
    /// Requested resource.
    pub target: RequestTarget,
    /// Reviewer comment of the change.
    pub reviewer_comments: Option<String>,
    /// Actor that caused the change.
    pub updated_by: String,
}

/// Per-group attributes maintained in the directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupAttributes {
    /// Users or groups allowed to approve requests for this group.
    #[serde(default)]
    pub secondary_approvers: Vec<String>,
    /// Groups whose members are approved automatically.
    #[serde(default)]
    pub self_approval_groups: Vec<String>,
    /// Restricted groups refuse membership changes to everyone.
    #[serde(default)]
    pub restricted: bool,
    /// Whether users may request membership at all.
    #[serde(default)]
    pub requestable: bool,
}

/// Position of the last approved request seen by an expiry sweep.
///
/// Expired approvals are listed in `(expires_at, request_id)` order and a
/// cursor resumes strictly after its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryCursor<'a> {
    /// Expiry of the last request seen.
    pub expires_at: i64,
    /// Id of the last request seen.
    pub request_id: &'a str,
}

/// Outcome of adding a member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipChange {
    /// The user was added.
    Added,
    /// The user was already a member.
    AlreadyMember,
    /// The directory refused the change.
    Denied(String),
}

/// Outcome of removing a member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipRemoval {
    /// The user was removed.
    Removed,
    /// The user was not a member.
    NotMember,
    /// The directory refused the change.
    Denied(String),
}

/// Durable storage of access requests.
#[async_trait]
pub trait AccessRequestRepository: Send + Sync {
    /// Inserts a new request.
    ///
    /// Fails with `AppError::Conflict` when a pending request already exists
    /// for the same requester and target key.
    async fn insert_request(&self, request: &AccessRequest) -> AppResult<()>;

    /// Overwrites an existing request.
    async fn save_request(&self, request: &AccessRequest) -> AppResult<()>;

    /// Finds a request by id.
    async fn find_request(&self, request_id: &str) -> AppResult<Option<AccessRequest>>;

    /// Finds the pending request of a requester for a target key.
    async fn find_pending_for(
        &self,
        requester: &str,
        target_key: &str,
    ) -> AppResult<Option<AccessRequest>>;

    /// Loads requests by id, skipping unknown ids.
    async fn find_requests(&self, request_ids: &[String]) -> AppResult<Vec<AccessRequest>>;

    /// Lists pending requests, oldest first.
    async fn list_pending(&self, limit: usize) -> AppResult<Vec<AccessRequest>>;

    /// Lists approved requests whose expiry is at or before `now`, ordered by
    /// `(expires_at, request_id)` and starting after `after` when given.
    async fn list_expired_approvals(
        &self,
        now: i64,
        after: Option<ExpiryCursor<'_>>,
        limit: usize,
    ) -> AppResult<Vec<AccessRequest>>;

    /// Appends a request id to the requester's back-reference list.
    async fn append_user_request(&self, user: &str, request_id: &str) -> AppResult<()>;

    /// Returns the requester's back-reference list in submission order.
    async fn list_user_request_ids(&self, user: &str) -> AppResult<Vec<String>>;
}

/// Group directory collaborator.
#[async_trait]
pub trait GroupDirectory: Send + Sync {
    /// Returns attributes of a group, `None` when the group is unknown.
    async fn group_attributes(&self, group_name: &str) -> AppResult<Option<GroupAttributes>>;

    /// Creates a group or replaces its attributes, keeping its members.
    async fn put_group_attributes(
        &self,
        group_name: &str,
        attributes: &GroupAttributes,
    ) -> AppResult<()>;

    /// Adds a user to a group.
    async fn add_member(&self, group_name: &str, user: &str) -> AppResult<MembershipChange>;

    /// Removes a user from a group.
    async fn remove_member(&self, group_name: &str, user: &str) -> AppResult<MembershipRemoval>;
}

/// Receiver of access request events.
#[async_trait]
pub trait AccessRequestNotifier: Send + Sync {
    /// Delivers one event.
    async fn notify(&self, event: &AccessRequestEvent) -> AppResult<()>;
}
