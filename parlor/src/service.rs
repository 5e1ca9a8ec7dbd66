//! Request/response contract for the out-of-core collaborators.
//!
//! Persistent storage, moderation, and directory authentication live
//! behind server endpoints the sync engine only ever calls through
//! this trait. The engine holds no durable state of its own: on
//! restart everything is rebuilt from the handshake snapshot plus
//! live events.

use std::collections::HashMap;

use parlor_proto::message::{LinkmanId, Message};
use parlor_proto::snapshot::{ClientInfo, GroupSummary, GuestSnapshot, UserSnapshot};

/// Errors returned by the collaborator services.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The presented token was rejected or expired.
    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    /// The service could not be reached or answered abnormally.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The service answered with a malformed payload.
    #[error("malformed response: {0}")]
    BadResponse(String),
}

/// Async contract for authentication, guest provisioning, and message
/// history fetches.
///
/// Implementations are network clients in production; tests use
/// in-memory mocks. All calls are plain request/response with no
/// ordering requirements between them.
pub trait ChatService: Send + Sync + 'static {
    /// Re-authenticate with a previously issued credential token.
    fn login_by_token(
        &self,
        token: &str,
        client: &ClientInfo,
    ) -> impl std::future::Future<Output = Result<UserSnapshot, ServiceError>> + Send;

    /// Provision an anonymous guest identity bound to one default group.
    fn guest(
        &self,
        client: &ClientInfo,
    ) -> impl std::future::Future<Output = Result<GuestSnapshot, ServiceError>> + Send;

    /// Fetch the most recent messages for each of the given linkmen in
    /// one batched call, keyed by linkman id.
    fn last_messages(
        &self,
        linkman_ids: &[LinkmanId],
    ) -> impl std::future::Future<Output = Result<HashMap<LinkmanId, Vec<Message>>, ServiceError>> + Send;

    /// Fetch one page of older history for a linkman. `existing` is
    /// the number of messages the client already holds, used as the
    /// paging offset.
    fn history(
        &self,
        linkman_id: &LinkmanId,
        existing: usize,
    ) -> impl std::future::Future<Output = Result<Vec<Message>, ServiceError>> + Send;
}

/// Offline service for demo mode and simple tests: every login fails,
/// guests land in a static default group, and all history is empty.
#[derive(Debug, Clone)]
pub struct OfflineService {
    group: GroupSummary,
}

impl OfflineService {
    /// Creates an offline service with the given default group.
    #[must_use]
    pub const fn new(group: GroupSummary) -> Self {
        Self { group }
    }
}

impl ChatService for OfflineService {
    async fn login_by_token(
        &self,
        _token: &str,
        _client: &ClientInfo,
    ) -> Result<UserSnapshot, ServiceError> {
        Err(ServiceError::AuthRejected("offline mode".into()))
    }

    async fn guest(&self, _client: &ClientInfo) -> Result<GuestSnapshot, ServiceError> {
        Ok(GuestSnapshot {
            group: self.group.clone(),
            messages: Vec::new(),
        })
    }

    async fn last_messages(
        &self,
        _linkman_ids: &[LinkmanId],
    ) -> Result<HashMap<LinkmanId, Vec<Message>>, ServiceError> {
        Ok(HashMap::new())
    }

    async fn history(
        &self,
        _linkman_id: &LinkmanId,
        _existing: usize,
    ) -> Result<Vec<Message>, ServiceError> {
        Ok(Vec::new())
    }
}
