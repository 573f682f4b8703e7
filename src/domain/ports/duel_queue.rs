//! Durable work queue port for duel requests.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{DuelRequest, QueueCounts};

/// Durable FIFO of duel requests.
///
/// Items move `pending -> locked -> done | failed`. A locked item belongs to
/// exactly one consumer until it is marked; `retry_locked` returns orphans
/// from a crashed run to `pending`, `retry_failed` does the same for
/// failures. Order is preserved across retries.
#[async_trait]
pub trait DuelQueue: Send + Sync {
    /// Append one request as pending.
    async fn add(&self, request: &DuelRequest) -> DomainResult<()>;

    /// Append many requests in one transaction; returns the number added.
    async fn add_all(&self, requests: &[DuelRequest]) -> DomainResult<usize>;

    /// Atomically lock the oldest pending item and return it with a fresh
    /// `message_id`. `None` when nothing is pending.
    async fn get(&self) -> DomainResult<Option<DuelRequest>>;

    /// Locked -> done. Anything else is an `InvalidQueueTransition`.
    async fn mark_done(&self, message_id: Uuid) -> DomainResult<()>;

    /// Locked -> failed. Anything else is an `InvalidQueueTransition`.
    async fn mark_failed(&self, message_id: Uuid) -> DomainResult<()>;

    /// Failed -> pending for every failed item; true when any moved.
    async fn retry_failed(&self) -> DomainResult<bool>;

    /// Locked -> pending for every locked item; true when any moved.
    async fn retry_locked(&self) -> DomainResult<bool>;

    /// Delete done items, and failed ones too when `include_failed`.
    async fn prune(&self, include_failed: bool) -> DomainResult<u64>;

    async fn pending_count(&self) -> DomainResult<u64>;

    async fn status_counts(&self) -> DomainResult<QueueCounts>;

    /// Remove every item regardless of status.
    async fn clear(&self) -> DomainResult<u64>;
}
