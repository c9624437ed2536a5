//! Quota-bounded index of stored bundles, kept in eviction order.

use crate::bundle::Bundle;
use crate::error::{PolicyError, RepositoryError};
use crate::heap::Heap;
use crate::queue_policy::{PolicyEnv, QueueComp, QueuePolicy};

fn untracked(_: &Bundle, _: usize) {}

/// Bundles the router holds, with the next eviction victim on top.
///
/// The order reads stats and routes that change underneath it, so every
/// operation takes the current [`PolicyEnv`]. Evicted bundles are returned
/// to the caller, which asks the host to drop them.
#[derive(Debug, Clone, Default)]
pub struct Repository {
    heap: Heap<Bundle>,
    policy: QueuePolicy,
    min_forward: u32,
    usage: u64,
}

impl Repository {
    /// Empty FIFO repository.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn policy(&self) -> QueuePolicy {
        self.policy
    }

    pub fn min_forward(&self) -> u32 {
        self.min_forward
    }

    /// Bytes held.
    pub fn usage(&self) -> u64 {
        self.usage
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Next eviction victim.
    pub fn top(&self) -> Option<&Bundle> {
        self.heap.top()
    }

    /// Bundles in heap order.
    pub fn iter(&self) -> std::slice::Iter<'_, Bundle> {
        self.heap.iter()
    }

    pub fn contains(&self, b: &Bundle) -> bool {
        self.heap.position(|x| x.same_bundle(b)).is_some()
    }

    // the policy was validated by set_policy
    fn comparator<'a>(&self, env: PolicyEnv<'a>) -> QueueComp<'a> {
        QueueComp::from_env(self.policy, self.min_forward, env)
    }

    /// Switch eviction order and rebuild the heap under it.
    pub fn set_policy(&mut self, policy: QueuePolicy, min_forward: u32, env: PolicyEnv<'_>) -> Result<(), PolicyError> {
        let comp = QueueComp::with_env(policy, min_forward, env)?;
        tracing::debug!(
            subsystem = "repository",
            from = %self.policy,
            to = %policy,
            "changing queue policy"
        );
        self.policy = policy;
        self.min_forward = min_forward;
        self.heap.heapify(|a, b| comp.comp(a, b), untracked);
        Ok(())
    }

    /// Store `b`, then evict until back under the host quota.
    pub fn add(&mut self, b: Bundle, env: PolicyEnv<'_>) -> Result<Vec<Bundle>, RepositoryError> {
        if self.contains(&b) {
            return Err(RepositoryError::Duplicate {
                dest: b.destination,
                cts: b.creation_ts,
                seq: b.seqno,
            });
        }
        let comp = self.comparator(env);
        self.usage += b.size;
        tracing::debug!(subsystem = "repository", dest = %b.destination, seqno = b.seqno, size = b.size, usage = self.usage, "add");
        self.heap.push(b, |x, y| comp.comp(x, y), untracked);
        Ok(self.enforce_quota(env))
    }

    /// Forget `b`; returns the stored view if it was present.
    pub fn del(&mut self, b: &Bundle, env: PolicyEnv<'_>) -> Option<Bundle> {
        let pos = self.heap.position(|x| x.same_bundle(b))?;
        let comp = self.comparator(env);
        let removed = self.heap.remove(pos, |x, y| comp.comp(x, y), untracked)?;
        self.usage = self.usage.saturating_sub(removed.size);
        tracing::debug!(subsystem = "repository", dest = %removed.destination, seqno = removed.seqno, "removed from list");
        Some(removed)
    }

    /// Replace the stored view of `b` (e.g. a new forward count) and move it
    /// to its new place in the eviction order.
    pub fn change_priority(&mut self, b: &Bundle, env: PolicyEnv<'_>) -> bool {
        let Some(pos) = self.heap.position(|x| x.same_bundle(b)) else {
            return false;
        };
        let comp = self.comparator(env);
        let old_size = self.heap.get(pos).map(|x| x.size).unwrap_or(0);
        self.usage = self.usage.saturating_sub(old_size) + b.size;
        self.heap
            .replace(pos, b.clone(), |x, y| comp.comp(x, y), untracked)
            .is_some()
    }

    /// Re-apply the host quota after it changed.
    pub fn handle_change_max(&mut self, env: PolicyEnv<'_>) -> Vec<Bundle> {
        self.enforce_quota(env)
    }

    fn enforce_quota(&mut self, env: PolicyEnv<'_>) -> Vec<Bundle> {
        let quota = env.core.max_bundle_quota();
        let mut evicted = Vec::new();
        if quota == 0 {
            return evicted;
        }
        while self.usage > quota {
            match self.evict(env) {
                Some(b) => evicted.push(b),
                None => break,
            }
        }
        evicted
    }

    fn evict(&mut self, env: PolicyEnv<'_>) -> Option<Bundle> {
        let comp = self.comparator(env);
        // LEPR scans in heap storage order, not by rank, for a bundle past
        // min_forward; if none qualifies the root goes anyway
        let pos = self.heap.position(|b| comp.qualifies(b)).unwrap_or(0);
        let victim = self.heap.remove(pos, |x, y| comp.comp(x, y), untracked)?;
        self.usage = self.usage.saturating_sub(victim.size);
        tracing::info!(
            subsystem = "repository",
            policy = %self.policy,
            dest = %victim.destination,
            seqno = victim.seqno,
            usage = self.usage,
            "evicting bundle"
        );
        Some(victim)
    }

    /// Heap order holds under the current policy and usage matches contents.
    pub fn check_invariants(&self, env: PolicyEnv<'_>) -> bool {
        let comp = self.comparator(env);
        self.heap.is_heap(|a, b| comp.comp(a, b))
            && self.usage == self.heap.iter().map(|b| b.size).sum::<u64>()
    }
}
