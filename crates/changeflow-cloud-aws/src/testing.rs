//! In-memory WAF endpoint for tests
//!
//! Models the parts of WAF that matter to the retry controller: one current
//! change token that the first accepted mutation consumes, IP sets keyed by
//! id, and per-operation failure injection.

use crate::api::{IpSet, IpSetUpdate, WafApi};
use crate::error::codes;
use async_trait::async_trait;
use changeflow_cloud::{ApiError, ChangeAction, ChangeToken};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Remote operation, used for failure injection and call inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetChangeToken,
    CreateIpSet,
    GetIpSet,
    UpdateIpSet,
    DeleteIpSet,
}

/// A mutating call as the service saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub operation: Operation,
    pub token: String,
    pub ip_set_id: Option<String>,
    pub updates: Vec<IpSetUpdate>,
    pub accepted: bool,
}

#[derive(Default)]
struct State {
    token_version: u64,
    next_id: u64,
    ip_sets: BTreeMap<String, IpSet>,
    failures: HashMap<Operation, VecDeque<Option<ApiError>>>,
    calls: Vec<RecordedCall>,
    token_fetches: usize,
}

/// In-memory WAF endpoint
#[derive(Default)]
pub struct MemoryWaf {
    state: Mutex<State>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryWaf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every mutating call, widening the window between token fetch
    /// and token use
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        // A panicking test thread must not hide the state from other assertions.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fail the next call of `operation` with `error`
    pub fn fail_next(&self, operation: Operation, error: ApiError) {
        self.state()
            .failures
            .entry(operation)
            .or_default()
            .push_back(Some(error));
    }

    /// Let the next call of `operation` through before any queued failure
    pub fn pass_next(&self, operation: Operation) {
        self.state()
            .failures
            .entry(operation)
            .or_default()
            .push_back(None);
    }

    /// Fail the next `count` calls of `operation` with the given error code
    pub fn fail_times(&self, operation: Operation, code: &str, count: usize) {
        for _ in 0..count {
            self.fail_next(operation, ApiError::new(code, "injected failure"));
        }
    }

    /// Consume the current token as another client would
    pub fn consume_token_externally(&self) {
        self.state().token_version += 1;
    }

    pub fn current_token(&self) -> String {
        token_for(self.state().token_version)
    }

    pub fn token_fetches(&self) -> usize {
        self.state().token_fetches
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    pub fn accepted_calls(&self, operation: Operation) -> Vec<RecordedCall> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.operation == operation && c.accepted)
            .cloned()
            .collect()
    }

    pub fn ip_set(&self, ip_set_id: &str) -> Option<IpSet> {
        self.state().ip_sets.get(ip_set_id).cloned()
    }

    pub fn ip_set_count(&self) -> usize {
        self.state().ip_sets.len()
    }

    /// Delete an IP set behind the provider's back
    pub fn remove_externally(&self, ip_set_id: &str) -> Option<IpSet> {
        self.state().ip_sets.remove(ip_set_id)
    }

    /// Highest number of mutating calls that were in progress at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        InFlight(&self.in_flight)
    }

    /// Apply a mutation: injected failure, then existence check, then token check
    fn mutate<T>(
        &self,
        operation: Operation,
        token: &ChangeToken,
        ip_set_id: Option<&str>,
        updates: &[IpSetUpdate],
        apply: impl FnOnce(&mut State) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        let mut state = self.state();
        let mut call = RecordedCall {
            operation,
            token: token.as_str().to_string(),
            ip_set_id: ip_set_id.map(str::to_string),
            updates: updates.to_vec(),
            accepted: false,
        };

        let result = take_failure(&mut state, operation)
            .map_or(Ok(()), Err)
            .and_then(|()| match ip_set_id {
                Some(id) if !state.ip_sets.contains_key(id) => Err(ApiError::new(
                    codes::NONEXISTENT_ITEM,
                    format!("The referenced item does not exist: {id}"),
                )),
                _ => Ok(()),
            })
            .and_then(|()| {
                if token.as_str() == token_for(state.token_version) {
                    Ok(())
                } else {
                    Err(ApiError::new(
                        codes::STALE_DATA,
                        "The operation failed because you tried to use a change token that has already been used.",
                    ))
                }
            })
            .and_then(|()| apply(&mut state));

        if result.is_ok() {
            state.token_version += 1;
            call.accepted = true;
        }
        state.calls.push(call);
        result
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn token_for(version: u64) -> String {
    format!("token-{version:04}")
}

fn take_failure(state: &mut State, operation: Operation) -> Option<ApiError> {
    state
        .failures
        .get_mut(&operation)
        .and_then(VecDeque::pop_front)
        .flatten()
}

#[async_trait]
impl WafApi for MemoryWaf {
    async fn get_change_token(&self) -> Result<ChangeToken, ApiError> {
        let mut state = self.state();
        if let Some(err) = take_failure(&mut state, Operation::GetChangeToken) {
            return Err(err);
        }
        state.token_fetches += 1;
        Ok(ChangeToken::new(token_for(state.token_version)))
    }

    async fn create_ip_set(&self, token: &ChangeToken, name: &str) -> Result<String, ApiError> {
        let _in_flight = self.enter().await;
        self.mutate(Operation::CreateIpSet, token, None, &[], |state| {
            state.next_id += 1;
            let id = format!("ipset-{:04}", state.next_id);
            state.ip_sets.insert(
                id.clone(),
                IpSet {
                    ip_set_id: id.clone(),
                    name: name.to_string(),
                    descriptors: Vec::new(),
                },
            );
            Ok(id)
        })
    }

    async fn get_ip_set(&self, ip_set_id: &str) -> Result<IpSet, ApiError> {
        let mut state = self.state();
        if let Some(err) = take_failure(&mut state, Operation::GetIpSet) {
            return Err(err);
        }
        state.ip_sets.get(ip_set_id).cloned().ok_or_else(|| {
            ApiError::new(
                codes::NONEXISTENT_ITEM,
                format!("The referenced item does not exist: {ip_set_id}"),
            )
        })
    }

    async fn update_ip_set(
        &self,
        token: &ChangeToken,
        ip_set_id: &str,
        updates: &[IpSetUpdate],
    ) -> Result<(), ApiError> {
        let _in_flight = self.enter().await;
        self.mutate(
            Operation::UpdateIpSet,
            token,
            Some(ip_set_id),
            updates,
            |state| {
                let ip_set = state.ip_sets.get_mut(ip_set_id).ok_or_else(|| {
                    ApiError::new(codes::NONEXISTENT_ITEM, ip_set_id.to_string())
                })?;
                for update in updates {
                    let present = ip_set.descriptors.contains(&update.member);
                    match (update.action, present) {
                        (ChangeAction::Insert, false) => {
                            ip_set.descriptors.push(update.member.clone())
                        }
                        (ChangeAction::Delete, true) => {
                            ip_set.descriptors.retain(|d| d != &update.member)
                        }
                        (ChangeAction::Insert, true) => {
                            return Err(ApiError::new(
                                "WAFInvalidOperationException",
                                format!("descriptor already present: {}", update.member.value),
                            ));
                        }
                        (ChangeAction::Delete, false) => {
                            return Err(ApiError::new(
                                "WAFNonexistentContainerException",
                                format!("descriptor not present: {}", update.member.value),
                            ));
                        }
                    }
                }
                Ok(())
            },
        )
    }

    async fn delete_ip_set(&self, token: &ChangeToken, ip_set_id: &str) -> Result<(), ApiError> {
        let _in_flight = self.enter().await;
        self.mutate(
            Operation::DeleteIpSet,
            token,
            Some(ip_set_id),
            &[],
            |state| {
                let non_empty = state
                    .ip_sets
                    .get(ip_set_id)
                    .is_some_and(|s| !s.descriptors.is_empty());
                if non_empty {
                    return Err(ApiError::new(
                        "WAFNonEmptyEntityException",
                        "The IP set still contains descriptors",
                    ));
                }
                state.ip_sets.remove(ip_set_id);
                Ok(())
            },
        )
    }
}
