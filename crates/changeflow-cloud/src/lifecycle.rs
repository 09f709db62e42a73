//! Resource lifecycle on top of the retry executor
//!
//! State machine for a bound resource:
//!
//! ```text
//! Absent -> Creating -> Present -> Updating -> Present -> Deleting -> Absent
//! ```
//!
//! Any read that finds the remote object gone moves the binding back to
//! `Absent` and clears its id, so the framework plans a recreate.
//!
//! A failure after the object exists never drops the id. A create whose
//! member pass failed stays bound in `Creating`; an update that failed
//! partway returns to `Present`.

use crate::action::{ChangeAction, ChangeSummary, batch};
use crate::diff::{MemberDiff, diff_members};
use crate::error::{ApiError, CloudError, ConflictKind, Result};
use crate::retry::{Outcome, RetryExecutor};
use crate::token::{ChangeToken, Scope};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Lifecycle status recorded on a [`RemoteObjectRef`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    #[default]
    Absent,
    Creating,
    Present,
    Updating,
    Deleting,
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceStatus::Absent => write!(f, "absent"),
            ResourceStatus::Creating => write!(f, "creating"),
            ResourceStatus::Present => write!(f, "present"),
            ResourceStatus::Updating => write!(f, "updating"),
            ResourceStatus::Deleting => write!(f, "deleting"),
        }
    }
}

/// Local binding to a remote object, owned by the framework's state store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObjectRef {
    id: Option<String>,
    status: ResourceStatus,
}

impl RemoteObjectRef {
    /// An unbound reference
    pub fn new() -> Self {
        Self::default()
    }

    /// A reference to an object known to exist
    pub fn bound(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            status: ResourceStatus::Present,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn require_id(&self) -> Result<&str> {
        self.id.as_deref().ok_or(CloudError::NotBound)
    }

    pub fn is_bound(&self) -> bool {
        self.id.is_some()
    }

    pub fn status(&self) -> ResourceStatus {
        self.status
    }

    pub fn set_status(&mut self, status: ResourceStatus) {
        self.status = status;
    }

    pub fn bind(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
        self.status = ResourceStatus::Present;
    }

    /// The remote object no longer exists
    pub fn clear(&mut self) {
        self.id = None;
        self.status = ResourceStatus::Absent;
    }
}

/// The CRUD contract the host framework drives for every resource type.
///
/// `create`, `read` and `update` return the observed state, or `None` when
/// the object turned out not to exist (the binding is cleared in that case).
/// On error the binding still reflects what exists remotely.
#[async_trait]
pub trait ResourceLifecycle: Send + Sync {
    type Desired: Send + Sync;
    type Observed: Send + Sync;

    async fn create(
        &self,
        desired: &Self::Desired,
        binding: &mut RemoteObjectRef,
    ) -> Result<Option<Self::Observed>>;

    async fn read(&self, binding: &mut RemoteObjectRef) -> Result<Option<Self::Observed>>;

    async fn update(
        &self,
        observed: &Self::Observed,
        desired: &Self::Desired,
        binding: &mut RemoteObjectRef,
    ) -> Result<Option<Self::Observed>>;

    async fn delete(&self, binding: &mut RemoteObjectRef) -> Result<()>;
}

/// Desired or observed state of a named remote collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSet<M: Ord> {
    pub name: String,
    pub members: BTreeSet<M>,
}

impl<M: Ord> MemberSet<M> {
    pub fn new(name: impl Into<String>, members: impl IntoIterator<Item = M>) -> Self {
        Self {
            name: name.into(),
            members: members.into_iter().collect(),
        }
    }

    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: BTreeSet::new(),
        }
    }
}

/// Remote calls of a collection whose members change through
/// insert/delete batches carrying a change token.
#[async_trait]
pub trait MemberSetApi: Send + Sync {
    type Member: Clone + Ord + std::fmt::Debug + Send + Sync;

    /// Resource type name used in logs
    fn kind(&self) -> &str;

    /// Create the empty collection and return its remote id
    async fn create(
        &self,
        token: &ChangeToken,
        desired: &MemberSet<Self::Member>,
    ) -> std::result::Result<String, ApiError>;

    async fn get(&self, id: &str) -> std::result::Result<MemberSet<Self::Member>, ApiError>;

    async fn update(
        &self,
        token: &ChangeToken,
        id: &str,
        changes: &[crate::action::MemberChange<Self::Member>],
    ) -> std::result::Result<(), ApiError>;

    async fn delete(&self, token: &ChangeToken, id: &str) -> std::result::Result<(), ApiError>;
}

/// Generic lifecycle for any [`MemberSetApi`] resource.
///
/// Create is two-phase: the collection is created empty, then its members
/// are pushed through an update pass.
pub struct MemberSetResource<A> {
    api: Arc<A>,
    executor: RetryExecutor,
    scope: Scope,
    batch_size: usize,
}

/// Upper bound on changes per mutation accepted by most change-token APIs
pub const DEFAULT_BATCH_SIZE: usize = 1000;

impl<A: MemberSetApi> MemberSetResource<A> {
    pub fn new(api: Arc<A>, executor: RetryExecutor, scope: Scope) -> Self {
        Self {
            api,
            executor,
            scope,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    fn is_not_found(&self, error: &ApiError) -> bool {
        self.executor.classifier().classify(error) == ConflictKind::NotFound
    }

    /// Submit inserts, then deletes, each chunk as its own mutation.
    /// `None` means the object disappeared underneath us.
    async fn apply_changes(
        &self,
        id: &str,
        diff: &MemberDiff<A::Member>,
    ) -> Result<Option<ChangeSummary>> {
        let api = self.api.as_ref();
        let mut summary = ChangeSummary {
            inserted: diff.to_insert.len(),
            deleted: diff.to_delete.len(),
            mutations: 0,
        };

        for (action, members) in [
            (ChangeAction::Insert, &diff.to_insert),
            (ChangeAction::Delete, &diff.to_delete),
        ] {
            for chunk in members.chunks(self.batch_size) {
                let changes = batch(action, chunk);
                let changes = changes.as_slice();
                let outcome = self
                    .executor
                    .execute(&self.scope, |token| async move {
                        api.update(&token, id, changes).await
                    })
                    .await?;
                if outcome.is_not_found() {
                    return Ok(None);
                }
                summary.mutations += 1;
            }
        }

        Ok(Some(summary))
    }
}

#[async_trait]
impl<A: MemberSetApi> ResourceLifecycle for MemberSetResource<A> {
    type Desired = MemberSet<A::Member>;
    type Observed = MemberSet<A::Member>;

    async fn create(
        &self,
        desired: &Self::Desired,
        binding: &mut RemoteObjectRef,
    ) -> Result<Option<Self::Observed>> {
        binding.set_status(ResourceStatus::Creating);
        let api = self.api.as_ref();

        let id = match self
            .executor
            .execute(&self.scope, |token| async move {
                api.create(&token, desired).await
            })
            .await?
        {
            Outcome::Applied(id) => id,
            Outcome::NotFound(err) => {
                binding.clear();
                return Err(CloudError::Api(err));
            }
        };
        tracing::info!(kind = api.kind(), id = %id, name = %desired.name, "created");
        binding.bind(id.clone());

        let empty = MemberSet::empty(desired.name.clone());
        match self.update(&empty, desired, binding).await {
            Ok(observed) => Ok(observed),
            Err(err) => {
                // The object exists; keep the id and mark the create unfinished.
                if binding.is_bound() {
                    binding.set_status(ResourceStatus::Creating);
                }
                tracing::warn!(
                    kind = api.kind(),
                    id = %id,
                    error = %err,
                    transient = err.is_transient(),
                    "created but members could not be applied"
                );
                Err(err)
            }
        }
    }

    async fn read(&self, binding: &mut RemoteObjectRef) -> Result<Option<Self::Observed>> {
        let Some(id) = binding.id().map(str::to_owned) else {
            return Ok(None);
        };

        match self.api.get(&id).await {
            Ok(observed) => {
                if binding.status() == ResourceStatus::Absent {
                    binding.set_status(ResourceStatus::Present);
                }
                Ok(Some(observed))
            }
            Err(err) if self.is_not_found(&err) => {
                tracing::warn!(kind = self.api.kind(), id = %id, "not found, removing from state");
                binding.clear();
                Ok(None)
            }
            Err(err) => Err(CloudError::Api(err)),
        }
    }

    async fn update(
        &self,
        observed: &Self::Observed,
        desired: &Self::Desired,
        binding: &mut RemoteObjectRef,
    ) -> Result<Option<Self::Observed>> {
        let id = binding.require_id()?.to_owned();
        if observed.name != desired.name {
            return Err(CloudError::RequiresReplacement("name".to_string()));
        }

        let diff = diff_members(&observed.members, &desired.members);
        if diff.is_empty() {
            tracing::debug!(kind = self.api.kind(), id = %id, "members already up to date");
        } else {
            binding.set_status(ResourceStatus::Updating);
            let applied = match self.apply_changes(&id, &diff).await {
                Ok(applied) => applied,
                Err(err) => {
                    // Some batches may have landed; the next read tells which.
                    binding.set_status(ResourceStatus::Present);
                    tracing::warn!(
                        kind = self.api.kind(),
                        id = %id,
                        error = %err,
                        transient = err.is_transient(),
                        "member update failed"
                    );
                    return Err(err);
                }
            };
            match applied {
                Some(summary) => {
                    tracing::info!(kind = self.api.kind(), id = %id, %summary, "updated members");
                    binding.set_status(ResourceStatus::Present);
                }
                None => {
                    tracing::warn!(kind = self.api.kind(), id = %id, "disappeared during update");
                    binding.clear();
                    return Ok(None);
                }
            }
        }

        self.read(binding).await
    }

    async fn delete(&self, binding: &mut RemoteObjectRef) -> Result<()> {
        let Some(id) = binding.id().map(str::to_owned) else {
            return Ok(());
        };
        binding.set_status(ResourceStatus::Deleting);

        let current = match self.api.get(&id).await {
            Ok(current) => current,
            Err(err) if self.is_not_found(&err) => {
                tracing::debug!(kind = self.api.kind(), id = %id, "already absent");
                binding.clear();
                return Ok(());
            }
            Err(err) => return Err(CloudError::Api(err)),
        };

        let diff = MemberDiff {
            to_insert: Vec::new(),
            to_delete: current.members.into_iter().collect(),
        };
        if !diff.is_empty() && self.apply_changes(&id, &diff).await?.is_none() {
            binding.clear();
            return Ok(());
        }

        let api = self.api.as_ref();
        let id_ref = id.as_str();
        let outcome = self
            .executor
            .execute(&self.scope, |token| async move {
                api.delete(&token, id_ref).await
            })
            .await?;
        if outcome.is_not_found() {
            tracing::debug!(kind = api.kind(), id = %id, "already absent");
        } else {
            tracing::info!(kind = api.kind(), id = %id, "deleted");
        }

        binding.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::MemberChange;
    use crate::classify::CodeClassifier;
    use crate::error::RetryError;
    use crate::retry::RetryConfig;
    use crate::token::TokenSource;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory collection service with single-use tokens
    #[derive(Default)]
    struct FakeSets {
        version: Mutex<u64>,
        next_id: Mutex<u64>,
        sets: Mutex<HashMap<String, MemberSet<String>>>,
        updates: Mutex<Vec<Vec<MemberChange<String>>>>,
        /// Reject the update call made once this many have been accepted
        fail_update_at: Mutex<Option<usize>>,
    }

    impl FakeSets {
        fn consume(&self, token: &ChangeToken) -> std::result::Result<(), ApiError> {
            let mut version = self.version.lock().unwrap();
            if token.as_str() != version.to_string() {
                return Err(ApiError::new("Stale", "token already used"));
            }
            *version += 1;
            Ok(())
        }

        fn missing(id: &str) -> ApiError {
            ApiError::new("Missing", format!("no set {id}"))
        }
    }

    #[async_trait]
    impl TokenSource for FakeSets {
        async fn fetch(&self, _scope: &Scope) -> std::result::Result<ChangeToken, ApiError> {
            Ok(ChangeToken::new(self.version.lock().unwrap().to_string()))
        }
    }

    #[async_trait]
    impl MemberSetApi for FakeSets {
        type Member = String;

        fn kind(&self) -> &str {
            "fake_set"
        }

        async fn create(
            &self,
            token: &ChangeToken,
            desired: &MemberSet<String>,
        ) -> std::result::Result<String, ApiError> {
            self.consume(token)?;
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            let id = format!("set-{next}");
            self.sets
                .lock()
                .unwrap()
                .insert(id.clone(), MemberSet::empty(desired.name.clone()));
            Ok(id)
        }

        async fn get(&self, id: &str) -> std::result::Result<MemberSet<String>, ApiError> {
            self.sets
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or_else(|| Self::missing(id))
        }

        async fn update(
            &self,
            token: &ChangeToken,
            id: &str,
            changes: &[MemberChange<String>],
        ) -> std::result::Result<(), ApiError> {
            let mut sets = self.sets.lock().unwrap();
            let set = sets.get_mut(id).ok_or_else(|| Self::missing(id))?;
            if *self.fail_update_at.lock().unwrap() == Some(self.updates.lock().unwrap().len()) {
                return Err(ApiError::new("Denied", "update rejected"));
            }
            self.consume(token)?;
            for change in changes {
                match change.action {
                    ChangeAction::Insert => set.members.insert(change.member.clone()),
                    ChangeAction::Delete => set.members.remove(&change.member),
                };
            }
            self.updates.lock().unwrap().push(changes.to_vec());
            Ok(())
        }

        async fn delete(&self, token: &ChangeToken, id: &str) -> std::result::Result<(), ApiError> {
            let mut sets = self.sets.lock().unwrap();
            if !sets.contains_key(id) {
                return Err(Self::missing(id));
            }
            self.consume(token)?;
            sets.remove(id);
            Ok(())
        }
    }

    fn resource(fake: Arc<FakeSets>) -> MemberSetResource<FakeSets> {
        let classifier = CodeClassifier::new()
            .stale(["Stale"])
            .not_found(["Missing"]);
        let executor = RetryExecutor::new(fake.clone(), classifier).with_config(RetryConfig {
            max_attempts: 5,
            jitter: false,
            ..RetryConfig::default()
        });
        MemberSetResource::new(fake, executor, Scope::global())
    }

    fn set(members: &[&str]) -> MemberSet<String> {
        MemberSet::new("blocklist", members.iter().map(|m| m.to_string()))
    }

    #[tokio::test]
    async fn test_create_pushes_members_and_reads_back() {
        let fake = Arc::new(FakeSets::default());
        let res = resource(fake.clone());
        let mut binding = RemoteObjectRef::new();

        let observed = res.create(&set(&["a", "b"]), &mut binding).await.unwrap();

        assert_eq!(observed, Some(set(&["a", "b"])));
        assert_eq!(binding.id(), Some("set-1"));
        assert_eq!(binding.status(), ResourceStatus::Present);
        // create + one insert batch
        assert_eq!(*fake.version.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_update_submits_insert_then_delete_batches() {
        let fake = Arc::new(FakeSets::default());
        let res = resource(fake.clone());
        let mut binding = RemoteObjectRef::new();
        let observed = res
            .create(&set(&["A", "C"]), &mut binding)
            .await
            .unwrap()
            .unwrap();
        fake.updates.lock().unwrap().clear();

        let updated = res
            .update(&observed, &set(&["A", "B"]), &mut binding)
            .await
            .unwrap();

        assert_eq!(updated, Some(set(&["A", "B"])));
        assert_eq!(
            *fake.updates.lock().unwrap(),
            vec![
                vec![MemberChange::insert("B".to_string())],
                vec![MemberChange::delete("C".to_string())],
            ]
        );
    }

    #[tokio::test]
    async fn test_update_splits_large_batches() {
        let fake = Arc::new(FakeSets::default());
        let res = resource(fake.clone()).with_batch_size(2);
        let mut binding = RemoteObjectRef::new();

        res.create(&set(&["1", "2", "3", "4", "5"]), &mut binding)
            .await
            .unwrap();

        let sizes: Vec<usize> = fake.updates.lock().unwrap().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_rename_requires_replacement() {
        let fake = Arc::new(FakeSets::default());
        let res = resource(fake);
        let mut binding = RemoteObjectRef::new();
        let observed = res.create(&set(&[]), &mut binding).await.unwrap().unwrap();

        let renamed = MemberSet::new("other", Vec::<String>::new());
        let err = res.update(&observed, &renamed, &mut binding).await.unwrap_err();
        assert!(matches!(err, CloudError::RequiresReplacement(_)));
    }

    #[tokio::test]
    async fn test_read_missing_clears_binding() {
        let fake = Arc::new(FakeSets::default());
        let res = resource(fake);
        let mut binding = RemoteObjectRef::bound("set-404");

        assert_eq!(res.read(&mut binding).await.unwrap(), None);
        assert!(!binding.is_bound());
        assert_eq!(binding.status(), ResourceStatus::Absent);
    }

    #[tokio::test]
    async fn test_read_after_delete_is_not_found() {
        let fake = Arc::new(FakeSets::default());
        let res = resource(fake.clone());
        let mut binding = RemoteObjectRef::new();
        res.create(&set(&["x", "y"]), &mut binding).await.unwrap();
        let id = binding.id().unwrap().to_string();
        let mut stale_binding = binding.clone();

        res.delete(&mut binding).await.unwrap();
        assert!(!binding.is_bound());

        // members removed in one batch before the set itself
        let last_update = fake.updates.lock().unwrap().last().cloned().unwrap();
        assert_eq!(
            last_update,
            vec![
                MemberChange::delete("x".to_string()),
                MemberChange::delete("y".to_string()),
            ]
        );

        assert_eq!(stale_binding.id(), Some(id.as_str()));
        assert_eq!(res.read(&mut stale_binding).await.unwrap(), None);
        assert!(!stale_binding.is_bound());
    }

    #[tokio::test]
    async fn test_delete_of_missing_object_succeeds() {
        let fake = Arc::new(FakeSets::default());
        let res = resource(fake);
        let mut binding = RemoteObjectRef::bound("set-gone");

        res.delete(&mut binding).await.unwrap();
        assert!(!binding.is_bound());
    }

    #[tokio::test]
    async fn test_update_without_binding_fails() {
        let fake = Arc::new(FakeSets::default());
        let res = resource(fake);
        let mut binding = RemoteObjectRef::new();

        let err = res
            .update(&set(&[]), &set(&["a"]), &mut binding)
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::NotBound));
    }

    #[tokio::test]
    async fn test_failed_member_pass_keeps_created_binding() {
        let fake = Arc::new(FakeSets::default());
        *fake.fail_update_at.lock().unwrap() = Some(0);
        let res = resource(fake.clone());
        let mut binding = RemoteObjectRef::new();

        let err = res.create(&set(&["a"]), &mut binding).await.unwrap_err();

        assert!(matches!(err, CloudError::Retry(RetryError::Fatal { .. })));
        assert_eq!(binding.id(), Some("set-1"));
        assert_eq!(binding.status(), ResourceStatus::Creating);
        assert!(fake.sets.lock().unwrap().contains_key("set-1"));
    }

    #[tokio::test]
    async fn test_update_failing_between_batches_returns_to_present() {
        let fake = Arc::new(FakeSets::default());
        let res = resource(fake.clone()).with_batch_size(1);
        let mut binding = RemoteObjectRef::new();
        let observed = res
            .create(&set(&["A", "C"]), &mut binding)
            .await
            .unwrap()
            .unwrap();
        // insert(B) lands, insert(D) is rejected, delete(C) never runs
        *fake.fail_update_at.lock().unwrap() = Some(3);

        let err = res
            .update(&observed, &set(&["A", "B", "D"]), &mut binding)
            .await
            .unwrap_err();

        assert!(matches!(err, CloudError::Retry(RetryError::Fatal { .. })));
        assert_eq!(binding.id(), Some("set-1"));
        assert_eq!(binding.status(), ResourceStatus::Present);
        assert_eq!(
            res.read(&mut binding).await.unwrap(),
            Some(set(&["A", "B", "C"]))
        );
    }
}
