//! Parent entities that own parameter collections, and resolution of the
//! parent named in a nested URL such as `/api/hosts/:parent_id/parameters`.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use axum::async_trait;
use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::db::{ParameterStore, SaveError};
use crate::error::ApiError;
use crate::types::{Parameter, ParameterAttrs, ParameterKind, ParentKind, ParentRecord};
use crate::AppState;

/// One parent's parameters: the rows of a given storage type owned by a
/// given parent id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterCollection {
    kind: ParameterKind,
    owner_id: i64,
}

impl ParameterCollection {
    pub fn new(kind: ParameterKind, owner_id: i64) -> Self {
        Self { kind, owner_id }
    }

    pub fn count(&self, store: &ParameterStore) -> Result<u64> {
        store.count_parameters(self.kind, self.owner_id)
    }

    pub fn page(&self, store: &ParameterStore, limit: u32, offset: u64) -> Result<Vec<Parameter>> {
        store.list_parameters(self.kind, self.owner_id, limit, offset)
    }

    /// Find a member by id or by name.
    ///
    /// The identifier is tried as a numeric id first, but only when its
    /// leading integer is strictly positive. Anything else, or a numeric miss,
    /// falls back to an exact name match.
    pub fn find(&self, store: &ParameterStore, identifier: &str) -> Result<Option<Parameter>> {
        if let Some(id) = positive_id(identifier) {
            if let Some(found) = store.find_parameter_by_id(self.kind, self.owner_id, id)? {
                return Ok(Some(found));
            }
        }
        store.find_parameter_by_name(self.kind, self.owner_id, identifier)
    }

    pub fn create(&self, store: &ParameterStore, attrs: &ParameterAttrs) -> Result<Parameter, SaveError> {
        store.create_parameter(self.kind, self.owner_id, attrs)
    }

    pub fn update(
        &self,
        store: &ParameterStore,
        id: i64,
        attrs: &ParameterAttrs,
    ) -> Result<Parameter, SaveError> {
        store.update_parameter(self.kind, self.owner_id, id, attrs)
    }

    pub fn destroy(&self, store: &ParameterStore, id: i64) -> Result<bool> {
        store.delete_parameter(self.kind, self.owner_id, id)
    }

    pub fn destroy_all(&self, store: &ParameterStore) -> Result<Vec<Parameter>> {
        store.delete_all_parameters(self.kind, self.owner_id)
    }
}

/// Anything that owns a parameter collection.
pub trait HasParameters: fmt::Debug + Send + Sync {
    fn parent_kind(&self) -> ParentKind;

    fn record(&self) -> &ParentRecord;

    fn collection(&self) -> ParameterCollection;
}

#[derive(Debug, Clone)]
pub struct Host(pub ParentRecord);

#[derive(Debug, Clone)]
pub struct Hostgroup(pub ParentRecord);

#[derive(Debug, Clone)]
pub struct Domain(pub ParentRecord);

#[derive(Debug, Clone)]
pub struct Operatingsystem(pub ParentRecord);

impl Hostgroup {
    /// Hostgroups keep their own parameters in the group-parameters
    /// collection rather than the generic one.
    pub fn group_parameters(&self) -> ParameterCollection {
        ParameterCollection::new(ParameterKind::Group, self.0.id)
    }
}

impl HasParameters for Host {
    fn parent_kind(&self) -> ParentKind {
        ParentKind::Host
    }

    fn record(&self) -> &ParentRecord {
        &self.0
    }

    fn collection(&self) -> ParameterCollection {
        ParameterCollection::new(ParameterKind::Host, self.0.id)
    }
}

impl HasParameters for Hostgroup {
    fn parent_kind(&self) -> ParentKind {
        ParentKind::Hostgroup
    }

    fn record(&self) -> &ParentRecord {
        &self.0
    }

    fn collection(&self) -> ParameterCollection {
        self.group_parameters()
    }
}

impl HasParameters for Domain {
    fn parent_kind(&self) -> ParentKind {
        ParentKind::Domain
    }

    fn record(&self) -> &ParentRecord {
        &self.0
    }

    fn collection(&self) -> ParameterCollection {
        ParameterCollection::new(ParameterKind::Domain, self.0.id)
    }
}

impl HasParameters for Operatingsystem {
    fn parent_kind(&self) -> ParentKind {
        ParentKind::Operatingsystem
    }

    fn record(&self) -> &ParentRecord {
        &self.0
    }

    fn collection(&self) -> ParameterCollection {
        ParameterCollection::new(ParameterKind::Os, self.0.id)
    }
}

/// Wrap a loaded row in the adapter for its kind.
pub fn adapter_for(kind: ParentKind, record: ParentRecord) -> Arc<dyn HasParameters> {
    match kind {
        ParentKind::Host => Arc::new(Host(record)),
        ParentKind::Hostgroup => Arc::new(Hostgroup(record)),
        ParentKind::Domain => Arc::new(Domain(record)),
        ParentKind::Operatingsystem => Arc::new(Operatingsystem(record)),
    }
}

/// Load the parent named by `parent_id`, trying a positive numeric id first
/// and then the parent's name.
pub fn resolve_parent(
    store: &ParameterStore,
    kind: ParentKind,
    parent_id: &str,
) -> Result<Option<Arc<dyn HasParameters>>> {
    let mut record = None;
    if let Some(id) = positive_id(parent_id) {
        record = store.find_parent_by_id(kind, id)?;
    }
    if record.is_none() {
        record = store.find_parent_by_name(kind, parent_id)?;
    }
    Ok(record.map(|r| adapter_for(kind, r)))
}

/// Leading integer of `s` when it is strictly positive.
///
/// Reads optional leading whitespace, an optional sign and then digits,
/// stopping at the first other character, so `"12-web"` yields 12 while
/// `"0"`, `"-3"` and `"web"` yield nothing.
pub fn positive_id(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let mut n: i64 = 0;
    let mut seen = false;
    for b in digits.bytes() {
        if !b.is_ascii_digit() {
            break;
        }
        seen = true;
        // Out-of-range ids cannot match any row
        n = n.checked_mul(10)?.checked_add(i64::from(b - b'0'))?;
    }

    if !seen || negative || n == 0 {
        return None;
    }
    Some(n)
}

#[derive(Debug, Deserialize)]
struct NestedPath {
    parent_type: String,
    parent_id: String,
}

/// The parent resolved from the request path, available to every handler
/// before its body runs.
#[derive(Debug, Clone)]
pub struct Nested(pub Arc<dyn HasParameters>);

impl Nested {
    pub fn collection(&self) -> ParameterCollection {
        self.0.collection()
    }

    /// Short description for log lines, e.g. `host 'web01' (id=3)`.
    pub fn describe(&self) -> String {
        let record = self.0.record();
        format!("{} '{}' (id={})", self.0.parent_kind(), record.name, record.id)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Nested {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Path(path) = Path::<NestedPath>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;

        let Some(kind) = ParentKind::from_path_segment(&path.parent_type) else {
            return Err(ApiError::NotFound(format!(
                "Unknown nested resource '{}'",
                path.parent_type
            )));
        };

        match resolve_parent(&state.store, kind, &path.parent_id)? {
            Some(parent) => {
                debug!("Resolved nested {}", kind);
                Ok(Nested(parent))
            }
            None => {
                warn!("No {} matches '{}'", kind, path.parent_id);
                Err(ApiError::NotFound(format!(
                    "Resource {} not found by id '{}'",
                    kind, path.parent_id
                )))
            }
        }
    }
}
