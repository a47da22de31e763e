//! Indirect object storage and reference resolution.
//!
//! The interpreter proper owns a full cross-reference table; this store is
//! the slice of that machinery the analysis and rendering engines consume:
//! shared ownership of numbered objects plus reference-chasing accessors with
//! "known get" semantics (absent keys and type mismatches in optional keys
//! are not errors).

use crate::error::{RenderError, Result};
use crate::model::objects::{Dict, Object};
use rustc_hash::FxHashMap;
use std::ops::Deref;
use std::sync::Arc;
use tracing::debug;

/// Longest tolerated Ref -> Ref chain before giving up.
const MAX_REF_CHAIN: usize = 32;

/// Store of indirect objects, keyed by object id.
///
/// Objects are held behind `Arc` so resolution hands out shared ownership
/// without copying; the pointer identity of a resolved object doubles as its
/// identity key for cycle detection.
#[derive(Debug, Default)]
pub struct ObjectStore {
    objects: FxHashMap<u32, Arc<Object>>,
}

/// Result of resolving an object: either a direct borrow (the object was not
/// a reference) or shared ownership of a stored object.
#[derive(Debug, Clone)]
pub enum Resolved<'a> {
    Borrowed(&'a Object),
    Shared(Arc<Object>),
}

impl Deref for Resolved<'_> {
    type Target = Object;

    fn deref(&self) -> &Object {
        match self {
            Resolved::Borrowed(o) => o,
            Resolved::Shared(a) => a,
        }
    }
}

impl Resolved<'_> {
    /// Stable address of the underlying object, used as the identity key by
    /// the loop detector. Borrowed objects live inside their parent for the
    /// duration of a walk; shared objects are pinned by the store.
    pub fn identity(&self) -> usize {
        match self {
            Resolved::Borrowed(o) => *o as *const Object as usize,
            Resolved::Shared(a) => Arc::as_ptr(a) as usize,
        }
    }

    /// Promote to shared ownership, cloning a borrowed object if needed.
    pub fn into_shared(self) -> Arc<Object> {
        match self {
            Resolved::Borrowed(o) => Arc::new(o.clone()),
            Resolved::Shared(a) => a,
        }
    }
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an indirect object under its id, replacing any previous one.
    pub fn insert(&mut self, objid: u32, obj: Object) {
        self.objects.insert(objid, Arc::new(obj));
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Resolve an object, following reference chains.
    ///
    /// A dangling reference is an `Undefined` error; a chain longer than
    /// `MAX_REF_CHAIN` (a reference cycle) is a `LimitCheck`.
    pub fn resolve<'a>(&'a self, obj: &'a Object) -> Result<Resolved<'a>> {
        let Object::Ref(r) = obj else {
            return Ok(Resolved::Borrowed(obj));
        };

        let mut objid = r.objid;
        for _ in 0..MAX_REF_CHAIN {
            let target = self
                .objects
                .get(&objid)
                .ok_or_else(|| RenderError::Undefined(format!("object {objid}")))?;
            match target.as_ref() {
                Object::Ref(next) => objid = next.objid,
                _ => return Ok(Resolved::Shared(Arc::clone(target))),
            }
        }
        Err(RenderError::LimitCheck(format!(
            "reference chain exceeds {MAX_REF_CHAIN} links"
        )))
    }

    /// Look up and resolve a dictionary entry. Absent keys and dangling
    /// references both come back as `None` (the latter with a debug log).
    pub fn known_get<'a>(&'a self, dict: &'a Dict, key: &str) -> Option<Resolved<'a>> {
        let obj = dict.get(key)?;
        match self.resolve(obj) {
            Ok(r) if r.is_null() => None,
            Ok(r) => Some(r),
            Err(e) => {
                debug!(key, error = %e, "unresolvable dictionary entry");
                None
            }
        }
    }

    /// `known_get` trying a primary key, then an inline-image abbreviation.
    pub fn known_get2<'a>(
        &'a self,
        dict: &'a Dict,
        key: &str,
        abbrev: &str,
    ) -> Option<Resolved<'a>> {
        self.known_get(dict, key)
            .or_else(|| self.known_get(dict, abbrev))
    }

    /// Optional name entry; type mismatches are swallowed.
    pub fn known_get_name(&self, dict: &Dict, key: &str) -> Option<String> {
        self.known_get(dict, key)
            .and_then(|o| o.as_name().ok().map(str::to_string))
    }

    /// Optional numeric entry; type mismatches are swallowed.
    pub fn known_get_number(&self, dict: &Dict, key: &str) -> Option<f64> {
        self.known_get(dict, key).and_then(|o| o.as_num().ok())
    }

    /// Optional integer entry; type mismatches are swallowed.
    pub fn known_get_int(&self, dict: &Dict, key: &str) -> Option<i64> {
        self.known_get(dict, key).and_then(|o| o.as_int().ok())
    }

    /// Optional boolean entry; type mismatches are swallowed.
    pub fn known_get_bool(&self, dict: &Dict, key: &str) -> Option<bool> {
        self.known_get(dict, key).and_then(|o| o.as_bool().ok())
    }

    /// Required integer entry, with an inline-image abbreviation fallback.
    /// Missing on both keys is an `Undefined` error; a wrong type propagates
    /// as a `TypeCheck`.
    pub fn get_required_int2(&self, dict: &Dict, key: &str, abbrev: &str) -> Result<i64> {
        match self.known_get2(dict, key, abbrev) {
            Some(o) => o.as_int(),
            None => Err(RenderError::Undefined(format!("required key {key}"))),
        }
    }
}
