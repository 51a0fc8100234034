//! Subscription index: classify once, resolve per change.
//!
//! Each declaration lands in exactly one bucket — exact path, compiled
//! wildcard pattern, or relative suffix — so resolving a trigger is a hash
//! lookup plus two linear scans over the pattern/relative declarations.

use crate::path::{Path, Pattern, Segment, Target};
use crate::schema::SubscribeDecl;
use crate::store::DataStore;
use crate::value::Value;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::sync::Arc;

/// One resolved handler invocation.
#[derive(Clone, Debug)]
pub struct ResolvedMatch {
    pub decl: Arc<SubscribeDecl>,
    /// The subscriber's render path after row-index substitution.
    pub subscriber_path: Path,
    /// Captured wildcard indices, when the match came from a pattern.
    pub stars: SmallVec<[usize; 4]>,
}

struct RelativeEntry {
    suffix: Vec<Segment>,
    /// Schema path of the declaring node.
    owner: Path,
    decl: Arc<SubscribeDecl>,
}

pub struct SubscriptionIndex {
    exact: FxHashMap<Path, Vec<Arc<SubscribeDecl>>>,
    wildcard: Vec<(Pattern, Arc<SubscribeDecl>)>,
    relative: Vec<RelativeEntry>,
}

impl SubscriptionIndex {
    pub fn build(decls: &[Arc<SubscribeDecl>]) -> Self {
        let mut exact: FxHashMap<Path, Vec<Arc<SubscribeDecl>>> = FxHashMap::default();
        let mut wildcard = Vec::new();
        let mut relative = Vec::new();
        for decl in decls {
            match &decl.target {
                Target::Exact(path) => {
                    exact.entry(path.clone()).or_default().push(decl.clone());
                }
                Target::Wildcard(pattern) => wildcard.push((pattern.clone(), decl.clone())),
                Target::Relative(suffix) => relative.push(RelativeEntry {
                    suffix: suffix.clone(),
                    owner: decl.subscriber_path.clone(),
                    decl: decl.clone(),
                }),
            }
        }
        SubscriptionIndex {
            exact,
            wildcard,
            relative,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.wildcard.is_empty() && self.relative.is_empty()
    }

    /// Resolve every declaration matching a change at `trigger`.
    pub fn resolve(&self, trigger: &Path, store: &DataStore) -> Vec<ResolvedMatch> {
        let mut out = Vec::new();
        let indices = trigger.indices();

        if let Some(decls) = self.exact.get(trigger) {
            for decl in decls {
                for subscriber_path in instantiate(&decl.subscriber_path, &indices, store) {
                    out.push(ResolvedMatch {
                        decl: decl.clone(),
                        subscriber_path,
                        stars: SmallVec::new(),
                    });
                }
            }
        }

        for (pattern, decl) in &self.wildcard {
            if let Some(stars) = pattern.matches(trigger) {
                for subscriber_path in instantiate(&decl.subscriber_path, &indices, store) {
                    out.push(ResolvedMatch {
                        decl: decl.clone(),
                        subscriber_path,
                        stars: stars.clone(),
                    });
                }
            }
        }

        if let Some((row_prefix, _, trailing)) = trigger.split_at_row() {
            for entry in &self.relative {
                if trailing != entry.suffix.as_slice() {
                    continue;
                }
                // The declaring node, instantiated with the trigger's row
                // indices, must live inside the same row.
                for subscriber_path in instantiate(&entry.owner, &indices, store) {
                    if subscriber_path.starts_with(&row_prefix) {
                        out.push(ResolvedMatch {
                            decl: entry.decl.clone(),
                            subscriber_path,
                            stars: SmallVec::new(),
                        });
                    }
                }
            }
        }

        out
    }
}

/// Substitute trigger row indices into a schema path's `items` slots, left
/// to right. When the path holds more `items` slots than the trigger
/// supplied indices, the remainder fans out across every current row — a
/// global trigger reaches each row instance independently.
pub(crate) fn instantiate(schema_path: &Path, indices: &[usize], store: &DataStore) -> Vec<Path> {
    let mut acc = vec![Path::root()];
    let mut consumed = 0usize;
    for seg in schema_path.segments() {
        if seg.is_items() {
            if consumed < indices.len() {
                let row = indices[consumed];
                consumed += 1;
                for path in &mut acc {
                    *path = path.index(row);
                }
            } else {
                let mut fanned = Vec::new();
                for path in &acc {
                    let len = store
                        .get(path)
                        .and_then(Value::as_list)
                        .map(Vec::len)
                        .unwrap_or(0);
                    for row in 0..len {
                        fanned.push(path.index(row));
                    }
                }
                acc = fanned;
                if acc.is_empty() {
                    return acc;
                }
            }
        } else {
            for path in &mut acc {
                *path = path.child(seg.clone());
            }
        }
    }
    acc
}
