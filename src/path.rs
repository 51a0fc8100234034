//! Dot-path addressing.
//!
//! Path strings stay the interface contract ("list.0.name"), but they are
//! parsed into segment lists on entry so the dispatch hot path never rescans
//! strings. Schema paths spell list rows as the literal segment `items`;
//! render paths spell them as numeric indices; the two are mutually derivable
//! by positional substitution.

use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// The schema-path segment that stands for "one list row".
pub const ITEMS: &str = "items";

/// One path segment. A segment that parses as an unsigned integer is an
/// array index.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(Arc<str>),
    Index(usize),
}

impl Segment {
    pub fn parse(raw: &str) -> Self {
        match raw.parse::<usize>() {
            Ok(i) => Segment::Index(i),
            Err(_) => Segment::Key(Arc::from(raw)),
        }
    }

    pub fn key(name: impl Into<Arc<str>>) -> Self {
        Segment::Key(name.into())
    }

    pub fn as_index(&self) -> Option<usize> {
        match self {
            Segment::Index(i) => Some(*i),
            Segment::Key(_) => None,
        }
    }

    pub fn is_items(&self) -> bool {
        matches!(self, Segment::Key(k) if k.as_ref() == ITEMS)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(k) => write!(f, "{k}"),
            Segment::Index(i) => write!(f, "{i}"),
        }
    }
}

/// A concrete path into the model or render tree. The empty path is the root.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct Path {
    segs: SmallVec<[Segment; 8]>,
}

impl Path {
    pub fn root() -> Self {
        Path::default()
    }

    /// Parse a dot-separated path. Empty input is the root; empty segments
    /// (from stray dots) are dropped.
    pub fn parse(raw: &str) -> Self {
        Path {
            segs: raw
                .split('.')
                .filter(|part| !part.is_empty())
                .map(Segment::parse)
                .collect(),
        }
    }

    pub fn from_segments(segs: impl IntoIterator<Item = Segment>) -> Self {
        Path {
            segs: segs.into_iter().collect(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.segs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segs.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segs
    }

    pub fn last(&self) -> Option<&Segment> {
        self.segs.last()
    }

    pub fn child(&self, seg: Segment) -> Path {
        let mut segs = self.segs.clone();
        segs.push(seg);
        Path { segs }
    }

    pub fn key(&self, name: impl Into<Arc<str>>) -> Path {
        self.child(Segment::Key(name.into()))
    }

    pub fn index(&self, i: usize) -> Path {
        self.child(Segment::Index(i))
    }

    pub fn parent(&self) -> Path {
        let mut segs = self.segs.clone();
        segs.pop();
        Path { segs }
    }

    pub fn join(&self, tail: &[Segment]) -> Path {
        let mut segs = self.segs.clone();
        segs.extend(tail.iter().cloned());
        Path { segs }
    }

    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.segs.len() >= prefix.segs.len() && self.segs[..prefix.segs.len()] == prefix.segs[..]
    }

    /// Row indices appearing in this path, left to right.
    pub fn indices(&self) -> SmallVec<[usize; 4]> {
        self.segs.iter().filter_map(Segment::as_index).collect()
    }

    /// Position of the last numeric segment, i.e. the nearest enclosing list
    /// row when walking backward from the leaf.
    pub fn last_index_pos(&self) -> Option<usize> {
        self.segs.iter().rposition(|s| matches!(s, Segment::Index(_)))
    }

    /// Split at the nearest enclosing row: `(row prefix incl. the index, row
    /// index, trailing segments)`. `None` when the path holds no index.
    pub fn split_at_row(&self) -> Option<(Path, usize, &[Segment])> {
        let pos = self.last_index_pos()?;
        let row = match &self.segs[pos] {
            Segment::Index(i) => *i,
            Segment::Key(_) => unreachable!(),
        };
        let prefix = Path {
            segs: self.segs[..=pos].iter().cloned().collect(),
        };
        Some((prefix, row, &self.segs[pos + 1..]))
    }

    /// Derive the schema path: every numeric segment becomes the literal
    /// `items` segment.
    pub fn to_schema_path(&self) -> Path {
        Path {
            segs: self
                .segs
                .iter()
                .map(|seg| match seg {
                    Segment::Index(_) => Segment::key(ITEMS),
                    Segment::Key(k) => Segment::Key(k.clone()),
                })
                .collect(),
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segs.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

impl From<&str> for Path {
    fn from(raw: &str) -> Self {
        Path::parse(raw)
    }
}

/// One compiled pattern segment. `Star` matches any numeric index and
/// captures it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PatternSegment {
    Key(Arc<str>),
    Index(usize),
    Star,
}

impl fmt::Display for PatternSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternSegment::Key(k) => write!(f, "{k}"),
            PatternSegment::Index(i) => write!(f, "{i}"),
            PatternSegment::Star => write!(f, "*"),
        }
    }
}

/// A wildcard path pattern, compiled once at subscription-index build time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pattern {
    segs: Vec<PatternSegment>,
}

impl Pattern {
    pub fn parse(raw: &str) -> Self {
        Pattern {
            segs: raw
                .split('.')
                .filter(|part| !part.is_empty())
                .map(|part| {
                    if part == "*" {
                        PatternSegment::Star
                    } else {
                        match part.parse::<usize>() {
                            Ok(i) => PatternSegment::Index(i),
                            Err(_) => PatternSegment::Key(Arc::from(part)),
                        }
                    }
                })
                .collect(),
        }
    }

    pub fn segments(&self) -> &[PatternSegment] {
        &self.segs
    }

    pub fn has_star(&self) -> bool {
        self.segs.iter().any(|s| matches!(s, PatternSegment::Star))
    }

    /// Match a concrete path, returning the captured star indices in order.
    pub fn matches(&self, path: &Path) -> Option<SmallVec<[usize; 4]>> {
        if self.segs.len() != path.segments().len() {
            return None;
        }
        let mut stars = SmallVec::new();
        for (pat, seg) in self.segs.iter().zip(path.segments()) {
            match (pat, seg) {
                (PatternSegment::Star, Segment::Index(i)) => stars.push(*i),
                (PatternSegment::Star, Segment::Key(_)) => return None,
                (PatternSegment::Index(a), Segment::Index(b)) if a == b => {}
                (PatternSegment::Key(a), Segment::Key(b)) if a == b => {}
                _ => return None,
            }
        }
        Some(stars)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segs.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

/// A classified subscription target. Classification happens exactly once,
/// when the subscription index is built.
#[derive(Clone, Debug)]
pub enum Target {
    /// Absolute path, matched exactly.
    Exact(Path),
    /// Path with `*` segments, matched structurally.
    Wildcard(Pattern),
    /// `.`-prefixed suffix, resolved against the subscriber's enclosing row.
    Relative(Vec<Segment>),
}

impl Target {
    pub fn parse(raw: &str) -> Self {
        if let Some(suffix) = raw.strip_prefix('.') {
            Target::Relative(
                suffix
                    .split('.')
                    .filter(|part| !part.is_empty())
                    .map(Segment::parse)
                    .collect(),
            )
        } else if raw.split('.').any(|part| part == "*") {
            Target::Wildcard(Pattern::parse(raw))
        } else {
            Target::Exact(Path::parse(raw))
        }
    }
}

/// Expand a comma-separated target string into its individual targets.
pub fn split_targets(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|part| !part.is_empty())
}
