//! Physical key layout.
//!
//! Every structure the cache owns lives under one namespace prefix:
//!
//! ```text
//! {ns}:__CT__{t1,t2,...}      hash  composite location, one field per entry key
//! {ns}:__nonAutoInvalidate__  hash  tag-only partition
//! {ns}:__tagsMap__            hash  tag -> "{location}\x1f{entry key}"
//! {ns}:__CTS__{table}         set   composite locations depending on `table`
//! ```

use std::collections::BTreeSet;
use std::fmt;

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "ctec";

const COMPOSITE_PREFIX: &str = "__CT__";
const TABLE_SET_PREFIX: &str = "__CTS__";
const TAGS_MAP: &str = "__tagsMap__";
const TAG_ONLY_PARTITION: &str = "__nonAutoInvalidate__";

/// Separates the location from the entry key inside a TagIndex pointer.
pub(crate) const POINTER_SEPARATOR: char = '\u{1f}';

/// Key prefix scoping one logical cache instance inside a shared store.
///
/// The name is encoded before it becomes a key prefix: `%` and `:` are
/// percent-escaped, so the first `:` of a physical key always ends the namespace and
/// no namespace prefix is a prefix of another namespace's keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    name: String,
    encoded: String,
}

impl Namespace {
    /// Create a namespace from its name. An empty name selects the default scope.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.is_empty() {
            return Self::default();
        }
        let encoded = encode_name(&name);
        Self { name, encoded }
    }

    /// Namespace name as configured.
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Prefix shared by every physical key of this namespace.
    pub fn prefix(&self) -> String {
        format!("{}:", self.encoded)
    }

    fn physical(&self, suffix: &str) -> String {
        format!("{}:{}", self.encoded, suffix)
    }

    /// Composite location for a dependency set.
    pub fn composite_key(&self, dependencies: &DependencySet) -> CompositeKey {
        CompositeKey(self.physical(&format!("{COMPOSITE_PREFIX}{}", dependencies.joined())))
    }

    /// TableIndex set listing the composite locations that depend on `table`.
    pub fn table_set_key(&self, table: &str) -> String {
        self.physical(&format!("{TABLE_SET_PREFIX}{table}"))
    }

    /// The TagIndex hash.
    pub fn tags_map_key(&self) -> String {
        self.physical(TAGS_MAP)
    }

    /// The tag-only partition hash.
    pub fn tag_only_key(&self) -> String {
        self.physical(TAG_ONLY_PARTITION)
    }

    /// `SCAN MATCH` pattern covering the whole namespace.
    ///
    /// Glob metacharacters in the namespace name are escaped so that a namespace
    /// like `run[1]` only matches its own keys.
    pub fn scan_pattern(&self) -> String {
        let mut pattern = String::with_capacity(self.encoded.len() + 2);
        for c in self.encoded.chars() {
            if matches!(c, '*' | '?' | '[' | ']' | '\\') {
                pattern.push('\\');
            }
            pattern.push(c);
        }
        pattern.push_str(":*");
        pattern
    }
}

fn encode_name(name: &str) -> String {
    let mut encoded = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '%' => encoded.push_str("%25"),
            ':' => encoded.push_str("%3A"),
            c => encoded.push(c),
        }
    }
    encoded
}

impl Default for Namespace {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAMESPACE.to_string(),
            encoded: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Set of table names a cached value depends on.
///
/// Backed by an ordered set, so iteration is sorted and duplicates collapse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DependencySet(BTreeSet<String>);

impl DependencySet {
    /// Empty set: the entry is tag-only.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: impl Into<String>) -> bool {
        self.0.insert(table.into())
    }

    pub fn contains(&self, table: &str) -> bool {
        self.0.contains(table)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Table names in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    fn joined(&self) -> String {
        self.0.iter().map(String::as_str).collect::<Vec<_>>().join(",")
    }
}

impl<S: Into<String>> FromIterator<S> for DependencySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Namespaced storage location shared by all entries with the same dependency set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeKey(String);

impl CompositeKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a tagged entry lives: the location hash and the field inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TagPointer {
    pub location: String,
    pub key: String,
}

impl TagPointer {
    pub fn new(location: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            key: key.into(),
        }
    }

    pub fn encode(&self) -> String {
        format!("{}{POINTER_SEPARATOR}{}", self.location, self.key)
    }

    pub fn decode(raw: &str) -> Option<Self> {
        let (location, key) = raw.split_once(POINTER_SEPARATOR)?;
        Some(Self::new(location, key))
    }
}
