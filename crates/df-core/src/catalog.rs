//! Component catalog.
//!
//! The catalog is loaded once from a versioned JSON data file and is
//! immutable afterwards. Three read-only indices are derived on load:
//!
//! | Index | Maps | Used by |
//! |-------|------|---------|
//! | canonical | canonical name -> entry | exact lookup |
//! | alias | alias spelling -> entry | alias lookup |
//! | keyword | lowercase word fragment -> entries | fuzzy suggestions |
//!
//! Lookups are plain reads, so a single `Arc<Catalog>` can be shared by any
//! number of concurrent callers without locking.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::corrections::CorrectionTable;

/// Embedded catalog data file.
const BUILTIN_CATALOG: &str = include_str!("../data/azure_nodes.json");

/// Highest catalog file version this loader understands.
const CATALOG_VERSION_MAX: u32 = 1;

/// Maximum number of suggestions returned for an unknown name.
pub const SUGGESTIONS_MAX: usize = 5;

/// Character-overlap similarity above which a canonical name is suggested.
const SIMILARITY_MIN: f64 = 0.6;

/// Suffixes stripped to produce extra keyword variants, in pairs where the
/// first (longer) form is tried before the second.
const STRIPPED_SUFFIXES: [(&str, &str); 2] = [("services", "service"), ("apps", "app")];

/// One known component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    /// The single authoritative spelling recognized by the renderer
    pub canonical_name: String,
    /// Module group the component must be imported from
    pub module_group: String,
    /// Alternate spellings that resolve to this entry
    pub aliases: Vec<String>,
}

/// A candidate replacement for an unknown component name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    /// Canonical name of the suggested component
    pub name: String,
    /// Module group of the suggested component
    pub module_group: String,
    /// Why this component was suggested
    pub reason: String,
}

/// Catalog load errors.
///
/// All of these are fatal at startup: nothing in the engine can run
/// without a catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read catalog file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unsupported catalog version {0}")]
    UnsupportedVersion(u32),

    #[error("Catalog contains no components")]
    Empty,

    #[error("Duplicate canonical name '{name}' in module groups '{first}' and '{second}'")]
    DuplicateCanonical {
        name: String,
        first: String,
        second: String,
    },

    #[error("Alias '{alias}' of '{canonical}' collides with a canonical name")]
    AliasShadowsCanonical { alias: String, canonical: String },

    #[error("Alias '{alias}' is claimed by both '{first}' and '{second}'")]
    DuplicateAlias {
        alias: String,
        first: String,
        second: String,
    },
}

/// On-disk catalog layout.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    version: u32,
    provider: String,
    namespace: String,
    modules: BTreeMap<String, Vec<RawEntry>>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    canonical: String,
    #[serde(default)]
    aliases: Vec<String>,
}

/// The component catalog with its derived lookup indices.
#[derive(Debug, Clone)]
pub struct Catalog {
    version: u32,
    provider: String,
    namespace: String,
    entries: Vec<CatalogEntry>,
    by_canonical: HashMap<String, usize>,
    by_alias: HashMap<String, usize>,
    keywords: HashMap<String, Vec<usize>>,
}

impl Catalog {
    /// Load the catalog embedded in this crate.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json(BUILTIN_CATALOG)
    }

    /// Load a catalog from a JSON data file.
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parse a catalog from JSON text and build its indices.
    pub fn from_json(content: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(content)?;
        if file.version > CATALOG_VERSION_MAX {
            return Err(CatalogError::UnsupportedVersion(file.version));
        }

        let mut entries = Vec::new();
        for (module_group, raw_entries) in file.modules {
            for raw in raw_entries {
                // Private classes are not part of the public surface.
                if raw.canonical.starts_with('_') || raw.canonical.is_empty() {
                    continue;
                }
                entries.push(CatalogEntry {
                    canonical_name: raw.canonical,
                    module_group: module_group.clone(),
                    aliases: raw.aliases,
                });
            }
        }

        let catalog = Self::from_entries(file.version, file.provider, file.namespace, entries)?;
        tracing::debug!(
            provider = %catalog.provider,
            version = catalog.version,
            components = catalog.len(),
            "catalog loaded"
        );
        Ok(catalog)
    }

    /// Build a catalog from already-parsed entries, enforcing uniqueness.
    pub fn from_entries(
        version: u32,
        provider: impl Into<String>,
        namespace: impl Into<String>,
        entries: Vec<CatalogEntry>,
    ) -> Result<Self, CatalogError> {
        if entries.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut by_canonical = HashMap::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            if let Some(&first) = by_canonical.get(&entry.canonical_name) {
                let first: &CatalogEntry = &entries[first];
                return Err(CatalogError::DuplicateCanonical {
                    name: entry.canonical_name.clone(),
                    first: first.module_group.clone(),
                    second: entry.module_group.clone(),
                });
            }
            by_canonical.insert(entry.canonical_name.clone(), index);
        }

        let mut by_alias: HashMap<String, usize> = HashMap::new();
        for (index, entry) in entries.iter().enumerate() {
            for alias in &entry.aliases {
                if alias == &entry.canonical_name {
                    continue;
                }
                if by_canonical.contains_key(alias) {
                    return Err(CatalogError::AliasShadowsCanonical {
                        alias: alias.clone(),
                        canonical: entry.canonical_name.clone(),
                    });
                }
                if let Some(&other) = by_alias.get(alias) {
                    return Err(CatalogError::DuplicateAlias {
                        alias: alias.clone(),
                        first: entries[other].canonical_name.clone(),
                        second: entry.canonical_name.clone(),
                    });
                }
                by_alias.insert(alias.clone(), index);
            }
        }

        let mut keywords: HashMap<String, Vec<usize>> = HashMap::new();
        for (index, entry) in entries.iter().enumerate() {
            for keyword in keyword_fragments(&entry.canonical_name) {
                keywords.entry(keyword).or_default().push(index);
            }
        }

        Ok(Self {
            version,
            provider: provider.into(),
            namespace: namespace.into(),
            entries,
            by_canonical,
            by_alias,
            keywords,
        })
    }

    /// Catalog data file version.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Provider name (e.g. "azure").
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Import namespace that module groups live under (e.g. "diagrams.azure").
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog has no components. Never true for a loaded catalog.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in load order.
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Module groups in load order, without duplicates.
    pub fn module_groups(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .map(|e| e.module_group.as_str())
            .filter(|group| seen.insert(*group))
            .collect()
    }

    /// Canonical names of the components in one module group.
    pub fn components_in(&self, module_group: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.module_group == module_group)
            .map(|e| e.canonical_name.as_str())
            .collect()
    }

    /// Full import path for an entry, e.g. `diagrams.azure.web`.
    pub fn import_path(&self, entry: &CatalogEntry) -> String {
        format!("{}.{}", self.namespace, entry.module_group)
    }

    /// Exact canonical lookup.
    pub fn lookup_canonical(&self, name: &str) -> Option<&CatalogEntry> {
        self.by_canonical.get(name).map(|&i| &self.entries[i])
    }

    /// Alias lookup. Canonical names are not aliases of themselves.
    pub fn lookup_alias(&self, name: &str) -> Option<&CatalogEntry> {
        self.by_alias.get(name).map(|&i| &self.entries[i])
    }

    /// Whether the name is known either as canonical or alias.
    pub fn is_known(&self, name: &str) -> bool {
        self.by_canonical.contains_key(name) || self.by_alias.contains_key(name)
    }

    /// Suggest up to [`SUGGESTIONS_MAX`] known components for an unknown name.
    ///
    /// Keyword matches come first, in fragment order, followed by
    /// character-overlap matches. Never fails; no match yields an empty list.
    pub fn suggest(&self, name: &str) -> Vec<Suggestion> {
        let mut suggestions: Vec<Suggestion> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();

        for fragment in keyword_fragments(name) {
            let Some(indices) = self.keywords.get(&fragment) else {
                continue;
            };
            for &index in indices {
                let entry = &self.entries[index];
                if seen.insert(entry.canonical_name.as_str()) {
                    suggestions.push(Suggestion {
                        name: entry.canonical_name.clone(),
                        module_group: entry.module_group.clone(),
                        reason: format!("matches keyword '{}'", fragment),
                    });
                }
            }
        }

        let name_lower = name.to_lowercase();
        for entry in &self.entries {
            if seen.contains(entry.canonical_name.as_str()) {
                continue;
            }
            let score = similarity(&name_lower, &entry.canonical_name.to_lowercase());
            if score > SIMILARITY_MIN {
                seen.insert(entry.canonical_name.as_str());
                suggestions.push(Suggestion {
                    name: entry.canonical_name.clone(),
                    module_group: entry.module_group.clone(),
                    reason: "similar name".to_string(),
                });
            }
        }

        suggestions.truncate(SUGGESTIONS_MAX);
        debug_assert!(suggestions.len() <= SUGGESTIONS_MAX);
        suggestions
    }

    /// Build the misspelling -> canonical table used by the auto-fixer.
    pub fn correction_table(&self) -> CorrectionTable {
        CorrectionTable::derive(self)
    }
}

/// Split a name into lowercase keyword fragments.
///
/// Produces the case-transition words (`SQLDatabases` -> `sql`, `databases`),
/// the whole lowercased name, and the name with a `services`/`service` or
/// `apps`/`app` suffix stripped. Order is stable and duplicates are removed.
pub fn keyword_fragments(name: &str) -> Vec<String> {
    let mut fragments: Vec<String> = split_words(name)
        .into_iter()
        .map(|w| w.to_lowercase())
        .collect();

    let lower = name.to_lowercase();
    if !lower.is_empty() {
        fragments.push(lower.clone());
    }

    for (long, short) in STRIPPED_SUFFIXES {
        let stripped = lower
            .strip_suffix(long)
            .or_else(|| lower.strip_suffix(short));
        if let Some(stripped) = stripped {
            if !stripped.is_empty() {
                fragments.push(stripped.to_string());
            }
        }
    }

    let mut seen = HashSet::new();
    fragments.retain(|f| seen.insert(f.clone()));
    fragments
}

/// Split an identifier on case transitions, digit boundaries and separators.
///
/// An uppercase run followed by a lowercase letter gives up its last letter
/// to the next word: `APIManagement` -> `API`, `Management`.
fn split_words(name: &str) -> Vec<String> {
    let chars: Vec<char> = name.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_ascii_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }

        if let Some(prev) = current.chars().last() {
            let next = chars.get(i + 1).copied();
            let boundary = (prev.is_ascii_lowercase() && c.is_ascii_uppercase())
                || (prev.is_ascii_digit() != c.is_ascii_digit())
                || (prev.is_ascii_uppercase()
                    && c.is_ascii_uppercase()
                    && next.is_some_and(|n| n.is_ascii_lowercase()));
            if boundary {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }

    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Cheap character-overlap similarity: characters of `a` found anywhere in
/// `b`, divided by the longer length.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.chars().filter(|c| b.contains(*c)).count();
    let longest = a.chars().count().max(b.chars().count());
    shared as f64 / longest as f64
}
