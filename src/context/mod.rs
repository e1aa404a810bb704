//! Per-context binding state.
//!
//! An [`ApplicationContext`] holds everything one load context accumulates:
//! the Trusted-Platform-Assembly (TPA) index, the probing-path list, and the
//! identity cache that enforces the at-most-once-load guarantee. Each
//! [`LoadContextBinder`](crate::binder::LoadContextBinder) owns exactly one
//! context; sibling contexts never share state, so slow binds in one context
//! cannot contend with another.
//!
//! # Concurrency
//!
//! The TPA index and probing paths are built at construction time and read-only
//! afterwards. The identity cache is the single mutable structure:
//! [`insert_if_absent`](ApplicationContext::insert_if_absent) is the
//! serialization point of the whole binding layer, and
//! [`find_cached`](ApplicationContext::find_cached) is a lock-free read that
//! never blocks on I/O. Probing and image loading always happen outside the
//! cache, on the caller's thread.
//!
//! # At-Most-Once Loading
//!
//! Cache entries are add-only until an explicit context teardown; nothing is
//! ever evicted individually. That makes the central invariant simple: all
//! successful binds of one simple name within one context observe the same
//! [`ResolvedAssembly`] instance, even when several threads race the initial
//! load.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam_skiplist::SkipMap;
use dashmap::{mapref::entry::Entry, DashMap};

use crate::{
    binder::ResolvedAssembly,
    identity::AssemblyName,
    probe::Location,
};

/// Platform list separator used by TPA manifests.
#[cfg(windows)]
const TPA_LIST_SEPARATOR: char = ';';
#[cfg(not(windows))]
const TPA_LIST_SEPARATOR: char = ':';

/// Outcome of an atomic check-and-insert against the identity cache.
#[derive(Clone)]
pub enum InsertOutcome {
    /// The caller's module won the insert and is now the cached entry.
    Inserted(Arc<ResolvedAssembly>),
    /// Another bind already cached an entry under this simple name; the
    /// caller's redundant module should be discarded in favour of this one.
    AlreadyPresent(Arc<ResolvedAssembly>),
}

impl InsertOutcome {
    /// The entry that ended up in the cache, whichever caller produced it.
    #[must_use]
    pub fn winner(self) -> Arc<ResolvedAssembly> {
        match self {
            InsertOutcome::Inserted(module) | InsertOutcome::AlreadyPresent(module) => module,
        }
    }
}

/// State owned by one load context: TPA index, probing paths and the identity
/// cache.
///
/// # Example
///
/// ```rust
/// use dotbind::context::ApplicationContext;
///
/// let context = ApplicationContext::new(false);
/// context.add_tpa_entry("System.Runtime", "/dotnet/shared/System.Runtime.dll");
///
/// let hit = context.probe_tpa("system.runtime").unwrap();
/// assert_eq!(hit.path, std::path::PathBuf::from("/dotnet/shared/System.Runtime.dll"));
/// ```
pub struct ApplicationContext {
    /// TPA index keyed by normalized simple name. First registration wins,
    /// matching the manifest's ordered-list semantics.
    tpa: SkipMap<String, PathBuf>,

    /// Directories probed for assemblies not on the TPA list.
    probing_paths: Vec<PathBuf>,

    /// Identity cache keyed by normalized simple name. Add-only until
    /// [`clear_cache`](Self::clear_cache).
    cache: DashMap<String, Arc<ResolvedAssembly>>,

    /// Whether simple-name comparison is case-sensitive.
    case_sensitive: bool,
}

impl ApplicationContext {
    /// Create an empty context with the given simple-name case rule.
    ///
    /// The runtime's default is case-insensitive matching; pass `true` only
    /// for hosts that guarantee canonical casing in requests and manifests.
    #[must_use]
    pub fn new(case_sensitive: bool) -> Self {
        Self {
            tpa: SkipMap::new(),
            probing_paths: Vec::new(),
            cache: DashMap::new(),
            case_sensitive,
        }
    }

    /// Replace the probing-path list.
    ///
    /// Called once during binder construction; paths are probed in order after
    /// the TPA index misses.
    #[must_use]
    pub fn with_probing_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.probing_paths = paths;
        self
    }

    /// Whether simple-name comparison is case-sensitive in this context.
    #[must_use]
    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// The cache-key form of a simple name under this context's case rule.
    #[must_use]
    pub fn normalize(&self, simple_name: &str) -> String {
        if self.case_sensitive {
            simple_name.to_string()
        } else {
            simple_name.to_lowercase()
        }
    }

    /// Register one TPA entry. The first registration of a simple name wins;
    /// later duplicates are ignored, matching the ordered manifest semantics.
    pub fn add_tpa_entry(&self, simple_name: &str, path: impl Into<PathBuf>) {
        let key = self.normalize(simple_name);
        if self.tpa.get(&key).is_none() {
            self.tpa.insert(key, path.into());
        }
    }

    /// Parse a platform-delimited TPA manifest into the index.
    ///
    /// Each entry is a path whose file stem becomes the simple name. Entries
    /// without a recognized image extension (`.dll`, `.exe`) are skipped, and
    /// the first occurrence of a simple name wins.
    pub fn parse_tpa_list(&self, list: &str) {
        for entry in list.split(TPA_LIST_SEPARATOR) {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }

            let path = Path::new(entry);
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("dll") || ext.eq_ignore_ascii_case("exe"));
            if !is_image {
                continue;
            }

            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                self.add_tpa_entry(stem, path);
            }
        }
    }

    /// Look up a simple name in the TPA index.
    ///
    /// Deterministic map lookup; any I/O needed to confirm the location's
    /// existence is the probe chain's concern, not the context's.
    #[must_use]
    pub fn probe_tpa(&self, simple_name: &str) -> Option<Location> {
        self.tpa
            .get(&self.normalize(simple_name))
            .map(|entry| Location::file(entry.value().clone()))
    }

    /// Number of entries in the TPA index.
    #[must_use]
    pub fn tpa_len(&self) -> usize {
        self.tpa.len()
    }

    /// Directories probed for non-TPA candidates, in order.
    #[must_use]
    pub fn probing_paths(&self) -> &[PathBuf] {
        &self.probing_paths
    }

    /// Thread-safe read against the identity cache. Never blocks on I/O.
    ///
    /// Keys are indexed on the normalized simple name, so a request that is
    /// looser than the cached identity (lower version, neutral culture) still
    /// hits the entry cached under the resolved identity.
    #[must_use]
    pub fn find_cached(&self, requested: &AssemblyName) -> Option<Arc<ResolvedAssembly>> {
        self.cache
            .get(&requested.normalized_name(self.case_sensitive))
            .map(|entry| entry.clone())
    }

    /// Atomic check-and-insert under the cache's entry lock.
    ///
    /// Never fails: if another thread's bind already cached an entry under the
    /// same simple name, that entry is returned as
    /// [`InsertOutcome::AlreadyPresent`] so the losing thread can discard its
    /// redundant module and adopt the winner. Callers therefore never observe
    /// two distinct modules for one simple name.
    pub fn insert_if_absent(
        &self,
        resolved: &AssemblyName,
        module: Arc<ResolvedAssembly>,
    ) -> InsertOutcome {
        match self.cache.entry(resolved.normalized_name(self.case_sensitive)) {
            Entry::Occupied(entry) => InsertOutcome::AlreadyPresent(entry.get().clone()),
            Entry::Vacant(entry) => {
                entry.insert(module.clone());
                InsertOutcome::Inserted(module)
            }
        }
    }

    /// Number of cached resolved modules.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Drop every cache entry.
    ///
    /// Only context teardown calls this; entries are never evicted
    /// individually. Releasing the cache drops the context's references to its
    /// resolved modules, which frees each image once the last caller lets go.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

impl std::fmt::Debug for ApplicationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationContext")
            .field("tpa_len", &self.tpa.len())
            .field("probing_paths", &self.probing_paths)
            .field("cached_len", &self.cache.len())
            .field("case_sensitive", &self.case_sensitive)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        identity::AssemblyVersion,
        loader::ModuleHandle,
    };
    use std::sync::Weak;

    fn module(name: &str, major: u16) -> Arc<ResolvedAssembly> {
        Arc::new(ResolvedAssembly::new(
            AssemblyName::new(name, AssemblyVersion::new(major, 0, 0, 0)),
            Some(Location::file(format!("/tpa/{name}.dll"))),
            ModuleHandle::from_bytes(vec![0x4D, 0x5A]),
            Weak::new(),
        ))
    }

    #[test]
    fn test_tpa_first_registration_wins() {
        let context = ApplicationContext::new(false);
        context.add_tpa_entry("Foo", "/first/Foo.dll");
        context.add_tpa_entry("foo", "/second/Foo.dll");

        assert_eq!(context.tpa_len(), 1);
        let hit = context.probe_tpa("FOO").unwrap();
        assert_eq!(hit.path, PathBuf::from("/first/Foo.dll"));
    }

    #[test]
    fn test_tpa_case_sensitive_mode() {
        let context = ApplicationContext::new(true);
        context.add_tpa_entry("Foo", "/tpa/Foo.dll");

        assert!(context.probe_tpa("Foo").is_some());
        assert!(context.probe_tpa("foo").is_none());
    }

    #[test]
    fn test_parse_tpa_list() {
        let context = ApplicationContext::new(false);
        let list = [
            "/shared/System.Runtime.dll",
            "/shared/System.Console.dll",
            "/app/host.exe",
            "/shared/notes.txt",
            "/duplicate/System.Runtime.dll",
        ]
        .join(&TPA_LIST_SEPARATOR.to_string());

        context.parse_tpa_list(&list);

        assert_eq!(context.tpa_len(), 3);
        let runtime = context.probe_tpa("System.Runtime").unwrap();
        assert_eq!(runtime.path, PathBuf::from("/shared/System.Runtime.dll"));
        assert!(context.probe_tpa("host").is_some());
        assert!(context.probe_tpa("notes").is_none());
    }

    #[test]
    fn test_cache_insert_and_lookup() {
        let context = ApplicationContext::new(false);
        let request = AssemblyName::new("Lib", AssemblyVersion::new(1, 0, 0, 0));

        assert!(context.find_cached(&request).is_none());

        let first = module("Lib", 1);
        let outcome = context.insert_if_absent(first.identity(), first.clone());
        assert!(matches!(outcome, InsertOutcome::Inserted(_)));

        let hit = context.find_cached(&request).unwrap();
        assert!(Arc::ptr_eq(&hit, &first));
    }

    #[test]
    fn test_cache_loser_adopts_winner() {
        let context = ApplicationContext::new(false);

        let winner = module("Lib", 1);
        context.insert_if_absent(winner.identity(), winner.clone());

        let loser = module("Lib", 1);
        let outcome = context.insert_if_absent(loser.identity(), loser.clone());

        match outcome {
            InsertOutcome::AlreadyPresent(existing) => {
                assert!(Arc::ptr_eq(&existing, &winner));
                assert!(!Arc::ptr_eq(&existing, &loser));
            }
            InsertOutcome::Inserted(_) => panic!("second insert must lose"),
        }
        assert_eq!(context.cached_len(), 1);
    }

    #[test]
    fn test_cache_key_ignores_request_looseness() {
        let context = ApplicationContext::new(false);

        // Cached under the *resolved* identity (2.0); a looser request still hits.
        let resolved = module("Lib", 2);
        context.insert_if_absent(resolved.identity(), resolved.clone());

        let loose = AssemblyName::new("lib", AssemblyVersion::new(1, 0, 0, 0));
        let hit = context.find_cached(&loose).unwrap();
        assert!(Arc::ptr_eq(&hit, &resolved));
    }

    #[test]
    fn test_clear_cache_releases_entries() {
        let context = ApplicationContext::new(false);
        let entry = module("Lib", 1);
        context.insert_if_absent(entry.identity(), entry);

        assert_eq!(context.cached_len(), 1);
        context.clear_cache();
        assert_eq!(context.cached_len(), 0);
    }

    #[test]
    fn test_concurrent_insert_single_winner() {
        let context = Arc::new(ApplicationContext::new(false));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let context = context.clone();
            handles.push(std::thread::spawn(move || {
                let candidate = module("Racing", 1);
                context
                    .insert_if_absent(candidate.identity(), candidate)
                    .winner()
            }));
        }

        let winners: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();

        assert_eq!(context.cached_len(), 1);
        for winner in &winners[1..] {
            assert!(Arc::ptr_eq(winner, &winners[0]));
        }
    }
}
