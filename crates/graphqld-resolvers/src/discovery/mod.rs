//! Enumerating resolver executables.
//!
//! The registry does not care where resolvers come from; it consumes any
//! [`ResolverSource`]. [`DirectoryDiscovery`] implements the document-root
//! layout:
//!
//! ```text
//! <root>/charCount.sh                 -> Query.charCount
//! <root>/Query/python.py              -> Query.python
//! <root>/CharCountResponse/isEven.py  -> CharCountResponse.isEven
//! ```
//!
//! Only files with the owner-execute bit count as resolvers. Non-executable
//! files ending in `.graphql` are type declaration documents. Hidden entries
//! are skipped and symlinked directories are not followed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;
use tracing::debug;

use crate::location::ResolverLocation;

/// Tracing target for discovery.
const DISCOVERY_TARGET: &str = "graphqld_resolvers::discovery";

/// Errors raised while enumerating resolvers.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// A configured root is missing or is not a directory.
    #[error("resolver root '{}' is not a directory", path.display())]
    MissingRoot {
        /// The configured root.
        path: PathBuf,
    },
    /// Reading a directory or its entries failed.
    #[error("failed to read '{}': {source}", path.display())]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Everything one discovery pass found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovered {
    /// Resolver locations in registration order.
    pub locations: Vec<ResolverLocation>,
    /// `.graphql` documents in walk order.
    pub declarations: Vec<PathBuf>,
}

/// A provider of resolver locations.
pub trait ResolverSource {
    /// Lists resolver locations in registration order.
    ///
    /// # Errors
    ///
    /// Returns a [`DiscoveryError`] when the source cannot be enumerated.
    fn locations(&self) -> Result<Vec<ResolverLocation>, DiscoveryError>;

    /// Lists resolver locations together with type declaration documents.
    ///
    /// # Errors
    ///
    /// Returns a [`DiscoveryError`] when the source cannot be enumerated.
    fn discover(&self) -> Result<Discovered, DiscoveryError> {
        Ok(Discovered {
            locations: self.locations()?,
            declarations: Vec::new(),
        })
    }
}

/// Names, sizes, and modification times of every visible entry under the
/// roots. Two equal fingerprints mean nothing a rescan would see changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootFingerprint {
    entries: Vec<EntryStamp>,
}

impl RootFingerprint {
    /// Number of entries covered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when the roots are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct EntryStamp {
    path: PathBuf,
    modified: Option<SystemTime>,
    len: u64,
    executable: bool,
}

/// What one walk over the roots collects.
#[derive(Default)]
struct Scan {
    found: Discovered,
    stamps: Vec<EntryStamp>,
}

impl ResolverSource for [ResolverLocation] {
    fn locations(&self) -> Result<Vec<ResolverLocation>, DiscoveryError> {
        Ok(self.to_vec())
    }
}

impl ResolverSource for Vec<ResolverLocation> {
    fn locations(&self) -> Result<Vec<ResolverLocation>, DiscoveryError> {
        Ok(self.clone())
    }
}

/// Discovers resolvers by walking one or more document roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryDiscovery {
    roots: Vec<PathBuf>,
    root_type: String,
}

impl DirectoryDiscovery {
    /// Walks `roots` in order; files directly under a root belong to
    /// `root_type`.
    #[must_use]
    pub fn new<I, P>(roots: I, root_type: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
            root_type: root_type.into(),
        }
    }

    /// Configured roots.
    #[must_use]
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Fingerprints the roots without introspecting anything.
    ///
    /// # Errors
    ///
    /// Returns a [`DiscoveryError`] when a root cannot be enumerated.
    pub fn fingerprint(&self) -> Result<RootFingerprint, DiscoveryError> {
        self.scan().map(|scan| RootFingerprint {
            entries: scan.stamps,
        })
    }

    fn scan(&self) -> Result<Scan, DiscoveryError> {
        let mut scan = Scan::default();
        for root in &self.roots {
            if !root.is_dir() {
                return Err(DiscoveryError::MissingRoot { path: root.clone() });
            }
            let canonical = fs::canonicalize(root).map_err(|source| DiscoveryError::Io {
                path: root.clone(),
                source,
            })?;
            self.walk(&canonical, &canonical, &mut scan)?;
        }
        debug!(
            target: DISCOVERY_TARGET,
            roots = self.roots.len(),
            resolvers = scan.found.locations.len(),
            declarations = scan.found.declarations.len(),
            "discovered resolvers"
        );
        Ok(scan)
    }

    fn walk(&self, root: &Path, dir: &Path, scan: &mut Scan) -> Result<(), DiscoveryError> {
        let io_error = |path: &Path| {
            let owned = path.to_path_buf();
            move |source| DiscoveryError::Io {
                path: owned,
                source,
            }
        };

        let mut entries = fs::read_dir(dir)
            .map_err(io_error(dir))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(io_error(dir))?;
        entries.sort_by_key(fs::DirEntry::file_name);

        for entry in entries {
            let path = entry.path();
            if is_hidden(&path) {
                continue;
            }
            let file_type = entry.file_type().map_err(io_error(&path))?;
            let metadata = match fs::metadata(&path) {
                Ok(metadata) => metadata,
                Err(err) => {
                    debug!(
                        target: DISCOVERY_TARGET,
                        path = %path.display(),
                        error = %err,
                        "skipping unreadable entry"
                    );
                    continue;
                }
            };
            let executable = metadata.is_file() && is_executable(&metadata);
            scan.stamps.push(EntryStamp {
                path: path.clone(),
                modified: metadata.modified().ok(),
                len: metadata.len(),
                executable,
            });
            if file_type.is_dir() {
                self.walk(root, &path, scan)?;
            } else if executable {
                if let Some(location) = self.locate(root, &path) {
                    scan.found.locations.push(location);
                }
            } else if metadata.is_file() && is_declaration(&path) {
                scan.found.declarations.push(path);
            }
        }
        Ok(())
    }

    fn locate(&self, root: &Path, path: &Path) -> Option<ResolverLocation> {
        let field = path.file_stem()?.to_str()?;
        let parent = path.parent()?;
        let type_name = if parent == root {
            self.root_type.as_str()
        } else {
            parent.file_name()?.to_str()?
        };
        Some(ResolverLocation::new(type_name, field, path).with_root(root))
    }
}

impl ResolverSource for DirectoryDiscovery {
    fn locations(&self) -> Result<Vec<ResolverLocation>, DiscoveryError> {
        self.discover().map(|found| found.locations)
    }

    fn discover(&self) -> Result<Discovered, DiscoveryError> {
        self.scan().map(|scan| scan.found)
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

fn is_declaration(path: &Path) -> bool {
    path.extension().is_some_and(|extension| extension == "graphql")
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;

    metadata.permissions().mode() & 0o100 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    true
}

#[cfg(all(test, unix))]
mod tests;
