//! Error types for treesnap.

use std::path::PathBuf;

/// Errors from manifest loading, graph construction, and snapshot I/O.
///
/// Projection itself never fails; these cover everything around it.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// Cannot read a graph manifest from disk.
    ManifestRead(PathBuf, std::io::Error),
    /// Manifest file contains invalid JSON or an unknown shape.
    ManifestParse(PathBuf, serde_json::Error),
    /// Manifest declares no nodes.
    EmptyManifest(PathBuf),
    /// Two manifest nodes declare the same path.
    DuplicateNode(PathBuf),
    /// A parent, link target, or edge refers to a path no node declares.
    UnknownNode(PathBuf),
    /// Attaching a node would make it contain itself.
    ContainmentCycle(PathBuf),
    /// Links point at each other without reaching a real node.
    LinkCycle(PathBuf),
    /// The requested root is not a node of the graph.
    RootNotFound(String),
    /// Cannot read a snapshot file from disk.
    SnapshotRead(PathBuf, std::io::Error),
    /// Snapshot file contains invalid JSON.
    SnapshotParse(PathBuf, serde_json::Error),
    /// Cannot encode a snapshot as JSON.
    SnapshotEncode(serde_json::Error),
    /// Cannot write a snapshot file to disk.
    SnapshotWrite(PathBuf, std::io::Error),
    /// Cannot write results to stdout.
    OutputWrite(std::io::Error),
}

impl Error {
    /// User-facing hint to accompany the error message.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::EmptyManifest(_) => Some("a manifest needs at least one entry in \"nodes\""),
            Self::UnknownNode(_) => {
                Some("parent, fsParent, link and edge \"from\" must name a declared node path")
            }
            Self::LinkCycle(_) => Some("every chain of links must end at a node without \"link\""),
            Self::RootNotFound(_) => Some("--root takes a location such as node_modules/foo, or \"\" for the top"),
            Self::SnapshotParse(..) => Some("snapshots are written by `treesnap show --save`"),
            _ => None,
        }
    }
}

// Display: lowercase, no trailing punctuation, so it composes into
// larger error messages.
impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ManifestRead(path, source) => {
                write!(f, "cannot read manifest '{}': {source}", path.display())
            }
            Self::ManifestParse(path, source) => {
                write!(f, "invalid manifest '{}': {source}", path.display())
            }
            Self::EmptyManifest(path) => {
                write!(f, "manifest '{}' has no nodes", path.display())
            }
            Self::DuplicateNode(path) => {
                write!(f, "node '{}' is declared more than once", path.display())
            }
            Self::UnknownNode(path) => {
                write!(f, "no node declared at '{}'", path.display())
            }
            Self::ContainmentCycle(path) => {
                write!(f, "'{}' cannot be placed inside itself", path.display())
            }
            Self::LinkCycle(path) => {
                write!(f, "link '{}' never reaches a real node", path.display())
            }
            Self::RootNotFound(location) => {
                write!(f, "no node at location '{location}'")
            }
            Self::SnapshotRead(path, source) => {
                write!(f, "cannot read snapshot '{}': {source}", path.display())
            }
            Self::SnapshotParse(path, source) => {
                write!(f, "invalid snapshot '{}': {source}", path.display())
            }
            Self::SnapshotEncode(source) => write!(f, "cannot encode snapshot: {source}"),
            Self::SnapshotWrite(path, source) => {
                write!(f, "cannot write snapshot '{}': {source}", path.display())
            }
            Self::OutputWrite(source) => write!(f, "cannot write output: {source}"),
        }
    }
}

// Implement source() for error chain introspection.
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ManifestRead(_, e)
            | Self::SnapshotRead(_, e)
            | Self::SnapshotWrite(_, e)
            | Self::OutputWrite(e) => Some(e),
            Self::ManifestParse(_, e) | Self::SnapshotParse(_, e) | Self::SnapshotEncode(e) => {
                Some(e)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_node_has_hint() {
        let err = Error::UnknownNode(PathBuf::from("./node_modules/nope"));
        assert!(err.to_string().contains("node_modules/nope"));
        assert!(err.hint().unwrap().contains("declared"));
    }

    #[test]
    fn root_not_found_mentions_location() {
        let err = Error::RootNotFound("node_modules/x".to_string());
        assert_eq!(err.to_string(), "no node at location 'node_modules/x'");
    }

    #[test]
    fn io_errors_chain_source() {
        use std::error::Error as _;
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = Error::SnapshotRead(PathBuf::from("a.json"), io);
        assert!(err.source().is_some());
        assert!(Error::ContainmentCycle(PathBuf::from(".")).source().is_none());
    }
}
