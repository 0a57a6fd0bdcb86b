//! # Disk Discovery
//!
//! Builds a [`DescriptorRegistry`] by compiling `.proto` sources from disk.
//!
//! File paths may be given relative to one of the import directories or as
//! absolute paths; they are normalized against the import roots before the
//! whole set is compiled in a single batch, so type references between the
//! given files resolve without any particular ordering. When no import
//! directories are supplied, the files' own parent directories are used as
//! the resolution roots.
use super::{DescriptorRegistry, walk_file_descriptors};
use prost_types::FileDescriptorProto;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileDiscoveryError {
    #[error("no *.proto files found")]
    NoSchemaFiles,

    #[error("failed to parse schema files: {0}")]
    Parse(#[source] protox::Error),

    #[error("failed to resolve schema import: {0}")]
    Resolution(#[source] protox::Error),

    #[error("failed to build descriptor registry: {0}")]
    InvalidRegistry(#[from] prost_reflect::DescriptorError),
}

/// Compiles `filenames` against `import_paths` and aggregates the result
/// into a registry.
///
/// # Returns
///
/// * `Ok(registry)` - Every given file plus its transitive imports, each
///   appearing exactly once.
/// * `Err(FileDiscoveryError)` - Empty input set, malformed syntax, or an
///   import that cannot be located under the resolution roots.
pub fn from_files(
    import_paths: &[PathBuf],
    filenames: &[PathBuf],
) -> Result<DescriptorRegistry, FileDiscoveryError> {
    if filenames.is_empty() {
        return Err(FileDiscoveryError::NoSchemaFiles);
    }

    let imports = if import_paths.is_empty() {
        infer_import_paths(filenames)
    } else {
        import_paths.to_vec()
    };
    let resolved = resolve_filenames(&imports, filenames);

    let fd_set = protox::compile(&resolved, &imports).map_err(classify)?;

    let by_name: HashMap<String, FileDescriptorProto> = fd_set
        .file
        .into_iter()
        .filter_map(|fd| fd.name.clone().map(|name| (name, fd)))
        .collect();
    let roots: Vec<String> = resolved.iter().map(|p| proto_name(p)).collect();

    let files = walk_file_descriptors(roots.iter().map(String::as_str), &by_name);
    tracing::debug!(files = files.len(), "compiled schema files from disk");

    Ok(DescriptorRegistry::from_file_descriptors(files)?)
}

fn classify(err: protox::Error) -> FileDiscoveryError {
    if err.is_file_not_found() {
        FileDiscoveryError::Resolution(err)
    } else {
        FileDiscoveryError::Parse(err)
    }
}

/// Normalizes each filename to be relative to one of the import roots, so
/// callers may pass absolute paths interchangeably with import-relative ones.
/// Paths under no root are kept as given and surface as resolution failures
/// during compilation.
fn resolve_filenames(import_paths: &[PathBuf], filenames: &[PathBuf]) -> Vec<PathBuf> {
    filenames
        .iter()
        .map(|file| {
            for import in import_paths {
                if let Ok(stripped) = file.strip_prefix(import) {
                    return stripped.to_path_buf();
                }
            }
            file.clone()
        })
        .collect()
}

fn infer_import_paths(filenames: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for file in filenames {
        let Some(parent) = file.parent() else {
            continue;
        };
        let parent = if parent.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            parent.to_path_buf()
        };
        if seen.insert(parent.clone()) {
            out.push(parent);
        }
    }
    out
}

/// Protobuf file names always use forward slashes, whatever the platform.
fn proto_name(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
