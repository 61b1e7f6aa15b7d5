//! Package resolution pipeline: reuse an existing
//! install, otherwise run the package manager, then locate and prefix the
//! executable.

use std::path::{Path, PathBuf};

use mcph_core::{BridgeError, InstallRecord};
use sha2::{Digest, Sha256};
use tokio::process::Command;
use tracing::info;

const MANIFEST_NAME: &str = "package.json";
const INSTALL_RECORD_NAME: &str = ".mcph-install.json";

pub struct ResolvedPackage {
    pub executable: PathBuf,
    /// Interpreter to prefix onto the command line when `executable` is a
    /// script rather than a native binary (e.g. `node`, `python3`).
    pub interpreter_prefix: Vec<String>,
}

/// (1) Reuse an existing install if the package directory's manifest hash
/// still matches the hash recorded at install time.
/// (2) Otherwise create the directory and run `init` then `install`,
/// propagating the combined stderr and exit code on failure.
/// (3) Locate the executable via a prioritized list of standard locations.
/// (4) Prefix an interpreter if the resolved executable is a script.
pub async fn resolve_package(install_root: &Path, package: &str) -> Result<ResolvedPackage, BridgeError> {
    let package_dir = install_root.join(sanitize_dir_name(package));

    if !existing_install_is_valid(&package_dir).await {
        install(&package_dir, package).await?;
    }

    let executable = locate_executable(&package_dir, package).await?;
    let interpreter_prefix = interpreter_prefix_for(&executable);
    Ok(ResolvedPackage {
        executable,
        interpreter_prefix,
    })
}

fn sanitize_dir_name(package: &str) -> String {
    package
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn hash_manifest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// An install is reusable only if both the manifest and the install record
/// sidecar exist and the record's hash still matches the manifest on disk —
/// a manually edited or partially-removed install falls through to a fresh
/// `install`.
async fn existing_install_is_valid(package_dir: &Path) -> bool {
    let Ok(manifest_bytes) = tokio::fs::read(package_dir.join(MANIFEST_NAME)).await else {
        return false;
    };
    let Ok(record_bytes) = tokio::fs::read(package_dir.join(INSTALL_RECORD_NAME)).await else {
        return false;
    };
    let Ok(record) = serde_json::from_slice::<InstallRecord>(&record_bytes) else {
        return false;
    };
    record.manifest_hash == hash_manifest(&manifest_bytes)
}

async fn install(package_dir: &Path, package: &str) -> Result<(), BridgeError> {
    tokio::fs::create_dir_all(package_dir).await.map_err(|e| BridgeError::InstallationFailed {
        server: package.to_string(),
        exit_code: None,
        stderr: format!("failed to create install dir: {e}"),
    })?;

    info!(package, dir = %package_dir.display(), "spawner_install_start");
    run_package_manager(package_dir, &["init", "-y"], package).await?;
    run_package_manager(package_dir, &["install", package], package).await?;
    write_install_record(package_dir, package).await
}

/// Hashes the manifest the package manager just wrote and persists an
/// `InstallRecord` sidecar so the next `resolve_package` call can
/// short-circuit the install step. Best-effort: a write failure here doesn't
/// fail the install itself, it just means the next run reinstalls.
async fn write_install_record(package_dir: &Path, package: &str) -> Result<(), BridgeError> {
    let Ok(manifest_bytes) = tokio::fs::read(package_dir.join(MANIFEST_NAME)).await else {
        return Ok(());
    };
    let record = InstallRecord::new(package, hash_manifest(&manifest_bytes));
    if let Ok(bytes) = serde_json::to_vec(&record) {
        let _ = tokio::fs::write(package_dir.join(INSTALL_RECORD_NAME), bytes).await;
    }
    Ok(())
}

async fn run_package_manager(dir: &Path, args: &[&str], package: &str) -> Result<(), BridgeError> {
    let output = Command::new("npm")
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .map_err(|e| BridgeError::InstallationFailed {
            server: package.to_string(),
            exit_code: None,
            stderr: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(BridgeError::InstallationFailed {
            server: package.to_string(),
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(())
}

async fn locate_executable(package_dir: &Path, package: &str) -> Result<PathBuf, BridgeError> {
    let short_name = package.rsplit('/').next().unwrap_or(package);
    let candidates = [
        package_dir.join("node_modules/.bin").join(short_name),
        package_dir.join("node_modules/.bin/mcp-server"),
        package_dir.join(format!("node_modules/{package}/bin/{short_name}.js")),
        package_dir.join(format!("node_modules/{package}/index.js")),
    ];
    for candidate in candidates {
        if tokio::fs::metadata(&candidate).await.is_ok() {
            return Ok(candidate);
        }
    }
    if let Ok(path) = which::which(short_name) {
        return Ok(path);
    }
    Err(BridgeError::ExecutableNotFound {
        server: package.to_string(),
    })
}

fn interpreter_prefix_for(executable: &Path) -> Vec<String> {
    match executable.extension().and_then(|ext| ext.to_str()) {
        Some("js") => vec!["node".to_string()],
        Some("py") => vec!["python3".to_string()],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_executable_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = locate_executable(dir.path(), "definitely-not-a-real-package-xyz")
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::ExecutableNotFound { .. }));
    }

    #[tokio::test]
    async fn locates_bin_in_node_modules() {
        let dir = tempfile::tempdir().unwrap();
        let bin_dir = dir.path().join("node_modules/.bin");
        tokio::fs::create_dir_all(&bin_dir).await.unwrap();
        let bin_path = bin_dir.join("demo-mcp");
        tokio::fs::write(&bin_path, b"#!/bin/sh\necho hi\n").await.unwrap();

        let resolved = locate_executable(dir.path(), "demo-mcp").await.unwrap();
        assert_eq!(resolved, bin_path);
    }

    #[test]
    fn js_executable_gets_node_prefix() {
        let prefix = interpreter_prefix_for(Path::new("/tmp/pkg/index.js"));
        assert_eq!(prefix, vec!["node".to_string()]);
    }

    #[test]
    fn native_binary_has_no_prefix() {
        let prefix = interpreter_prefix_for(Path::new("/usr/bin/demo-mcp"));
        assert!(prefix.is_empty());
    }

    #[tokio::test]
    async fn fresh_directory_has_no_valid_install() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!existing_install_is_valid(dir.path()).await);
    }

    #[tokio::test]
    async fn install_record_matching_manifest_hash_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join(MANIFEST_NAME), b"{\"name\":\"demo-mcp\"}")
            .await
            .unwrap();
        write_install_record(dir.path(), "demo-mcp").await.unwrap();

        assert!(existing_install_is_valid(dir.path()).await);
    }

    #[tokio::test]
    async fn edited_manifest_invalidates_the_recorded_hash() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join(MANIFEST_NAME), b"{\"name\":\"demo-mcp\"}")
            .await
            .unwrap();
        write_install_record(dir.path(), "demo-mcp").await.unwrap();

        tokio::fs::write(dir.path().join(MANIFEST_NAME), b"{\"name\":\"demo-mcp\",\"version\":\"2\"}")
            .await
            .unwrap();

        assert!(!existing_install_is_valid(dir.path()).await);
    }
}
