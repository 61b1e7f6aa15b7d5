//! Record of a resolved package installation, persisted as a sidecar file
//! next to the installed package so re-runs can tell a stale manifest from a
//! reusable one without re-running the package manager.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallRecord {
    pub package: String,
    pub manifest_hash: String,
    pub installed_at: DateTime<Utc>,
}

impl InstallRecord {
    pub fn new(package: impl Into<String>, manifest_hash: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            manifest_hash: manifest_hash.into(),
            installed_at: Utc::now(),
        }
    }
}
