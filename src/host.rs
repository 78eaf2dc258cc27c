//! Host queries used during cache reconciliation
//!
//! Who is logged in at the console and what kind of file a download is.
//! Behind a trait so tests can pin both answers.

use async_trait::async_trait;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

const CONSOLE_DEVICE: &str = "/dev/console";

/// Host facts needed by the replicator and recorder
#[async_trait]
pub trait SystemInfo: Send + Sync {
    /// Short name of the user owning the console, if resolvable
    async fn console_user(&self) -> Option<String>;

    /// Human-readable content type description (as printed by `file -b`)
    async fn content_type(&self, path: &Path) -> Option<String>;
}

/// System info backed by the running host
#[derive(Debug, Default, Clone, Copy)]
pub struct HostSystem;

impl HostSystem {
    /// Create the host system
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SystemInfo for HostSystem {
    async fn console_user(&self) -> Option<String> {
        let uid = tokio::fs::metadata(CONSOLE_DEVICE).await.ok()?.uid();
        let name = user_name(uid);
        debug!("Console user: {:?}", name);
        name
    }

    async fn content_type(&self, path: &Path) -> Option<String> {
        let output = Command::new("file")
            .arg("-b")
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
            .ok()?;

        if !output.status.success() {
            return None;
        }
        let kind = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!kind.is_empty()).then_some(kind)
    }
}

/// Resolve a uid to its login name through the user database
fn user_name(uid: u32) -> Option<String> {
    users::get_user_by_uid(uid).map(|user| user.name().to_string_lossy().into_owned())
}

/// System info with fixed answers
#[derive(Debug, Default, Clone)]
pub struct FixedSystem {
    /// Reported console user
    pub user: Option<String>,
    /// Reported content type for every path
    pub kind: Option<String>,
}

#[async_trait]
impl SystemInfo for FixedSystem {
    async fn console_user(&self) -> Option<String> {
        self.user.clone()
    }

    async fn content_type(&self, _path: &Path) -> Option<String> {
        self.kind.clone()
    }
}
