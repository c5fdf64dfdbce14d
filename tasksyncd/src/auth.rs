//! Principal resolution against the on-disk directory tree.
//!
//! Authentication succeeds when the `(org, user, key)` triple exists and
//! matches on disk and neither the organization nor the user carries a
//! `suspended` marker. Absence and mismatch both answer 430 so that probing
//! cannot reveal which organizations or users exist.

use std::path::{Path, PathBuf};

use log::info;
use tasksync_types::error::Failure;

use crate::config::Config;

const ACCESS_DENIED: u16 = 430;
const ACCOUNT_SUSPENDED: u16 = 431;

/// Whether a client-supplied name is usable as a single path component.
fn safe_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
}

#[derive(Clone, Debug)]
pub struct Authenticator {
    root: PathBuf,
}

impl Authenticator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a principal. The supplied credential is never logged.
    pub fn authenticate(&self, org: &str, user: &str, key: &str) -> Result<(), Failure> {
        if !safe_component(org) || !safe_component(user) {
            info!("Auth failure: unusable principal name");
            return Err(Failure::Code(ACCESS_DENIED));
        }

        let org_dir = self.root.join("orgs").join(org);
        if !org_dir.is_dir() {
            info!("Auth failure: org '{org}' unknown");
            return Err(Failure::Code(ACCESS_DENIED));
        }
        if org_dir.join("suspended").exists() {
            info!("Auth failure: org '{org}' suspended");
            return Err(Failure::Code(ACCOUNT_SUSPENDED));
        }

        let user_dir = org_dir.join("users").join(user);
        if !user_dir.is_dir() {
            info!("Auth failure: org '{org}' user '{user}' unknown");
            return Err(Failure::Code(ACCESS_DENIED));
        }
        if user_dir.join("suspended").exists() {
            info!("Auth failure: org '{org}' user '{user}' suspended");
            return Err(Failure::Code(ACCOUNT_SUSPENDED));
        }

        if !self.key_matches(&user_dir, key) {
            info!("Auth failure: org '{org}' user '{user}' bad key");
            return Err(Failure::Code(ACCESS_DENIED));
        }

        Ok(())
    }

    fn key_matches(&self, user_dir: &Path, key: &str) -> bool {
        match Config::load(&user_dir.join("config")) {
            Ok(user_rc) => !key.is_empty() && user_rc.get("key") == key,
            Err(_) => false,
        }
    }
}
