//! File vault lookup for annotation uploads.
//!
//! The automation platform keeps uploaded artifacts in a vault addressed by
//! vault id. `Vault` is the seam to that store; `LocalVault` is an in-memory
//! registry of local files used by the command-line runner and tests.

use std::path::{Path, PathBuf};

use crate::error::{ConnectorError, ConnectorResult};

pub const MISSING_PARAMETER: &str = "At least one of the Vault ID or File name must be specified";
pub const INVALID_VAULT_ID: &str = "Invalid Vault ID";
pub const INVALID_FILE_NAME: &str = "Invalid file name";
pub const INVALID_FILE_FORMAT: &str = "Invalid file format";

const ANNOTATION_EXTENSION: &str = ".csv";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultEntry {
    pub vault_id: String,
    pub name: String,
}

pub trait Vault {
    /// Entries stored under `vault_id`, or every entry when `None`.
    fn entries(&self, vault_id: Option<&str>) -> Vec<VaultEntry>;

    /// Local path of the file stored under `vault_id`.
    fn file_path(&self, vault_id: &str) -> Option<PathBuf>;
}

#[derive(Debug, Clone, Default)]
pub struct LocalVault {
    files: Vec<(VaultEntry, PathBuf)>,
}

impl LocalVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `path` under `vault_id`; the entry name is the file name.
    pub fn with_file(mut self, vault_id: impl Into<String>, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.files.push((
            VaultEntry {
                vault_id: vault_id.into(),
                name,
            },
            path,
        ));
        self
    }
}

impl Vault for LocalVault {
    fn entries(&self, vault_id: Option<&str>) -> Vec<VaultEntry> {
        self.files
            .iter()
            .filter(|(entry, _)| vault_id.map_or(true, |id| entry.vault_id == id))
            .map(|(entry, _)| entry.clone())
            .collect()
    }

    fn file_path(&self, vault_id: &str) -> Option<PathBuf> {
        self.files
            .iter()
            .find(|(entry, _)| entry.vault_id == vault_id)
            .map(|(_, path)| path.clone())
    }
}

fn is_csv(name: &str) -> bool {
    name.to_lowercase().ends_with(ANNOTATION_EXTENSION)
}

/// Find the annotation file named by `vault_id` and/or `filename`.
///
/// When a file name is given it is matched against entry names; otherwise
/// the vault id must match. The matched file must be a CSV.
pub fn resolve_annotation_file(
    vault: &dyn Vault,
    vault_id: Option<&str>,
    filename: Option<&str>,
) -> ConnectorResult<PathBuf> {
    let vault_id = vault_id.filter(|id| !id.is_empty());
    let filename = filename.filter(|name| !name.is_empty());
    if vault_id.is_none() && filename.is_none() {
        return Err(ConnectorError::validation(MISSING_PARAMETER));
    }

    let entry = vault.entries(vault_id).into_iter().find(|entry| {
        filename.is_some_and(|name| entry.name == name)
            || vault_id.is_some_and(|id| entry.vault_id == id)
    });

    let Some(entry) = entry else {
        let message = if filename.is_some() {
            INVALID_FILE_NAME
        } else {
            INVALID_VAULT_ID
        };
        return Err(ConnectorError::validation(message));
    };

    let bad_format = (vault_id.is_some() && !is_csv(&entry.name))
        || filename.is_some_and(|name| !is_csv(name));
    if bad_format {
        return Err(ConnectorError::validation(INVALID_FILE_FORMAT));
    }

    vault
        .file_path(&entry.vault_id)
        .ok_or_else(|| ConnectorError::validation(INVALID_VAULT_ID))
}
