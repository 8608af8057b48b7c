//! The template store and its on-disk form.
//!
//! Trained templates serialize with [rkyv](https://docs.rs/rkyv) the same way
//! the rest of the pipeline persists its products.

use std::collections::BTreeMap;

use anyhow::Context;
use rkyv::{Archive, Deserialize, Serialize};
use tracing::info;

use crate::sed::Sed;

/// Template id → SED. Ordered by id so rounds merge deterministically.
pub type TemplateStore = BTreeMap<String, Sed>;

#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
struct StoredTemplate {
    id: String,
    sed: Sed,
}

#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
struct StoredTemplates {
    templates: Vec<StoredTemplate>,
}

/// Serialize a template store to bytes using rkyv.
pub fn to_rkyv_bytes(store: &TemplateStore) -> anyhow::Result<Vec<u8>> {
    let stored = StoredTemplates {
        templates: store
            .iter()
            .map(|(id, sed)| StoredTemplate {
                id: id.clone(),
                sed: sed.clone(),
            })
            .collect(),
    };
    let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(&stored)
        .map_err(|e| anyhow::anyhow!("rkyv serialization failed: {}", e))?;
    Ok(bytes.to_vec())
}

/// Deserialize a template store from rkyv bytes.
pub fn from_rkyv_bytes(bytes: &[u8]) -> anyhow::Result<TemplateStore> {
    // Archived f64 fields need an aligned buffer.
    let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(bytes.len());
    aligned.extend_from_slice(bytes);
    let stored = rkyv::from_bytes::<StoredTemplates, rkyv::rancor::Error>(&aligned)
        .map_err(|e| anyhow::anyhow!("rkyv deserialization failed: {}", e))?;
    stored
        .templates
        .into_iter()
        .map(|t| {
            let sed = t
                .sed
                .validated()
                .with_context(|| format!("invalid SED for template '{}'", t.id))?;
            Ok((t.id, sed))
        })
        .collect()
}

/// Save a template store to a file using rkyv.
pub fn save_to_file(store: &TemplateStore, path: &str) -> anyhow::Result<()> {
    let bytes = to_rkyv_bytes(store)?;
    std::fs::write(path, &bytes)?;
    info!("Saved {} templates to {} ({} bytes)", store.len(), path, bytes.len());
    Ok(())
}

/// Load a template store from an rkyv file.
pub fn load_from_file(path: &str) -> anyhow::Result<TemplateStore> {
    let bytes = std::fs::read(path)?;
    let store = from_rkyv_bytes(&bytes)?;
    info!("Loaded {} templates from {}", store.len(), path);
    Ok(store)
}
