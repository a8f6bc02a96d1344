use include_dir::{include_dir, Dir};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;

use crate::error::{DrillError, InsufficientPool, Result};
use crate::kind::TestKind;
use crate::stimulus::{Stimulus, StimulusPool};
use crate::store::{BlobStore, DocumentStore};

static PACK_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/src/packs");

/// Supplies the full pool of stimuli for a test kind, read once per session
pub trait StimulusSource {
    fn load_pool(&self, kind: TestKind) -> Result<StimulusPool>;
}

/// Stimulus pack shipped inside the binary
#[derive(Deserialize, Clone, Debug)]
pub struct Pack {
    pub name: String,
    pub size: u32,
    pub items: Vec<serde_json::Value>,
}

impl Pack {
    pub fn bundled(kind: TestKind) -> Result<Self> {
        let file_name = format!("{}.json", kind.key());
        let file = PACK_DIR
            .get_file(&file_name)
            .ok_or(DrillError::EmptyPool(kind))?;
        let contents = file
            .contents_utf8()
            .ok_or_else(|| DrillError::InvalidConfig(format!("{file_name} is not UTF-8")))?;
        Ok(serde_json::from_str(contents)?)
    }
}

/// Decode documents, skipping the ones that do not fit the kind's shape
fn decode_all<'a, I>(kind: TestKind, docs: I) -> Result<StimulusPool>
where
    I: IntoIterator<Item = &'a serde_json::Value>,
{
    let stimuli: Vec<Stimulus> = docs
        .into_iter()
        .filter_map(|fields| match Stimulus::from_document(kind, fields) {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!(kind = %kind, error = %e, "skipping malformed stimulus");
                None
            }
        })
        .collect();
    StimulusPool::new(kind, stimuli)
}

/// Reads the packs embedded in the binary
#[derive(Debug, Default, Clone, Copy)]
pub struct BundledSource;

impl StimulusSource for BundledSource {
    fn load_pool(&self, kind: TestKind) -> Result<StimulusPool> {
        let pack = Pack::bundled(kind)?;
        let pool = decode_all(kind, &pack.items)?;
        tracing::debug!(kind = %kind, pack = %pack.name, size = pool.len(), "loaded bundled pool");
        Ok(pool)
    }
}

/// Reads stimuli from the document store collection for the kind
pub struct StoreSource<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
    order_by: Option<String>,
}

impl<'a, S: DocumentStore + ?Sized> StoreSource<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            order_by: None,
        }
    }

    pub fn ordered_by<F: Into<String>>(mut self, field: F) -> Self {
        self.order_by = Some(field.into());
        self
    }
}

impl<S: DocumentStore + ?Sized> StimulusSource for StoreSource<'_, S> {
    fn load_pool(&self, kind: TestKind) -> Result<StimulusPool> {
        let docs = self.store.query(kind.collection(), self.order_by.as_deref())?;
        let pool = decode_all(kind, docs.iter().map(|d| &d.fields))?;
        tracing::debug!(kind = %kind, size = pool.len(), "loaded pool from store");
        Ok(pool)
    }
}

/// Copy every bundled pack into an empty store collection. Collections that
/// already hold documents are left alone. Returns the number of documents written.
pub fn seed_store<S: DocumentStore + ?Sized>(store: &S) -> Result<usize> {
    let mut written = 0;
    for kind in TestKind::ALL {
        if !store.query(kind.collection(), None)?.is_empty() {
            tracing::info!(collection = kind.collection(), "already seeded; skipping");
            continue;
        }
        let pack = Pack::bundled(kind)?;
        for item in &pack.items {
            let stimulus = match Stimulus::from_document(kind, item) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(kind = %kind, error = %e, "skipping malformed pack item");
                    continue;
                }
            };
            store.create(kind.collection(), stimulus.to_document()?)?;
            written += 1;
        }
    }
    Ok(written)
}

/// Uniform random subset: full Fisher-Yates shuffle, then the first
/// `min(requested, len)` items. A short pool yields a warning, not an error.
pub fn select_subset<R: Rng + ?Sized>(
    pool: &StimulusPool,
    requested: usize,
    rng: &mut R,
) -> (StimulusPool, Option<InsufficientPool>) {
    let mut stimuli = pool.clone().into_stimuli();
    stimuli.shuffle(rng);

    let warning = if requested > stimuli.len() {
        Some(InsufficientPool {
            requested,
            available: stimuli.len(),
        })
    } else {
        stimuli.truncate(requested);
        None
    };

    (StimulusPool::from_parts(pool.kind(), stimuli), warning)
}

/// Resolve every image reference to a displayable URL before the session starts
pub fn resolve_images<B: BlobStore + ?Sized>(pool: StimulusPool, blobs: &B) -> Result<StimulusPool> {
    let kind = pool.kind();
    let mut stimuli = pool.into_stimuli();
    for stimulus in stimuli.iter_mut() {
        if let Some(image_ref) = stimulus.image_ref().map(str::to_string) {
            let url = blobs.public_url(&image_ref)?;
            stimulus.set_image_url(url);
        }
    }
    Ok(StimulusPool::from_parts(kind, stimuli))
}
