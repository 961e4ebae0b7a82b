//! Postings boundary for the term dictionary
//!
//! The dictionary accumulates opaque per-term metadata; a `PostingsReader`
//! turns that metadata into a decoded `TermState` and then into document
//! iterators. The block codecs behind this trait live with the segment
//! reader; `RamPostingsReader` is the resident implementation used by tests
//! and by callers that keep postings in memory.

use roaring::RoaringBitmap;

use crate::error::{Error, Result};
use crate::DocId;

use super::field_infos::FieldInfo;
use super::metadata::TermMeta;

/// Sentinel value indicating an iterator is exhausted
pub const TERMINATED: DocId = DocId::MAX;

/// Decoded, codec-independent view of one term's postings entry.
///
/// Captured states can be handed back to an enumerator later
/// (`seek_exact_state`) to reposition without re-walking the transducer.
#[derive(Debug, Clone, PartialEq)]
pub struct TermState {
    pub doc_freq: u32,
    pub total_term_freq: i64,
    /// Codec-specific address of the postings data for this term.
    pub address: u64,
    /// Bytes the codec carried through the dictionary verbatim.
    pub payload: Vec<u8>,
}

/// Iterator over the documents containing one term
///
/// Starts positioned on the first document; `doc()` returns `TERMINATED`
/// once exhausted.
pub trait DocIterator {
    /// Current document ID, or `TERMINATED` if exhausted
    fn doc(&self) -> DocId;

    /// Advance to the next document, returns new doc_id or `TERMINATED`
    fn advance(&mut self) -> DocId;

    /// Seek to the first doc_id >= target
    fn seek(&mut self, target: DocId) -> DocId {
        while self.doc() < target {
            self.advance();
        }
        self.doc()
    }

    /// Term frequency within the current document
    fn freq(&self) -> u32;
}

/// Decodes dictionary metadata into postings access
pub trait PostingsReader: Send + Sync {
    /// Resolve accumulated term metadata into a decoded state.
    ///
    /// Called at most once per enumerator position; enumerators memoize the
    /// result until they move.
    fn decode_term(&self, field: &FieldInfo, meta: &TermMeta) -> Result<TermState>;

    /// Produce a document iterator for a decoded term, optionally restricted
    /// to the given live documents.
    fn docs(
        &self,
        field: &FieldInfo,
        state: &TermState,
        live_docs: Option<&RoaringBitmap>,
    ) -> Result<Box<dyn DocIterator>>;
}

/// One posting entry: document and within-document frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    pub doc_id: DocId,
    pub freq: u32,
}

/// RAM-resident postings, addressed by slot index
///
/// The slot index returned by `add_list` goes into the first auxiliary long
/// of the term's metadata; `decode_term` reads it back.
#[derive(Debug, Default)]
pub struct RamPostingsReader {
    lists: Vec<Vec<Posting>>,
}

impl RamPostingsReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a posting list (doc ids strictly ascending), returning the
    /// slot address to store in the term's metadata.
    pub fn add_list(&mut self, postings: Vec<(DocId, u32)>) -> u64 {
        debug_assert!(postings.windows(2).all(|w| w[0].0 < w[1].0));
        let slot = self.lists.len() as u64;
        self.lists.push(
            postings
                .into_iter()
                .map(|(doc_id, freq)| Posting { doc_id, freq })
                .collect(),
        );
        slot
    }

    pub fn num_lists(&self) -> usize {
        self.lists.len()
    }
}

impl PostingsReader for RamPostingsReader {
    fn decode_term(&self, _field: &FieldInfo, meta: &TermMeta) -> Result<TermState> {
        let address = meta.aux.first().copied().ok_or_else(|| {
            Error::Corruption("term metadata carries no postings address".to_string())
        })?;
        if address >= self.lists.len() as u64 {
            return Err(Error::Corruption(format!(
                "postings address {} out of range ({} lists)",
                address,
                self.lists.len()
            )));
        }
        Ok(TermState {
            doc_freq: meta.doc_freq,
            total_term_freq: meta.total_term_freq,
            address,
            payload: meta.trailing.clone(),
        })
    }

    fn docs(
        &self,
        _field: &FieldInfo,
        state: &TermState,
        live_docs: Option<&RoaringBitmap>,
    ) -> Result<Box<dyn DocIterator>> {
        let list = self.lists.get(state.address as usize).ok_or_else(|| {
            Error::Corruption(format!(
                "postings address {} out of range ({} lists)",
                state.address,
                self.lists.len()
            ))
        })?;

        let postings = match live_docs {
            Some(live) => list
                .iter()
                .copied()
                .filter(|p| live.contains(p.doc_id))
                .collect(),
            None => list.clone(),
        };
        Ok(Box::new(RamDocIterator {
            postings,
            position: 0,
        }))
    }
}

struct RamDocIterator {
    postings: Vec<Posting>,
    position: usize,
}

impl DocIterator for RamDocIterator {
    fn doc(&self) -> DocId {
        match self.postings.get(self.position) {
            Some(p) => p.doc_id,
            None => TERMINATED,
        }
    }

    fn advance(&mut self) -> DocId {
        self.position += 1;
        self.doc()
    }

    fn freq(&self) -> u32 {
        match self.postings.get(self.position) {
            Some(p) => p.freq,
            None => 0,
        }
    }
}
