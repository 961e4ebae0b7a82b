//! Term dictionary reader
//!
//! Loads the per-field transducers out of one dictionary file, runs every
//! load-time invariant check, and keeps the result resident for the life of
//! the segment. A detected corruption is fatal: the segment fails to open
//! and nothing is retried.

use byteorder::{ByteOrder, LittleEndian};
use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::directories::FileSlice;
use crate::error::{Error, Result};
use crate::structures::automaton::Automaton;
use crate::structures::transducer::{read_vint, Transducer};

use super::field_infos::{FieldInfo, FieldInfos};
use super::intersect::IntersectIterator;
use super::metadata::{TermMetaOutputs, UNTRACKED_TERM_FREQ};
use super::postings::PostingsReader;
use super::term_iter::TermIterator;
use super::writer::TERM_DICT_MAGIC;

/// All term dictionaries of one segment, one per indexed field
pub struct TermDictionary {
    fields: Vec<FieldTerms>,
    by_number: FxHashMap<u32, usize>,
    by_name: FxHashMap<String, usize>,
    max_doc: u32,
}

impl std::fmt::Debug for TermDictionary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TermDictionary")
            .field("num_fields", &self.fields.len())
            .field("max_doc", &self.max_doc)
            .finish()
    }
}

impl TermDictionary {
    /// Parse and validate a dictionary file.
    ///
    /// The trailer (last 8 bytes) holds the absolute offset of the field
    /// directory; each field header is followed inline by its transducer
    /// section. Every invariant violation is `Error::Corruption` and aborts
    /// the open.
    pub fn open(
        data: &FileSlice,
        field_infos: &FieldInfos,
        postings: Arc<dyn PostingsReader>,
        max_doc: u32,
    ) -> Result<Self> {
        let bytes = data.read_bytes();
        let raw = bytes.as_slice();
        if raw.len() < 12 {
            return Err(Error::Corruption(format!(
                "term dictionary file too short: {} bytes",
                raw.len()
            )));
        }

        let magic = LittleEndian::read_u32(&raw[0..4]);
        if magic != TERM_DICT_MAGIC {
            return Err(Error::Corruption(format!(
                "bad term dictionary magic: 0x{:08X}, expected 0x{:08X}",
                magic, TERM_DICT_MAGIC
            )));
        }

        let trailer_at = raw.len() - 8;
        let directory_offset = LittleEndian::read_u64(&raw[trailer_at..]) as usize;
        if directory_offset < 4 || directory_offset > trailer_at {
            return Err(Error::Corruption(format!(
                "field directory offset {} outside file body (len {})",
                directory_offset,
                raw.len()
            )));
        }

        let mut reader = &raw[directory_offset..trailer_at];
        let num_fields = read_vint(&mut reader)? as usize;

        let mut fields = Vec::with_capacity(num_fields);
        let mut by_number = FxHashMap::default();
        let mut by_name = FxHashMap::default();

        for _ in 0..num_fields {
            let field_number = read_vint(&mut reader)?;
            if field_number > u32::MAX as u64 {
                return Err(Error::Corruption(format!(
                    "field number {} out of range",
                    field_number
                )));
            }
            let info = field_infos
                .by_number(field_number as u32)
                .ok_or_else(|| {
                    Error::Corruption(format!("unknown field number: {}", field_number))
                })?
                .clone();
            if by_number.contains_key(&info.number) {
                return Err(Error::Corruption(format!(
                    "field number {} repeats in term dictionary",
                    info.number
                )));
            }

            let num_terms = read_vint(&mut reader)?;
            let sum_total_term_freq = if info.has_freqs {
                read_vint(&mut reader)? as i64
            } else {
                UNTRACKED_TERM_FREQ
            };
            let sum_doc_freq = read_vint(&mut reader)?;
            let doc_count = read_vint(&mut reader)?;
            if doc_count > max_doc as u64 {
                return Err(Error::Corruption(format!(
                    "field {}: doc_count {} exceeds segment max_doc {}",
                    info.name, doc_count, max_doc
                )));
            }
            if sum_doc_freq < doc_count {
                return Err(Error::Corruption(format!(
                    "field {}: sum_doc_freq {} below doc_count {}",
                    info.name, sum_doc_freq, doc_count
                )));
            }
            if info.has_freqs && sum_total_term_freq < sum_doc_freq as i64 {
                return Err(Error::Corruption(format!(
                    "field {}: sum_total_term_freq {} below sum_doc_freq {}",
                    info.name, sum_total_term_freq, sum_doc_freq
                )));
            }

            let aux_width = read_vint(&mut reader)?;
            if aux_width > u32::MAX as u64 {
                return Err(Error::Corruption(format!(
                    "field {}: auxiliary width {} out of range",
                    info.name, aux_width
                )));
            }

            let outputs = TermMetaOutputs::new(aux_width as u32, info.has_freqs);
            let fst = Transducer::from_bytes(&mut reader, outputs)?;
            if fst.term_count() != num_terms {
                return Err(Error::Corruption(format!(
                    "field {}: header claims {} terms, transducer holds {}",
                    info.name,
                    num_terms,
                    fst.term_count()
                )));
            }

            log::debug!(
                "TermDictionary::open field={} terms={} ram={}",
                info.name,
                num_terms,
                fst.ram_bytes_used()
            );

            by_number.insert(info.number, fields.len());
            by_name.insert(info.name.clone(), fields.len());
            fields.push(FieldTerms {
                info,
                fst,
                num_terms,
                sum_doc_freq,
                sum_total_term_freq,
                doc_count: doc_count as u32,
                postings: Arc::clone(&postings),
            });
        }

        if !reader.is_empty() {
            return Err(Error::Corruption(format!(
                "{} trailing bytes after field directory",
                reader.len()
            )));
        }

        Ok(Self {
            fields,
            by_number,
            by_name,
            max_doc,
        })
    }

    pub fn field(&self, name: &str) -> Option<&FieldTerms> {
        self.by_name.get(name).map(|&idx| &self.fields[idx])
    }

    pub fn field_by_number(&self, number: u32) -> Option<&FieldTerms> {
        self.by_number.get(&number).map(|&idx| &self.fields[idx])
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldTerms> {
        self.fields.iter()
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn max_doc(&self) -> u32 {
        self.max_doc
    }

    /// Resident size across all fields.
    pub fn ram_bytes_used(&self) -> usize {
        self.fields.iter().map(|f| f.ram_bytes_used()).sum()
    }
}

/// One field's resident term dictionary
pub struct FieldTerms {
    pub(crate) info: FieldInfo,
    pub(crate) fst: Transducer<TermMetaOutputs>,
    num_terms: u64,
    sum_doc_freq: u64,
    sum_total_term_freq: i64,
    doc_count: u32,
    pub(crate) postings: Arc<dyn PostingsReader>,
}

impl FieldTerms {
    pub fn info(&self) -> &FieldInfo {
        &self.info
    }

    pub fn num_terms(&self) -> u64 {
        self.num_terms
    }

    pub fn sum_doc_freq(&self) -> u64 {
        self.sum_doc_freq
    }

    /// Total occurrences across the field, `None` when untracked.
    pub fn sum_total_term_freq(&self) -> Option<i64> {
        if self.info.has_freqs {
            Some(self.sum_total_term_freq)
        } else {
            None
        }
    }

    pub fn doc_count(&self) -> u32 {
        self.doc_count
    }

    pub fn aux_width(&self) -> u32 {
        self.fst.outputs().aux_width()
    }

    /// Smallest term in the field, `None` when the field is empty.
    pub fn min_term(&self) -> Option<Vec<u8>> {
        if self.fst.empty_output().is_some() {
            return Some(Vec::new());
        }
        if self.fst.num_arcs(self.fst.root()) == 0 {
            return None;
        }
        let mut term = Vec::new();
        let mut node = self.fst.root();
        loop {
            let arc = self.fst.arc(node, 0);
            term.push(arc.label);
            if arc.is_final {
                return Some(term);
            }
            node = arc.target;
        }
    }

    /// Largest term in the field, `None` when the field is empty.
    pub fn max_term(&self) -> Option<Vec<u8>> {
        if self.fst.num_arcs(self.fst.root()) == 0 {
            return self.fst.empty_output().map(|_| Vec::new());
        }
        let mut term = Vec::new();
        let mut node = self.fst.root();
        loop {
            let arc = self.fst.arc(node, self.fst.num_arcs(node) - 1);
            term.push(arc.label);
            if self.fst.num_arcs(arc.target) == 0 {
                return Some(term);
            }
            node = arc.target;
        }
    }

    /// Ordered enumerator positioned before the first term.
    pub fn iterator(&self) -> TermIterator<'_> {
        TermIterator::new(self)
    }

    /// Enumerator over exactly the stored terms the automaton accepts,
    /// optionally starting strictly after `start_term`.
    pub fn intersect<A: Automaton>(
        &self,
        automaton: A,
        start_term: Option<&[u8]>,
    ) -> IntersectIterator<'_, A> {
        IntersectIterator::new(self, automaton, start_term)
    }

    /// Approximate resident size of this field's transducer.
    pub fn ram_bytes_used(&self) -> usize {
        self.fst.ram_bytes_used()
    }
}
