//! Segment-build counterpart of the term dictionary reader
//!
//! Consumes per-field sorted `(term, TermMeta)` streams, computes the
//! per-field summary statistics, builds the transducer bytes, and assembles
//! the dictionary file: magic, field directory with inline transducer
//! sections, and a trailer holding the directory offset.

use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;

use crate::error::{Error, Result};
use crate::structures::transducer::write_vint;
use crate::structures::trie_builder::TrieBuilder;

use super::field_infos::FieldInfos;
use super::metadata::{TermMeta, TermMetaOutputs, UNTRACKED_TERM_FREQ};

/// Term dictionary magic number - version 1
pub const TERM_DICT_MAGIC: u32 = 0x534B4431; // "SKD1"

/// Writer knobs
#[derive(Debug, Clone)]
pub struct TermDictWriterConfig {
    /// Factor metadata shared by a subtree onto its incoming arc so readers
    /// accumulate common prefixes once. Turning this off stores every term's
    /// full metadata on its final arc; observable values are identical.
    pub share_outputs: bool,
}

impl Default for TermDictWriterConfig {
    fn default() -> Self {
        Self {
            share_outputs: true,
        }
    }
}

struct FieldSection {
    number: u32,
    has_freqs: bool,
    num_terms: u64,
    sum_total_term_freq: i64,
    sum_doc_freq: u64,
    doc_count: u32,
    aux_width: u32,
    fst_bytes: Vec<u8>,
}

/// Builds one term dictionary file across fields
pub struct TermDictWriter<'a> {
    field_infos: &'a FieldInfos,
    config: TermDictWriterConfig,
    sections: Vec<FieldSection>,
}

impl<'a> TermDictWriter<'a> {
    pub fn new(field_infos: &'a FieldInfos, config: TermDictWriterConfig) -> Self {
        Self {
            field_infos,
            config,
            sections: Vec::new(),
        }
    }

    /// Ingest one field's terms, sorted ascending and unique.
    ///
    /// `doc_count` is the number of documents with at least one term in this
    /// field; the indexing chain supplies it since term-level sums cannot
    /// derive it. `aux_width` is the postings codec's auxiliary long count
    /// and every term must carry exactly that many.
    pub fn add_field<I>(
        &mut self,
        field_name: &str,
        doc_count: u32,
        aux_width: u32,
        terms: I,
    ) -> Result<()>
    where
        I: IntoIterator<Item = (Vec<u8>, TermMeta)>,
    {
        let info = self.field_infos.by_name(field_name).ok_or_else(|| {
            Error::InvalidArgument(format!("unknown field: {}", field_name))
        })?;
        if self.sections.iter().any(|s| s.number == info.number) {
            return Err(Error::InvalidArgument(format!(
                "field {} written twice",
                field_name
            )));
        }

        let outputs = TermMetaOutputs::new(aux_width, info.has_freqs);
        let mut builder = TrieBuilder::new(outputs);
        let mut sum_doc_freq = 0u64;
        let mut sum_total_term_freq = 0i64;

        for (term, meta) in terms {
            if meta.aux.len() != aux_width as usize {
                return Err(Error::InvalidArgument(format!(
                    "term {:?} carries {} auxiliary longs, field expects {}",
                    term,
                    meta.aux.len(),
                    aux_width
                )));
            }
            if meta.doc_freq == 0 {
                return Err(Error::InvalidArgument(format!(
                    "term {:?} has zero doc_freq",
                    term
                )));
            }
            if info.has_freqs {
                if meta.total_term_freq < meta.doc_freq as i64 {
                    return Err(Error::InvalidArgument(format!(
                        "term {:?} total_term_freq {} below doc_freq {}",
                        term, meta.total_term_freq, meta.doc_freq
                    )));
                }
                sum_total_term_freq += meta.total_term_freq;
            } else if meta.total_term_freq != UNTRACKED_TERM_FREQ {
                return Err(Error::InvalidArgument(format!(
                    "term {:?} carries a total_term_freq but field {} does not track frequencies",
                    term, field_name
                )));
            }
            sum_doc_freq += meta.doc_freq as u64;

            builder.insert(&term, meta)?;
        }

        if sum_doc_freq < doc_count as u64 {
            return Err(Error::InvalidArgument(format!(
                "field {}: sum_doc_freq {} below doc_count {}",
                field_name, sum_doc_freq, doc_count
            )));
        }

        let num_terms = builder.num_terms();
        let fst_bytes = builder.into_bytes(self.config.share_outputs);

        self.sections.push(FieldSection {
            number: info.number,
            has_freqs: info.has_freqs,
            num_terms,
            sum_total_term_freq: if info.has_freqs {
                sum_total_term_freq
            } else {
                UNTRACKED_TERM_FREQ
            },
            sum_doc_freq,
            doc_count,
            aux_width,
            fst_bytes,
        });
        Ok(())
    }

    pub fn num_fields(&self) -> usize {
        self.sections.len()
    }

    /// Assemble the dictionary file bytes.
    pub fn finish(self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.write_u32::<LittleEndian>(TERM_DICT_MAGIC)?;

        let directory_offset = out.len() as u64;
        write_vint(&mut out, self.sections.len() as u64);
        for section in &self.sections {
            write_vint(&mut out, section.number as u64);
            write_vint(&mut out, section.num_terms);
            if section.has_freqs {
                write_vint(&mut out, section.sum_total_term_freq as u64);
            }
            write_vint(&mut out, section.sum_doc_freq);
            write_vint(&mut out, section.doc_count as u64);
            write_vint(&mut out, section.aux_width as u64);
            out.write_all(&section.fst_bytes)?;
        }

        out.write_u64::<LittleEndian>(directory_offset)?;
        Ok(out)
    }
}
