//! Integration tests for the segment term dictionary

mod corruption;

use std::collections::HashSet;
use std::sync::Arc;

use crate::directories::{FileSlice, OwnedBytes};
use crate::error::Result;
use crate::segment::{
    FieldInfo, FieldInfos, FieldTerms, RamPostingsReader, TermDictWriter, TermDictWriterConfig,
    TermDictionary, TermMeta,
};
use crate::structures::automaton::Automaton;

pub(crate) const FIELD: &str = "body";
pub(crate) const MAX_DOC: u32 = 1000;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub(crate) fn field_infos() -> FieldInfos {
    FieldInfos::new(vec![FieldInfo::new(0, FIELD, true)]).unwrap()
}

/// A built dictionary over one freq-tracking field, postings resident in a
/// `RamPostingsReader`, plus the inputs for brute-force comparison.
pub(crate) struct Fixture {
    pub dict: TermDictionary,
    pub terms: Vec<Vec<u8>>,
    pub metas: Vec<TermMeta>,
}

impl Fixture {
    pub fn field(&self) -> &FieldTerms {
        self.dict.field(FIELD).unwrap()
    }

    /// Every term in order, via the sequential enumerator.
    pub fn sequential_terms(&self) -> Vec<Vec<u8>> {
        let mut iter = self.field().iterator();
        let mut out = Vec::new();
        while let Some(term) = iter.next() {
            out.push(term.to_vec());
        }
        out
    }
}

/// Deterministic per-term statistics: term `i` gets `i % 3 + 1` documents,
/// a posting slot in its first auxiliary long, and (every fourth term) a
/// trailing blob.
pub(crate) fn build_fixture(terms: &[&[u8]], share_outputs: bool) -> Fixture {
    init_logs();
    let infos = field_infos();
    let mut postings = RamPostingsReader::new();
    let mut entries = Vec::new();
    let mut metas = Vec::new();
    let mut sum_doc_freq = 0u64;

    for (i, term) in terms.iter().enumerate() {
        let doc_freq = (i % 3 + 1) as u32;
        let mut docs = Vec::new();
        let mut total_term_freq = 0i64;
        for j in 0..doc_freq {
            let freq = 1 + (j % 2);
            docs.push((i as u32 * 10 + j * 3, freq));
            total_term_freq += freq as i64;
        }
        sum_doc_freq += doc_freq as u64;

        let slot = postings.add_list(docs);
        let trailing = if i % 4 == 0 {
            vec![b'x', i as u8]
        } else {
            Vec::new()
        };
        let meta = TermMeta::new(doc_freq, total_term_freq, vec![slot], trailing);
        metas.push(meta.clone());
        entries.push((term.to_vec(), meta));
    }

    let doc_count = sum_doc_freq.min(100) as u32;
    let mut writer = TermDictWriter::new(&infos, TermDictWriterConfig { share_outputs });
    writer.add_field(FIELD, doc_count, 1, entries).unwrap();
    let bytes = writer.finish().unwrap();

    let slice = FileSlice::new(OwnedBytes::new(bytes));
    let dict = TermDictionary::open(&slice, &infos, Arc::new(postings), MAX_DOC).unwrap();
    Fixture {
        dict,
        terms: terms.iter().map(|t| t.to_vec()).collect(),
        metas,
    }
}

pub(crate) fn open_bytes(bytes: Vec<u8>, infos: &FieldInfos) -> Result<TermDictionary> {
    init_logs();
    let slice = FileSlice::new(OwnedBytes::new(bytes));
    TermDictionary::open(&slice, infos, Arc::new(RamPostingsReader::new()), MAX_DOC)
}

/// Acceptor for an explicit finite set of byte strings; states are indexes
/// into the sorted list of all prefixes of the set.
pub(crate) struct SetAutomaton {
    prefixes: Vec<Vec<u8>>,
    terms: HashSet<Vec<u8>>,
}

impl SetAutomaton {
    pub fn new(terms: &[&[u8]]) -> Self {
        let mut prefixes: Vec<Vec<u8>> = vec![Vec::new()];
        for term in terms {
            for len in 1..=term.len() {
                prefixes.push(term[..len].to_vec());
            }
        }
        prefixes.sort();
        prefixes.dedup();
        Self {
            prefixes,
            terms: terms.iter().map(|t| t.to_vec()).collect(),
        }
    }
}

impl Automaton for SetAutomaton {
    fn start(&self) -> u32 {
        self.prefixes.binary_search(&Vec::new()).unwrap() as u32
    }

    fn accept(&self, state: u32, byte: u8) -> Option<u32> {
        let mut next = self.prefixes[state as usize].clone();
        next.push(byte);
        self.prefixes
            .binary_search(&next)
            .ok()
            .map(|idx| idx as u32)
    }

    fn is_match(&self, state: u32) -> bool {
        self.terms.contains(&self.prefixes[state as usize])
    }
}
