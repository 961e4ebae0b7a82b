//! Segment-level term dictionary: reader, enumerators, and writer

mod field_infos;
mod intersect;
mod metadata;
mod postings;
mod term_dict;
mod term_iter;
mod writer;

pub use field_infos::{FieldInfo, FieldInfos};
pub use intersect::IntersectIterator;
pub use metadata::{TermMeta, TermMetaOutputs, UNTRACKED_TERM_FREQ};
pub use postings::{
    DocIterator, Posting, PostingsReader, RamPostingsReader, TermState, TERMINATED,
};
pub use term_dict::{FieldTerms, TermDictionary};
pub use term_iter::{SeekStatus, TermIterator};
pub use writer::{TermDictWriter, TermDictWriterConfig, TERM_DICT_MAGIC};

#[cfg(test)]
mod tests;
