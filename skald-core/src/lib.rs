//! Skald - segment term dictionary core
//!
//! The memory-resident term dictionary of a search segment:
//! - Transducer-backed term index mapping every unique term to its
//!   statistics and postings metadata
//! - Sequential enumeration with exact and ceiling seeks
//! - Automaton intersection for wildcard/regex/fuzzy/prefix-style queries,
//!   bounded by the automaton-compatible portion of the dictionary
//! - Monoid metadata accumulation along shared term prefixes
//! - Write-path builder producing the on-disk dictionary format

pub mod directories;
pub mod error;
pub mod segment;
pub mod structures;

pub use error::{Error, Result};

// Re-exports from directories
pub use directories::{FileSlice, OwnedBytes};

// Re-exports from structures
pub use structures::{Automaton, ByteDfa, Outputs, Transducer, Transition};

// Re-exports from segment
pub use segment::{
    DocIterator, FieldInfo, FieldInfos, FieldTerms, IntersectIterator, PostingsReader,
    RamPostingsReader, SeekStatus, TermDictWriter, TermDictWriterConfig, TermDictionary,
    TermIterator, TermMeta, TermMetaOutputs, TermState, TERMINATED, UNTRACKED_TERM_FREQ,
};

/// Document identifier within a segment
pub type DocId = u32;
