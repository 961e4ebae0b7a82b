//! Core data structures for the term index

pub mod automaton;
pub mod transducer;
pub mod trie_builder;

pub use automaton::{Automaton, ByteDfa};
pub use transducer::{read_vint, write_vint, NodeId, Outputs, Transducer, Transition};
pub use trie_builder::TrieBuilder;
