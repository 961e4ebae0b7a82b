//! Ordered term enumerator
//!
//! Walks one field's transducer in unsigned lexicographic order. The
//! enumerator owns its growable term buffer and accumulates path metadata as
//! it walks, so `doc_freq`/`total_term_freq` are available at every position
//! without touching the postings codec; the full codec decode is memoized
//! and happens at most once per position.

use roaring::RoaringBitmap;

use crate::error::{Error, Result};
use crate::structures::transducer::{NodeId, Outputs};

use super::metadata::TermMeta;
use super::postings::{DocIterator, TermState};
use super::term_dict::FieldTerms;

/// Outcome of a ceiling seek
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekStatus {
    /// Positioned exactly on the requested term
    Found,
    /// Requested term absent; positioned on the smallest greater term
    NotFound,
    /// No term at or above the requested term
    End,
}

#[derive(Debug, Clone, Copy)]
struct SeqFrame {
    node: NodeId,
    arc_idx: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum IterState {
    Unpositioned,
    /// Positioned on the empty term
    AtEmpty,
    /// Positioned on the final arc at the top of the stack
    AtFrame,
    /// Repositioned from a captured state; the transducer cursor is
    /// re-derived lazily by the following `next`
    Saved,
    Exhausted,
}

/// Sequential enumerator over one field's terms
pub struct TermIterator<'a> {
    field: &'a FieldTerms,
    stack: Vec<SeqFrame>,
    term: Vec<u8>,
    /// `accum[i]` is the combined output of the arcs in `stack[..=i]`.
    accum: Vec<TermMeta>,
    state: IterState,
    /// Full metadata of the current term (path value plus final output).
    current_meta: Option<TermMeta>,
    decoded: Option<TermState>,
}

impl<'a> TermIterator<'a> {
    pub(crate) fn new(field: &'a FieldTerms) -> Self {
        Self {
            field,
            stack: Vec::new(),
            term: Vec::new(),
            accum: Vec::new(),
            state: IterState::Unpositioned,
            current_meta: None,
            decoded: None,
        }
    }

    fn reset(&mut self) {
        self.stack.clear();
        self.term.clear();
        self.accum.clear();
        self.state = IterState::Unpositioned;
        self.current_meta = None;
        self.decoded = None;
    }

    fn push_arc(&mut self, node: NodeId, arc_idx: usize) {
        let outputs = self.field.fst.outputs();
        let arc = self.field.fst.arc(node, arc_idx);
        let parent = match self.accum.last() {
            Some(acc) => acc.clone(),
            None => outputs.identity(),
        };
        self.accum.push(outputs.combine(&parent, &arc.output));
        self.term.push(arc.label);
        self.stack.push(SeqFrame { node, arc_idx });
    }

    fn pop_frame(&mut self) {
        self.stack.pop();
        self.term.pop();
        self.accum.pop();
    }

    /// Fix the current position on a final arc (or the empty term) and
    /// compute its full metadata.
    fn settle(&mut self, state: IterState) {
        self.state = state;
        self.decoded = None;
        let outputs = self.field.fst.outputs();
        self.current_meta = Some(match state {
            IterState::AtEmpty => self
                .field
                .fst
                .empty_output()
                .cloned()
                .unwrap_or_else(|| outputs.identity()),
            IterState::AtFrame => {
                let top = self.stack.last().expect("frame position without frames");
                let arc = self.field.fst.arc(top.node, top.arc_idx);
                let path = self.accum.last().expect("frame position without output");
                match &arc.final_output {
                    Some(extra) => outputs.combine(path, extra),
                    None => path.clone(),
                }
            }
            _ => unreachable!("settle on a non-positioned state"),
        });
    }

    /// Walk first arcs from `node` down to the nearest final arc.
    fn descend_min(&mut self, mut node: NodeId) {
        loop {
            let arc = self.field.fst.arc(node, 0);
            let (is_final, target) = (arc.is_final, arc.target);
            self.push_arc(node, 0);
            if is_final {
                self.settle(IterState::AtFrame);
                return;
            }
            node = target;
        }
    }

    /// Pop until a greater sibling exists, then descend to the smallest term
    /// through it. False when the whole field is exhausted.
    fn backtrack(&mut self) -> bool {
        while let Some(&SeqFrame { node, arc_idx }) = self.stack.last() {
            self.pop_frame();
            if arc_idx + 1 < self.field.fst.num_arcs(node) {
                let arc = self.field.fst.arc(node, arc_idx + 1);
                let (is_final, target) = (arc.is_final, arc.target);
                self.push_arc(node, arc_idx + 1);
                if is_final {
                    self.settle(IterState::AtFrame);
                } else {
                    self.descend_min(target);
                }
                return true;
            }
        }
        false
    }

    /// Advance to the next greater term.
    ///
    /// Returns `None` once the field is exhausted; exactly `num_terms`
    /// strictly increasing terms are produced overall.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<&[u8]> {
        match self.state {
            IterState::Exhausted => return None,
            IterState::Saved => {
                let target = std::mem::take(&mut self.term);
                match self.seek_ceil(&target) {
                    SeekStatus::Found => return self.next(),
                    SeekStatus::NotFound => {
                        debug_assert!(false, "saved state did not land on its term");
                        return Some(&self.term);
                    }
                    SeekStatus::End => return None,
                }
            }
            IterState::Unpositioned => {
                if self.field.fst.empty_output().is_some() {
                    self.settle(IterState::AtEmpty);
                    return Some(&self.term);
                }
                let root = self.field.fst.root();
                if self.field.fst.num_arcs(root) == 0 {
                    self.state = IterState::Exhausted;
                    return None;
                }
                self.descend_min(root);
                return Some(&self.term);
            }
            IterState::AtEmpty => {
                self.current_meta = None;
                self.decoded = None;
                let root = self.field.fst.root();
                if self.field.fst.num_arcs(root) == 0 {
                    self.state = IterState::Exhausted;
                    return None;
                }
                self.descend_min(root);
                return Some(&self.term);
            }
            IterState::AtFrame => {}
        }

        self.current_meta = None;
        self.decoded = None;
        let top = *self.stack.last().expect("frame position without frames");
        let arc = self.field.fst.arc(top.node, top.arc_idx);
        let target = arc.target;
        if self.field.fst.num_arcs(target) > 0 {
            self.descend_min(target);
            return Some(&self.term);
        }
        if self.backtrack() {
            Some(&self.term)
        } else {
            self.state = IterState::Exhausted;
            None
        }
    }

    /// Position exactly on `target` if it is in the dictionary.
    ///
    /// O(|target|) arc lookups; on a miss the enumerator is left
    /// unpositioned.
    pub fn seek_exact(&mut self, target: &[u8]) -> bool {
        self.reset();
        if target.is_empty() {
            if self.field.fst.empty_output().is_some() {
                self.settle(IterState::AtEmpty);
                return true;
            }
            return false;
        }

        let mut node = self.field.fst.root();
        for (i, &byte) in target.iter().enumerate() {
            let Some(idx) = self.field.fst.find_arc(node, byte) else {
                self.reset();
                return false;
            };
            let arc = self.field.fst.arc(node, idx);
            let (is_final, arc_target) = (arc.is_final, arc.target);
            self.push_arc(node, idx);
            if i == target.len() - 1 {
                if is_final {
                    self.settle(IterState::AtFrame);
                    return true;
                }
                self.reset();
                return false;
            }
            node = arc_target;
        }
        unreachable!("loop returns on the last byte")
    }

    /// Position on the smallest term >= `target`.
    pub fn seek_ceil(&mut self, target: &[u8]) -> SeekStatus {
        self.reset();
        if target.is_empty() {
            if self.field.fst.empty_output().is_some() {
                self.settle(IterState::AtEmpty);
                return SeekStatus::Found;
            }
            let root = self.field.fst.root();
            if self.field.fst.num_arcs(root) == 0 {
                self.state = IterState::Exhausted;
                return SeekStatus::End;
            }
            self.descend_min(root);
            return SeekStatus::NotFound;
        }

        let mut node = self.field.fst.root();
        for (i, &byte) in target.iter().enumerate() {
            let Some(idx) = self.field.fst.ceil_arc(node, byte) else {
                return if self.backtrack() {
                    SeekStatus::NotFound
                } else {
                    self.state = IterState::Exhausted;
                    SeekStatus::End
                };
            };

            let arc = self.field.fst.arc(node, idx);
            let (label, is_final, arc_target) = (arc.label, arc.is_final, arc.target);
            self.push_arc(node, idx);

            if label > byte {
                if is_final {
                    self.settle(IterState::AtFrame);
                } else {
                    self.descend_min(arc_target);
                }
                return SeekStatus::NotFound;
            }

            if i == target.len() - 1 {
                if is_final {
                    self.settle(IterState::AtFrame);
                    return SeekStatus::Found;
                }
                // target is a proper prefix of everything below this arc
                self.descend_min(arc_target);
                return SeekStatus::NotFound;
            }
            node = arc_target;
        }
        unreachable!("loop returns on the last byte")
    }

    /// Reposition from a previously captured `TermState` without walking the
    /// transducer. The cursor is re-derived on the following `next`.
    pub fn seek_exact_state(&mut self, term: &[u8], state: TermState) {
        self.reset();
        self.term = term.to_vec();
        self.current_meta = None;
        self.decoded = Some(state);
        self.state = IterState::Saved;
    }

    /// Current term; `None` unless positioned.
    pub fn term(&self) -> Option<&[u8]> {
        match self.state {
            IterState::AtEmpty | IterState::AtFrame | IterState::Saved => Some(&self.term),
            _ => None,
        }
    }

    /// Document frequency of the current term.
    pub fn doc_freq(&self) -> Option<u32> {
        match self.state {
            IterState::Saved => self.decoded.as_ref().map(|s| s.doc_freq),
            _ => self.current_meta.as_ref().map(|m| m.doc_freq),
        }
    }

    /// Total occurrences of the current term, `UNTRACKED_TERM_FREQ` when the
    /// field does not track frequencies.
    pub fn total_term_freq(&self) -> Option<i64> {
        match self.state {
            IterState::Saved => self.decoded.as_ref().map(|s| s.total_term_freq),
            _ => self.current_meta.as_ref().map(|m| m.total_term_freq),
        }
    }

    /// Decoded postings state for the current term, computed at most once
    /// per position.
    pub fn term_state(&mut self) -> Result<TermState> {
        if let Some(state) = &self.decoded {
            return Ok(state.clone());
        }
        let meta = self.current_meta.as_ref().ok_or_else(|| {
            Error::InvalidArgument("enumerator is not positioned on a term".to_string())
        })?;
        let state = self.field.postings.decode_term(&self.field.info, meta)?;
        self.decoded = Some(state.clone());
        Ok(state)
    }

    /// Documents containing the current term.
    pub fn postings(&mut self, live_docs: Option<&RoaringBitmap>) -> Result<Box<dyn DocIterator>> {
        let state = self.term_state()?;
        self.field.postings.docs(&self.field.info, &state, live_docs)
    }

    /// Term ordinals are not tracked by this dictionary.
    pub fn ord(&self) -> Result<u64> {
        Err(Error::UnsupportedOperation(
            "transducer term dictionaries do not track ordinals",
        ))
    }

    /// Term ordinals are not tracked by this dictionary.
    pub fn seek_ord(&mut self, _ord: u64) -> Result<()> {
        Err(Error::UnsupportedOperation(
            "transducer term dictionaries do not track ordinals",
        ))
    }
}
