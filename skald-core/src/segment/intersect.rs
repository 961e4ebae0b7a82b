//! Automaton-constrained term enumeration
//!
//! Enumerates, strictly ascending, exactly the terms that are both stored in
//! the field's transducer and accepted by a caller-supplied deterministic
//! automaton. The walk is a DFS over frames pairing an arc cursor with the
//! automaton state reached by consuming that arc's label; a subtree the
//! automaton rejects is never entered, so cost is bounded by the
//! automaton-compatible portion of the dictionary rather than its size.
//!
//! Metadata is accumulated lazily: `meta_upto` tracks the deepest level whose
//! path value is already combined, so terms sharing a prefix share the
//! accumulation work. Every pop clamps `meta_upto` back so stale deeper
//! values are never reused.

use roaring::RoaringBitmap;

use crate::error::{Error, Result};
use crate::structures::automaton::Automaton;
use crate::structures::transducer::{NodeId, Outputs};

use super::metadata::TermMeta;
use super::postings::{DocIterator, TermState};
use super::term_dict::FieldTerms;

/// Marker for the virtual root frame, which consumed no arc.
const NO_NODE: NodeId = NodeId::MAX;

/// One level of the traversal: arc `arc_idx` of `node`, plus the automaton
/// state after consuming that arc's label.
#[derive(Debug, Clone, Copy)]
struct Frame {
    node: NodeId,
    arc_idx: u32,
    state: u32,
}

enum Landing {
    /// Every target byte matched an arc exactly
    Exact,
    /// Stopped on the smallest live path greater than the consumed prefix
    Larger,
    /// No stored term at or above the target survives the automaton
    End,
}

/// Enumerator over the intersection of a field's terms with an automaton
pub struct IntersectIterator<'a, A: Automaton> {
    field: &'a FieldTerms,
    automaton: A,
    /// `stack[0]` is the virtual root (start state, empty term); the term
    /// length always equals `stack.len() - 1`.
    stack: Vec<Frame>,
    term: Vec<u8>,
    /// `accum[i]` combines the arc outputs of `stack[1..=i]`; only indexes
    /// up to `meta_upto` are valid.
    accum: Vec<TermMeta>,
    meta_upto: usize,
    /// An accepted term is already on the stack, ready to be returned.
    pending: bool,
    exhausted: bool,
    current_meta: Option<TermMeta>,
    decoded: Option<TermState>,
}

impl<'a, A: Automaton> IntersectIterator<'a, A> {
    pub(crate) fn new(field: &'a FieldTerms, automaton: A, start_term: Option<&[u8]>) -> Self {
        let start_state = automaton.start();
        let identity = field.fst.outputs().identity();
        let mut iter = Self {
            field,
            automaton,
            stack: vec![Frame {
                node: NO_NODE,
                arc_idx: 0,
                state: start_state,
            }],
            term: Vec::new(),
            accum: vec![identity],
            meta_upto: 0,
            pending: false,
            exhausted: false,
            current_meta: None,
            decoded: None,
        };

        if iter.field.fst.is_empty() {
            iter.exhausted = true;
            return iter;
        }
        match start_term {
            None => {
                iter.pending = iter.is_accept_top();
            }
            Some(target) => match iter.do_seek_ceil(target) {
                Landing::End => iter.exhausted = true,
                // An exact landing is only surfaced by an explicit seek;
                // the first `next` moves strictly past it.
                Landing::Exact => {}
                Landing::Larger => {
                    iter.pending = iter.is_accept_top();
                }
            },
        }
        iter
    }

    /// Node the top frame's arc points into (the root node for the virtual
    /// root frame).
    fn target_of(&self, frame: &Frame) -> NodeId {
        if frame.node == NO_NODE {
            self.field.fst.root()
        } else {
            self.field.fst.arc(frame.node, frame.arc_idx as usize).target
        }
    }

    /// Both machines agree the current path is a complete term.
    fn is_accept_top(&self) -> bool {
        let top = self.stack.last().expect("virtual root is never popped");
        if !self.automaton.is_match(top.state) {
            return false;
        }
        if top.node == NO_NODE {
            self.field.fst.empty_output().is_some()
        } else {
            self.field.fst.arc(top.node, top.arc_idx as usize).is_final
        }
    }

    /// Smallest arc of `node` at or after `from_idx` whose label the
    /// automaton accepts out of `parent_state`. Never yields a dead frame.
    fn first_accepted(&self, node: NodeId, parent_state: u32, from_idx: usize) -> Option<Frame> {
        let arcs = self.field.fst.arcs(node);
        for (offset, arc) in arcs[from_idx..].iter().enumerate() {
            if let Some(state) = self.automaton.accept(parent_state, arc.label) {
                return Some(Frame {
                    node,
                    arc_idx: (from_idx + offset) as u32,
                    state,
                });
            }
        }
        None
    }

    fn push(&mut self, frame: Frame) {
        let label = self.field.fst.arc(frame.node, frame.arc_idx as usize).label;
        self.term.push(label);
        self.stack.push(frame);
    }

    fn pop(&mut self) -> Frame {
        let frame = self.stack.pop().expect("virtual root is never popped");
        self.term.pop();
        let level = self.stack.len() - 1;
        if self.meta_upto > level {
            self.meta_upto = level;
            self.accum.truncate(self.meta_upto + 1);
        }
        frame
    }

    /// Pop until some popped frame has a live greater sibling, pushing that
    /// sibling. False when the stack collapses to the virtual root.
    fn climb(&mut self) -> bool {
        loop {
            if self.stack.len() == 1 {
                return false;
            }
            let popped = self.pop();
            let parent_state = self.stack.last().expect("root frame present").state;
            if let Some(frame) =
                self.first_accepted(popped.node, parent_state, popped.arc_idx as usize + 1)
            {
                self.push(frame);
                return true;
            }
        }
    }

    /// Consume `target` byte by byte through ceiling frames.
    fn do_seek_ceil(&mut self, target: &[u8]) -> Landing {
        for &byte in target {
            let top = *self.stack.last().expect("root frame present");
            let node = self.target_of(&top);
            let frame = self
                .field
                .fst
                .ceil_arc(node, byte)
                .and_then(|idx| self.first_accepted(node, top.state, idx));

            match frame {
                Some(frame) => {
                    let label = self.field.fst.arc(frame.node, frame.arc_idx as usize).label;
                    self.push(frame);
                    if label != byte {
                        return Landing::Larger;
                    }
                }
                None => {
                    // Nothing >= byte survives at this depth; rewind.
                    return if self.climb() {
                        Landing::Larger
                    } else {
                        Landing::End
                    };
                }
            }
        }
        Landing::Exact
    }

    /// Combine arc outputs from the deepest already-computed level down to
    /// the current one, then fix the full value for the accepted term.
    fn load_metadata(&mut self) {
        let outputs = self.field.fst.outputs();
        let level = self.stack.len() - 1;
        while self.meta_upto < level {
            let i = self.meta_upto + 1;
            let frame = self.stack[i];
            let arc = self.field.fst.arc(frame.node, frame.arc_idx as usize);
            let combined = outputs.combine(&self.accum[i - 1], &arc.output);
            self.accum.push(combined);
            self.meta_upto = i;
        }

        let full = if level == 0 {
            self.field
                .fst
                .empty_output()
                .cloned()
                .unwrap_or_else(|| outputs.identity())
        } else {
            let top = self.stack[level];
            let arc = self.field.fst.arc(top.node, top.arc_idx as usize);
            match &arc.final_output {
                Some(extra) => outputs.combine(&self.accum[level], extra),
                None => self.accum[level].clone(),
            }
        };
        self.current_meta = Some(full);
        self.decoded = None;
    }

    /// Advance to the next accepted term, strictly ascending.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<&[u8]> {
        if self.exhausted {
            return None;
        }
        if self.pending {
            self.pending = false;
            self.load_metadata();
            return Some(&self.term);
        }
        self.current_meta = None;
        self.decoded = None;

        loop {
            let top = *self.stack.last().expect("root frame present");
            let node = self.target_of(&top);
            if let Some(frame) = self.first_accepted(node, top.state, 0) {
                self.push(frame);
                if self.is_accept_top() {
                    self.load_metadata();
                    return Some(&self.term);
                }
                continue;
            }

            if !self.climb() {
                self.exhausted = true;
                return None;
            }
            if self.is_accept_top() {
                self.load_metadata();
                return Some(&self.term);
            }
        }
    }

    /// Current term; `None` until `next` has returned one.
    pub fn term(&self) -> Option<&[u8]> {
        self.current_meta.as_ref().map(|_| self.term.as_slice())
    }

    /// Document frequency of the current term.
    pub fn doc_freq(&self) -> Option<u32> {
        self.current_meta.as_ref().map(|m| m.doc_freq)
    }

    /// Total occurrences of the current term, `UNTRACKED_TERM_FREQ` when the
    /// field does not track frequencies.
    pub fn total_term_freq(&self) -> Option<i64> {
        self.current_meta.as_ref().map(|m| m.total_term_freq)
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
