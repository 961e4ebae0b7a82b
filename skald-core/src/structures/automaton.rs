//! Deterministic byte automatons for constrained term enumeration
//!
//! The query layer hands the dictionary a compiled, deterministic acceptor
//! over the byte alphabet. This module defines that contract plus `ByteDfa`,
//! a dense transition-table form with constructors for the common query
//! shapes. Full regex and fuzzy compilation live with the query compiler,
//! not here.

use rustc_hash::FxHashMap;

/// Deterministic acceptor over byte sequences.
///
/// States are opaque `u32` handles. `accept` returns `None` when the byte
/// leads to no live state; enumeration never descends past a `None`.
pub trait Automaton {
    fn start(&self) -> u32;

    fn accept(&self, state: u32, byte: u8) -> Option<u32>;

    fn is_match(&self, state: u32) -> bool;
}

impl<A: Automaton + ?Sized> Automaton for &A {
    fn start(&self) -> u32 {
        (**self).start()
    }

    fn accept(&self, state: u32, byte: u8) -> Option<u32> {
        (**self).accept(state, byte)
    }

    fn is_match(&self, state: u32) -> bool {
        (**self).is_match(state)
    }
}

const DEAD: u32 = u32::MAX;

/// Dense table DFA: 256 transitions per state.
#[derive(Debug, Clone)]
pub struct ByteDfa {
    /// `table[state * 256 + byte]`, `DEAD` marking absent transitions.
    table: Vec<u32>,
    matches: Vec<bool>,
}

impl ByteDfa {
    fn with_states(num_states: usize) -> Self {
        Self {
            table: vec![DEAD; num_states * 256],
            matches: vec![false; num_states],
        }
    }

    /// Accepts every byte sequence.
    pub fn any() -> Self {
        let mut dfa = Self::with_states(1);
        for byte in 0..256 {
            dfa.table[byte] = 0;
        }
        dfa.matches[0] = true;
        dfa
    }

    /// Accepts nothing at all.
    pub fn nothing() -> Self {
        Self::with_states(1)
    }

    /// Accepts exactly `bytes`.
    pub fn literal(bytes: &[u8]) -> Self {
        let mut dfa = Self::with_states(bytes.len() + 1);
        for (i, &b) in bytes.iter().enumerate() {
            dfa.table[i * 256 + b as usize] = i as u32 + 1;
        }
        dfa.matches[bytes.len()] = true;
        dfa
    }

    /// Accepts every sequence starting with `bytes` (including `bytes` itself).
    pub fn prefix(bytes: &[u8]) -> Self {
        let mut dfa = Self::literal(bytes);
        let last = bytes.len();
        for byte in 0..256 {
            dfa.table[last * 256 + byte] = last as u32;
        }
        dfa
    }

    /// Compile a glob-style pattern: `*` matches any run of bytes (possibly
    /// empty), `?` matches exactly one byte, everything else is literal.
    /// Built by subset construction over the obvious position NFA.
    pub fn wildcard(pattern: &[u8]) -> Self {
        #[derive(Clone, Copy, PartialEq)]
        enum Tok {
            Lit(u8),
            Any,
            Star,
        }

        let toks: Vec<Tok> = pattern
            .iter()
            .map(|&b| match b {
                b'*' => Tok::Star,
                b'?' => Tok::Any,
                other => Tok::Lit(other),
            })
            .collect();

        // Positions reachable without consuming a byte: a star position also
        // activates the position after it.
        let close = |set: &mut Vec<u16>| {
            let mut i = 0;
            while i < set.len() {
                let p = set[i] as usize;
                if p < toks.len() && toks[p] == Tok::Star {
                    let next = (p + 1) as u16;
                    if !set.contains(&next) {
                        set.push(next);
                    }
                }
                i += 1;
            }
            set.sort_unstable();
            set.dedup();
        };

        let mut start_set = vec![0u16];
        close(&mut start_set);

        let mut ids: FxHashMap<Vec<u16>, u32> = FxHashMap::default();
        let mut sets: Vec<Vec<u16>> = Vec::new();
        ids.insert(start_set.clone(), 0);
        sets.push(start_set);

        let mut table = Vec::new();
        let mut matches = Vec::new();
        let mut next_row = 0usize;

        while next_row < sets.len() {
            let set = sets[next_row].clone();
            matches.push(set.contains(&(toks.len() as u16)));

            for byte in 0..=255u8 {
                let mut out: Vec<u16> = Vec::new();
                for &p in &set {
                    let p = p as usize;
                    if p >= toks.len() {
                        continue;
                    }
                    match toks[p] {
                        Tok::Lit(l) if l == byte => out.push(p as u16 + 1),
                        Tok::Lit(_) => {}
                        Tok::Any => out.push(p as u16 + 1),
                        Tok::Star => out.push(p as u16),
                    }
                }
                close(&mut out);

                if out.is_empty() {
                    table.push(DEAD);
                } else if let Some(&id) = ids.get(&out) {
                    table.push(id);
                } else {
                    let id = sets.len() as u32;
                    ids.insert(out.clone(), id);
                    sets.push(out);
                    table.push(id);
                }
            }
            next_row += 1;
        }

        Self { table, matches }
    }

    pub fn num_states(&self) -> usize {
        self.matches.len()
    }
}

impl Automaton for ByteDfa {
    fn start(&self) -> u32 {
        0
    }

    fn accept(&self, state: u32, byte: u8) -> Option<u32> {
        let next = self.table[state as usize * 256 + byte as usize];
        if next == DEAD { None } else { Some(next) }
    }

    fn is_match(&self, state: u32) -> bool {
        self.matches[state as usize]
    }
}
