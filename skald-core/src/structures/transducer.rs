//! Byte-keyed acyclic transducer
//!
//! The term index for one field is a byte-labeled DAG: every arc carries a
//! partial output value, and the full value for a term is the monoid
//! combination of the outputs along its path (plus the deepest arc's final
//! output). The structure is deserialized once per segment open, validated
//! eagerly, and kept resident; all traversal state lives in the enumerators.
//!
//! Storage is an arena: one flat arc vector plus per-node offsets, so a
//! traversal position is just a `(node, arc index)` pair and arcs within a
//! node support binary search for exact and ceiling lookups.

use std::fmt;

use crate::error::{Error, Result};

/// Node handle into the arc arena. The root is always node 0.
pub type NodeId = u32;

pub(crate) const SECTION_FLAG_EMPTY_OUTPUT: u8 = 1;

pub(crate) const ARC_FLAG_FINAL: u8 = 1;
pub(crate) const ARC_FLAG_FINAL_OUTPUT: u8 = 2;
const ARC_FLAG_MASK: u8 = ARC_FLAG_FINAL | ARC_FLAG_FINAL_OUTPUT;

/// Write a LEB128 variable-length integer
pub fn write_vint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Read a LEB128 variable-length integer
///
/// Truncated or overlong input is a corruption at this layer: varints are
/// only ever read out of validated segment sections.
pub fn read_vint(reader: &mut &[u8]) -> Result<u64> {
    let mut result = 0u64;
    let mut shift = 0;

    loop {
        let Some((&byte, rest)) = reader.split_first() else {
            return Err(Error::Corruption("truncated varint".to_string()));
        };
        *reader = rest;
        result |= ((byte & 0x7F) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift >= 64 {
            return Err(Error::Corruption("varint too long".to_string()));
        }
    }
}

pub(crate) fn read_u8(reader: &mut &[u8]) -> Result<u8> {
    let Some((&byte, rest)) = reader.split_first() else {
        return Err(Error::Corruption("unexpected end of data".to_string()));
    };
    *reader = rest;
    Ok(byte)
}

/// Output value algebra attached to a transducer.
///
/// `combine` is the path accumulation: `a` is the value contributed by a
/// path prefix, `b` by the remaining suffix, and the result is the value
/// visible at the end of the full path. It must be associative; it is not
/// required to be commutative. `prefix`/`subtract` are the write-path
/// sharing operations: `combine(&prefix(a, b), &subtract(a, &prefix(a, b)))`
/// must reconstruct `a`.
///
/// One codec instance is injected per field (auxiliary widths differ), so
/// every operation takes `&self`.
pub trait Outputs: Send + Sync {
    type Value: Clone + fmt::Debug + PartialEq + Send + Sync;

    /// Value with no contribution: `combine(identity, x) == x`.
    fn identity(&self) -> Self::Value;

    /// Accumulate a suffix contribution onto a prefix contribution.
    fn combine(&self, prefix: &Self::Value, suffix: &Self::Value) -> Self::Value;

    /// Largest contribution shared by both values (write-path pushing).
    fn prefix(&self, a: &Self::Value, b: &Self::Value) -> Self::Value;

    /// Remainder of `a` once a shared contribution is factored out.
    fn subtract(&self, a: &Self::Value, shared: &Self::Value) -> Self::Value;

    fn read(&self, reader: &mut &[u8]) -> Result<Self::Value>;

    fn write(&self, value: &Self::Value, out: &mut Vec<u8>);

    /// Heap bytes held by `value`, for resident-size reporting.
    fn approx_ram(&self, value: &Self::Value) -> usize;
}

/// One labeled arc out of a node
#[derive(Debug, Clone)]
pub struct Transition<V> {
    pub label: u8,
    pub target: NodeId,
    /// The path ending with this arc is a complete term.
    pub is_final: bool,
    /// Partial output contributed by traversing this arc.
    pub output: V,
    /// Extra output contributed when the path stops here; only on final arcs.
    pub final_output: Option<V>,
}

/// Immutable arc graph for one field, arena-backed.
pub struct Transducer<O: Outputs> {
    outputs: O,
    /// All arcs, grouped by node; node `i` owns `arcs[starts[i]..starts[i + 1]]`.
    arcs: Vec<Transition<O::Value>>,
    starts: Vec<u32>,
    /// Present when the empty term is in the dictionary.
    empty_output: Option<O::Value>,
    term_count: u64,
    ram_bytes: usize,
}

impl<O: Outputs> std::fmt::Debug for Transducer<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transducer")
            .field("num_arcs", &self.arcs.len())
            .field("term_count", &self.term_count)
            .field("ram_bytes", &self.ram_bytes)
            .finish()
    }
}

impl<O: Outputs> Transducer<O> {
    /// Deserialize one transducer section, advancing `reader` past it.
    ///
    /// All structural invariants are checked here, unconditionally: strictly
    /// ascending labels per node, topologically ordered in-bounds targets
    /// (which also guarantees acyclicity and bounded traversals), arc-count
    /// agreement, and no non-final arc into a leaf node. Any violation is an
    /// `Error::Corruption` and aborts the segment open.
    pub fn from_bytes(reader: &mut &[u8], outputs: O) -> Result<Self> {
        let section_len = read_vint(reader)? as usize;
        if section_len > reader.len() {
            return Err(Error::Corruption(format!(
                "transducer section length {} exceeds remaining {} bytes",
                section_len,
                reader.len()
            )));
        }
        let mut section = &reader[..section_len];
        *reader = &reader[section_len..];

        let flags = read_u8(&mut section)?;
        if flags & !SECTION_FLAG_EMPTY_OUTPUT != 0 {
            return Err(Error::Corruption(format!(
                "unknown transducer section flags: 0x{:02X}",
                flags
            )));
        }
        let empty_output = if flags & SECTION_FLAG_EMPTY_OUTPUT != 0 {
            Some(outputs.read(&mut section)?)
        } else {
            None
        };

        let num_nodes = read_vint(&mut section)? as usize;
        if num_nodes == 0 || num_nodes > u32::MAX as usize {
            return Err(Error::Corruption(format!(
                "invalid transducer node count: {}",
                num_nodes
            )));
        }
        let num_arcs = read_vint(&mut section)? as usize;
        if num_arcs > u32::MAX as usize {
            return Err(Error::Corruption(format!(
                "invalid transducer arc count: {}",
                num_arcs
            )));
        }

        let mut arcs: Vec<Transition<O::Value>> = Vec::with_capacity(num_arcs);
        let mut starts: Vec<u32> = Vec::with_capacity(num_nodes + 1);
        let mut term_count = if empty_output.is_some() { 1u64 } else { 0 };

        for node in 0..num_nodes {
            starts.push(arcs.len() as u32);
            let arc_count = read_vint(&mut section)? as usize;
            let mut prev_label: Option<u8> = None;

            for _ in 0..arc_count {
                let label = read_u8(&mut section)?;
                if let Some(prev) = prev_label {
                    if label <= prev {
                        return Err(Error::Corruption(format!(
                            "arc labels out of order at node {}: {} after {}",
                            node, label, prev
                        )));
                    }
                }
                prev_label = Some(label);

                let arc_flags = read_u8(&mut section)?;
                if arc_flags & !ARC_FLAG_MASK != 0 {
                    return Err(Error::Corruption(format!(
                        "unknown arc flags 0x{:02X} at node {}",
                        arc_flags, node
                    )));
                }
                let is_final = arc_flags & ARC_FLAG_FINAL != 0;
                if arc_flags & ARC_FLAG_FINAL_OUTPUT != 0 && !is_final {
                    return Err(Error::Corruption(format!(
                        "final output on non-final arc at node {}",
                        node
                    )));
                }

                let target = read_vint(&mut section)?;
                if target <= node as u64 || target >= num_nodes as u64 {
                    return Err(Error::Corruption(format!(
                        "arc target {} out of bounds at node {} ({} nodes)",
                        target, node, num_nodes
                    )));
                }

                let output = outputs.read(&mut section)?;
                let final_output = if arc_flags & ARC_FLAG_FINAL_OUTPUT != 0 {
                    Some(outputs.read(&mut section)?)
                } else {
                    None
                };

                if is_final {
                    term_count += 1;
                }
                arcs.push(Transition {
                    label,
                    target: target as NodeId,
                    is_final,
                    output,
                    final_output,
                });
            }
        }
        starts.push(arcs.len() as u32);

        if arcs.len() != num_arcs {
            return Err(Error::Corruption(format!(
                "transducer arc count mismatch: header says {}, nodes hold {}",
                num_arcs,
                arcs.len()
            )));
        }
        if !section.is_empty() {
            return Err(Error::Corruption(format!(
                "{} trailing bytes after transducer section",
                section.len()
            )));
        }

        // A path must never dead-end: an arc into a node with no outgoing
        // arcs has to terminate a term.
        for arc in &arcs {
            let t = arc.target as usize;
            if starts[t] == starts[t + 1] && !arc.is_final {
                return Err(Error::Corruption(format!(
                    "non-final arc into leaf node {}",
                    arc.target
                )));
            }
        }

        let mut ram_bytes = arcs.len() * std::mem::size_of::<Transition<O::Value>>()
            + starts.len() * std::mem::size_of::<u32>();
        for arc in &arcs {
            ram_bytes += outputs.approx_ram(&arc.output);
            if let Some(f) = &arc.final_output {
                ram_bytes += outputs.approx_ram(f);
            }
        }
        if let Some(e) = &empty_output {
            ram_bytes += outputs.approx_ram(e);
        }

        Ok(Self {
            outputs,
            arcs,
            starts,
            empty_output,
            term_count,
            ram_bytes,
        })
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn outputs(&self) -> &O {
        &self.outputs
    }

    pub fn num_nodes(&self) -> usize {
        self.starts.len() - 1
    }

    /// Number of complete terms (final arcs plus the empty term).
    pub fn term_count(&self) -> u64 {
        self.term_count
    }

    /// True when the transducer holds no terms at all.
    pub fn is_empty(&self) -> bool {
        self.term_count == 0
    }

    pub fn arcs(&self, node: NodeId) -> &[Transition<O::Value>] {
        let start = self.starts[node as usize] as usize;
        let end = self.starts[node as usize + 1] as usize;
        &self.arcs[start..end]
    }

    pub fn num_arcs(&self, node: NodeId) -> usize {
        self.arcs(node).len()
    }

    pub fn arc(&self, node: NodeId, idx: usize) -> &Transition<O::Value> {
        &self.arcs(node)[idx]
    }

    /// Index of the arc labeled exactly `label`, if present.
    pub fn find_arc(&self, node: NodeId, label: u8) -> Option<usize> {
        self.arcs(node)
            .binary_search_by_key(&label, |arc| arc.label)
            .ok()
    }

    /// Index of the smallest arc with label >= `label` (the ceiling arc).
    pub fn ceil_arc(&self, node: NodeId, label: u8) -> Option<usize> {
        let arcs = self.arcs(node);
        let idx = arcs.partition_point(|arc| arc.label < label);
        if idx < arcs.len() { Some(idx) } else { None }
    }

    /// Output contributed when the empty term is present.
    pub fn empty_output(&self) -> Option<&O::Value> {
        self.empty_output.as_ref()
    }

    /// Approximate resident size of this transducer.
    pub fn ram_bytes_used(&self) -> usize {
        self.ram_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// u64 sum outputs, enough to exercise the graph layer on its own.
    struct SumOutputs;

    impl Outputs for SumOutputs {
        type Value = u64;

        fn identity(&self) -> u64 {
            0
        }

        fn combine(&self, prefix: &u64, suffix: &u64) -> u64 {
            prefix + suffix
        }

        fn prefix(&self, a: &u64, b: &u64) -> u64 {
            *a.min(b)
        }

        fn subtract(&self, a: &u64, shared: &u64) -> u64 {
            a - shared
        }

        fn read(&self, reader: &mut &[u8]) -> Result<u64> {
            read_vint(reader)
        }

        fn write(&self, value: &u64, out: &mut Vec<u8>) {
            write_vint(out, *value);
        }

        fn approx_ram(&self, _value: &u64) -> usize {
            0
        }
    }

    fn write_arc(out: &mut Vec<u8>, label: u8, flags: u8, target: u64, output: u64) {
        out.push(label);
        out.push(flags);
        write_vint(out, target);
        write_vint(out, output);
    }

    /// Hand-built section: terms "ab" (output 3+4) and "b" (output 7).
    fn small_section() -> Vec<u8> {
        let mut body = Vec::new();
        body.push(0); // flags: no empty output
        write_vint(&mut body, 3); // nodes
        write_vint(&mut body, 3); // arcs
        // node 0: a -> 1 (out 3), b -> 2 (final, out 7)
        write_vint(&mut body, 2);
        write_arc(&mut body, b'a', 0, 1, 3);
        write_arc(&mut body, b'b', 1, 2, 7);
        // node 1: b -> 2 (final, out 4)
        write_vint(&mut body, 1);
        write_arc(&mut body, b'b', 1, 2, 4);
        // node 2: leaf
        write_vint(&mut body, 0);

        let mut section = Vec::new();
        write_vint(&mut section, body.len() as u64);
        section.extend_from_slice(&body);
        section
    }

    #[test]
    fn test_parse_and_lookup() {
        let bytes = small_section();
        let mut reader = bytes.as_slice();
        let fst = Transducer::from_bytes(&mut reader, SumOutputs).unwrap();
        assert!(reader.is_empty());

        assert_eq!(fst.num_nodes(), 3);
        assert_eq!(fst.term_count(), 2);
        assert_eq!(fst.num_arcs(fst.root()), 2);

        let a = fst.find_arc(0, b'a').unwrap();
        assert_eq!(fst.arc(0, a).target, 1);
        assert!(!fst.arc(0, a).is_final);

        let b = fst.find_arc(1, b'b').unwrap();
        assert!(fst.arc(1, b).is_final);
        assert_eq!(fst.arc(1, b).output, 4);

        assert!(fst.find_arc(0, b'c').is_none());
        assert_eq!(fst.ceil_arc(0, b'a'), Some(0));
        assert_eq!(fst.ceil_arc(0, b'b'), Some(1));
        assert_eq!(fst.ceil_arc(0, b'c'), None);
        assert!(fst.ram_bytes_used() > 0);
    }

    #[test]
    fn test_rejects_unsorted_labels() {
        let mut body = Vec::new();
        body.push(0);
        write_vint(&mut body, 2);
        write_vint(&mut body, 2);
        write_vint(&mut body, 2);
        write_arc(&mut body, b'b', 1, 1, 0);
        write_arc(&mut body, b'a', 1, 1, 0); // out of order
        write_vint(&mut body, 0);

        let mut section = Vec::new();
        write_vint(&mut section, body.len() as u64);
        section.extend_from_slice(&body);

        let mut reader = section.as_slice();
        let err = Transducer::from_bytes(&mut reader, SumOutputs).unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));
    }

    #[test]
    fn test_rejects_backward_target() {
        let mut body = Vec::new();
        body.push(0);
        write_vint(&mut body, 2);
        write_vint(&mut body, 1);
        write_vint(&mut body, 0); // node 0: no arcs
        write_vint(&mut body, 1); // node 1
        write_arc(&mut body, b'a', 1, 0, 0); // target 0 <= node 1

        let mut section = Vec::new();
        write_vint(&mut section, body.len() as u64);
        section.extend_from_slice(&body);

        let mut reader = section.as_slice();
        let err = Transducer::from_bytes(&mut reader, SumOutputs).unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));
    }

    #[test]
    fn test_rejects_dangling_path() {
        // node 0 --a--> node 1, not final, node 1 has no arcs
        let mut body = Vec::new();
        body.push(0);
        write_vint(&mut body, 2);
        write_vint(&mut body, 1);
        write_vint(&mut body, 1);
        write_arc(&mut body, b'a', 0, 1, 0);
        write_vint(&mut body, 0);

        let mut section = Vec::new();
        write_vint(&mut section, body.len() as u64);
        section.extend_from_slice(&body);

        let mut reader = section.as_slice();
        let err = Transducer::from_bytes(&mut reader, SumOutputs).unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));
    }

    #[test]
    fn test_rejects_truncation() {
        let bytes = small_section();
        for cut in 1..bytes.len() {
            let mut reader = &bytes[..cut];
            assert!(
                Transducer::from_bytes(&mut reader, SumOutputs).is_err(),
                "truncation at {} was accepted",
                cut
            );
        }
    }

    #[test]
    fn test_varint_roundtrip() {
        let values = [0u64, 1, 127, 128, 255, 16383, 16384, u64::MAX];
        for &v in &values {
            let mut buf = Vec::new();
            write_vint(&mut buf, v);
            let mut reader = buf.as_slice();
            assert_eq!(read_vint(&mut reader).unwrap(), v);
            assert!(reader.is_empty());
        }
    }
}
