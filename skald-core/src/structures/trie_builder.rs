//! Write-path builder for the transducer wire format
//!
//! Terms go in sorted and unique; the builder grows a shared-prefix trie,
//! optionally pushes output contributions up onto shared arcs, and emits the
//! section format that `Transducer::from_bytes` consumes. Node ids are
//! assigned breadth-first so every arc target is greater than its source,
//! which is the topological invariant the reader validates.
//!
//! There is no suffix sharing or node minimization here; terms for one
//! segment field fit a plain trie and the reader does not care which
//! construction produced the bytes.

use crate::error::{Error, Result};

use super::transducer::{
    write_vint, Outputs, ARC_FLAG_FINAL, ARC_FLAG_FINAL_OUTPUT, SECTION_FLAG_EMPTY_OUTPUT,
};

struct TrieEdge<V> {
    label: u8,
    child: u32,
    output: V,
}

struct TrieNode<V> {
    edges: Vec<TrieEdge<V>>,
    /// Full (or residual, after pushing) value of the term ending here.
    terminal: Option<V>,
}

impl<V> TrieNode<V> {
    fn new() -> Self {
        Self {
            edges: Vec::new(),
            terminal: None,
        }
    }
}

/// Builds transducer bytes from sorted unique `(term, value)` pairs.
pub struct TrieBuilder<O: Outputs> {
    outputs: O,
    nodes: Vec<TrieNode<O::Value>>,
    last_term: Option<Vec<u8>>,
    num_terms: u64,
}

impl<O: Outputs> TrieBuilder<O> {
    pub fn new(outputs: O) -> Self {
        Self {
            outputs,
            nodes: vec![TrieNode::new()],
            last_term: None,
            num_terms: 0,
        }
    }

    pub fn num_terms(&self) -> u64 {
        self.num_terms
    }

    /// Insert the next term. Terms must arrive in strictly ascending
    /// unsigned-lexicographic order.
    pub fn insert(&mut self, term: &[u8], value: O::Value) -> Result<()> {
        if let Some(last) = &self.last_term {
            if term <= last.as_slice() {
                return Err(Error::InvalidArgument(format!(
                    "terms out of order: {:?} after {:?}",
                    term, last
                )));
            }
        }

        let mut node = 0usize;
        for &label in term {
            let next = match self.nodes[node].edges.last() {
                Some(edge) if edge.label == label => edge.child as usize,
                _ => {
                    let child = self.nodes.len() as u32;
                    self.nodes.push(TrieNode::new());
                    self.nodes[node].edges.push(TrieEdge {
                        label,
                        child,
                        output: self.outputs.identity(),
                    });
                    child as usize
                }
            };
            node = next;
        }

        self.nodes[node].terminal = Some(value);
        self.last_term = Some(term.to_vec());
        self.num_terms += 1;
        Ok(())
    }

    /// Serialize into the wire section (length-prefixed).
    ///
    /// With `share_outputs` the common contribution of each subtree is
    /// factored onto its incoming arc, so readers accumulate shared-prefix
    /// metadata once instead of per term. Sharing never changes the
    /// combined value observed for any term.
    pub fn into_bytes(mut self, share_outputs: bool) -> Vec<u8> {
        if share_outputs {
            self.push_outputs();
        }

        // Breadth-first ids: targets strictly greater than sources.
        let mut bfs_order: Vec<usize> = Vec::with_capacity(self.nodes.len());
        let mut remap = vec![0u32; self.nodes.len()];
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(0usize);
        while let Some(n) = queue.pop_front() {
            remap[n] = bfs_order.len() as u32;
            bfs_order.push(n);
            for edge in &self.nodes[n].edges {
                queue.push_back(edge.child as usize);
            }
        }

        let num_arcs: usize = self.nodes.iter().map(|n| n.edges.len()).sum();
        let identity = self.outputs.identity();

        let mut body = Vec::new();
        let root_terminal = self.nodes[0].terminal.take();
        match &root_terminal {
            Some(value) => {
                body.push(SECTION_FLAG_EMPTY_OUTPUT);
                self.outputs.write(value, &mut body);
            }
            None => body.push(0),
        }

        write_vint(&mut body, self.nodes.len() as u64);
        write_vint(&mut body, num_arcs as u64);

        for &n in &bfs_order {
            let node = &self.nodes[n];
            write_vint(&mut body, node.edges.len() as u64);
            for edge in &node.edges {
                let child = &self.nodes[edge.child as usize];
                let mut flags = 0u8;
                let final_output = match &child.terminal {
                    Some(value) => {
                        flags |= ARC_FLAG_FINAL;
                        if *value != identity {
                            flags |= ARC_FLAG_FINAL_OUTPUT;
                            Some(value)
                        } else {
                            None
                        }
                    }
                    None => None,
                };

                body.push(edge.label);
                body.push(flags);
                write_vint(&mut body, remap[edge.child as usize] as u64);
                self.outputs.write(&edge.output, &mut body);
                if let Some(value) = final_output {
                    self.outputs.write(value, &mut body);
                }
            }
        }

        let mut section = Vec::with_capacity(body.len() + 5);
        write_vint(&mut section, body.len() as u64);
        section.extend_from_slice(&body);
        section
    }

    /// Factor shared contributions toward the root.
    ///
    /// Children have larger indices than their parents, so a reverse index
    /// scan visits every subtree before the arc leading into it.
    fn push_outputs(&mut self) {
        let identity = self.outputs.identity();

        for n in (0..self.nodes.len()).rev() {
            for i in 0..self.nodes[n].edges.len() {
                let child = self.nodes[n].edges[i].child as usize;

                let mut common: Option<O::Value> = None;
                if let Some(t) = &self.nodes[child].terminal {
                    common = Some(t.clone());
                }
                for edge in &self.nodes[child].edges {
                    common = Some(match common {
                        Some(c) => self.outputs.prefix(&c, &edge.output),
                        None => edge.output.clone(),
                    });
                }

                let Some(common) = common else { continue };
                if common == identity {
                    continue;
                }

                if let Some(t) = self.nodes[child].terminal.take() {
                    self.nodes[child].terminal = Some(self.outputs.subtract(&t, &common));
                }
                for edge in &mut self.nodes[child].edges {
                    edge.output = self.outputs.subtract(&edge.output, &common);
                }
                self.nodes[n].edges[i].output = common;
            }
        }
    }
}
