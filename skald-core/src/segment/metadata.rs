//! Per-term statistics and their path-accumulation codec
//!
//! Every arc in a field's transducer carries a partial `TermMeta`; the value
//! visible for a term is the monoid combination of the partials along its
//! path. `TermMetaOutputs` is the `Outputs` implementation injected per field
//! (auxiliary width and frequency tracking differ between postings layouts).

use crate::error::{Error, Result};
use crate::structures::transducer::{read_u8, read_vint, write_vint, Outputs};

/// `total_term_freq` value for fields that do not track frequencies.
pub const UNTRACKED_TERM_FREQ: i64 = -1;

const META_HAS_AUX: u8 = 1;
const META_HAS_TRAILING: u8 = 2;
const META_HAS_STATS: u8 = 4;
const META_FLAG_MASK: u8 = META_HAS_AUX | META_HAS_TRAILING | META_HAS_STATS;

/// Statistics and codec payload for one term
///
/// `aux` is a fixed-width array of longs owned by the postings codec (file
/// pointers, skip offsets); `trailing` is an opaque blob the codec appends.
/// The dictionary only accumulates these, it never interprets them.
#[derive(Debug, Clone, PartialEq)]
pub struct TermMeta {
    pub doc_freq: u32,
    /// Total occurrences across all documents, `UNTRACKED_TERM_FREQ` when the
    /// field does not track frequencies.
    pub total_term_freq: i64,
    pub aux: Box<[u64]>,
    pub trailing: Vec<u8>,
}

impl TermMeta {
    pub fn new(doc_freq: u32, total_term_freq: i64, aux: Vec<u64>, trailing: Vec<u8>) -> Self {
        Self {
            doc_freq,
            total_term_freq,
            aux: aux.into_boxed_slice(),
            trailing,
        }
    }

    /// True when this value carries term statistics (identity values do not).
    pub fn has_stats(&self) -> bool {
        self.doc_freq != 0
    }
}

/// Monoid + wire codec for `TermMeta`, one instance per field.
///
/// Accumulation: auxiliary longs add element-wise, trailing bytes
/// concatenate, and statistics are taken from the suffix when it carries
/// any (the deepest contribution wins). Sharing factors the element-wise
/// minimum of aux longs and the common byte prefix of trailing blobs onto
/// shared arcs; statistics are only shared when identical.
#[derive(Debug, Clone, Copy)]
pub struct TermMetaOutputs {
    aux_width: u32,
    has_freqs: bool,
}

impl TermMetaOutputs {
    pub fn new(aux_width: u32, has_freqs: bool) -> Self {
        Self {
            aux_width,
            has_freqs,
        }
    }

    pub fn aux_width(&self) -> u32 {
        self.aux_width
    }

    pub fn has_freqs(&self) -> bool {
        self.has_freqs
    }

    fn identity_freq(&self) -> i64 {
        if self.has_freqs {
            0
        } else {
            UNTRACKED_TERM_FREQ
        }
    }
}

impl Outputs for TermMetaOutputs {
    type Value = TermMeta;

    fn identity(&self) -> TermMeta {
        TermMeta {
            doc_freq: 0,
            total_term_freq: self.identity_freq(),
            aux: vec![0u64; self.aux_width as usize].into_boxed_slice(),
            trailing: Vec::new(),
        }
    }

    fn combine(&self, prefix: &TermMeta, suffix: &TermMeta) -> TermMeta {
        let aux = prefix
            .aux
            .iter()
            .zip(suffix.aux.iter())
            .map(|(a, b)| a + b)
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let mut trailing = Vec::with_capacity(prefix.trailing.len() + suffix.trailing.len());
        trailing.extend_from_slice(&prefix.trailing);
        trailing.extend_from_slice(&suffix.trailing);

        let (doc_freq, total_term_freq) = if suffix.has_stats() {
            (suffix.doc_freq, suffix.total_term_freq)
        } else {
            (prefix.doc_freq, prefix.total_term_freq)
        };

        TermMeta {
            doc_freq,
            total_term_freq,
            aux,
            trailing,
        }
    }

    fn prefix(&self, a: &TermMeta, b: &TermMeta) -> TermMeta {
        let aux = a
            .aux
            .iter()
            .zip(b.aux.iter())
            .map(|(x, y)| *x.min(y))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let common_len = a
            .trailing
            .iter()
            .zip(b.trailing.iter())
            .take_while(|(x, y)| x == y)
            .count();
        let trailing = a.trailing[..common_len].to_vec();

        let stats_shared = a.doc_freq == b.doc_freq && a.total_term_freq == b.total_term_freq;
        let (doc_freq, total_term_freq) = if stats_shared {
            (a.doc_freq, a.total_term_freq)
        } else {
            (0, self.identity_freq())
        };

        TermMeta {
            doc_freq,
            total_term_freq,
            aux,
            trailing,
        }
    }

    fn subtract(&self, a: &TermMeta, shared: &TermMeta) -> TermMeta {
        let aux = a
            .aux
            .iter()
            .zip(shared.aux.iter())
            .map(|(x, y)| x - y)
            .collect::<Vec<_>>()
            .into_boxed_slice();

        debug_assert!(a.trailing.starts_with(&shared.trailing));
        let trailing = a.trailing[shared.trailing.len()..].to_vec();

        let stats_absorbed =
            shared.has_stats() && shared.doc_freq == a.doc_freq && shared.total_term_freq == a.total_term_freq;
        let (doc_freq, total_term_freq) = if stats_absorbed {
            (0, self.identity_freq())
        } else {
            (a.doc_freq, a.total_term_freq)
        };

        TermMeta {
            doc_freq,
            total_term_freq,
            aux,
            trailing,
        }
    }

    fn read(&self, reader: &mut &[u8]) -> Result<TermMeta> {
        let flags = read_u8(reader)?;
        if flags & !META_FLAG_MASK != 0 {
            return Err(Error::Corruption(format!(
                "unknown term metadata flags: 0x{:02X}",
                flags
            )));
        }

        let mut aux = vec![0u64; self.aux_width as usize];
        if flags & META_HAS_AUX != 0 {
            for slot in aux.iter_mut() {
                *slot = read_vint(reader)?;
            }
        }

        let trailing = if flags & META_HAS_TRAILING != 0 {
            let len = read_vint(reader)? as usize;
            if len > reader.len() {
                return Err(Error::Corruption(format!(
                    "trailing blob length {} exceeds remaining {} bytes",
                    len,
                    reader.len()
                )));
            }
            let blob = reader[..len].to_vec();
            *reader = &reader[len..];
            blob
        } else {
            Vec::new()
        };

        let (doc_freq, total_term_freq) = if flags & META_HAS_STATS != 0 {
            let doc_freq = read_vint(reader)?;
            if doc_freq == 0 || doc_freq > u32::MAX as u64 {
                return Err(Error::Corruption(format!(
                    "invalid doc_freq in term metadata: {}",
                    doc_freq
                )));
            }
            let total_term_freq = if self.has_freqs {
                let delta = read_vint(reader)? as i64;
                doc_freq as i64 + delta
            } else {
                UNTRACKED_TERM_FREQ
            };
            (doc_freq as u32, total_term_freq)
        } else {
            (0, self.identity_freq())
        };

        Ok(TermMeta {
            doc_freq,
            total_term_freq,
            aux: aux.into_boxed_slice(),
            trailing,
        })
    }

    fn write(&self, value: &TermMeta, out: &mut Vec<u8>) {
        debug_assert_eq!(value.aux.len(), self.aux_width as usize);

        let mut flags = 0u8;
        if value.aux.iter().any(|&v| v != 0) {
            flags |= META_HAS_AUX;
        }
        if !value.trailing.is_empty() {
            flags |= META_HAS_TRAILING;
        }
        if value.has_stats() {
            flags |= META_HAS_STATS;
        }
        out.push(flags);

        if flags & META_HAS_AUX != 0 {
            for &v in value.aux.iter() {
                write_vint(out, v);
            }
        }
        if flags & META_HAS_TRAILING != 0 {
            write_vint(out, value.trailing.len() as u64);
            out.extend_from_slice(&value.trailing);
        }
        if flags & META_HAS_STATS != 0 {
            write_vint(out, value.doc_freq as u64);
            if self.has_freqs {
                write_vint(out, (value.total_term_freq - value.doc_freq as i64) as u64);
            }
        }
    }

    fn approx_ram(&self, value: &TermMeta) -> usize {
        value.aux.len() * std::mem::size_of::<u64>() + value.trailing.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outputs() -> TermMetaOutputs {
        TermMetaOutputs::new(2, true)
    }

    fn meta(doc_freq: u32, ttf: i64, aux: &[u64], trailing: &[u8]) -> TermMeta {
        TermMeta::new(doc_freq, ttf, aux.to_vec(), trailing.to_vec())
    }

    #[test]
    fn test_identity_is_neutral() {
        let o = outputs();
        let id = o.identity();
        let value = meta(3, 10, &[7, 9], b"xy");

        assert_eq!(o.combine(&id, &value), value);
        assert_eq!(o.combine(&value, &id), value);
    }

    #[test]
    fn test_combine_is_associative() {
        let o = outputs();
        let a = meta(0, 0, &[1, 2], b"a");
        let b = meta(4, 8, &[3, 0], b"b");
        let c = meta(2, 5, &[0, 1], b"c");

        let left = o.combine(&o.combine(&a, &b), &c);
        let right = o.combine(&a, &o.combine(&b, &c));
        assert_eq!(left, right);
    }

    #[test]
    fn test_suffix_stats_win() {
        let o = outputs();
        let prefix = meta(9, 20, &[0, 0], b"");
        let suffix = meta(2, 4, &[0, 0], b"");

        let combined = o.combine(&prefix, &suffix);
        assert_eq!(combined.doc_freq, 2);
        assert_eq!(combined.total_term_freq, 4);

        let stat_less = o.identity();
        let kept = o.combine(&prefix, &stat_less);
        assert_eq!(kept.doc_freq, 9);
        assert_eq!(kept.total_term_freq, 20);
    }

    #[test]
    fn test_prefix_subtract_reconstruct() {
        let o = outputs();
        let a = meta(3, 7, &[10, 4], b"abcd");
        let b = meta(5, 12, &[6, 4], b"abzz");

        let shared = o.prefix(&a, &b);
        assert_eq!(shared.aux.as_ref(), &[6, 4]);
        assert_eq!(shared.trailing, b"ab");
        assert!(!shared.has_stats());

        for value in [&a, &b] {
            let residual = o.subtract(value, &shared);
            assert_eq!(&o.combine(&shared, &residual), value);
        }
    }

    #[test]
    fn test_equal_stats_are_shared() {
        let o = outputs();
        let a = meta(3, 7, &[1, 0], b"");
        let b = meta(3, 7, &[2, 0], b"");

        let shared = o.prefix(&a, &b);
        assert_eq!(shared.doc_freq, 3);
        assert_eq!(shared.total_term_freq, 7);

        let residual = o.subtract(&a, &shared);
        assert!(!residual.has_stats());
        assert_eq!(o.combine(&shared, &residual), a);
    }

    #[test]
    fn test_wire_roundtrip() {
        let o = outputs();
        let values = [
            o.identity(),
            meta(1, 1, &[0, 0], b""),
            meta(42, 100, &[123456, 7], b"tail"),
            meta(0, 0, &[5, 0], b""),
        ];
        for value in &values {
            let mut buf = Vec::new();
            o.write(value, &mut buf);
            let mut reader = buf.as_slice();
            assert_eq!(&o.read(&mut reader).unwrap(), value);
            assert!(reader.is_empty());
        }
    }

    #[test]
    fn test_untracked_field_freq() {
        let o = TermMetaOutputs::new(1, false);
        let value = meta(4, UNTRACKED_TERM_FREQ, &[9], b"");

        let mut buf = Vec::new();
        o.write(&value, &mut buf);
        let mut reader = buf.as_slice();
        let back = o.read(&mut reader).unwrap();
        assert_eq!(back.doc_freq, 4);
        assert_eq!(back.total_term_freq, UNTRACKED_TERM_FREQ);
    }

    #[test]
    fn test_read_rejects_bad_flags() {
        let o = outputs();
        let mut reader: &[u8] = &[0xFF];
        assert!(o.read(&mut reader).is_err());
    }
}
