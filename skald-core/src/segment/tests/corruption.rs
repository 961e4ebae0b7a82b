//! Load-time validation: every header invariant violation must fail the
//! open with `Error::Corruption`.

use byteorder::{LittleEndian, WriteBytesExt};

use super::{field_infos, open_bytes, MAX_DOC};
use crate::error::Error;
use crate::segment::{TermMeta, TermMetaOutputs, TERM_DICT_MAGIC};
use crate::structures::transducer::write_vint;
use crate::structures::trie_builder::TrieBuilder;

struct Header {
    number: u64,
    num_terms: u64,
    sum_total_term_freq: u64,
    sum_doc_freq: u64,
    doc_count: u64,
    aux_width: u64,
}

impl Header {
    fn good() -> Self {
        Self {
            number: 0,
            num_terms: 2,
            sum_total_term_freq: 5,
            sum_doc_freq: 3,
            doc_count: 2,
            aux_width: 1,
        }
    }
}

/// Transducer bytes for terms "a" (df 1, ttf 2) and "b" (df 2, ttf 3).
fn fst_bytes() -> Vec<u8> {
    let mut builder = TrieBuilder::new(TermMetaOutputs::new(1, true));
    builder
        .insert(b"a", TermMeta::new(1, 2, vec![0], Vec::new()))
        .unwrap();
    builder
        .insert(b"b", TermMeta::new(2, 3, vec![1], Vec::new()))
        .unwrap();
    builder.into_bytes(true)
}

fn assemble(sections: &[(Header, Vec<u8>)]) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_u32::<LittleEndian>(TERM_DICT_MAGIC).unwrap();
    let directory_offset = out.len() as u64;
    write_vint(&mut out, sections.len() as u64);
    for (header, fst) in sections {
        write_vint(&mut out, header.number);
        write_vint(&mut out, header.num_terms);
        write_vint(&mut out, header.sum_total_term_freq);
        write_vint(&mut out, header.sum_doc_freq);
        write_vint(&mut out, header.doc_count);
        write_vint(&mut out, header.aux_width);
        out.extend_from_slice(fst);
    }
    out.write_u64::<LittleEndian>(directory_offset).unwrap();
    out
}

fn assert_corrupt(bytes: Vec<u8>) {
    let err = open_bytes(bytes, &field_infos()).unwrap_err();
    assert!(matches!(err, Error::Corruption(_)), "got {:?}", err);
}

#[test]
fn test_well_formed_file_opens() {
    let dict = open_bytes(assemble(&[(Header::good(), fst_bytes())]), &field_infos()).unwrap();
    assert_eq!(dict.num_fields(), 1);
    assert_eq!(dict.field("body").unwrap().num_terms(), 2);
}

#[test]
fn test_rejects_short_file() {
    assert_corrupt(Vec::new());
    assert_corrupt(vec![1, 2, 3]);
    assert_corrupt(vec![0; 11]);
}

#[test]
fn test_rejects_bad_magic() {
    let mut bytes = assemble(&[(Header::good(), fst_bytes())]);
    bytes[0] ^= 0xFF;
    assert_corrupt(bytes);
}

#[test]
fn test_rejects_bad_directory_offset() {
    let good = assemble(&[(Header::good(), fst_bytes())]);

    // Offset pointing past the trailer.
    let mut bytes = good.clone();
    let len = bytes.len();
    bytes[len - 8..].copy_from_slice(&(len as u64).to_le_bytes());
    assert_corrupt(bytes);

    // Offset inside the magic.
    let mut bytes = good;
    let len = bytes.len();
    bytes[len - 8..].copy_from_slice(&0u64.to_le_bytes());
    assert_corrupt(bytes);
}

#[test]
fn test_rejects_unknown_field_number() {
    let mut header = Header::good();
    header.number = 9;
    assert_corrupt(assemble(&[(header, fst_bytes())]));
}

#[test]
fn test_rejects_repeated_field_number() {
    assert_corrupt(assemble(&[
        (Header::good(), fst_bytes()),
        (Header::good(), fst_bytes()),
    ]));
}

#[test]
fn test_rejects_doc_count_above_max_doc() {
    let mut header = Header::good();
    header.doc_count = MAX_DOC as u64 + 1;
    header.sum_doc_freq = MAX_DOC as u64 + 1;
    header.sum_total_term_freq = MAX_DOC as u64 + 1;
    assert_corrupt(assemble(&[(header, fst_bytes())]));
}

#[test]
fn test_rejects_sum_doc_freq_below_doc_count() {
    let mut header = Header::good();
    header.sum_doc_freq = 1;
    assert_corrupt(assemble(&[(header, fst_bytes())]));
}

#[test]
fn test_rejects_sum_ttf_below_sum_doc_freq() {
    let mut header = Header::good();
    header.sum_total_term_freq = 2;
    assert_corrupt(assemble(&[(header, fst_bytes())]));
}

#[test]
fn test_rejects_term_count_mismatch() {
    let mut header = Header::good();
    header.num_terms = 3;
    assert_corrupt(assemble(&[(header, fst_bytes())]));
}

#[test]
fn test_rejects_truncated_transducer() {
    let fst = fst_bytes();
    let cut = fst[..fst.len() - 3].to_vec();
    assert_corrupt(assemble(&[(Header::good(), cut)]));
}

#[test]
fn test_rejects_trailing_directory_bytes() {
    let mut sections = assemble(&[(Header::good(), fst_bytes())]);
    // Splice junk between the last transducer byte and the trailer.
    let trailer = sections.split_off(sections.len() - 8);
    sections.extend_from_slice(&[0xAB, 0xCD]);
    sections.extend_from_slice(&trailer);
    assert_corrupt(sections);
}
