use csv_ingest::hashing::{ContentHashes, HashMatch, digest, trim_blank_cells};
use csv_ingest::upload::{UTF8_BOM, Upload};
use proptest::prelude::*;

fn csv_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        proptest::collection::vec("[a-z0-9 ]{0,6}", 1..5).prop_map(|cells| cells.join(",")),
        1..8,
    )
    .prop_map(|rows| rows.join("\n") + "\n")
}

fn with_bom(content: &str) -> Vec<u8> {
    let mut bytes = UTF8_BOM.to_vec();
    bytes.extend_from_slice(content.as_bytes());
    bytes
}

#[test]
fn hashes_of_a_known_file() {
    let upload = Upload::new("a.csv", with_bom("id,name\n1, Ann \n"));
    let hashes = ContentHashes::compute(&upload).expect("hashes");
    assert_eq!(hashes.raw, digest(upload.raw()));
    assert_eq!(hashes.without_bom, digest(b"id,name\n1, Ann \n"));
    assert_eq!(hashes.trimmed_without_bom, digest(b"id,name\n1,Ann\n"));
}

#[test]
fn only_a_leading_marker_is_removed() {
    let mut content = with_bom("a\n");
    content.extend_from_slice(UTF8_BOM);
    let upload = Upload::new("a.csv", content.clone());
    let hashes = ContentHashes::compute(&upload).expect("hashes");
    assert_eq!(hashes.without_bom, digest(&content[UTF8_BOM.len()..]));
}

#[test]
fn whitespace_only_upload_trims_to_nothing() {
    let trimmed = trim_blank_cells(b" , \n\t,\n").expect("trim");
    assert!(trimmed.is_empty());
}

proptest! {
    #[test]
    fn a_byte_order_mark_only_changes_the_raw_hash(content in csv_text()) {
        let plain = ContentHashes::compute(&Upload::new("a.csv", content.clone())).expect("plain");
        let marked = ContentHashes::compute(&Upload::new("a.csv", with_bom(&content))).expect("marked");
        prop_assert_ne!(&plain.raw, &marked.raw);
        prop_assert_eq!(&plain.without_bom, &marked.without_bom);
        prop_assert_eq!(&plain.trimmed_without_bom, &marked.trimmed_without_bom);
        prop_assert_eq!(plain.matches(&marked), Some(HashMatch::EncodingVariant));
    }

    #[test]
    fn trimming_is_idempotent(content in csv_text()) {
        let once = trim_blank_cells(content.as_bytes()).expect("trim once");
        let twice = trim_blank_cells(&once).expect("trim twice");
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn surrounding_blanks_do_not_change_the_trimmed_hash(content in csv_text()) {
        let padded = content
            .lines()
            .map(|line| {
                line.split(',')
                    .map(|cell| format!(" {cell} "))
                    .collect::<Vec<_>>()
                    .join(",")
                    + ", \n\n"
            })
            .collect::<String>();
        prop_assert_eq!(
            digest(&trim_blank_cells(content.as_bytes()).expect("trim")),
            digest(&trim_blank_cells(padded.as_bytes()).expect("trim padded"))
        );
    }
}
