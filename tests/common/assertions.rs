//! Archive assertions for integration tests

use std::collections::BTreeMap;
use std::io::{Read, Seek};

/// Read every entry of a ZIP archive into a name -> content map.
///
/// Panics if the archive is not a valid, finalized ZIP container.
pub fn read_archive<R: Read + Seek>(reader: R) -> BTreeMap<String, Vec<u8>> {
    let mut archive = zip::ZipArchive::new(reader).expect("archive should be a valid ZIP");
    let mut entries = BTreeMap::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).expect("entry should be readable");
        let mut content = Vec::new();
        file.read_to_end(&mut content)
            .expect("entry content should be readable");
        entries.insert(file.name().to_string(), content);
    }
    entries
}

/// Assert the archive holds exactly `expected` (name, content) pairs.
pub fn assert_archive_eq(actual: &BTreeMap<String, Vec<u8>>, expected: &[(&str, &[u8])]) {
    let expected: BTreeMap<String, Vec<u8>> = expected
        .iter()
        .map(|(name, content)| (name.to_string(), content.to_vec()))
        .collect();

    let actual_names: Vec<&String> = actual.keys().collect();
    let expected_names: Vec<&String> = expected.keys().collect();
    assert_eq!(actual_names, expected_names, "archive entry names differ");

    for (name, content) in &expected {
        assert_eq!(
            actual[name].len(),
            content.len(),
            "entry {} has the wrong size",
            name
        );
        assert!(actual[name] == *content, "entry {} has the wrong content", name);
    }
}
