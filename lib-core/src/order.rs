//! Manifest-first entry ordering.
//!
//! The JVM expects the manifest to be discoverable early, so the conventional
//! order puts the `META-INF/` directory entry first, the manifest file
//! second, and everything else in lexicographic name order. The same
//! comparator is applied to the local pass and the central pass so the two
//! stay consistent.

use std::cmp::Ordering;

use crate::format::{MANIFEST_DIR, MANIFEST_PATH};

fn rank(name: &[u8]) -> u8 {
    if name == MANIFEST_DIR {
        0
    } else if name == MANIFEST_PATH {
        1
    } else {
        2
    }
}

/// Total order over entry names: manifest folder, manifest file, then
/// lexicographic.
#[must_use]
pub fn compare_names(a: &[u8], b: &[u8]) -> Ordering {
    rank(a).cmp(&rank(b)).then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_sorts_first() {
        let mut names: Vec<&[u8]> = vec![
            b"zz.txt",
            MANIFEST_PATH,
            b"META-INF/services/x",
            b"a.class",
            MANIFEST_DIR,
        ];
        names.sort_by(|a, b| compare_names(a, b));
        assert_eq!(names[0], MANIFEST_DIR);
        assert_eq!(names[1], MANIFEST_PATH);
        assert_eq!(names[2], b"META-INF/services/x");
        assert_eq!(names[3], b"a.class");
        assert_eq!(names[4], b"zz.txt");
    }
}
