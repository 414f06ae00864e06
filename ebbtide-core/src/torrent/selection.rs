//! Default file selection for multi-file torrents.

use super::swarm::FileEntry;

/// Picks the file to expose when the caller did not name one: the largest
/// by length, ties broken by first occurrence. Returns `None` only for an
/// empty table.
pub fn select_default_file(files: &[FileEntry]) -> Option<usize> {
    let mut best: Option<(usize, u64)> = None;
    for (index, file) in files.iter().enumerate() {
        match best {
            Some((_, length)) if file.length <= length => {}
            _ => best = Some((index, file.length)),
        }
    }
    best.map(|(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, length: u64, offset: u64) -> FileEntry {
        FileEntry {
            name: name.to_string(),
            length,
            offset,
        }
    }

    #[test]
    fn test_picks_largest_file() {
        let files = vec![
            entry("small.txt", 10, 0),
            entry("movie.mp4", 5000, 10),
            entry("sample.mp4", 200, 5010),
        ];
        assert_eq!(select_default_file(&files), Some(1));
    }

    #[test]
    fn test_tie_goes_to_first_occurrence() {
        let files = vec![
            entry("a", 10, 0),
            entry("b", 50, 10),
            entry("c", 50, 60),
        ];
        assert_eq!(select_default_file(&files), Some(1));
    }

    #[test]
    fn test_empty_table() {
        assert_eq!(select_default_file(&[]), None);
    }

    #[test]
    fn test_single_file() {
        assert_eq!(select_default_file(&[entry("only", 1, 0)]), Some(0));
    }
}
