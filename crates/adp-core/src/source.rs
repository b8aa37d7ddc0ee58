//! Source text helpers shared by the scanning stages.

/// Maps byte offsets to 1-based line/column positions.
///
/// Columns count bytes from the start of the line, which keeps them stable
/// for the ASCII-heavy syntax that annotations are written in.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self {
            line_starts,
            len: source.len(),
        }
    }

    /// 1-based line containing `offset`.
    pub fn line(&self, offset: usize) -> usize {
        let offset = offset.min(self.len);
        match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx + 1,
            Err(idx) => idx,
        }
    }

    /// 1-based (line, column) for `offset`.
    pub fn position(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.len);
        let line = self.line(offset);
        (line, offset - self.line_starts[line - 1] + 1)
    }

    /// Byte offset where 1-based `line` starts.
    pub fn line_start(&self, line: usize) -> Option<usize> {
        line.checked_sub(1)
            .and_then(|idx| self.line_starts.get(idx))
            .copied()
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

/// Normalize a file path into the form used inside entity ids.
///
/// Backslashes become forward slashes, `.` segments and empty segments are
/// dropped, and `..` pops the previous segment where one exists.
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let absolute = unified.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(last) if *last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}

/// Directory portion of a normalized path ("" for top-level files).
pub fn parent_dir(normalized: &str) -> &str {
    normalized.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Final segment of a normalized path.
pub fn file_name(normalized: &str) -> &str {
    normalized
        .rsplit_once('/')
        .map(|(_, name)| name)
        .unwrap_or(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_index_positions() {
        let index = LineIndex::new("ab\ncd\n\nef");
        assert_eq!(index.position(0), (1, 1));
        assert_eq!(index.position(1), (1, 2));
        assert_eq!(index.position(3), (2, 1));
        assert_eq!(index.position(6), (3, 1));
        assert_eq!(index.position(8), (4, 2));
        assert_eq!(index.line_count(), 4);
    }

    #[test]
    fn test_line_index_clamps_past_end() {
        let index = LineIndex::new("abc");
        assert_eq!(index.position(100), (1, 4));
    }

    #[test]
    fn test_line_start() {
        let index = LineIndex::new("a\nbb\nccc");
        assert_eq!(index.line_start(1), Some(0));
        assert_eq!(index.line_start(3), Some(5));
        assert_eq!(index.line_start(4), None);
        assert_eq!(index.line_start(0), None);
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("./src/app.py"), "src/app.py");
        assert_eq!(normalize_path("src\\models\\user.py"), "src/models/user.py");
        assert_eq!(normalize_path("src//a/../b.py"), "src/b.py");
        assert_eq!(normalize_path("../shared/x.py"), "../shared/x.py");
        assert_eq!(normalize_path("/abs/./p.py"), "/abs/p.py");
    }

    #[test]
    fn test_parent_and_file_name() {
        assert_eq!(parent_dir("src/app.py"), "src");
        assert_eq!(parent_dir("app.py"), "");
        assert_eq!(file_name("src/app.py"), "app.py");
        assert_eq!(file_name("app.py"), "app.py");
    }
}
