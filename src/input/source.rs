//! Document source detection

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Url,
    File,
}

impl SourceKind {
    /// Anything with an http(s) scheme is fetched remotely; everything else is
    /// treated as a local path.
    pub fn detect(source: &str) -> Self {
        let lowered = source.trim_start().to_lowercase();
        if lowered.starts_with("http://") || lowered.starts_with("https://") {
            SourceKind::Url
        } else {
            SourceKind::File
        }
    }

    /// Flag understood by the extraction tool.
    pub fn flag(&self) -> &'static str {
        match self {
            SourceKind::Url => "--url",
            SourceKind::File => "--file",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Url => write!(f, "url"),
            SourceKind::File => write!(f, "file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_source_kind() {
        assert_eq!(SourceKind::detect("https://example.org/a.pdf"), SourceKind::Url);
        assert_eq!(SourceKind::detect("HTTP://example.org"), SourceKind::Url);
        assert_eq!(SourceKind::detect("/tmp/report.pdf"), SourceKind::File);
        assert_eq!(SourceKind::detect("ftp.example.org/file"), SourceKind::File);
    }

    #[test]
    fn test_flags() {
        assert_eq!(SourceKind::Url.flag(), "--url");
        assert_eq!(SourceKind::File.flag(), "--file");
    }
}
