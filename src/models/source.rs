//! Source references and the archive hints that travel with them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

/// Descriptive tier of the archive a source comes from.
///
/// Tier is a label only; it never grants confirmation on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTier {
    /// Government or institutional archive.
    Primary,
    /// Genealogy database.
    #[default]
    Secondary,
    /// Reference work.
    Tertiary,
}

impl SourceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::Tertiary => "tertiary",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "primary" => Some(Self::Primary),
            "secondary" => Some(Self::Secondary),
            "tertiary" => Some(Self::Tertiary),
            _ => None,
        }
    }
}

/// How an archive exposes its documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessMode {
    #[default]
    Direct,
    /// Landing page that links to the actual PDF.
    PdfLink,
    AuthRequired,
    /// Refuses headless downloads; only a rendered screenshot works.
    Protected,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::PdfLink => "pdf-link",
            Self::AuthRequired => "auth-required",
            Self::Protected => "protected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "direct" => Some(Self::Direct),
            "pdf-link" => Some(Self::PdfLink),
            "auth-required" => Some(Self::AuthRequired),
            "protected" => Some(Self::Protected),
            _ => None,
        }
    }
}

/// Crawler-supplied hints about where a source lives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchiveHints {
    #[serde(default)]
    pub archive_name: Option<String>,
    #[serde(default)]
    pub tier: SourceTier,
    #[serde(default)]
    pub access_mode: AccessMode,
    /// Volume identifier used in placeholder names and row fingerprints.
    #[serde(default)]
    pub volume_id: Option<String>,
    /// Page number within the volume (1-based).
    #[serde(default)]
    pub page_number: Option<u32>,
}

/// An opaque URL or an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceReference {
    Url(String),
    File(PathBuf),
}

impl SourceReference {
    /// Interpret a CLI argument: anything with a scheme is a URL, otherwise a file.
    pub fn parse(input: &str) -> Self {
        if input.starts_with("http://") || input.starts_with("https://") {
            Self::Url(input.to_string())
        } else if let Some(path) = input.strip_prefix("file://") {
            Self::File(PathBuf::from(path))
        } else {
            Self::File(PathBuf::from(input))
        }
    }

    /// Stable URL used as the provenance key in the store.
    pub fn source_url(&self) -> String {
        match self {
            Self::Url(url) => url.clone(),
            Self::File(path) => format!("file://{}", path.display()),
        }
    }

    /// Whether the reference names a PDF by its path alone.
    pub fn has_pdf_path(&self) -> bool {
        match self {
            Self::Url(url) => Url::parse(url)
                .map(|u| u.path().to_lowercase().ends_with(".pdf"))
                .unwrap_or_else(|_| url.to_lowercase().ends_with(".pdf")),
            Self::File(path) => has_extension(path, "pdf"),
        }
    }

    /// Last path segment without extension, used as a default volume id.
    pub fn stem(&self) -> Option<String> {
        match self {
            Self::Url(url) => Url::parse(url).ok().and_then(|u| {
                u.path_segments()
                    .and_then(|mut segs| segs.next_back().map(|s| s.to_string()))
                    .filter(|s| !s.is_empty())
                    .map(|s| strip_extension(&s))
            }),
            Self::File(path) => path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(|s| s.to_string()),
        }
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

fn strip_extension(segment: &str) -> String {
    match segment.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => segment.to_string(),
    }
}

/// A source reference together with its hints: what a crawler hands the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRequest {
    pub reference: SourceReference,
    #[serde(default)]
    pub hints: ArchiveHints,
}

impl SourceRequest {
    pub fn new(reference: SourceReference) -> Self {
        Self {
            reference,
            hints: ArchiveHints::default(),
        }
    }

    pub fn with_hints(mut self, hints: ArchiveHints) -> Self {
        self.hints = hints;
        self
    }

    pub fn source_url(&self) -> String {
        self.reference.source_url()
    }

    /// Volume id from hints, else derived from the reference.
    pub fn volume_id(&self) -> String {
        self.hints
            .volume_id
            .clone()
            .or_else(|| self.reference.stem())
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn page_number(&self) -> u32 {
        self.hints.page_number.unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reference() {
        assert_eq!(
            SourceReference::parse("https://example.org/a.pdf"),
            SourceReference::Url("https://example.org/a.pdf".to_string())
        );
        assert_eq!(
            SourceReference::parse("scans/page.png"),
            SourceReference::File(PathBuf::from("scans/page.png"))
        );
    }

    #[test]
    fn test_pdf_path_ignores_query() {
        let r = SourceReference::Url("https://archive.example/vol/812.PDF?dl=1".to_string());
        assert!(r.has_pdf_path());
        let r = SourceReference::Url("https://archive.example/item/812".to_string());
        assert!(!r.has_pdf_path());
    }

    #[test]
    fn test_volume_defaults_to_stem() {
        let req = SourceRequest::new(SourceReference::Url(
            "https://archive.example/records/vol812.pdf".to_string(),
        ));
        assert_eq!(req.volume_id(), "vol812");
        assert_eq!(req.page_number(), 1);
    }

    #[test]
    fn test_access_mode_round_trip() {
        for mode in [
            AccessMode::Direct,
            AccessMode::PdfLink,
            AccessMode::AuthRequired,
            AccessMode::Protected,
        ] {
            assert_eq!(AccessMode::from_str(mode.as_str()), Some(mode));
        }
        assert_eq!(AccessMode::from_str("pdf_link"), Some(AccessMode::PdfLink));
    }
}
