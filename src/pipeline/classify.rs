//! Document classification capability and the retry policy applied at its boundary.

use log::{error, warn};
use std::path::Path;
use thiserror::Error;

use crate::ClassificationFlag;
use crate::error::CatalogError;
use crate::engine::retry::{Sleeper, jitter_delay};

/// Why a classifier could not produce a flag.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    /// Opening or parsing the document failed; may be transient.
    #[error("cannot open document: {0}")]
    Open(String),
    #[error("document is encrypted")]
    Encrypted,
    #[error("cannot read page {page}: {reason}")]
    Page { page: usize, reason: String },
    #[error("{0}")]
    Other(String),
}

/// External analysis of document content. Called from worker threads.
pub trait Classifier: Send + Sync {
    /// Look at up to `max_pages` pages: `HasText` as soon as a page has text, `ImageOnly`
    /// when none has, `Indeterminate` for empty documents.
    fn classify(&self, path: &Path, max_pages: usize) -> Result<ClassificationFlag, ClassifyError>;

    /// Release internal caches. Called periodically by the control thread.
    fn compact_cache(&self) {}
}

/// Used when no document engine is available: every document is indeterminate.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnavailableClassifier;

impl Classifier for UnavailableClassifier {
    fn classify(&self, _path: &Path, _max_pages: usize) -> Result<ClassificationFlag, ClassifyError> {
        Ok(ClassificationFlag::Indeterminate)
    }
}

/// Classify `path`, retrying an open failure once after a jittered delay.
/// Every other failure, or a second open failure, gives `Indeterminate`.
pub fn classify_with_fallback(
    classifier: &dyn Classifier,
    path: &Path,
    max_pages: usize,
    sleeper: &dyn Sleeper,
) -> ClassificationFlag {
    let first = match classifier.classify(path, max_pages) {
        Err(ClassifyError::Open(reason)) => {
            warn!("Opening {} failed, retrying: {}", path.display(), reason);
            sleeper.sleep(jitter_delay());
            classifier.classify(path, max_pages)
        }
        other => other,
    };
    match first {
        Ok(flag) => flag,
        Err(e) => {
            let err = CatalogError::Classification {
                path: path.to_path_buf(),
                reason: e.to_string(),
            };
            error!("{}", err);
            ClassificationFlag::Indeterminate
        }
    }
}

#[cfg(feature = "pdfium")]
pub use pdf::PdfiumClassifier;

#[cfg(feature = "pdfium")]
mod pdf {
    use log::debug;
    use pdfium_render::prelude::{PdfiumError, PdfiumInternalError, Pdfium};
    use std::path::Path;

    use super::{ClassificationFlag, Classifier, ClassifyError};

    /// PDF classifier backed by a pdfium shared library.
    pub struct PdfiumClassifier {
        pdfium: Pdfium,
    }

    impl PdfiumClassifier {
        /// Bind pdfium from `dir` if given, falling back to the system library.
        pub fn bind(dir: Option<&Path>) -> Result<Self, PdfiumError> {
            let bindings = match dir {
                Some(d) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(d))
                    .or_else(|_| Pdfium::bind_to_system_library()),
                None => Pdfium::bind_to_system_library(),
            }?;
            Ok(Self {
                pdfium: Pdfium::new(bindings),
            })
        }
    }

    impl Classifier for PdfiumClassifier {
        fn classify(&self, path: &Path, max_pages: usize) -> Result<ClassificationFlag, ClassifyError> {
            let document = match self.pdfium.load_pdf_from_file(path, None) {
                Ok(d) => d,
                Err(PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError)) => {
                    return Err(ClassifyError::Encrypted);
                }
                Err(e) => return Err(ClassifyError::Open(format!("{e:?}"))),
            };
            let pages = document.pages();
            let count = (pages.len() as usize).min(max_pages);
            if pages.len() == 0 {
                return Ok(ClassificationFlag::Indeterminate);
            }
            for index in 0..count {
                let page = pages.get(index as u16).map_err(|e| ClassifyError::Page {
                    page: index + 1,
                    reason: format!("{e:?}"),
                })?;
                let text = page.text().map_err(|e| ClassifyError::Page {
                    page: index + 1,
                    reason: format!("{e:?}"),
                })?;
                if !text.all().trim().is_empty() {
                    return Ok(ClassificationFlag::HasText);
                }
            }
            debug!("No text in first {} pages of {}", count, path.display());
            Ok(ClassificationFlag::ImageOnly)
        }
    }
}
