//! Pre-flight checks run before any network call.
//!
//! Order matters for the message the user sees: type, then size, then page
//! count. Page counting parses the document, so it runs last.

use super::input::{SelectedFile, PDF_MIME};
use crate::config::UploadLimits;
use crate::error::RemediateError;
use tracing::debug;

/// Reject anything that is not a PDF by extension *and* content.
pub fn check_type(file: &SelectedFile) -> Result<(), RemediateError> {
    let path = file.path().to_path_buf();
    match file.declared_type() {
        Some(PDF_MIME) => {}
        other => {
            return Err(RemediateError::NotAPdf {
                path,
                detail: format!("declared type {}", other.unwrap_or("unknown")),
            })
        }
    }
    if !file.has_pdf_magic() {
        return Err(RemediateError::NotAPdf {
            path,
            detail: "content does not start with %PDF".into(),
        });
    }
    Ok(())
}

pub fn check_size(file: &SelectedFile, limits: &UploadLimits) -> Result<(), RemediateError> {
    if file.size_bytes() > limits.max_size_bytes() {
        return Err(RemediateError::FileTooLarge {
            size_bytes: file.size_bytes(),
            limit_mb: limits.max_size_mb,
        });
    }
    Ok(())
}

/// Number of pages in the document.
pub fn count_pages(file: &SelectedFile) -> Result<usize, RemediateError> {
    let doc = lopdf::Document::load_mem(file.bytes()).map_err(|e| RemediateError::UnreadablePdf {
        path: file.path().to_path_buf(),
        detail: e.to_string(),
    })?;
    Ok(doc.get_pages().len())
}

pub fn check_pages(file: &SelectedFile, limits: &UploadLimits) -> Result<usize, RemediateError> {
    let pages = count_pages(file)?;
    if pages > limits.max_pages {
        return Err(RemediateError::TooManyPages {
            pages,
            limit: limits.max_pages,
        });
    }
    Ok(pages)
}

/// Run every check in order, returning the page count.
pub fn validate(file: &SelectedFile, limits: &UploadLimits) -> Result<usize, RemediateError> {
    check_type(file)?;
    check_size(file, limits)?;
    let pages = check_pages(file, limits)?;
    debug!(
        "Validated '{}': {} pages, {} bytes",
        file.name(),
        pages,
        file.size_bytes()
    );
    Ok(pages)
}

/// Build an `n`-page PDF with lopdf.
#[cfg(test)]
pub(crate) fn sample_pdf(pages: usize) -> Vec<u8> {
    use lopdf::{dictionary, Document, Object};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let kids: Vec<Object> = (0..pages)
        .map(|_| {
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            })
            .into()
        })
        .collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> UploadLimits {
        UploadLimits {
            max_files: 8,
            max_pages: 10,
            max_size_mb: 25,
        }
    }

    #[test]
    fn counts_pages() {
        let file = SelectedFile::from_bytes("a.pdf", sample_pdf(5));
        assert_eq!(count_pages(&file).unwrap(), 5);
        assert_eq!(validate(&file, &limits()).unwrap(), 5);
    }

    #[test]
    fn eleven_pages_rejected() {
        let file = SelectedFile::from_bytes("a.pdf", sample_pdf(11));
        let err = validate(&file, &limits()).unwrap_err();
        assert!(matches!(err, RemediateError::TooManyPages { pages: 11, limit: 10 }));
    }

    #[test]
    fn wrong_extension_rejected_before_parsing() {
        let file = SelectedFile::from_bytes("a.docx", sample_pdf(1));
        assert!(matches!(
            validate(&file, &limits()),
            Err(RemediateError::NotAPdf { .. })
        ));
    }

    #[test]
    fn renamed_non_pdf_rejected() {
        let file = SelectedFile::from_bytes("a.pdf", b"GIF89a".to_vec());
        assert!(matches!(
            check_type(&file),
            Err(RemediateError::NotAPdf { .. })
        ));
    }

    #[test]
    fn size_checked_before_pages() {
        let tight = UploadLimits {
            max_size_mb: 0,
            ..limits()
        };
        let file = SelectedFile::from_bytes("a.pdf", sample_pdf(50));
        assert!(matches!(
            validate(&file, &tight),
            Err(RemediateError::FileTooLarge { limit_mb: 0, .. })
        ));
    }

    #[test]
    fn corrupt_pdf_is_unreadable() {
        let file = SelectedFile::from_bytes("a.pdf", b"%PDF-1.4\ngarbage".to_vec());
        assert!(matches!(
            validate(&file, &limits()),
            Err(RemediateError::UnreadablePdf { .. })
        ));
    }

    #[test]
    fn huge_server_size_limit_accepts_small_file() {
        let usage: crate::quota::UsageSnapshot =
            serde_json::from_str(r#"{"maxSizeAllowedMB": 18446744073709551615}"#).unwrap();
        let file = SelectedFile::from_bytes("a.pdf", sample_pdf(1));
        assert_eq!(validate(&file, &usage.limits()).unwrap(), 1);
    }
}
