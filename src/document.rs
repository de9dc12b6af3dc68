//! The source document and text extraction from uploaded files.

use std::path::Path;

use crate::error::NarrationError;

/// Immutable document text; all char offsets in a narration refer to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    title: String,
    text: String,
    char_len: usize,
}

impl Document {
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            title: title.into(),
            char_len: text.chars().count(),
            text,
        }
    }

    /// Extract the text of an uploaded file, enforcing `max_bytes`.
    pub fn from_upload(
        filename: &str,
        bytes: &[u8],
        max_bytes: usize,
    ) -> Result<Self, NarrationError> {
        if bytes.len() > max_bytes {
            return Err(NarrationError::DocumentTooLarge {
                size: bytes.len(),
                limit: max_bytes,
            });
        }
        let text = extract_text(filename, bytes)?;
        Ok(Self::new(filename, text))
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn char_len(&self) -> usize {
        self.char_len
    }

    /// The text between two char offsets, clamped to the document.
    pub fn slice(&self, start: usize, end: usize) -> String {
        let end = end.min(self.char_len);
        let start = start.min(end);
        self.text.chars().skip(start).take(end - start).collect()
    }
}

/// Extract plain text from an uploaded file, dispatching on its extension.
pub fn extract_text(filename: &str, bytes: &[u8]) -> Result<String, NarrationError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "txt" | "md" => Ok(decode_utf8_dropping_invalid(bytes)),
        #[cfg(feature = "docx")]
        "docx" => docx::extract(bytes),
        #[cfg(feature = "pdf")]
        "pdf" => pdf::extract(bytes),
        _ => Err(NarrationError::UnsupportedFormat(filename.to_string())),
    }
}

/// Decode UTF-8, skipping invalid byte sequences instead of replacing them.
fn decode_utf8_dropping_invalid(bytes: &[u8]) -> String {
    bytes.utf8_chunks().map(|chunk| chunk.valid()).collect()
}

#[cfg(feature = "pdf")]
mod pdf {
    use crate::error::NarrationError;

    /// Page texts of a PDF in page order, joined with newlines.
    pub fn extract(bytes: &[u8]) -> Result<String, NarrationError> {
        let doc = lopdf::Document::load_mem(bytes)?;
        let mut pages = Vec::new();
        for page_number in doc.get_pages().keys() {
            let text = doc.extract_text(&[*page_number])?;
            pages.push(text.trim_end_matches('\n').to_string());
        }
        log::debug!("Extracted text from {} PDF page(s)", pages.len());
        Ok(pages.join("\n"))
    }
}

#[cfg(feature = "docx")]
mod docx {
    use std::io::{Cursor, Read};

    use crate::error::NarrationError;

    const BODY_ENTRY: &str = "word/document.xml";

    /// Paragraph texts of a .docx body, joined with newlines.
    pub fn extract(bytes: &[u8]) -> Result<String, NarrationError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
        let mut xml = String::new();
        archive.by_name(BODY_ENTRY)?.read_to_string(&mut xml)?;
        Ok(paragraphs(&xml).join("\n"))
    }

    pub(super) fn paragraphs(xml: &str) -> Vec<String> {
        let mut paragraphs = Vec::new();
        let mut current = String::new();
        let mut in_text = false;
        let mut in_paragraph = false;
        let mut rest = xml;

        while let Some(open) = rest.find('<') {
            if in_text {
                current.push_str(&unescape(&rest[..open]));
            }
            let Some(close) = rest[open..].find('>') else {
                break;
            };
            let tag = &rest[open + 1..open + close];
            rest = &rest[open + close + 1..];

            let closing = tag.starts_with('/');
            let self_closing = tag.ends_with('/');
            let name = tag
                .trim_start_matches('/')
                .split(|c: char| c.is_whitespace() || c == '/')
                .next()
                .unwrap_or("");

            match (name, closing) {
                ("w:p", false) if !self_closing => {
                    in_paragraph = true;
                    current.clear();
                }
                ("w:p", false) => paragraphs.push(String::new()),
                ("w:p", true) => {
                    if in_paragraph {
                        paragraphs.push(std::mem::take(&mut current));
                    }
                    in_paragraph = false;
                }
                ("w:t", false) => in_text = !self_closing,
                ("w:t", true) => in_text = false,
                ("w:tab", false) => current.push('\t'),
                ("w:br" | "w:cr", false) => current.push('\n'),
                _ => {}
            }
        }

        paragraphs
    }

    fn unescape(raw: &str) -> String {
        if !raw.contains('&') {
            return raw.to_string();
        }
        let mut out = String::with_capacity(raw.len());
        let mut rest = raw;
        while let Some(amp) = rest.find('&') {
            out.push_str(&rest[..amp]);
            let after = &rest[amp..];
            let Some(semi) = after.find(';') else {
                out.push_str(after);
                return out;
            };
            let entity = &after[1..semi];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32),
            };
            match decoded {
                Some(ch) => out.push(ch),
                None => out.push_str(&after[..=semi]),
            }
            rest = &after[semi + 1..];
        }
        out.push_str(rest);
        out
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn unescapes_entities() {
            assert_eq!(unescape("a &amp; b &lt;c&gt; &#65;&#x42; &bogus;"), "a & b <c> AB &bogus;");
        }

        #[test]
        fn collects_runs_tabs_and_empty_paragraphs() {
            let xml = r#"<w:document><w:body>
                <w:p><w:r><w:t>Hello</w:t></w:r><w:r><w:t xml:space="preserve"> world</w:t></w:r></w:p>
                <w:p/>
                <w:p><w:r><w:t>a</w:t><w:tab/><w:t>b</w:t><w:br/><w:t>c</w:t></w:r></w:p>
                <w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:t>Tom &amp; Jerry</w:t></w:r></w:p>
            </w:body></w:document>"#;
            assert_eq!(
                paragraphs(xml),
                vec!["Hello world", "", "a\tb\nc", "Tom & Jerry"]
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_utf8_in_plain_text_is_dropped() {
        let text = extract_text("Notes.TXT", b"caf\xc3\xa9 \xff ok").unwrap();
        assert_eq!(text, "café  ok");
        // Truncated sequence at the end.
        assert_eq!(extract_text("a.txt", b"ab\xe2\x82").unwrap(), "ab");
        assert_eq!(extract_text("readme.md", b"# Title").unwrap(), "# Title");
    }

    #[test]
    fn unknown_extensions_are_rejected() {
        for name in ["scan.rtf", "image.png", "no_extension"] {
            assert!(matches!(
                extract_text(name, b"data"),
                Err(NarrationError::UnsupportedFormat(_))
            ));
        }
    }

    #[test]
    fn upload_size_is_enforced() {
        let err = Document::from_upload("big.txt", &[b'a'; 11], 10).unwrap_err();
        assert!(matches!(
            err,
            NarrationError::DocumentTooLarge { size: 11, limit: 10 }
        ));
        let doc = Document::from_upload("ok.txt", b"fine", 10).unwrap();
        assert_eq!(doc.title(), "ok.txt");
        assert_eq!(doc.text(), "fine");
    }

    #[test]
    fn char_len_and_slice_use_chars() {
        let doc = Document::new("t", "naïve café");
        assert_eq!(doc.char_len(), 10);
        assert_eq!(doc.slice(6, 10), "café");
        assert_eq!(doc.slice(6, 99), "café");
        assert_eq!(doc.slice(12, 20), "");
    }

    #[cfg(feature = "docx")]
    #[test]
    fn docx_archive_body_is_extracted() {
        use std::io::Write;

        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            zip.start_file("word/document.xml", options).unwrap();
            zip.write_all(
                br#"<w:document><w:body><w:p><w:r><w:t>First</w:t></w:r></w:p><w:p><w:r><w:t>Second</w:t></w:r></w:p></w:body></w:document>"#,
            )
            .unwrap();
            zip.finish().unwrap();
        }
        let text = extract_text("report.docx", buf.get_ref()).unwrap();
        assert_eq!(text, "First\nSecond");

        assert!(extract_text("broken.docx", b"not a zip").is_err());
    }

    #[cfg(feature = "pdf")]
    #[test]
    fn pdf_pages_are_extracted_in_order() {
        use lopdf::content::{Content, Operation};
        use lopdf::{dictionary, Object, Stream};

        let mut pdf = lopdf::Document::with_version("1.5");
        let pages_id = pdf.new_object_id();
        let font_id = pdf.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = pdf.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let mut kids: Vec<Object> = Vec::new();
        for line in ["Hello World", "Second page"] {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![100.into(), 600.into()]),
                    Operation::new("Tj", vec![Object::string_literal(line)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                pdf.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = pdf.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }
        pdf.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => 2,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = pdf.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        pdf.trailer.set("Root", catalog_id);
        let mut bytes = Vec::new();
        pdf.save_to(&mut bytes).unwrap();

        let text = extract_text("paper.PDF", &bytes).unwrap();
        let first = text.find("Hello World").expect("first page text");
        let second = text.find("Second page").expect("second page text");
        assert!(first < second);
        assert!(text[first..second].contains('\n'));

        assert!(matches!(
            extract_text("broken.pdf", b"not a pdf"),
            Err(NarrationError::Pdf(_))
        ));
    }
}
