//! EPUB assembler. Consumes the canonical [Novel] and writes an EPUB 3
//! archive: stored mimetype, container, OPF, nav.xhtml, toc.ncx (for legacy
//! readers), a title page, optional cover, and one XHTML file per chapter.
//!
//! A novel with zero chapters still produces a structurally valid shell; the
//! title page keeps the spine non-empty.

use crate::model::Novel;
use std::io::{Seek, Write};
use std::path::Path;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const MIMETYPE: &[u8] = b"application/epub+zip";
const OEBPS_PREFIX: &str = "OEBPS/";

const CONTAINER_XML: &[u8] = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<container version=\"1.0\" xmlns=\"urn:oasis:names:tc:opendocument:xmlns:container\">\n  <rootfiles>\n    <rootfile full-path=\"OEBPS/content.opf\" media-type=\"application/oebps-package+xml\"/>\n  </rootfiles>\n</container>";

/// Assembly errors. Fatal for the run; the CLI preserves the gathered
/// chapters alongside the error so the scrape is never wasted.
#[derive(Debug, Error)]
pub enum EpubError {
    #[error("Cannot write EPUB: novel title is empty.")]
    EmptyTitle,

    #[error("Failed to create EPUB file: {path}: {source}")]
    CreateFile {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write EPUB archive: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl From<std::io::Error> for EpubError {
    fn from(e: std::io::Error) -> Self {
        EpubError::Zip(zip::result::ZipError::Io(e))
    }
}

/// Cover image bytes plus file extension ("jpg" or "png").
#[derive(Debug, Clone)]
pub struct CoverImage {
    pub data: Vec<u8>,
    pub ext: &'static str,
}

impl CoverImage {
    /// Pick the extension from an HTTP content type, falling back to the URL
    /// path suffix, defaulting to jpg.
    pub fn ext_for(content_type: Option<&str>, url: &str) -> &'static str {
        if let Some(ct) = content_type {
            if ct.contains("png") {
                return "png";
            }
            if ct.contains("jpeg") || ct.contains("jpg") {
                return "jpg";
            }
        }
        let path = url.split(['?', '#']).next().unwrap_or(url);
        if path.to_ascii_lowercase().ends_with(".png") {
            "png"
        } else {
            "jpg"
        }
    }

    fn media_type(&self) -> &'static str {
        match self.ext {
            "png" => "image/png",
            _ => "image/jpeg",
        }
    }
}

/// Write the novel to an EPUB 3 file at `path`.
pub fn write_epub(novel: &Novel, cover: Option<&CoverImage>, path: &Path) -> Result<(), EpubError> {
    if novel.title.trim().is_empty() {
        return Err(EpubError::EmptyTitle);
    }

    let path = path.to_path_buf();
    let file = std::fs::File::create(&path).map_err(|e| EpubError::CreateFile {
        path: path.clone(),
        source: e,
    })?;
    let mut zip = ZipWriter::new(file);

    let stored = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(0o644);
    let deflated = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    // Mimetype must come first and uncompressed.
    zip.start_file("mimetype", stored)?;
    zip.write_all(MIMETYPE)?;

    zip.start_file("META-INF/container.xml", deflated)?;
    zip.write_all(CONTAINER_XML)?;

    write_opf(novel, cover, &mut zip, deflated)?;
    write_nav(novel, &mut zip, deflated)?;
    write_ncx(novel, &mut zip, deflated)?;
    if let Some(cover) = cover {
        write_cover_page(cover, &mut zip, deflated)?;
        zip.start_file(format!("{}images/cover.{}", OEBPS_PREFIX, cover.ext), deflated)?;
        zip.write_all(&cover.data)?;
    }
    write_title_page(novel, &mut zip, deflated)?;
    write_chapters(novel, &mut zip, deflated)?;

    zip.finish()?;
    Ok(())
}

fn identifier(novel: &Novel) -> String {
    novel
        .source_url
        .clone()
        .unwrap_or_else(|| "urn:pageturner:novel".to_string())
}

fn write_opf(
    novel: &Novel,
    cover: Option<&CoverImage>,
    zip: &mut ZipWriter<impl Write + Seek>,
    options: SimpleFileOptions,
) -> Result<(), EpubError> {
    let id = xml_escape(&identifier(novel));
    let title = xml_escape(&novel.title);
    let creator = xml_escape(&novel.author);
    let language = xml_escape(&novel.language);
    let description_el = novel
        .description
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .map(|d| format!("    <dc:description>{}</dc:description>\n", xml_escape(d)))
        .unwrap_or_default();

    let mut manifest = String::from(
        r#"<item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
  <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
  <item id="title-page" href="title.xhtml" media-type="application/xhtml+xml"/>
"#,
    );
    if let Some(cover) = cover {
        manifest.push_str(&format!(
            "  <item id=\"cover-img\" href=\"images/cover.{}\" media-type=\"{}\" properties=\"cover-image\"/>\n",
            cover.ext,
            cover.media_type()
        ));
        manifest.push_str(
            "  <item id=\"cover\" href=\"cover.xhtml\" media-type=\"application/xhtml+xml\"/>\n",
        );
    }
    for (i, _) in novel.chapters.iter().enumerate() {
        manifest.push_str(&format!(
            "  <item id=\"chapter-{n}\" href=\"chapter-{n}.xhtml\" media-type=\"application/xhtml+xml\"/>\n",
            n = i + 1
        ));
    }

    // Spine: cover page (if any), title page, then chapters in traversal
    // order. The title page guarantees at least one itemref.
    let mut spine = String::new();
    if cover.is_some() {
        spine.push_str("  <itemref idref=\"cover\"/>\n");
    }
    spine.push_str("  <itemref idref=\"title-page\"/>\n");
    for (i, _) in novel.chapters.iter().enumerate() {
        spine.push_str(&format!("  <itemref idref=\"chapter-{}\"/>\n", i + 1));
    }

    let guide = if cover.is_some() {
        "  <reference type=\"cover\" href=\"cover.xhtml\" title=\"Cover\"/>\n"
    } else {
        ""
    };

    let opf = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" unique-identifier="book-id" version="3.0"
  xmlns:dc="http://purl.org/dc/elements/1.1/">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="book-id">{id}</dc:identifier>
    <dc:title>{title}</dc:title>
    <dc:creator>{creator}</dc:creator>
    <dc:language>{language}</dc:language>
{description_el}  </metadata>
  <manifest>
{manifest}  </manifest>
  <spine toc="ncx">
{spine}  </spine>
  <guide>
{guide}  </guide>
</package>
"#
    );

    zip.start_file(format!("{}content.opf", OEBPS_PREFIX), options)?;
    zip.write_all(opf.as_bytes())?;
    Ok(())
}

fn write_nav(
    novel: &Novel,
    zip: &mut ZipWriter<impl Write + Seek>,
    options: SimpleFileOptions,
) -> Result<(), EpubError> {
    let mut links = String::new();
    for (i, ch) in novel.chapters.iter().enumerate() {
        links.push_str(&format!(
            "    <li><a href=\"chapter-{}.xhtml\">{}</a></li>\n",
            i + 1,
            html_escape_attr(&ch.title)
        ));
    }
    if links.is_empty() {
        links.push_str("    <li><a href=\"title.xhtml\">Title Page</a></li>\n");
    }
    let nav = format!(
        r#"<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head>
  <meta charset="UTF-8"/>
  <title>Table of Contents</title>
</head>
<body>
  <nav epub:type="toc">
    <h1>Contents</h1>
    <ol>
{}    </ol>
  </nav>
</body>
</html>
"#,
        links
    );
    zip.start_file(format!("{}nav.xhtml", OEBPS_PREFIX), options)?;
    zip.write_all(nav.as_bytes())?;
    Ok(())
}

fn write_ncx(
    novel: &Novel,
    zip: &mut ZipWriter<impl Write + Seek>,
    options: SimpleFileOptions,
) -> Result<(), EpubError> {
    let mut nav_points = String::new();
    for (i, ch) in novel.chapters.iter().enumerate() {
        nav_points.push_str(&format!(
            r#"    <navPoint id="navpoint-{n}" playOrder="{n}">
      <navLabel><text>{label}</text></navLabel>
      <content src="chapter-{n}.xhtml"/>
    </navPoint>
"#,
            n = i + 1,
            label = xml_escape(&ch.title)
        ));
    }
    if nav_points.is_empty() {
        nav_points.push_str(
            r#"    <navPoint id="navpoint-1" playOrder="1">
      <navLabel><text>Title Page</text></navLabel>
      <content src="title.xhtml"/>
    </navPoint>
"#,
        );
    }
    let ncx = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content="{}"/>
  </head>
  <docTitle>
    <text>{}</text>
  </docTitle>
  <navMap>
{}  </navMap>
</ncx>
"#,
        xml_escape(&identifier(novel)),
        xml_escape(&novel.title),
        nav_points
    );
    zip.start_file(format!("{}toc.ncx", OEBPS_PREFIX), options)?;
    zip.write_all(ncx.as_bytes())?;
    Ok(())
}

fn write_cover_page(
    cover: &CoverImage,
    zip: &mut ZipWriter<impl Write + Seek>,
    options: SimpleFileOptions,
) -> Result<(), EpubError> {
    let cover_xhtml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
  <meta charset="UTF-8"/>
  <title>Cover</title>
</head>
<body>
  <div style="text-align: center;">
    <img src="images/cover.{}" alt="Cover" style="max-width: 100%; height: auto;"/>
  </div>
</body>
</html>
"#,
        cover.ext
    );
    zip.start_file(format!("{}cover.xhtml", OEBPS_PREFIX), options)?;
    zip.write_all(cover_xhtml.as_bytes())?;
    Ok(())
}

fn write_title_page(
    novel: &Novel,
    zip: &mut ZipWriter<impl Write + Seek>,
    options: SimpleFileOptions,
) -> Result<(), EpubError> {
    let title = html_escape_attr(&novel.title);
    let author = html_escape_attr(&novel.author);
    let title_xhtml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
  <meta charset="UTF-8"/>
  <title>{title}</title>
</head>
<body>
  <div style="text-align: center; font-family: serif; margin-top: 3em;">
    <h1 style="font-size: 1.5em;">{title}</h1>
    <p style="margin-top: 1em;">{author}</p>
  </div>
</body>
</html>
"#
    );
    zip.start_file(format!("{}title.xhtml", OEBPS_PREFIX), options)?;
    zip.write_all(title_xhtml.as_bytes())?;
    Ok(())
}

fn write_chapters(
    novel: &Novel,
    zip: &mut ZipWriter<impl Write + Seek>,
    options: SimpleFileOptions,
) -> Result<(), EpubError> {
    for (i, ch) in novel.chapters.iter().enumerate() {
        let html = format!(
            r#"<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
  <meta charset="UTF-8"/>
  <title>{}</title>
</head>
<body>
  <h2>{}</h2>
{}
</body>
</html>
"#,
            html_escape_attr(&ch.title),
            html_escape_attr(&ch.title),
            ch.body
        );
        zip.start_file(format!("{}chapter-{}.xhtml", OEBPS_PREFIX, i + 1), options)?;
        zip.write_all(html.as_bytes())?;
    }
    Ok(())
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn html_escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Chapter;
    use std::io::Read;
    use zip::read::ZipArchive;

    fn minimal_novel() -> Novel {
        Novel {
            title: "Test Novel".to_string(),
            author: "Test Author".to_string(),
            language: "en".to_string(),
            description: None,
            cover_url: None,
            source_url: Some("https://site.example/chapter-1.html".to_string()),
            chapters: vec![Chapter {
                index: 1,
                url: "https://site.example/chapter-1.html".to_string(),
                title: "Chapter 1".to_string(),
                body: "<p>First paragraph.</p>".to_string(),
            }],
        }
    }

    fn read_entry(path: &Path, name: &str) -> String {
        let file = std::fs::File::open(path).unwrap();
        let mut zip = ZipArchive::new(file).unwrap();
        let mut entry = zip.by_name(name).unwrap();
        let mut s = String::new();
        entry.read_to_string(&mut s).unwrap();
        s
    }

    #[test]
    fn rejects_empty_title() {
        let mut novel = minimal_novel();
        novel.title = "   ".to_string();
        let path = std::env::temp_dir().join("pageturner_epub_void.epub");
        let result = write_epub(&novel, None, &path);
        assert!(matches!(result, Err(EpubError::EmptyTitle)));
    }

    #[test]
    fn writes_expected_archive_layout() {
        let novel = minimal_novel();
        let path = std::env::temp_dir().join("pageturner_epub_layout.epub");
        write_epub(&novel, None, &path).unwrap();
        let file = std::fs::File::open(&path).unwrap();
        let zip = ZipArchive::new(file).unwrap();
        let names: Vec<String> = zip.file_names().map(String::from).collect();
        assert_eq!(names[0], "mimetype");
        assert!(names.contains(&"META-INF/container.xml".to_string()));
        assert!(names.contains(&"OEBPS/content.opf".to_string()));
        assert!(names.contains(&"OEBPS/nav.xhtml".to_string()));
        assert!(names.contains(&"OEBPS/toc.ncx".to_string()));
        assert!(names.contains(&"OEBPS/title.xhtml".to_string()));
        assert!(names.contains(&"OEBPS/chapter-1.xhtml".to_string()));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn zero_chapters_still_writes_valid_shell() {
        let mut novel = minimal_novel();
        novel.chapters.clear();
        let path = std::env::temp_dir().join("pageturner_epub_empty.epub");
        write_epub(&novel, None, &path).unwrap();
        let opf = read_entry(&path, "OEBPS/content.opf");
        // Spine must not be empty: the title page anchors it. The source URL
        // in dc:identifier may still mention "chapter", so check manifest
        // entries specifically.
        assert!(opf.contains("<itemref idref=\"title-page\"/>"));
        assert!(!opf.contains("chapter-1.xhtml"));
        assert!(!opf.contains("idref=\"chapter-1\""));
        let ncx = read_entry(&path, "OEBPS/toc.ncx");
        assert!(ncx.contains("Title Page"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn opf_carries_configured_language_and_metadata() {
        let mut novel = minimal_novel();
        novel.language = "fr".to_string();
        novel.description = Some("Une histoire.".to_string());
        let path = std::env::temp_dir().join("pageturner_epub_lang.epub");
        write_epub(&novel, None, &path).unwrap();
        let opf = read_entry(&path, "OEBPS/content.opf");
        assert!(opf.contains("<dc:language>fr</dc:language>"));
        assert!(opf.contains("<dc:description>Une histoire.</dc:description>"));
        assert!(opf.contains("<dc:title>Test Novel</dc:title>"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn cover_image_is_packaged_and_in_spine() {
        let novel = minimal_novel();
        let cover = CoverImage {
            data: vec![0xFF, 0xD8, 0xFF],
            ext: "jpg",
        };
        let path = std::env::temp_dir().join("pageturner_epub_cover.epub");
        write_epub(&novel, Some(&cover), &path).unwrap();
        let file = std::fs::File::open(&path).unwrap();
        let zip = ZipArchive::new(file).unwrap();
        let names: Vec<String> = zip.file_names().map(String::from).collect();
        assert!(names.contains(&"OEBPS/images/cover.jpg".to_string()));
        assert!(names.contains(&"OEBPS/cover.xhtml".to_string()));
        let opf = read_entry(&path, "OEBPS/content.opf");
        assert!(opf.contains("properties=\"cover-image\""));
        assert!(opf.contains("<itemref idref=\"cover\"/>"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn titles_are_escaped_in_nav_and_opf() {
        let mut novel = minimal_novel();
        novel.title = "War & <Peace>".to_string();
        novel.chapters[0].title = "Fish & Chips".to_string();
        let path = std::env::temp_dir().join("pageturner_epub_escape.epub");
        write_epub(&novel, None, &path).unwrap();
        let opf = read_entry(&path, "OEBPS/content.opf");
        assert!(opf.contains("War &amp; &lt;Peace&gt;"));
        let nav = read_entry(&path, "OEBPS/nav.xhtml");
        assert!(nav.contains("Fish &amp; Chips"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn cover_ext_prefers_content_type_then_url() {
        assert_eq!(CoverImage::ext_for(Some("image/png"), "https://x/c.jpg"), "png");
        assert_eq!(CoverImage::ext_for(Some("image/jpeg"), "https://x/c.png"), "jpg");
        assert_eq!(CoverImage::ext_for(None, "https://x/cover.PNG?v=2"), "png");
        assert_eq!(CoverImage::ext_for(None, "https://x/cover"), "jpg");
    }
}
