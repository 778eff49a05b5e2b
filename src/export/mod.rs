/// Export pipeline
///
/// Walks a selection of files and folders depth-first and lays every
/// image and text file out onto pages:
/// - an image gets a page with its name and the picture scaled into the
///   content box; extracted text (`<stem>_ocr.txt`), if present, follows on
///   extra pages
/// - a text file gets its name as heading and its contents below
///
/// Body text is written one source line per row, cut at a fixed width, with
/// a page break whenever the cursor passes the bottom margin. The document is
/// only written once the whole walk has succeeded.
pub mod document;

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::imaging::ocr::ocr_sidecar_path;
use crate::imaging::transform::image_dimensions;
use crate::state::config::ExportFormat;
use crate::state::data::{file_name_of, EntryKind};
use crate::state::tree::list_dir;
use document::{DocumentRenderer, FlowDocument, PageDocument, PageSize, Placement, A4};

/// Left margin and title offset from the top edge
const MARGIN: f32 = 50.0;
/// First body line, measured from the top edge
const BODY_TOP: f32 = 80.0;
/// Cursor position below which a new page is started
const BOTTOM_MARGIN: f32 = 50.0;
const LINE_HEIGHT: f32 = 20.0;
/// Characters kept from each source line
const LINE_WIDTH: usize = 100;
/// Horizontal and vertical space reserved around an image
const IMAGE_INSET_X: f32 = 100.0;
const IMAGE_INSET_Y: f32 = 150.0;

/// Outcome of a finished export
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportReport {
    pub output: PathBuf,
    pub pages: usize,
    pub images: usize,
    pub texts: usize,
    /// Images that had extracted text attached
    pub attachments: usize,
    /// `(path, error message)` for items that were skipped
    pub failures: Vec<(PathBuf, String)>,
}

/// Export `paths` into one document at `output`
pub fn export(paths: &[PathBuf], output: &Path, format: ExportFormat) -> Result<ExportReport> {
    let renderer: Box<dyn DocumentRenderer> = match format {
        ExportFormat::Pdf => Box::new(PageDocument::new(A4)),
        ExportFormat::Docx => Box::new(FlowDocument::new()),
    };
    export_with(renderer, paths, output)
}

/// Export with a caller-supplied renderer
pub fn export_with(renderer: Box<dyn DocumentRenderer>, paths: &[PathBuf], output: &Path) -> Result<ExportReport> {
    tracing::info!(items = paths.len(), output = %output.display(), "📄 Export started");

    let mut pipeline = ExportPipeline::new(renderer);
    for path in paths {
        pipeline.walk(path)?;
    }
    pipeline.finish(output)
}

struct ExportPipeline {
    renderer: Box<dyn DocumentRenderer>,
    page: PageSize,
    report: ExportReport,
}

impl ExportPipeline {
    fn new(renderer: Box<dyn DocumentRenderer>) -> Self {
        let page = renderer.page_size();
        Self {
            renderer,
            page,
            report: ExportReport::default(),
        }
    }

    /// Pre-order walk; a directory that cannot be listed aborts the export
    fn walk(&mut self, path: &Path) -> Result<()> {
        if path.is_dir() {
            self.renderer.section(&file_name_of(path));
            for child in list_dir(path)? {
                self.walk(&child.path)?;
            }
            return Ok(());
        }

        if let Err(e) = self.export_file(path) {
            tracing::warn!(path = %path.display(), error = %e, "⚠️  Skipped during export");
            self.report.failures.push((path.to_path_buf(), e.to_string()));
        }
        Ok(())
    }

    fn export_file(&mut self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(Error::not_found("export", path));
        }
        match EntryKind::from_file_name(&file_name_of(path)) {
            EntryKind::Image => self.export_image(path),
            EntryKind::Text => self.export_text(path),
            _ => Ok(()),
        }
    }

    fn export_image(&mut self, path: &Path) -> Result<()> {
        let (width, height) = image_dimensions(path)?;
        let name = file_name_of(path);

        let title_y = self.top(MARGIN);
        let placement = self.fit_image(width, height);
        self.renderer.heading(&name, 2, MARGIN, title_y);
        self.renderer.image(path, placement);
        self.renderer.page_break();
        self.report.images += 1;

        // An unreadable sidecar only drops the text pages; the image stays
        let sidecar = ocr_sidecar_path(path);
        if sidecar.is_file() {
            match fs::read_to_string(&sidecar) {
                Ok(text) => {
                    self.renderer
                        .heading(&format!("Text extraction - {name}"), 3, MARGIN, title_y);
                    self.write_lines(&text);
                    self.renderer.page_break();
                    self.report.attachments += 1;
                }
                Err(e) => {
                    let e = Error::io("read extracted text", &sidecar, e);
                    tracing::warn!(path = %sidecar.display(), error = %e, "⚠️  Extracted text skipped");
                    self.report.failures.push((sidecar, e.to_string()));
                }
            }
        }
        Ok(())
    }

    fn export_text(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path).map_err(|e| Error::io("read text", path, e))?;

        let title_y = self.top(MARGIN);
        self.renderer.heading(&file_name_of(path), 2, MARGIN, title_y);
        self.write_lines(&content);
        self.renderer.page_break();
        self.report.texts += 1;
        Ok(())
    }

    /// One row per source line, truncated, breaking pages at the bottom margin
    fn write_lines(&mut self, text: &str) {
        let mut y = self.top(BODY_TOP);
        for line in text.lines() {
            if y < BOTTOM_MARGIN {
                self.renderer.page_break();
                y = self.top(MARGIN);
            }
            let row: String = line.chars().take(LINE_WIDTH).collect();
            self.renderer.paragraph(&row, MARGIN, y);
            y -= LINE_HEIGHT;
        }
    }

    /// Scale into the content box keeping the aspect ratio, centered
    fn fit_image(&self, width: u32, height: u32) -> Placement {
        let max_w = self.page.width - IMAGE_INSET_X;
        let max_h = self.page.height - IMAGE_INSET_Y;
        let ratio = (max_w / width.max(1) as f32).min(max_h / height.max(1) as f32);

        let w = width as f32 * ratio;
        let h = height as f32 * ratio;
        Placement {
            x: (self.page.width - w) / 2.0,
            y: (self.page.height - h) / 2.0 - MARGIN,
            width: w,
            height: h,
        }
    }

    /// Convert a distance from the top edge into a page y coordinate
    fn top(&self, offset: f32) -> f32 {
        self.page.height - offset
    }

    fn finish(mut self, output: &Path) -> Result<ExportReport> {
        self.renderer.save(output)?;

        self.report.output = output.to_path_buf();
        self.report.pages = self.renderer.page_count();
        tracing::info!(
            pages = self.report.pages,
            skipped = self.report.failures.len(),
            output = %output.display(),
            "✅ Export complete"
        );
        Ok(self.report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    fn write_png(path: &Path, w: u32, h: u32) {
        DynamicImage::ImageRgb8(RgbImage::new(w, h)).save(path).unwrap();
    }

    /// Records the calls a renderer receives; the pages are shared with the test
    #[derive(Clone, Default)]
    struct Recorder {
        pages: Arc<Mutex<Vec<Vec<String>>>>,
        current: Vec<String>,
    }

    impl DocumentRenderer for Recorder {
        fn page_size(&self) -> PageSize {
            A4
        }
        fn section(&mut self, name: &str) {
            self.current.push(format!("section:{name}"));
        }
        fn heading(&mut self, text: &str, _level: u8, _x: f32, _y: f32) {
            self.current.push(format!("heading:{text}"));
        }
        fn image(&mut self, source: &Path, _placement: Placement) {
            self.current.push(format!("image:{}", file_name_of(source)));
        }
        fn paragraph(&mut self, text: &str, _x: f32, _y: f32) {
            self.current.push(format!("line:{text}"));
        }
        fn page_break(&mut self) {
            let page = std::mem::take(&mut self.current);
            self.pages.lock().unwrap().push(page);
        }
        fn page_count(&self) -> usize {
            self.pages.lock().unwrap().len()
        }
        fn save(&self, _path: &Path) -> Result<()> {
            Ok(())
        }
    }

    fn math_subject(root: &Path) -> PathBuf {
        let math = root.join("Math");
        fs::create_dir_all(&math).unwrap();
        write_png(&math.join("q2.png"), 20, 10);
        write_png(&math.join("q1.png"), 10, 20);
        fs::write(math.join("q2.meta"), r#"{"tags": "hard"}"#).unwrap();
        math
    }

    #[test]
    fn test_empty_selection_is_a_valid_empty_document() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("empty.pdf");

        let report = export(&[], &output, ExportFormat::Pdf).unwrap();

        assert_eq!(report.pages, 0);
        assert!(output.is_file());
    }

    #[test]
    fn test_subject_exports_one_page_per_image_in_order() {
        let dir = tempdir().unwrap();
        let math = math_subject(dir.path());
        let recorder = Recorder::default();
        let pages = recorder.pages.clone();

        let report = export_with(Box::new(recorder), &[math], &dir.path().join("out.pdf")).unwrap();

        assert_eq!(report.images, 2);
        assert_eq!(report.attachments, 0);
        let pages = pages.lock().unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0], vec!["section:Math", "heading:q1.png", "image:q1.png"]);
        assert_eq!(pages[1], vec!["heading:q2.png", "image:q2.png"]);
    }

    #[test]
    fn test_extracted_text_adds_pages_with_truncated_lines() {
        let dir = tempdir().unwrap();
        let image = dir.path().join("q1.png");
        write_png(&image, 10, 10);
        let long = "x".repeat(150);
        let mut text = format!("{long}\n");
        // 50 more short lines overflow the first text page
        for i in 0..50 {
            text.push_str(&format!("line {i}\n"));
        }
        fs::write(dir.path().join("q1_ocr.txt"), text).unwrap();

        let recorder = Recorder::default();
        let pages = recorder.pages.clone();
        let report = export_with(Box::new(recorder), &[image], &dir.path().join("o.pdf")).unwrap();

        assert_eq!(report.attachments, 1);
        let pages = pages.lock().unwrap();
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[1][0], "heading:Text extraction - q1.png");
        assert_eq!(pages[1][1], format!("line:{}", "x".repeat(LINE_WIDTH)));
        // 841.89 - 80 = 761.89 down to 50 in steps of 20 fits 36 rows
        assert_eq!(pages[1].len(), 1 + 36);
        assert_eq!(pages[2].len(), 51 - 36);
    }

    #[test]
    fn test_unreadable_extracted_text_keeps_the_image() {
        let dir = tempdir().unwrap();
        let image = dir.path().join("q1.png");
        write_png(&image, 10, 10);
        let sidecar = dir.path().join("q1_ocr.txt");
        fs::write(&sidecar, [0xff, 0xfe, 0xfd]).unwrap();

        let recorder = Recorder::default();
        let pages = recorder.pages.clone();
        let report = export_with(Box::new(recorder), &[image], &dir.path().join("o.pdf")).unwrap();

        assert_eq!(report.images, 1);
        assert_eq!(report.attachments, 0);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, sidecar);
        assert_eq!(pages.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_text_files_get_heading_and_content() {
        let dir = tempdir().unwrap();
        let note = dir.path().join("note.txt");
        fs::write(&note, "first\nsecond\n").unwrap();

        let recorder = Recorder::default();
        let pages = recorder.pages.clone();
        export_with(Box::new(recorder), &[note], &dir.path().join("o.docx")).unwrap();

        assert_eq!(
            pages.lock().unwrap()[0],
            vec!["heading:note.txt", "line:first", "line:second"]
        );
    }

    #[test]
    fn test_broken_image_is_skipped_and_walk_continues() {
        let dir = tempdir().unwrap();
        let math = math_subject(dir.path());
        fs::write(math.join("broken.jpg"), b"not an image").unwrap();

        let report = export(&[math], &dir.path().join("out.docx"), ExportFormat::Docx).unwrap();

        assert_eq!(report.images, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.pages, 2);
    }

    #[test]
    fn test_image_fits_content_box() {
        let pipeline = ExportPipeline::new(Box::new(PageDocument::new(A4)));
        let placement = pipeline.fit_image(1000, 500);

        assert!((placement.width - (A4.width - IMAGE_INSET_X)).abs() < 0.01);
        assert!((placement.height - placement.width / 2.0).abs() < 0.01);
        assert!((placement.x * 2.0 + placement.width - A4.width).abs() < 0.01);
    }

    #[cfg(unix)]
    #[test]
    fn test_aborted_walk_writes_nothing() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir_all(&locked).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read_dir(&locked).is_ok() {
            // Running with privileges that ignore permissions
            return;
        }

        let output = dir.path().join("out.pdf");
        let result = export(&[locked.clone()], &output, ExportFormat::Pdf);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(result.is_err());
        assert!(!output.exists());
    }
}
