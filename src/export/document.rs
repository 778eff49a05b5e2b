/// Document-rendering collaborator and its two backends
///
/// The export pipeline decides what goes on which page and where; a
/// renderer only records those primitives and writes the finished document.
/// `PageDocument` keeps absolute positions per page (the PDF backend),
/// `FlowDocument` keeps a flat stream of blocks with explicit page breaks
/// (the Word backend). Both are written as JSON for a downstream encoder.
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{Error, Result};

/// Page dimensions in points (1/72 inch)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

pub const A4: PageSize = PageSize {
    width: 595.28,
    height: 841.89,
};

/// Where an image lands on its page, origin at the bottom-left corner
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

pub trait DocumentRenderer: Send {
    fn page_size(&self) -> PageSize;

    /// A directory is being entered
    fn section(&mut self, name: &str);

    fn heading(&mut self, text: &str, level: u8, x: f32, y: f32);

    fn image(&mut self, source: &Path, placement: Placement);

    /// One line of body text
    fn paragraph(&mut self, text: &str, x: f32, y: f32);

    /// Close the current page; later content goes on a new one
    fn page_break(&mut self);

    /// Pages finished so far
    fn page_count(&self) -> usize;

    fn save(&self, path: &Path) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PageItem {
    Heading { text: String, level: u8, x: f32, y: f32 },
    Image { source: PathBuf, placement: Placement },
    Text { text: String, x: f32, y: f32 },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Page {
    pub items: Vec<PageItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlineEntry {
    pub title: String,
    /// Index of the first page of the section
    pub page: usize,
}

/// Page-oriented document (PDF backend)
#[derive(Debug, Clone, Serialize)]
pub struct PageDocument {
    pub page_size: PageSize,
    pub pages: Vec<Page>,
    pub outline: Vec<OutlineEntry>,
    #[serde(skip)]
    current: Page,
}

impl PageDocument {
    pub fn new(page_size: PageSize) -> Self {
        Self {
            page_size,
            pages: Vec::new(),
            outline: Vec::new(),
            current: Page::default(),
        }
    }
}

impl DocumentRenderer for PageDocument {
    fn page_size(&self) -> PageSize {
        self.page_size
    }

    fn section(&mut self, name: &str) {
        self.outline.push(OutlineEntry {
            title: name.to_string(),
            page: self.pages.len(),
        });
    }

    fn heading(&mut self, text: &str, level: u8, x: f32, y: f32) {
        self.current.items.push(PageItem::Heading {
            text: text.to_string(),
            level,
            x,
            y,
        });
    }

    fn image(&mut self, source: &Path, placement: Placement) {
        self.current.items.push(PageItem::Image {
            source: source.to_path_buf(),
            placement,
        });
    }

    fn paragraph(&mut self, text: &str, x: f32, y: f32) {
        self.current.items.push(PageItem::Text {
            text: text.to_string(),
            x,
            y,
        });
    }

    fn page_break(&mut self) {
        self.pages.push(std::mem::take(&mut self.current));
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn save(&self, path: &Path) -> Result<()> {
        write_json(self, "pdf", path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Heading { text: String, level: u8 },
    Image { source: PathBuf, width: f32, height: f32 },
    Paragraph { text: String },
    PageBreak,
}

/// Flow-oriented document (Word backend)
#[derive(Debug, Clone, Default, Serialize)]
pub struct FlowDocument {
    pub blocks: Vec<Block>,
}

impl FlowDocument {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentRenderer for FlowDocument {
    fn page_size(&self) -> PageSize {
        A4
    }

    fn section(&mut self, name: &str) {
        self.blocks.push(Block::Heading {
            text: format!("Folder: {name}"),
            level: 1,
        });
    }

    fn heading(&mut self, text: &str, level: u8, _x: f32, _y: f32) {
        self.blocks.push(Block::Heading {
            text: text.to_string(),
            level,
        });
    }

    fn image(&mut self, source: &Path, placement: Placement) {
        self.blocks.push(Block::Image {
            source: source.to_path_buf(),
            width: placement.width,
            height: placement.height,
        });
    }

    fn paragraph(&mut self, text: &str, _x: f32, _y: f32) {
        self.blocks.push(Block::Paragraph {
            text: text.to_string(),
        });
    }

    fn page_break(&mut self) {
        self.blocks.push(Block::PageBreak);
    }

    fn page_count(&self) -> usize {
        self.blocks.iter().filter(|b| matches!(b, Block::PageBreak)).count()
    }

    fn save(&self, path: &Path) -> Result<()> {
        write_json(self, "docx", path)
    }
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    format: &'static str,
    document: &'a T,
}

fn write_json<T: Serialize>(document: &T, format: &'static str, path: &Path) -> Result<()> {
    let json = serde_json::to_vec_pretty(&Envelope { format, document })
        .map_err(|e| Error::json("save document", path, e))?;
    fs::write(path, json).map_err(|e| Error::io("save document", path, e))
}
