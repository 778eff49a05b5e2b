/// Text extraction (OCR) collaborator
///
/// The recognizer itself is an external program; this module only knows
/// how to call it and where its result is stored next to the image.
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Error, Result};

/// Suffix appended to an image's stem for its extracted text
pub const OCR_SUFFIX: &str = "_ocr.txt";

/// Language models used when none is specified
pub const DEFAULT_LANGUAGE: &str = "chi_sim+eng";

pub trait TextExtractor: Send + Sync {
    /// Recognize the text in the image at `image`
    fn extract(&self, image: &Path, language: &str) -> Result<String>;
}

/// Runs the `tesseract` command-line tool
#[derive(Debug, Clone)]
pub struct TesseractExtractor {
    program: PathBuf,
}

impl Default for TesseractExtractor {
    fn default() -> Self {
        Self {
            program: PathBuf::from("tesseract"),
        }
    }
}

impl TesseractExtractor {
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl TextExtractor for TesseractExtractor {
    fn extract(&self, image: &Path, language: &str) -> Result<String> {
        if !image.is_file() {
            return Err(Error::not_found("extract text", image));
        }

        let output = Command::new(&self.program)
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(language)
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => Error::RecognitionFailure(format!(
                    "{} is not installed or not on PATH",
                    self.program.display()
                )),
                _ => Error::RecognitionFailure(format!("could not run {}: {e}", self.program.display())),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::RecognitionFailure(format!(
                "{} failed on {}: {}",
                self.program.display(),
                image.display(),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Where the extracted text of `image` is stored (`q1.jpg` -> `q1_ocr.txt`)
pub fn ocr_sidecar_path(image: &Path) -> PathBuf {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    image.with_file_name(format!("{stem}{OCR_SUFFIX}"))
}
