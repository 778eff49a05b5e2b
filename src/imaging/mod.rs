/// Image collaborators
///
/// This module handles:
/// - Enhancing, cropping, rotating and resizing images (transform.rs)
/// - Calling the OCR engine and locating its output (ocr.rs)

pub mod ocr;
pub mod transform;
