//! Non-raster document handling. Vision models never see these inputs:
//! the cascade is direct PDF text extraction, then OCR over embedded page
//! images, then a dedicated unsupported-document failure.

use image::DynamicImage;
use lopdf::Document;

use crate::error::PipelineError;

use super::ClassicalOcr;

/// Magic-byte check used during input validation.
pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF-")
}

/// Extract text from a PDF using the classical recognizer only.
///
/// Digital PDFs yield text directly. Scanned PDFs yield little or none, so
/// embedded image XObjects are decoded and OCRed one by one. If the whole
/// cascade produces fewer than `min_text_len` chars the document is
/// unsupported and the run fails.
pub fn extract(
    bytes: &[u8],
    classical: &dyn ClassicalOcr,
    min_text_len: usize,
) -> Result<String, PipelineError> {
    let direct = pdf_extract::extract_text_from_mem(bytes)
        .map(|t| t.trim().to_string())
        .unwrap_or_else(|e| {
            tracing::debug!(error = %e, "direct PDF text extraction failed");
            String::new()
        });

    if direct.len() >= min_text_len {
        tracing::info!(chars = direct.len(), "extracted embedded text directly from PDF");
        return Ok(direct);
    }

    tracing::info!("PDF has no usable embedded text, OCRing page images");
    let images = embedded_images(bytes)?;

    let mut pages = Vec::new();
    for (i, img) in images.iter().enumerate() {
        match classical.recognize(img) {
            Ok(text) if !text.trim().is_empty() => pages.push(text.trim().to_string()),
            Ok(_) => {}
            Err(e) => tracing::warn!(page = i + 1, error = %e, "failed to OCR PDF image"),
        }
    }

    let combined = pages.join("\n\n");
    if combined.trim().len() >= min_text_len {
        return Ok(combined);
    }

    Err(PipelineError::UnsupportedDocument(
        "document contains no extractable text or recognizable page images".to_string(),
    ))
}

/// Decode every image XObject in the PDF. Objects that fail to decode are
/// skipped with a warning.
fn embedded_images(bytes: &[u8]) -> Result<Vec<DynamicImage>, PipelineError> {
    let doc = Document::load_mem(bytes)
        .map_err(|e| PipelineError::UnsupportedDocument(format!("failed to parse PDF: {e}")))?;

    let mut images = Vec::new();
    for (object_id, object) in doc.objects.iter() {
        let Ok(stream) = object.as_stream() else { continue };
        let is_image = stream
            .dict
            .get(b"Subtype")
            .ok()
            .and_then(|s| s.as_name().ok())
            .map(|n| n == b"Image")
            .unwrap_or(false);
        if !is_image {
            continue;
        }

        match decode_image_stream(&doc, stream) {
            Ok(img) => images.push(img),
            Err(e) => tracing::warn!(?object_id, error = %e, "failed to decode PDF image object"),
        }
    }

    Ok(images)
}

fn decode_image_stream(doc: &Document, stream: &lopdf::Stream) -> Result<DynamicImage, PipelineError> {
    let dim = |key: &[u8]| {
        stream
            .dict
            .get(key)
            .ok()
            .and_then(|v| v.as_i64().ok())
            .ok_or_else(|| PipelineError::Engine(format!("missing image {}", String::from_utf8_lossy(key))))
    };
    let width = dim(b"Width")? as u32;
    let height = dim(b"Height")? as u32;

    let data = stream
        .decompressed_content()
        .map_err(|e| PipelineError::Engine(format!("failed to decompress image: {e}")))?;

    let bits = stream
        .dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|b| b.as_i64().ok())
        .unwrap_or(8);
    if bits != 8 {
        return Err(PipelineError::Engine(format!("unsupported bit depth: {bits}")));
    }

    let color_space = resolve_color_space(doc, stream);
    match color_space.as_str() {
        "DeviceGray" if data.len() >= (width * height) as usize => {
            image::GrayImage::from_raw(width, height, data)
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(|| PipelineError::Engine("invalid grayscale image data".to_string()))
        }
        "DeviceRGB" | "ICCBased" if data.len() >= (width * height * 3) as usize => {
            image::RgbImage::from_raw(width, height, data)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| PipelineError::Engine("invalid RGB image data".to_string()))
        }
        "DeviceCMYK" if data.len() >= (width * height * 4) as usize => {
            let rgb: Vec<u8> = data
                .chunks_exact(4)
                .flat_map(|p| {
                    let k = p[3] as f32 / 255.0;
                    [p[0], p[1], p[2]].map(|ch| ((1.0 - ch as f32 / 255.0) * (1.0 - k) * 255.0) as u8)
                })
                .collect();
            image::RgbImage::from_raw(width, height, rgb)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| PipelineError::Engine("invalid CMYK image data".to_string()))
        }
        other => Err(PipelineError::Engine(format!(
            "unsupported color space or short data: {other} ({} bytes)",
            data.len()
        ))),
    }
}

/// Color-space names may be direct, indirect references, or arrays like
/// `[/ICCBased ref]`. Missing entries default to RGB.
fn resolve_color_space(doc: &Document, stream: &lopdf::Stream) -> String {
    let Ok(obj) = stream.dict.get(b"ColorSpace") else {
        return "DeviceRGB".to_string();
    };

    let name_of = |o: &lopdf::Object| -> Option<String> {
        if let Ok(name) = o.as_name() {
            return Some(String::from_utf8_lossy(name).to_string());
        }
        if let Ok(array) = o.as_array() {
            if let Some(first) = array.first() {
                if let Ok(name) = first.as_name() {
                    return Some(String::from_utf8_lossy(name).to_string());
                }
            }
        }
        None
    };

    if let Some(name) = name_of(obj) {
        return name;
    }
    if let Ok(reference) = obj.as_reference() {
        if let Ok(resolved) = doc.get_object(reference) {
            if let Some(name) = name_of(resolved) {
                return name;
            }
        }
    }
    "DeviceRGB".to_string()
}
