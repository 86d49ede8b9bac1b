//! Builders for small but valid input files.

#![allow(dead_code)]

use std::io::Cursor;

use lopdf::{dictionary, Document, Object, Stream};

/// Builds a PDF with one page per entry; `None` produces a page without a
/// text layer, like a scan.
pub fn pdf(pages: &[Option<&str>]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let kids: Vec<Object> = pages
        .iter()
        .map(|page| {
            let content = page
                .map(|text| format!("BT /F1 11 Tf 72 720 Td ({}) Tj ET", text))
                .unwrap_or_default();
            let content_id =
                doc.add_object(Object::Stream(Stream::new(dictionary! {}, content.into_bytes())));
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Resources" => resources_id,
                "Contents" => content_id,
            })
            .into()
        })
        .collect();

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("Failed to write test PDF");
    bytes
}

/// A small white PNG, standing in for a photographed page.
pub fn png() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(8, 8, image::Rgb([255, 255, 255]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("Failed to encode test PNG");
    out.into_inner()
}

/// Structuring response for the balcony scene.
pub const BALCONY_JSON: &str = r#"{
    "title": "The Balcony",
    "author": "William Shakespeare",
    "characters": ["ROMEO", "JULIET"],
    "lines": [
        { "characterName": "ROMEO", "text": "But soft, what light through yonder window breaks?", "order": 1 },
        { "characterName": "JULIET", "text": "Ay me!", "order": 2 },
        { "characterName": "ROMEO", "text": "She speaks.", "order": 3 }
    ]
}"#;

/// OCR output that the rule-based structurer can read.
pub const BALCONY_TEXT: &str =
    "The Balcony\nby William Shakespeare\n\nROMEO: But soft, what light through yonder window breaks?\nJULIET: Ay me!\nROMEO: She speaks.\n";
