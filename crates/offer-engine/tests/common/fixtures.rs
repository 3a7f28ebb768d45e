//! Document and catalog fixtures shared by the integration tests

#![allow(dead_code)]

use std::path::Path;

use lopdf::{dictionary, Dictionary, Document, Object, Stream, StringFormat};
use offer_types::{Category, Company, CompanyDocument, Product};

/// Install a test subscriber once; later calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// A PDF whose page N shows the text `{label}-{N}`
pub fn labelled_pdf(pages: u32, label: &str) -> Vec<u8> {
    save(build(pages, label))
}

/// Same as `labelled_pdf` with a Title/Author Info dictionary
pub fn titled_pdf(pages: u32, label: &str, title: &str) -> Vec<u8> {
    let mut doc = build(pages, label);
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::String(title.as_bytes().to_vec(), StringFormat::Literal),
        "Author" => Object::String(b"Offer Desk".to_vec(), StringFormat::Literal),
    });
    doc.trailer.set("Info", Object::Reference(info_id));
    save(doc)
}

/// A PDF that claims Standard encryption with a non-empty user password
pub fn locked_pdf(label: &str) -> Vec<u8> {
    let mut doc = build(1, label);
    let encrypt_id = doc.add_object(dictionary! {
        "Filter" => "Standard",
        "V" => 2,
        "R" => 3,
        "Length" => 128,
        "P" => -4,
        "O" => Object::string_literal(vec![0u8; 32]),
        "U" => Object::string_literal(vec![1u8; 32]),
    });
    doc.trailer.set("Encrypt", Object::Reference(encrypt_id));
    doc.trailer.set(
        "ID",
        Object::Array(vec![
            Object::string_literal(vec![2u8; 16]),
            Object::string_literal(vec![2u8; 16]),
        ]),
    );
    save(doc)
}

fn build(pages: u32, label: &str) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::new();

    for n in 1..=pages {
        let content = format!("BT /F1 12 Tf 50 700 Td ({}-{}) Tj ET", label, n);
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "Contents" => Object::Reference(content_id),
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        kids.push(Object::Reference(page_id));
    }

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
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));
    doc
}

fn save(mut doc: Document) -> Vec<u8> {
    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

/// First literal string on every page, in page order
pub fn page_labels(bytes: &[u8]) -> Vec<String> {
    let doc = Document::load_mem(bytes).unwrap();
    doc.get_pages()
        .values()
        .map(|&id| {
            let content = doc.get_page_content(id).unwrap_or_default();
            let text = String::from_utf8_lossy(&content).to_string();
            match (text.find('('), text.find(')')) {
                (Some(start), Some(end)) if start < end => text[start + 1..end].to_string(),
                _ => String::new(),
            }
        })
        .collect()
}

pub fn info_field(bytes: &[u8], key: &[u8]) -> Option<String> {
    let doc = Document::load_mem(bytes).ok()?;
    let info_id = doc.trailer.get(b"Info").ok()?.as_reference().ok()?;
    let value = doc.get_dictionary(info_id).ok()?.get(key).ok()?.as_str().ok()?;
    Some(String::from_utf8_lossy(value).to_string())
}

/// Solid grey RGB PNG
pub fn chart_png(width: u32, height: u32) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().unwrap();
        writer
            .write_image_data(&vec![180u8; (width * height * 3) as usize])
            .unwrap();
    }
    out
}

pub fn product(id: &str, category: Category, brand: &str, model: &str, capacity: f64) -> Product {
    Product {
        id: id.to_string(),
        category,
        brand: brand.to_string(),
        model: model.to_string(),
        capacity_value: capacity,
        unit_price: 1000.0,
        datasheet_path: Some(format!("sheets/{}.pdf", id)),
    }
}

pub fn company(id: &str, name: &str) -> Company {
    Company {
        id: id.to_string(),
        name: name.to_string(),
        logo_path: None,
    }
}

pub fn company_document(id: &str, display_name: &str, relative_path: &str) -> CompanyDocument {
    CompanyDocument {
        id: id.to_string(),
        display_name: display_name.to_string(),
        relative_path: relative_path.to_string(),
    }
}

/// Write a datasheet for every product that has a datasheet path
pub fn write_datasheets(root: &Path, products: &[Product]) {
    std::fs::create_dir_all(root.join("sheets")).unwrap();
    for product in products {
        if let Some(path) = &product.datasheet_path {
            std::fs::write(root.join(path), labelled_pdf(1, &product.id)).unwrap();
        }
    }
}
