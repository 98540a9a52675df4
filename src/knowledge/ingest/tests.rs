use super::*;
use tempfile::TempDir;

fn sonata() -> VehicleRecord {
    VehicleRecord {
        brand: "현대".to_string(),
        model: "쏘나타".to_string(),
        description: Some("중형 세단".to_string()),
        trims: vec![TrimRecord {
            name: "프리미엄".to_string(),
            price: 27_880_000,
            specs: BTreeMap::from([("연료".to_string(), "가솔린".to_string())]),
        }],
        options: vec![OptionRecord {
            name: "선루프".to_string(),
            price: 1_000_000,
        }],
        image_url: "https://img.example.com/sonata.png".to_string(),
        base_trim_id: "T100".to_string(),
        origin_id: "42".to_string(),
    }
}

#[test]
fn price_grouping() {
    assert_eq!(format_price(0), "0원");
    assert_eq!(format_price(999), "999원");
    assert_eq!(format_price(1_000), "1,000원");
    assert_eq!(format_price(27_880_000), "27,880,000원");
}

#[test]
fn rendered_document_carries_footer() {
    let document = sonata().to_document();

    assert_eq!(document.source, "car-42");
    assert!(document.content.starts_with("[차량] 현대 쏘나타"));
    assert!(document.content.contains("- 프리미엄: 27,880,000원 (연료: 가솔린)"));
    assert!(document.content.contains("- 선루프: 1,000,000원"));
    assert_eq!(
        footer_field(&document.content, IMAGE_URL_LABEL),
        Some("https://img.example.com/sonata.png")
    );
    assert_eq!(footer_field(&document.content, BASE_TRIM_ID_LABEL), Some("T100"));
    assert_eq!(footer_field(&document.content, ORIGIN_ID_LABEL), Some("42"));
}

#[test]
fn footer_field_missing_or_empty() {
    assert_eq!(footer_field("no footer here", BASE_TRIM_ID_LABEL), None);
    assert_eq!(footer_field("BaseTrimId:   ", BASE_TRIM_ID_LABEL), None);
}

#[test]
fn parse_catalog_json() {
    let raw = r#"[{
        "brand": "기아",
        "model": "K5",
        "imageUrl": "https://img.example.com/k5.png",
        "baseTrimId": "T200",
        "originId": "7",
        "trims": [{ "name": "노블레스", "price": 30000000 }]
    }]"#;

    let records = parse_records(raw).expect("catalog should parse");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].source(), "car-7");
    assert!(records[0].options.is_empty());
    assert!(records[0].description.is_none());
}

#[test]
fn empty_origin_id_is_rejected() {
    let raw = r#"[{ "brand": "기아", "model": "K5", "imageUrl": "u", "baseTrimId": "t", "originId": " " }]"#;
    assert!(matches!(parse_records(raw), Err(RagError::Ingest(_))));
}

#[test]
fn load_records_from_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("catalog.json");
    let json = serde_json::to_string(&vec![sonata()]).expect("serialize");
    std::fs::write(&path, json).expect("write catalog");

    let records = load_records(&path).expect("load should succeed");
    assert_eq!(records, vec![sonata()]);

    assert!(matches!(
        load_records(&temp_dir.path().join("missing.json")),
        Err(RagError::Ingest(_))
    ));
}
