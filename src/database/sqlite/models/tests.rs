use chrono::Utc;

use super::*;

#[test]
fn source_category_display() {
    assert_eq!(SourceCategory::Requirement.to_string(), "requirement");
    assert_eq!(SourceCategory::Defect.to_string(), "defect");
    assert_eq!(SourceCategory::TestCase.to_string(), "test_case");
    assert_eq!(SourceCategory::Document.to_string(), "document");
    assert_eq!(SourceCategory::DocumentSection.to_string(), "document_section");
}

#[test]
fn source_category_parsing() {
    for category in SourceCategory::ALL {
        let parsed: SourceCategory = category
            .as_str()
            .parse()
            .expect("canonical tag should parse");
        assert_eq!(parsed, category);
    }

    assert_eq!(
        "Test-Case".parse::<SourceCategory>().ok(),
        Some(SourceCategory::TestCase)
    );
    assert!("bug report".parse::<SourceCategory>().is_err());
    assert!("defects".parse::<SourceCategory>().is_err());
    assert!("".parse::<SourceCategory>().is_err());
}

#[test]
fn source_category_serde_uses_tags() {
    let json = serde_json::to_string(&SourceCategory::DocumentSection).expect("serializes");
    assert_eq!(json, "\"document_section\"");

    let parsed: SourceCategory = serde_json::from_str("\"test_case\"").expect("deserializes");
    assert_eq!(parsed, SourceCategory::TestCase);
}

#[test]
fn vector_blob_codec() {
    let vector = vec![0.0_f32, -1.5, 3.25, f32::MIN_POSITIVE];
    let bytes = encode_vector(&vector);
    assert_eq!(bytes.len(), 16);
    assert_eq!(
        decode_vector(&bytes).expect("valid blob should decode"),
        vector
    );
}

#[test]
fn corrupted_blob_is_rejected() {
    assert!(decode_vector(&[0, 1, 2]).is_err());
    assert!(
        decode_vector(&[])
            .expect("empty blob decodes")
            .is_empty()
    );
}

#[test]
fn row_with_wrong_dimension_is_rejected() {
    let now = Utc::now();
    let row = EmbeddingRow {
        source_id: "REQ-1".to_string(),
        source_category: SourceCategory::Requirement,
        vector: encode_vector(&[1.0, 2.0]),
        dimension: 3,
        snippet: "text".to_string(),
        embedding_origin: EmbeddingOrigin::Provider,
        reference_timestamp: now,
        created_at: now,
        updated_at: now,
    };

    assert!(StoredEmbedding::try_from(row.clone()).is_err());

    let valid = EmbeddingRow {
        dimension: 2,
        ..row
    };
    let stored = StoredEmbedding::try_from(valid).expect("consistent row should decode");
    assert_eq!(stored.vector, vec![1.0, 2.0]);
    assert_eq!(stored.origin, EmbeddingOrigin::Provider);
}
