//! End-to-end tests for the alert codec
//!
//! Composes the shipped ATLAS fragments, encodes alerts with stamps in both
//! framings and checks what comes back out.

use std::fs;
use std::path::{Path, PathBuf};

use atlas_alert_codec::{
    check_md5, compose, decode, decode_file, embed, encode, extract, read_bulk_file, write_bulk_file,
    AlertError, ContainerCodec, Record, ResolvedSchema, Stamp, StampField, Value,
};
use rstest::rstest;
use tempfile::TempDir;

fn schema_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("schema").join(name)
}

fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn alert_schema() -> ResolvedSchema {
    compose(&[
        schema_path("cutout.avsc"),
        schema_path("candidate.avsc"),
        schema_path("alert.avsc"),
    ])
    .expect("ATLAS fragments compose in dependency order")
}

fn sample_alert() -> Record {
    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(fixture_path("alert.json")).unwrap()).unwrap();
    Record::from_json(&json).unwrap()
}

fn alert_with_id(id: i64) -> Record {
    sample_alert().with("alertId", id)
}

// =============================================================================
// Schema composition
// =============================================================================

#[rstest]
#[case(&["cutout.avsc", "candidate.avsc", "alert.avsc"], true)]
#[case(&["candidate.avsc", "cutout.avsc", "alert.avsc"], true)]
#[case(&["alert.avsc", "candidate.avsc", "cutout.avsc"], false)]
#[case(&["cutout.avsc", "alert.avsc"], false)]
fn test_composition_is_order_dependent(#[case] order: &[&str], #[case] resolves: bool) {
    let paths: Vec<PathBuf> = order.iter().map(|name| schema_path(name)).collect();
    match compose(&paths) {
        Ok(schema) => {
            assert!(resolves, "{order:?} should not resolve");
            assert_eq!(schema.name().as_deref(), Some("atlas.alert.alert"));
        }
        Err(AlertError::SchemaResolution { .. }) => assert!(!resolves, "{order:?} should resolve"),
        Err(other) => panic!("Expected SchemaResolution, got {:?}", other),
    }
}

#[test]
fn test_duplicate_type_across_fragments() {
    let err = compose(&[schema_path("cutout.avsc"), fixture_path("duplicate_cutout.avsc")]).unwrap_err();
    match err {
        AlertError::SchemaResolution { reason, .. } => assert!(reason.contains("atlas.alert.cutout")),
        other => panic!("Expected SchemaResolution, got {:?}", other),
    }
}

#[test]
fn test_unreadable_and_malformed_sources_fail_to_load() {
    let missing = compose(&[fixture_path("does_not_exist.avsc")]).unwrap_err();
    assert!(matches!(missing, AlertError::SchemaLoad { .. }));

    let malformed = compose(&[fixture_path("malformed.avsc")]).unwrap_err();
    assert!(matches!(malformed, AlertError::SchemaLoad { .. }));
}

// =============================================================================
// Schemaless messages
// =============================================================================

#[test]
fn test_schemaless_round_trip_with_stamp() {
    let dir = TempDir::new().unwrap();
    let sci = dir.path().join("sci.jpg");
    let image: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
    fs::write(&sci, &image).unwrap();

    let schema = alert_schema();
    let mut alert = sample_alert();
    embed(&mut alert, StampField::Science, &sci).unwrap();

    let bytes = encode(&alert, &schema).unwrap();
    let decoded = decode(&bytes, &schema).unwrap();

    assert_eq!(decoded.get("alertId"), Some(&Value::Int(1)));
    let stamp = Stamp::from_value(decoded.get("cutoutScience").unwrap()).unwrap().unwrap();
    assert_eq!(stamp.file_name, "sci.jpg");
    assert_eq!(decoded.get("cutoutTemplate"), Some(&Value::Null));

    let out = dir.path().join("output");
    let written = extract(&decoded, StampField::Science, &out).unwrap().unwrap();
    assert_eq!(written, out.join("sci.jpg"));
    assert_eq!(fs::read(&written).unwrap(), image);
    assert!(check_md5(&sci, &written).unwrap());
}

#[test]
fn test_round_trip_equals_input_when_all_fields_present() {
    let schema = alert_schema();
    let stamp = Stamp::new("diff.jpg", vec![0, 1, 2, 3]);

    let first = decode(
        &encode(&sample_alert().with("cutoutDifference", stamp), &schema).unwrap(),
        &schema,
    )
    .unwrap();
    // a fully populated record survives a second trip unchanged
    let second = decode(&encode(&first, &schema).unwrap(), &schema).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_message_file_decodes_single_record() {
    let dir = TempDir::new().unwrap();
    let schema = alert_schema();
    let path = dir.path().join("alert.avro");
    fs::write(&path, encode(&alert_with_id(9), &schema).unwrap()).unwrap();

    let record = decode_file(&path, &schema).unwrap();
    assert_eq!(record.get("alertId"), Some(&Value::Int(9)));
}

#[test]
fn test_schemaless_bytes_need_the_writer_schema() {
    let schema = alert_schema();
    let bytes = encode(&sample_alert(), &schema).unwrap();

    let cutout_only = compose(&[schema_path("cutout.avsc")]).unwrap();
    match decode(&bytes, &cutout_only) {
        Err(AlertError::Decoding(_)) => {}
        Ok(record) => assert!(!record.contains("alertId")),
        Err(other) => panic!("Expected Decoding, got {:?}", other),
    }
}

#[test]
fn test_schema_is_shared_across_threads() {
    let schema = alert_schema();
    let encoded: Vec<Vec<u8>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|id| {
                let schema = &schema;
                scope.spawn(move || encode(&alert_with_id(id), schema).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (id, bytes) in encoded.iter().enumerate() {
        let record = decode(bytes, &schema).unwrap();
        assert_eq!(record.get("alertId"), Some(&Value::Int(id as i64)));
    }
}

// =============================================================================
// Bulk containers
// =============================================================================

#[rstest]
#[case(ContainerCodec::Null)]
#[case(ContainerCodec::Deflate)]
fn test_bulk_preserves_order(#[case] codec: ContainerCodec) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("alerts_bulk.avro");
    let schema = alert_schema();
    let alerts: Vec<Record> = (100..300).map(alert_with_id).collect();

    assert_eq!(write_bulk_file(&path, &schema, &alerts, codec).unwrap(), 200);

    let ids: Vec<i64> = read_bulk_file(&path, None)
        .unwrap()
        .map(|r| match r.unwrap().get("alertId") {
            Some(Value::Int(id)) => *id,
            other => panic!("unexpected alertId {:?}", other),
        })
        .collect();
    assert_eq!(ids, (100..300).collect::<Vec<_>>());
}

#[test]
fn test_bulk_container_is_self_describing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("alerts_bulk.avro");
    let schema = alert_schema();
    write_bulk_file(&path, &schema, &[alert_with_id(5)], ContainerCodec::Null).unwrap();

    let reader = read_bulk_file(&path, None).unwrap();
    assert_eq!(reader.writer_schema().canonical_form(), schema.canonical_form());
}

#[test]
fn test_bulk_projection_onto_reader_schema() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("alerts_bulk.avro");
    let schema = alert_schema();
    let stamp = Stamp::new("sci.jpg", vec![1, 2, 3]);
    write_bulk_file(&path, &schema, &[alert_with_id(7).with("cutoutScience", stamp)], ContainerCodec::Null).unwrap();

    let reader_schema = compose(&[
        schema_path("cutout.avsc"),
        schema_path("candidate.avsc"),
        fixture_path("evolved_alert.avsc"),
    ])
    .unwrap();

    let records: Vec<Record> = read_bulk_file(&path, Some(&reader_schema))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.get("alertId"), Some(&Value::Int(7)));
    assert_eq!(record.get("broker"), Some(&Value::String("atlas".to_string())));
    assert!(!record.contains("cutoutScience"));
    assert!(!record.contains("atlas_object_id"));
}

#[test]
fn test_bulk_incompatible_reader_schema() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("alerts_bulk.avro");
    let schema = alert_schema();
    write_bulk_file(&path, &schema, &[alert_with_id(1)], ContainerCodec::Null).unwrap();

    let reader_schema = compose(&[fixture_path("incompatible_alert.avsc")]).unwrap();
    match read_bulk_file(&path, Some(&reader_schema)) {
        Err(AlertError::Decoding(reason)) => assert!(reason.contains("priority")),
        Err(other) => panic!("Expected Decoding, got {:?}", other),
        Ok(_) => panic!("incompatible reader schema was accepted"),
    }
}

#[test]
fn test_bulk_reader_field_missing_under_union() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("alerts_bulk.avro");
    let schema = alert_schema();
    let stamp = Stamp::new("sci.jpg", vec![1, 2, 3]);
    write_bulk_file(&path, &schema, &[alert_with_id(3).with("cutoutScience", stamp)], ContainerCodec::Null).unwrap();

    // cutout fields sit under ["null", "atlas.alert.cutout"]
    let reader_schema = compose(&[
        fixture_path("checksummed_cutout.avsc"),
        schema_path("candidate.avsc"),
        schema_path("alert.avsc"),
    ])
    .unwrap();
    match read_bulk_file(&path, Some(&reader_schema)) {
        Err(AlertError::Decoding(reason)) => assert!(reason.contains("cutoutScience.checksum"), "{reason}"),
        Err(other) => panic!("Expected Decoding, got {:?}", other),
        Ok(_) => panic!("reader schema with an unfilled cutout field was accepted"),
    }
}

// =============================================================================
// Stamps
// =============================================================================

#[test]
fn test_stamp_extraction_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let schema = alert_schema();
    let alert = sample_alert().with("cutoutTemplate", Stamp::new("temp.jpg", vec![5; 64]));
    let decoded = decode(&encode(&alert, &schema).unwrap(), &schema).unwrap();

    let first = extract(&decoded, StampField::Template, dir.path()).unwrap().unwrap();
    let before = fs::read(&first).unwrap();
    let second = extract(&decoded, StampField::Template, dir.path()).unwrap().unwrap();

    assert_eq!(first, second);
    assert_eq!(fs::read(&second).unwrap(), before);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}
