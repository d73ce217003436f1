//! Tests d'intégration du pipeline sur des bundles écrits à la volée

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use geo::{polygon, CoordsIter, MultiPolygon};
use geojson::GeoJson;
use parcel_zoning::config::DatasetConfig;
use parcel_zoning::harmonize::harmonize;
use parcel_zoning::{run, run_in_memory, CrsError, PipelineConfig, PipelineError};
use serde_json::{json, Value};
use shapefile::dbase::{FieldValue, Record, TableWriterBuilder};
use shapefile::{Point, Polygon, PolygonRing};
use shpbundle::{Feature, FeatureSet, LoadOptions, Projection};
use tempfile::TempDir;

const UTM12_PRJ: &str = r#"PROJCS["WGS_1984_UTM_Zone_12N",GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Transverse_Mercator"],PARAMETER["False_Easting",500000.0],PARAMETER["False_Northing",0.0],PARAMETER["Central_Meridian",-111.0],PARAMETER["Scale_Factor",0.9996],PARAMETER["Latitude_Of_Origin",0.0],UNIT["Meter",1.0]]"#;

const WGS84_PRJ: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;

fn ring(points: &[(f64, f64)]) -> Polygon {
    Polygon::new(PolygonRing::Outer(
        points.iter().map(|&(x, y)| Point::new(x, y)).collect(),
    ))
}

fn rect(x0: f64, y0: f64, w: f64, h: f64) -> Polygon {
    ring(&[
        (x0, y0),
        (x0, y0 + h),
        (x0 + w, y0 + h),
        (x0 + w, y0),
        (x0, y0),
    ])
}

/// Bundle de parcelles : champs `pid` et `owner`
fn write_parcels(dir: &Path, prj: &str, rows: &[(&str, Polygon)]) -> PathBuf {
    let shp = dir.join("parcels.shp");
    let table = TableWriterBuilder::new()
        .add_character_field("pid".try_into().unwrap(), 20)
        .add_character_field("owner".try_into().unwrap(), 40);

    {
        let mut writer = shapefile::Writer::from_path(&shp, table).unwrap();
        for (pid, shape) in rows {
            let mut record = Record::default();
            record.insert("pid".to_string(), FieldValue::Character(Some(pid.to_string())));
            record.insert(
                "owner".to_string(),
                FieldValue::Character(Some(format!("Owner {}", pid))),
            );
            writer.write_shape_and_record(shape, &record).unwrap();
        }
    }

    std::fs::write(dir.join("parcels.prj"), prj).unwrap();
    shp
}

/// Bundle de zonage : champs `zid`, `zoning_code`, `district_name` et `ZONE_FAR`
fn write_zoning(dir: &Path, prj: &str, rows: &[(&str, &str, Polygon)]) -> PathBuf {
    let shp = dir.join("zoning.shp");
    let table = TableWriterBuilder::new()
        .add_character_field("zid".try_into().unwrap(), 20)
        .add_character_field("zoning_code".try_into().unwrap(), 20)
        .add_character_field("district_name".try_into().unwrap(), 40)
        .add_numeric_field("ZONE_FAR".try_into().unwrap(), 10, 2);

    {
        let mut writer = shapefile::Writer::from_path(&shp, table).unwrap();
        for (zid, code, shape) in rows {
            let mut record = Record::default();
            record.insert("zid".to_string(), FieldValue::Character(Some(zid.to_string())));
            record.insert(
                "zoning_code".to_string(),
                FieldValue::Character(Some(code.to_string())),
            );
            record.insert(
                "district_name".to_string(),
                FieldValue::Character(Some(format!("District {}", zid))),
            );
            record.insert("ZONE_FAR".to_string(), FieldValue::Numeric(Some(2.5)));
            writer.write_shape_and_record(shape, &record).unwrap();
        }
    }

    std::fs::write(dir.join("zoning.prj"), prj).unwrap();
    shp
}

fn config() -> PipelineConfig {
    let mut config = PipelineConfig::from_preset("generic").unwrap();
    config.parcels.id_field = Some("pid".to_string());
    config.zoning.dataset.id_field = Some("zid".to_string());
    config
}

/// Z1 = [0,100]², Z2 = [100,200]×[0,100]
fn two_zones() -> Vec<(&'static str, &'static str, Polygon)> {
    vec![
        ("Z1", "R-C1", rect(0.0, 0.0, 100.0, 100.0)),
        ("Z2", "M-G", rect(100.0, 0.0, 100.0, 100.0)),
    ]
}

fn read_features(path: &Path) -> Vec<geojson::Feature> {
    let content = std::fs::read_to_string(path).unwrap();
    match content.parse::<GeoJson>().unwrap() {
        GeoJson::FeatureCollection(fc) => fc.features,
        other => panic!("Expected FeatureCollection, got {:?}", other),
    }
}

fn prop<'a>(feature: &'a geojson::Feature, name: &str) -> &'a Value {
    feature
        .property(name)
        .unwrap_or_else(|| panic!("missing property {}", name))
}

fn feature_id(feature: &geojson::Feature) -> String {
    match feature.id.as_ref() {
        Some(geojson::feature::Id::String(s)) => s.clone(),
        other => panic!("Unexpected id {:?}", other),
    }
}

#[test]
fn test_fixture_scenario() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let parcels = write_parcels(
        input.path(),
        UTM12_PRJ,
        &[
            ("P3", rect(500.0, 500.0, 10.0, 10.0)),
            ("P1", rect(10.0, 10.0, 20.0, 20.0)),
            ("P2", rect(40.0, 10.0, 100.0, 10.0)),
        ],
    );
    let zoning = write_zoning(input.path(), UTM12_PRJ, &two_zones());

    let report = run(&parcels, &zoning, out.path(), &config(), None).unwrap();

    let features = read_features(&out.path().join("parcels_with_zoning.geojson"));
    let ids: Vec<String> = features.iter().map(feature_id).collect();
    assert_eq!(ids, vec!["P1", "P2", "P3"]);

    let p1 = &features[0];
    assert_eq!(prop(p1, "zoning_id"), &json!("Z1"));
    assert_eq!(prop(p1, "zoning_code"), &json!("R-C1"));
    assert_eq!(prop(p1, "zoning_district_name"), &json!("District Z1"));
    assert_eq!(prop(p1, "zoning_ZONE_FAR"), &json!(2.5));
    assert_eq!(prop(p1, "overlap_fraction").as_f64(), Some(1.0));
    assert_eq!(prop(p1, "owner"), &json!("Owner P1"));
    assert!(prop(p1, "join_reason").is_null());

    let p2 = &features[1];
    assert_eq!(prop(p2, "zoning_id"), &json!("Z1"));
    assert_eq!(prop(p2, "overlap_fraction").as_f64(), Some(0.6));
    assert_eq!(
        prop(p2, "secondary_matches"),
        &json!([{"zoning_id": "Z2", "overlap_fraction": 0.4}])
    );

    let p3 = &features[2];
    assert!(prop(p3, "zoning_id").is_null());
    assert!(prop(p3, "overlap_fraction").is_null());
    assert_eq!(prop(p3, "join_reason"), &json!("NO_CANDIDATE"));
    assert!(p3.geometry.is_some());

    assert_eq!(report.join.matched, 2);
    assert_eq!(report.join.unmatched_parcels, vec!["P3"]);
    assert_eq!(report.join.empty_districts, vec!["Z2"]);
    assert_eq!(report.parcels.source_epsg, 32612);

    let saved: Value = serde_json::from_str(
        &std::fs::read_to_string(out.path().join("quality_report.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(saved["join"]["unmatched_parcels"], json!(["P3"]));
    assert_eq!(saved["join"]["by_reason"]["NO_CANDIDATE"], json!(1));
    assert_eq!(saved["status"], json!("CompletedWithIssues"));
}

#[test]
fn test_output_is_byte_identical_across_runs() {
    let input = TempDir::new().unwrap();
    let parcels = write_parcels(
        input.path(),
        UTM12_PRJ,
        &[
            ("B", rect(40.0, 10.0, 100.0, 10.0)),
            ("A", rect(10.0, 10.0, 20.0, 20.0)),
            ("C", rect(95.0, 50.0, 10.0, 10.0)),
        ],
    );
    let zoning = write_zoning(input.path(), UTM12_PRJ, &two_zones());

    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    run(&parcels, &zoning, first.path(), &config(), None).unwrap();
    run(&parcels, &zoning, second.path(), &config(), Some(2)).unwrap();

    let a = std::fs::read(first.path().join("parcels_with_zoning.geojson")).unwrap();
    let b = std::fs::read(second.path().join("parcels_with_zoning.geojson")).unwrap();
    assert_eq!(a, b);

    // Même contenu en mémoire
    let options = LoadOptions {
        id_field: Some("pid".to_string()),
    };
    let zoning_options = LoadOptions {
        id_field: Some("zid".to_string()),
    };
    let (bytes, _) = run_in_memory(
        shpbundle::load(&parcels, &options).unwrap(),
        shpbundle::load(&zoning, &zoning_options).unwrap(),
        &config(),
    )
    .unwrap();
    assert_eq!(bytes, a);
}

#[test]
fn test_tie_resolves_to_lower_zoning_id() {
    let input = TempDir::new().unwrap();
    let parcels = write_parcels(input.path(), UTM12_PRJ, &[("1", rect(40.0, 0.0, 20.0, 10.0))]);
    let zoning = write_zoning(
        input.path(),
        UTM12_PRJ,
        &[
            ("10", "R-C1", rect(0.0, 0.0, 50.0, 100.0)),
            ("9", "R-C2", rect(50.0, 0.0, 50.0, 100.0)),
        ],
    );

    for _ in 0..3 {
        let out = TempDir::new().unwrap();
        run(&parcels, &zoning, out.path(), &config(), None).unwrap();
        let features = read_features(&out.path().join("parcels_with_zoning.geojson"));
        assert_eq!(prop(&features[0], "zoning_id"), &json!("9"));
        assert_eq!(prop(&features[0], "overlap_fraction").as_f64(), Some(0.5));
        assert_eq!(
            prop(&features[0], "secondary_matches")[0]["zoning_id"],
            json!("10")
        );
    }
}

#[test]
fn test_shared_edge_is_zero_overlap() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let parcels = write_parcels(input.path(), UTM12_PRJ, &[("1", rect(200.0, 0.0, 10.0, 10.0))]);
    let zoning = write_zoning(input.path(), UTM12_PRJ, &two_zones());

    let report = run(&parcels, &zoning, out.path(), &config(), None).unwrap();

    let features = read_features(&out.path().join("parcels_with_zoning.geojson"));
    assert_eq!(prop(&features[0], "join_reason"), &json!("ZERO_OVERLAP"));
    assert_eq!(report.join.by_reason.get("ZERO_OVERLAP"), Some(&1));
}

#[test]
fn test_self_intersection_repaired() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let bowtie = ring(&[(20.0, 40.0), (30.0, 50.0), (30.0, 40.0), (20.0, 50.0), (20.0, 40.0)]);
    let parcels = write_parcels(input.path(), UTM12_PRJ, &[("1", bowtie)]);
    let zoning = write_zoning(input.path(), UTM12_PRJ, &two_zones());

    let report = run(&parcels, &zoning, out.path(), &config(), None).unwrap();

    let features = read_features(&out.path().join("parcels_with_zoning.geojson"));
    let parcel = &features[0];
    assert_eq!(prop(parcel, "geometry_valid"), &json!(true));
    assert_eq!(prop(parcel, "geometry_repaired"), &json!(true));
    assert_eq!(prop(parcel, "zoning_id"), &json!("Z1"));
    assert_eq!(prop(parcel, "overlap_fraction").as_f64(), Some(1.0));

    assert_eq!(report.parcels.repaired, 1);
    assert!((report.parcels.total_area - 50.0).abs() < 1e-6);
    assert_eq!(report.parcels.repaired_by_kind.get("SELF_INTERSECTION"), Some(&1));
}

#[test]
fn test_overlapping_parts_merged_before_join() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let parts = Polygon::with_rings(vec![
        PolygonRing::Outer(
            [(10.0, 10.0), (10.0, 20.0), (20.0, 20.0), (20.0, 10.0), (10.0, 10.0)]
                .iter()
                .map(|&(x, y)| Point::new(x, y))
                .collect(),
        ),
        PolygonRing::Outer(
            [(15.0, 10.0), (15.0, 20.0), (25.0, 20.0), (25.0, 10.0), (15.0, 10.0)]
                .iter()
                .map(|&(x, y)| Point::new(x, y))
                .collect(),
        ),
    ]);
    let parcels = write_parcels(input.path(), UTM12_PRJ, &[("1", parts)]);
    let zoning = write_zoning(input.path(), UTM12_PRJ, &two_zones());

    let report = run(&parcels, &zoning, out.path(), &config(), None).unwrap();

    let features = read_features(&out.path().join("parcels_with_zoning.geojson"));
    let parcel = &features[0];
    assert_eq!(prop(parcel, "geometry_valid"), &json!(true));
    assert_eq!(prop(parcel, "geometry_repaired"), &json!(true));
    assert_eq!(prop(parcel, "zoning_id"), &json!("Z1"));
    assert_eq!(prop(parcel, "overlap_fraction").as_f64(), Some(1.0));

    assert_eq!(report.parcels.repaired, 1);
    assert!((report.parcels.total_area - 150.0).abs() < 1e-6);
}

#[test]
fn test_invalid_geometry_kept_and_flagged() {
    let input = TempDir::new().unwrap();
    let bowtie = ring(&[(20.0, 40.0), (30.0, 50.0), (30.0, 40.0), (20.0, 50.0), (20.0, 40.0)]);
    // Anneau plat replié sur lui-même : la réparation ne laisse aucune surface
    let flat = ring(&[(50.0, 50.0), (70.0, 50.0), (60.0, 50.0), (80.0, 50.0), (50.0, 50.0)]);
    let parcels = write_parcels(
        input.path(),
        UTM12_PRJ,
        &[("1", bowtie), ("2", flat), ("3", rect(10.0, 10.0, 5.0, 5.0))],
    );
    let zoning = write_zoning(input.path(), UTM12_PRJ, &two_zones());

    let mut no_repair = config();
    no_repair.repair = false;

    let out = TempDir::new().unwrap();
    let report = run(&parcels, &zoning, out.path(), &no_repair, None).unwrap();
    let features = read_features(&out.path().join("parcels_with_zoning.geojson"));
    assert_eq!(features.len(), 3);
    assert_eq!(prop(&features[0], "join_reason"), &json!("INVALID_GEOMETRY"));
    assert_eq!(prop(&features[0], "geometry_valid"), &json!(false));
    assert!(features[0].geometry.is_some());
    assert_eq!(prop(&features[1], "join_reason"), &json!("INVALID_GEOMETRY"));
    assert_eq!(prop(&features[2], "zoning_id"), &json!("Z1"));
    assert_eq!(report.parcels.invalid, 2);

    let out = TempDir::new().unwrap();
    let report = run(&parcels, &zoning, out.path(), &config(), None).unwrap();
    let features = read_features(&out.path().join("parcels_with_zoning.geojson"));
    assert_eq!(prop(&features[0], "zoning_id"), &json!("Z1"));
    assert_eq!(prop(&features[1], "join_reason"), &json!("INVALID_GEOMETRY"));
    assert_eq!(prop(&features[1], "geometry_repaired"), &json!(false));
    assert_eq!(report.parcels.invalid, 1);
    assert!(report.issues.iter().any(|i| i.feature_id == "2"));
}

#[test]
fn test_every_parcel_written_once() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();

    // Grille 10×10 écrite en ordre inverse, à cheval sur les deux zones et au-delà
    let rows: Vec<(String, Polygon)> = (0..100)
        .rev()
        .map(|i| {
            let x = (i % 10) as f64 * 20.0;
            let y = (i / 10) as f64 * 20.0;
            ((i + 1).to_string(), rect(x + 2.0, y + 2.0, 15.0, 15.0))
        })
        .collect();
    let rows: Vec<(&str, Polygon)> = rows.iter().map(|(id, p)| (id.as_str(), p.clone())).collect();
    let parcels = write_parcels(input.path(), UTM12_PRJ, &rows);
    let zoning = write_zoning(input.path(), UTM12_PRJ, &two_zones());

    let report = run(&parcels, &zoning, out.path(), &config(), Some(3)).unwrap();
    let features = read_features(&out.path().join("parcels_with_zoning.geojson"));

    assert_eq!(features.len(), 100);
    let ids: Vec<String> = features.iter().map(feature_id).collect();
    let expected: Vec<String> = (1..=100).map(|i| i.to_string()).collect();
    assert_eq!(ids, expected);
    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 100);

    for feature in &features {
        let matched = !prop(feature, "zoning_id").is_null();
        let reason = !prop(feature, "join_reason").is_null();
        assert!(matched != reason, "parcel {}", feature_id(feature));
        if let Some(fraction) = prop(feature, "overlap_fraction").as_f64() {
            assert!(fraction > 0.0 && fraction <= 1.0);
        }
    }

    // Les 50 parcelles des 5 premières rangées tombent dans Z1 ou Z2
    assert_eq!(report.join.matched, 50);
    assert_eq!(report.join.by_reason.get("NO_CANDIDATE"), Some(&50));
    assert!(report.join.empty_districts.is_empty());
}

#[test]
fn test_mixed_crs_inputs() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let parcels = write_parcels(
        input.path(),
        UTM12_PRJ,
        &[("1", rect(284660.0, 5659270.0, 20.0, 20.0))],
    );
    let zoning = write_zoning(
        input.path(),
        WGS84_PRJ,
        &[("Z1", "R-C1", rect(-114.2, 50.9, 0.4, 0.4))],
    );

    let report = run(&parcels, &zoning, out.path(), &config(), None).unwrap();

    assert_eq!(report.zoning.source_epsg, 4326);
    assert_eq!(report.parcels.source_epsg, 32612);
    let features = read_features(&out.path().join("parcels_with_zoning.geojson"));
    assert_eq!(prop(&features[0], "zoning_id"), &json!("Z1"));
    assert_eq!(prop(&features[0], "overlap_fraction").as_f64(), Some(1.0));
}

#[test]
fn test_undeclared_crs_aborts_without_output() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let parcels = write_parcels(input.path(), UTM12_PRJ, &[("1", rect(10.0, 10.0, 5.0, 5.0))]);
    let zoning = write_zoning(input.path(), "", &two_zones());

    match run(&parcels, &zoning, out.path(), &config(), None) {
        Err(PipelineError::Crs(CrsError::Undeclared { dataset, .. })) => {
            assert_eq!(dataset, "zoning")
        }
        other => panic!("Expected undeclared CRS, got {:?}", other.map(|r| r.summary())),
    }
    assert!(!out.path().join("parcels_with_zoning.geojson").exists());
    assert!(!out.path().join("quality_report.json").exists());

    // L'override débloque le run
    let mut config = config();
    config.zoning.dataset.crs_override = Some(32612);
    assert!(run(&parcels, &zoning, out.path(), &config, None).is_ok());
}

#[test]
fn test_colliding_parcel_attribute_is_kept_under_new_name() {
    let square = |x0: f64, y0: f64, size: f64| {
        MultiPolygon::new(vec![polygon![
            (x: x0, y: y0),
            (x: x0, y: y0 + size),
            (x: x0 + size, y: y0 + size),
            (x: x0 + size, y: y0)
        ]])
    };
    let mut attributes = std::collections::BTreeMap::new();
    attributes.insert(
        "zoning_code".to_string(),
        shpbundle::AttributeValue::Text("OLD".into()),
    );
    let parcels = FeatureSet::in_memory(
        "parcels",
        Projection::from_epsg(32612),
        vec!["zoning_code".to_string()],
        vec![Feature::new("1", square(10.0, 10.0, 5.0), attributes)],
    );

    let mut zone = std::collections::BTreeMap::new();
    zone.insert(
        "zoning_code".to_string(),
        shpbundle::AttributeValue::Text("R-C1".into()),
    );
    let zoning = FeatureSet::in_memory(
        "zoning",
        Projection::from_epsg(32612),
        vec!["zoning_code".to_string()],
        vec![Feature::new("Z1", square(0.0, 0.0, 100.0), zone)],
    );

    let (bytes, report) = run_in_memory(parcels, zoning, &config()).unwrap();

    let json: Value = serde_json::from_slice(&bytes).unwrap();
    let properties = &json["features"][0]["properties"];
    assert_eq!(properties["zoning_code"], json!("R-C1"));
    assert_eq!(properties["parcel_zoning_code"], json!("OLD"));
    assert_eq!(
        report.renamed_attributes.get("zoning_code").map(String::as_str),
        Some("parcel_zoning_code")
    );
}

#[test]
fn test_failed_report_leaves_no_output() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let parcels = write_parcels(input.path(), UTM12_PRJ, &[("1", rect(10.0, 10.0, 5.0, 5.0))]);
    let zoning = write_zoning(input.path(), UTM12_PRJ, &two_zones());

    // Un répertoire occupe la place du rapport : le renommage final échoue
    std::fs::create_dir(out.path().join("quality_report.json")).unwrap();

    assert!(matches!(
        run(&parcels, &zoning, out.path(), &config(), None),
        Err(PipelineError::Io { .. })
    ));
    assert!(!out.path().join("parcels_with_zoning.geojson").exists());
}

#[test]
fn test_reprojection_round_trip() {
    let original = MultiPolygon::new(vec![polygon![
        (x: -114.08, y: 51.04),
        (x: -114.07, y: 51.04),
        (x: -114.07, y: 51.05),
        (x: -114.08, y: 51.05)
    ]]);
    let mut set = FeatureSet::in_memory(
        "parcels",
        Projection::from_epsg(4326),
        vec![],
        vec![Feature::new("1", original.clone(), Default::default())],
    );

    harmonize(&mut set, &DatasetConfig::default(), 32612).unwrap();
    harmonize(&mut set, &DatasetConfig::default(), 3400).unwrap();
    harmonize(&mut set, &DatasetConfig::default(), 4326).unwrap();

    for (a, b) in original.coords_iter().zip(set.features[0].geometry.coords_iter()) {
        assert!((a.x - b.x).abs() < 1e-9, "{} vs {}", a.x, b.x);
        assert!((a.y - b.y).abs() < 1e-9, "{} vs {}", a.y, b.y);
    }
}
