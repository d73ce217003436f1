//! Export GeoJSON déterministe des parcelles jointes
//!
//! Écriture en flux : ordre des membres fixe, précision fixe, features dans
//! l'ordre des résultats de jointure (tri par `parcel_id`).

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};

use geo::{CoordsIter, LineString, MultiPolygon, Polygon};
use shpbundle::{AttributeValue, Feature, FeatureSet, ValidationResult};

use crate::join::JoinResult;

/// Paramètres d'écriture
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub epsg: u32,
    pub coordinate_precision: u8,
    pub fraction_precision: u8,
    /// Champ du code de zonage
    pub code_field: Option<String>,
    /// Champ du nom de district
    pub name_field: Option<String>,
    /// Préfixes des attributs de zonage recopiés (`zoning_<nom>`)
    pub passthrough_prefixes: Vec<String>,
}

/// Propriétés ajoutées par la jointure, hors champs recopiés
const JOIN_KEYS: [&str; 8] = [
    "zoning_id",
    "zoning_code",
    "zoning_district_name",
    "overlap_fraction",
    "join_reason",
    "secondary_matches",
    "geometry_valid",
    "geometry_repaired",
];

/// Préfixe des attributs de parcelle renommés
const RENAMED_PREFIX: &str = "parcel_";

/// Champs de zonage recopiés : schéma filtré par préfixe, trié
fn passthrough_fields<'a>(zoning: &'a FeatureSet, options: &ExportOptions) -> Vec<&'a str> {
    let mut fields: Vec<&str> = zoning
        .fields
        .iter()
        .filter(|f| {
            options
                .passthrough_prefixes
                .iter()
                .any(|p| f.starts_with(p.as_str()))
        })
        .map(String::as_str)
        .collect();
    fields.sort_unstable();
    fields.dedup();
    fields
}

/// Renommage des attributs de parcelle qui portent le nom d'une propriété de jointure
///
/// `zoning_code` devient `parcel_zoning_code` (préfixe répété tant que le nom
/// est pris). Les autres attributs gardent leur nom.
pub fn attribute_renames(
    parcels: &FeatureSet,
    zoning: &FeatureSet,
    options: &ExportOptions,
) -> BTreeMap<String, String> {
    let reserved: BTreeSet<String> = JOIN_KEYS
        .iter()
        .map(|k| k.to_string())
        .chain(
            passthrough_fields(zoning, options)
                .into_iter()
                .map(|f| format!("zoning_{}", f)),
        )
        .collect();

    let names: BTreeSet<&str> = parcels
        .fields
        .iter()
        .map(String::as_str)
        .chain(
            parcels
                .features
                .iter()
                .flat_map(|f| f.attributes.keys().map(String::as_str)),
        )
        .collect();

    let mut taken: BTreeSet<String> = names.iter().map(|n| n.to_string()).collect();
    taken.extend(reserved.iter().cloned());

    let mut renames = BTreeMap::new();
    for name in names.iter().filter(|n| reserved.contains(**n)) {
        let mut renamed = format!("{}{}", RENAMED_PREFIX, name);
        while taken.contains(&renamed) {
            renamed = format!("{}{}", RENAMED_PREFIX, renamed);
        }
        taken.insert(renamed.clone());
        renames.insert(name.to_string(), renamed);
    }
    renames
}

/// Écrit la FeatureCollection des parcelles jointes
pub fn write_collection<W: Write>(
    writer: &mut W,
    parcels: &FeatureSet,
    parcel_validation: &[ValidationResult],
    zoning: &FeatureSet,
    results: &[JoinResult],
    options: &ExportOptions,
) -> io::Result<()> {
    let passthrough = passthrough_fields(zoning, options);
    let renames = attribute_renames(parcels, zoning, options);
    let columns = Columns {
        passthrough: &passthrough,
        renames: &renames,
    };

    write!(
        writer,
        r#"{{"type":"FeatureCollection","crs":{{"type":"name","properties":{{"name":"urn:ogc:def:crs:EPSG::{}"}}}},"features":["#,
        options.epsg
    )?;

    for (i, result) in results.iter().enumerate() {
        if i > 0 {
            write!(writer, ",")?;
        }
        let parcel = &parcels.features[result.parcel_index];
        let validation = parcel_validation.get(result.parcel_index);
        write_feature(writer, parcel, validation, zoning, result, &columns, options)?;
    }

    write!(writer, "]}}")?;
    writer.flush()
}

/// Noms des propriétés communs à toutes les features
struct Columns<'a> {
    passthrough: &'a [&'a str],
    renames: &'a BTreeMap<String, String>,
}

/// Écrit une feature en GeoJSON
fn write_feature<W: Write>(
    writer: &mut W,
    parcel: &Feature,
    validation: Option<&ValidationResult>,
    zoning: &FeatureSet,
    result: &JoinResult,
    columns: &Columns<'_>,
    options: &ExportOptions,
) -> io::Result<()> {
    write!(
        writer,
        r#"{{"type":"Feature","id":"{}","geometry":"#,
        escape_json(&parcel.id)
    )?;
    write_geometry(writer, &parcel.geometry, options.coordinate_precision)?;

    write!(writer, r#","properties":{{"#)?;
    let mut first = true;
    let mut key = |writer: &mut W, name: &str| -> io::Result<()> {
        if !first {
            write!(writer, ",")?;
        }
        first = false;
        write!(writer, r#""{}":"#, escape_json(name))
    };

    // Ordre de sortie : nom final, pour rester stable après renommage
    let mut attributes: Vec<(&str, &AttributeValue)> = parcel
        .attributes
        .iter()
        .map(|(name, value)| {
            let name = columns.renames.get(name).unwrap_or(name);
            (name.as_str(), value)
        })
        .collect();
    attributes.sort_unstable_by(|a, b| a.0.cmp(b.0));

    for (name, value) in attributes {
        key(writer, name)?;
        write_value(writer, value)?;
    }

    let zone = result
        .primary
        .as_ref()
        .map(|m| &zoning.features[m.zoning_index]);
    let zone_text = |field: &Option<String>| {
        zone.zip(field.as_deref())
            .and_then(|(z, f)| z.text(f))
    };

    key(writer, "zoning_id")?;
    write_opt_str(writer, result.primary_zoning_id())?;
    key(writer, "zoning_code")?;
    write_opt_str(writer, zone_text(&options.code_field).as_deref())?;
    key(writer, "zoning_district_name")?;
    write_opt_str(writer, zone_text(&options.name_field).as_deref())?;

    for field in columns.passthrough {
        key(writer, &format!("zoning_{}", field))?;
        match zone.and_then(|z| z.attribute(field)) {
            Some(value) => write_value(writer, value)?,
            None => write!(writer, "null")?,
        }
    }

    key(writer, "overlap_fraction")?;
    match result.overlap_fraction() {
        Some(f) => write!(writer, "{}", format_fixed(f, options.fraction_precision))?,
        None => write!(writer, "null")?,
    }

    key(writer, "join_reason")?;
    write_opt_str(writer, result.reason.map(|r| r.code()))?;

    key(writer, "secondary_matches")?;
    write!(writer, "[")?;
    for (i, m) in result.secondary.iter().enumerate() {
        if i > 0 {
            write!(writer, ",")?;
        }
        write!(
            writer,
            r#"{{"zoning_id":"{}","overlap_fraction":{}}}"#,
            escape_json(&m.zoning_id),
            format_fixed(m.fraction, options.fraction_precision)
        )?;
    }
    write!(writer, "]")?;

    key(writer, "geometry_valid")?;
    write!(writer, "{}", validation.map_or(false, |v| v.valid))?;
    key(writer, "geometry_repaired")?;
    write!(writer, "{}", validation.map_or(false, |v| v.repaired))?;

    write!(writer, "}}}}")
}

/// Géométrie : Polygon si un seul membre, MultiPolygon sinon, null si vide ou non finie
fn write_geometry<W: Write>(writer: &mut W, mp: &MultiPolygon<f64>, precision: u8) -> io::Result<()> {
    let finite = mp.coords_iter().all(|c| c.x.is_finite() && c.y.is_finite());
    if mp.0.is_empty() || !finite {
        return write!(writer, "null");
    }

    if let [polygon] = mp.0.as_slice() {
        write!(writer, r#"{{"type":"Polygon","coordinates":"#)?;
        write_polygon(writer, polygon, precision)?;
    } else {
        write!(writer, r#"{{"type":"MultiPolygon","coordinates":["#)?;
        for (i, polygon) in mp.0.iter().enumerate() {
            if i > 0 {
                write!(writer, ",")?;
            }
            write_polygon(writer, polygon, precision)?;
        }
        write!(writer, "]")?;
    }
    write!(writer, "}}")
}

fn write_polygon<W: Write>(writer: &mut W, polygon: &Polygon<f64>, precision: u8) -> io::Result<()> {
    write!(writer, "[")?;
    write_ring(writer, polygon.exterior(), precision)?;
    for ring in polygon.interiors() {
        write!(writer, ",")?;
        write_ring(writer, ring, precision)?;
    }
    write!(writer, "]")
}

fn write_ring<W: Write>(writer: &mut W, ring: &LineString<f64>, precision: u8) -> io::Result<()> {
    write!(writer, "[")?;
    for (i, c) in ring.0.iter().enumerate() {
        if i > 0 {
            write!(writer, ",")?;
        }
        write!(
            writer,
            "[{},{}]",
            format_fixed(c.x, precision),
            format_fixed(c.y, precision)
        )?;
    }
    write!(writer, "]")
}

fn write_value<W: Write>(writer: &mut W, value: &AttributeValue) -> io::Result<()> {
    match value {
        AttributeValue::Null => write!(writer, "null"),
        AttributeValue::Text(s) | AttributeValue::Date(s) => {
            write!(writer, r#""{}""#, escape_json(s))
        }
        AttributeValue::Number(v) if v.is_finite() => write!(writer, "{}", v),
        AttributeValue::Number(_) => write!(writer, "null"),
        AttributeValue::Integer(i) => write!(writer, "{}", i),
        AttributeValue::Bool(b) => write!(writer, "{}", b),
    }
}

fn write_opt_str<W: Write>(writer: &mut W, value: Option<&str>) -> io::Result<()> {
    match value {
        Some(s) => write!(writer, r#""{}""#, escape_json(s)),
        None => write!(writer, "null"),
    }
}

/// Nombre à précision fixe, sans zéro négatif
fn format_fixed(value: f64, precision: u8) -> String {
    let s = format!("{:.*}", precision as usize, value);
    match s.strip_prefix('-') {
        Some(rest) if rest.bytes().all(|b| b == b'0' || b == b'.') => rest.to_string(),
        _ => s,
    }
}

/// Échappe une chaîne pour JSON
fn escape_json(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            c if c.is_control() => {
                result.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => result.push(c),
        }
    }
    result
}
