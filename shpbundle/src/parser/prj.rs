//! Parser pour les fichiers PRJ (déclaration de projection WKT)

use std::sync::OnceLock;

use regex::Regex;

use crate::types::Projection;

/// Mapping des noms ESRI / EPSG usuels vers EPSG
const PROJECTIONS: &[(&str, u32)] = &[
    ("GCS_WGS_1984", 4326),
    ("WGS 84", 4326),
    ("WGS84", 4326),
    ("GCS_North_American_1983", 4269),
    ("NAD83", 4269),
    ("WGS_1984_Web_Mercator_Auxiliary_Sphere", 3857),
    ("WGS_1984_Web_Mercator", 3857),
    ("WGS 84 / Pseudo-Mercator", 3857),
    ("NAD_1983_10TM_AEP_Forest", 3400),
    ("NAD83 / Alberta 10-TM (Forest)", 3400),
    ("NAD_1983_3TM_114", 3776),
    ("NAD83 / Alberta 3TM ref merid 114 W", 3776),
];

fn root_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\s*(?:PROJCS|GEOGCS|PROJCRS|GEOGCRS|GEODCRS)\s*\[\s*"([^"]*)""#)
            .expect("static regex")
    })
}

fn authority_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\b(?:AUTHORITY|ID)\s*\[\s*"EPSG"\s*,\s*"?(\d+)"?\s*\]"#)
            .expect("static regex")
    })
}

fn utm_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(WGS[ _]?(?:19)?84|NAD[ _]?(?:19)?83).*UTM[ _]zone[ _](\d{1,2})([NS])?")
            .expect("static regex")
    })
}

fn bare_epsg_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*EPSG:(\d+)\s*$").expect("static regex"))
}

/// Parse le contenu d'un fichier .prj
///
/// Ordre de résolution :
/// 1. `EPSG:n` seul dans le fichier
/// 2. `AUTHORITY["EPSG", n]` de l'élément racine
/// 3. nom de l'élément racine (table des noms connus, puis motif UTM)
///
/// Un fichier vide donne une projection non déclarée ; un WKT non reconnu
/// donne une projection nommée sans code EPSG. Aucune erreur ici : c'est à
/// l'harmonisation de décider (override ou `CrsError`).
pub fn parse(data: &[u8]) -> Projection {
    let wkt = String::from_utf8_lossy(data).trim().to_string();
    if wkt.is_empty() {
        return Projection::undeclared();
    }

    if let Some(caps) = bare_epsg_re().captures(&wkt) {
        let epsg = caps[1].parse().ok();
        return Projection {
            epsg,
            name: wkt.clone(),
            wkt,
        };
    }

    let name = root_name_re()
        .captures(&wkt)
        .map(|c| c[1].to_string())
        .unwrap_or_default();

    let epsg = root_authority(&wkt).or_else(|| epsg_from_name(&name));

    Projection { epsg, name, wkt }
}

/// Code EPSG de l'AUTHORITY portée par l'élément racine (profondeur 1)
fn root_authority(wkt: &str) -> Option<u32> {
    authority_re()
        .captures_iter(wkt)
        .filter(|caps| {
            caps.get(0)
                .map_or(false, |m| bracket_depth(&wkt[..m.start()]) == 1)
        })
        .filter_map(|caps| caps[1].parse().ok())
        .last()
}

/// Profondeur d'imbrication des crochets, hors chaînes entre guillemets
fn bracket_depth(prefix: &str) -> i32 {
    let mut depth = 0;
    let mut in_string = false;
    for c in prefix.chars() {
        match c {
            '"' => in_string = !in_string,
            '[' | '(' if !in_string => depth += 1,
            ']' | ')' if !in_string => depth -= 1,
            _ => {}
        }
    }
    depth
}

/// Résout un nom de système connu vers EPSG
pub fn epsg_from_name(name: &str) -> Option<u32> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    for &(known, epsg) in PROJECTIONS {
        if name.eq_ignore_ascii_case(known) {
            return Some(epsg);
        }
    }

    let caps = utm_re().captures(name)?;
    let zone: u32 = caps[2].parse().ok()?;
    if !(1..=60).contains(&zone) {
        return None;
    }
    let south = caps
        .get(3)
        .map_or(false, |h| h.as_str().eq_ignore_ascii_case("S"));
    let datum = caps[1].to_ascii_uppercase();

    if datum.starts_with("WGS") {
        Some(if south { 32700 + zone } else { 32600 + zone })
    } else if !south && zone <= 23 {
        // NAD83 / UTM : zones nord 1 à 23 uniquement
        Some(26900 + zone)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ESRI_UTM12: &str = r#"PROJCS["WGS_1984_UTM_Zone_12N",GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Transverse_Mercator"],PARAMETER["False_Easting",500000.0],PARAMETER["False_Northing",0.0],PARAMETER["Central_Meridian",-111.0],PARAMETER["Scale_Factor",0.9996],PARAMETER["Latitude_Of_Origin",0.0],UNIT["Meter",1.0]]"#;

    #[test]
    fn test_parse_esri_utm_name() {
        let proj = parse(ESRI_UTM12.as_bytes());
        assert_eq!(proj.epsg, Some(32612));
        assert_eq!(proj.name, "WGS_1984_UTM_Zone_12N");
    }

    #[test]
    fn test_parse_root_authority() {
        let wkt = r#"PROJCS["NAD83 / UTM zone 11N",GEOGCS["NAD83",AUTHORITY["EPSG","4269"]],UNIT["metre",1,AUTHORITY["EPSG","9001"]],AUTHORITY["EPSG","26911"]]"#;
        let proj = parse(wkt.as_bytes());
        assert_eq!(proj.epsg, Some(26911));
    }

    #[test]
    fn test_parse_ignores_nested_authority() {
        // Seul le GEOGCS imbriqué porte une AUTHORITY : ce n'est pas le CRS racine
        let wkt = r#"PROJCS["Custom_Local_Grid",GEOGCS["WGS 84",AUTHORITY["EPSG","4326"]],PROJECTION["Oblique_Stereographic"]]"#;
        let proj = parse(wkt.as_bytes());
        assert_eq!(proj.epsg, None);
        assert_eq!(proj.name, "Custom_Local_Grid");
    }

    #[test]
    fn test_parse_geographic() {
        let wkt = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;
        assert_eq!(parse(wkt.as_bytes()).epsg, Some(4326));
    }

    #[test]
    fn test_parse_alberta_10tm() {
        let wkt = r#"PROJCS["NAD_1983_10TM_AEP_Forest",GEOGCS["GCS_North_American_1983"]]"#;
        assert_eq!(parse(wkt.as_bytes()).epsg, Some(3400));
    }

    #[test]
    fn test_parse_bare_epsg() {
        assert_eq!(parse(b"EPSG:3857\n").epsg, Some(3857));
    }

    #[test]
    fn test_parse_empty_is_undeclared() {
        let proj = parse(b"   \r\n");
        assert_eq!(proj, Projection::undeclared());
    }

    #[test]
    fn test_epsg_from_name_utm_variants() {
        assert_eq!(epsg_from_name("WGS 84 / UTM zone 33S"), Some(32733));
        assert_eq!(epsg_from_name("NAD_1983_UTM_Zone_12N"), Some(26912));
        assert_eq!(epsg_from_name("NAD83 / UTM zone 12S"), None);
        assert_eq!(epsg_from_name("Lambert_Conformal_Conic"), None);
    }
}
