//! Parsers des fichiers d'un bundle (géométries, attributs, projection)

pub mod dbf;
pub mod prj;
pub mod shp;
