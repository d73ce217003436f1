//! Orchestration du pipeline
//!
//! Chargement → harmonisation → validation → index → jointure, puis rapport
//! et export en parallèle. Les sorties ne sont rendues visibles qu'une fois
//! toutes les deux écrites.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use shpbundle::{validate_set, FeatureSet, ValidationResult};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::export::{attribute_renames, write_collection, ExportOptions};
use crate::harmonize::harmonize;
use crate::index::SpatialIndex;
use crate::join::{self, JoinOptions, JoinResult};
use crate::report::{DatasetStats, JoinStats, QualityReport};

/// Jeux harmonisés, validés et joints
#[derive(Debug)]
pub struct JoinedDataset {
    pub parcels: FeatureSet,
    pub zoning: FeatureSet,
    pub parcel_validation: Vec<ValidationResult>,
    pub zoning_validation: Vec<ValidationResult>,
    /// Une entrée par parcelle, triée par `parcel_id`
    pub results: Vec<JoinResult>,
    pub parcels_source_epsg: u32,
    pub zoning_source_epsg: u32,
    pub overlapping_zone_pairs: usize,
}

impl JoinedDataset {
    /// Enchaîne harmonisation, validation, indexation et jointure
    pub fn build(
        mut parcels: FeatureSet,
        mut zoning: FeatureSet,
        config: &PipelineConfig,
    ) -> Result<Self> {
        config.validate()?;

        let parcels_source_epsg = harmonize(&mut parcels, &config.parcels, config.canonical_epsg)?;
        let zoning_source_epsg =
            harmonize(&mut zoning, &config.zoning.dataset, config.canonical_epsg)?;

        let zoning_options = config.zoning_validation()?;
        let (parcel_validation, zoning_validation) = rayon::join(
            || validate_set(&mut parcels, &config.parcel_validation()),
            || validate_set(&mut zoning, &zoning_options),
        );

        let index = SpatialIndex::build(&zoning, &zoning_validation);
        let results = join::join(
            &parcels,
            &parcel_validation,
            &zoning,
            &index,
            &JoinOptions {
                min_overlap_area: config.min_overlap_area,
            },
        );
        let overlapping_zone_pairs =
            join::count_overlapping_zones(&zoning, &zoning_validation, &index);

        Ok(Self {
            parcels,
            zoning,
            parcel_validation,
            zoning_validation,
            results,
            parcels_source_epsg,
            zoning_source_epsg,
            overlapping_zone_pairs,
        })
    }

    /// Rapport qualité du run
    pub fn report(&self, config: &PipelineConfig) -> QualityReport {
        let mut report = QualityReport::new(
            config.canonical_epsg,
            config.min_overlap_area,
            DatasetStats::collect(
                &self.parcels,
                self.parcels_source_epsg,
                &self.parcel_validation,
                &config.parcels.required_fields,
            ),
            DatasetStats::collect(
                &self.zoning,
                self.zoning_source_epsg,
                &self.zoning_validation,
                &config.zoning.dataset.required_fields,
            ),
            JoinStats::collect(&self.results, &self.zoning),
            self.overlapping_zone_pairs,
        );
        report.record_issues(&self.parcels, &self.parcel_validation);
        report.record_issues(&self.zoning, &self.zoning_validation);

        report.renamed_attributes =
            attribute_renames(&self.parcels, &self.zoning, &export_options(config));
        for (from, to) in &report.renamed_attributes {
            warn!(attribute = %from, renamed = %to, "Parcel attribute collides with a joined property");
        }
        report
    }

    /// Écrit la FeatureCollection des parcelles jointes
    pub fn write_geojson<W: Write>(&self, writer: &mut W, config: &PipelineConfig) -> io::Result<()> {
        write_collection(
            writer,
            &self.parcels,
            &self.parcel_validation,
            &self.zoning,
            &self.results,
            &export_options(config),
        )
    }
}

fn export_options(config: &PipelineConfig) -> ExportOptions {
    ExportOptions {
        epsg: config.canonical_epsg,
        coordinate_precision: config.coordinate_precision(),
        fraction_precision: config.fraction_precision,
        code_field: config.zoning.code_field.clone(),
        name_field: config.zoning.name_field.clone(),
        passthrough_prefixes: config.zoning.passthrough_prefixes.clone(),
    }
}

/// Exécute le pipeline sur des jeux déjà chargés, sorties en mémoire
pub fn run_in_memory(
    parcels: FeatureSet,
    zoning: FeatureSet,
    config: &PipelineConfig,
) -> Result<(Vec<u8>, QualityReport)> {
    let joined = JoinedDataset::build(parcels, zoning, config)?;

    let (report, output) = rayon::join(
        || joined.report(config),
        || {
            let mut buffer = Vec::new();
            joined.write_geojson(&mut buffer, config).map(|_| buffer)
        },
    );

    let output = output.map_err(|e| PipelineError::io(&config.output_name, e))?;
    Ok((output, report))
}

/// Chemins des fichiers produits par un run
#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub output: PathBuf,
    pub report: PathBuf,
}

impl OutputPaths {
    pub fn new(output_dir: &Path, config: &PipelineConfig) -> Self {
        Self {
            output: output_dir.join(&config.output_name),
            report: output_dir.join(&config.report_name),
        }
    }
}

/// Exécute le pipeline complet depuis les bundles jusqu'aux fichiers de sortie
///
/// `jobs` fixe le nombre de workers (pool rayon global si absent).
pub fn run(
    parcels_path: &Path,
    zoning_path: &Path,
    output_dir: &Path,
    config: &PipelineConfig,
    jobs: Option<usize>,
) -> Result<QualityReport> {
    match jobs {
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| PipelineError::ThreadPool(e.to_string()))?;
            pool.install(|| run_stages(parcels_path, zoning_path, output_dir, config))
        }
        None => run_stages(parcels_path, zoning_path, output_dir, config),
    }
}

fn run_stages(
    parcels_path: &Path,
    zoning_path: &Path,
    output_dir: &Path,
    config: &PipelineConfig,
) -> Result<QualityReport> {
    let start = Instant::now();
    config.validate()?;

    let (parcels, zoning) = rayon::join(
        || shpbundle::load(parcels_path, &config.parcel_load_options()),
        || shpbundle::load(zoning_path, &config.zoning_load_options()),
    );
    let joined = JoinedDataset::build(parcels?, zoning?, config)?;

    fs::create_dir_all(output_dir).map_err(|e| PipelineError::io(output_dir, e))?;
    let paths = OutputPaths::new(output_dir, config);

    let (mut report, output) = rayon::join(
        || joined.report(config),
        || write_temp(output_dir, &paths.output, |w| joined.write_geojson(w, config)),
    );
    let output = output?;

    report.set_duration(start.elapsed());
    let json = report.to_json()?;
    let report_file = write_temp(output_dir, &paths.report, |w| w.write_all(json.as_bytes()))?;

    persist(output, &paths.output)?;
    if let Err(e) = persist(report_file, &paths.report) {
        // Pas de GeoJSON sans son rapport
        let _ = fs::remove_file(&paths.output);
        return Err(e);
    }

    info!(
        output = %paths.output.display(),
        report = %paths.report.display(),
        duration_secs = report.duration_secs,
        "{}",
        report.summary()
    );

    Ok(report)
}

/// Écrit dans un fichier temporaire du répertoire de destination
fn write_temp<F>(dir: &Path, target: &Path, write: F) -> Result<NamedTempFile>
where
    F: FnOnce(&mut BufWriter<&mut NamedTempFile>) -> io::Result<()>,
{
    let mut file = NamedTempFile::new_in(dir).map_err(|e| PipelineError::io(dir, e))?;
    {
        let mut writer = BufWriter::new(&mut file);
        write(&mut writer).map_err(|e| PipelineError::io(target, e))?;
        writer.flush().map_err(|e| PipelineError::io(target, e))?;
    }
    Ok(file)
}

fn persist(file: NamedTempFile, target: &Path) -> Result<()> {
    file.persist(target)
        .map(|_| ())
        .map_err(|e| PipelineError::io(target, e.error))
}
