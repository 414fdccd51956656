use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use noisy_float::prelude::*;
use serde::{de::DeserializeOwned, Deserialize};
use thiserror::Error;

use crate::object::{IdLevel, IsoLevel, Kinematics, PhysicsObject};
use crate::weight::{combined_scale, ScaleFactors};

const PILEUP_TABLE: &str = "pileup.yaml";
const TABLE_EXTENSION: &str = "yaml";

#[derive(Debug, Error)]
pub enum CorrectionError {
    #[error("Failed to read {0:?}: {1}")]
    Io(PathBuf, io::Error),
    #[error("Failed to parse correction table {0:?}: {1}")]
    Parse(PathBuf, serde_yaml::Error),
    #[error("Invalid correction table {path:?}: {reason}")]
    Shape { path: PathBuf, reason: String },
}

/// Pileup weights indexed by the rounded number of true interactions
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct PileupTable {
    weights: Vec<f64>,
}

impl PileupTable {
    pub fn new(weights: Vec<f64>) -> Self {
        Self { weights }
    }

    /// Weight for the given number of true interactions
    ///
    /// Returns zero outside the range covered by the table.
    pub fn weight(&self, true_pileup: f64) -> f64 {
        let idx = true_pileup.round();
        if !(idx >= 0.) || idx >= self.weights.len() as f64 {
            return 0.;
        }
        self.weights[idx as usize]
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// Bin edges in absolute pseudorapidity and transverse momentum
///
/// Values outside the edges are assigned to the nearest bin.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Binning {
    abs_eta: Vec<f64>,
    pt: Vec<f64>,
}

impl Binning {
    fn check(&self) -> Result<(), String> {
        for (name, edges) in [("abs_eta", &self.abs_eta), ("pt", &self.pt)] {
            if edges.len() < 2 {
                return Err(format!("`{name}` needs at least two bin edges"));
            }
            if edges.windows(2).any(|w| !(w[0] < w[1])) {
                return Err(format!("`{name}` bin edges are not increasing"));
            }
        }
        Ok(())
    }

    fn check_grid(&self, name: &str, grid: &[Vec<f64>]) -> Result<(), String> {
        let shape = (self.abs_eta.len() - 1, self.pt.len() - 1);
        if grid.len() != shape.0 || grid.iter().any(|row| row.len() != shape.1) {
            return Err(format!(
                "`{name}` does not have the expected shape {} × {}",
                shape.0, shape.1
            ));
        }
        Ok(())
    }

    /// Look up the entry of `grid` for the given object
    fn lookup(&self, grid: &[Vec<f64>], obj: &PhysicsObject<'_>) -> f64 {
        let eta_bin = bin_index(&self.abs_eta, obj.eta().abs().raw());
        let pt_bin = bin_index(&self.pt, obj.pt().raw());
        grid[eta_bin][pt_bin]
    }
}

// number of edges not above `x`, minus one, clamped to the valid bins
fn bin_index(edges: &[f64], x: f64) -> usize {
    let k = edges.partition_point(|e| *e <= x);
    k.saturating_sub(1).min(edges.len() - 2)
}

/// Binned identification or isolation scale factors
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ScaleFactorTable {
    #[serde(flatten)]
    binning: Binning,
    values: Vec<Vec<f64>>,
}

impl ScaleFactorTable {
    fn check(&self) -> Result<(), String> {
        self.binning.check()?;
        self.binning.check_grid("values", &self.values)
    }

    pub fn scale(&self, obj: &PhysicsObject<'_>) -> f64 {
        self.binning.lookup(&self.values, obj)
    }
}

/// Binned trigger efficiencies in recorded data and simulation
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct TriggerTable {
    #[serde(flatten)]
    binning: Binning,
    data: Vec<Vec<f64>>,
    mc: Vec<Vec<f64>>,
}

impl TriggerTable {
    fn check(&self) -> Result<(), String> {
        self.binning.check()?;
        self.binning.check_grid("data", &self.data)?;
        self.binning.check_grid("mc", &self.mc)
    }

    /// Efficiencies in data and simulation for the given object
    pub fn efficiencies(&self, obj: &PhysicsObject<'_>) -> (f64, f64) {
        (
            self.binning.lookup(&self.data, obj),
            self.binning.lookup(&self.mc, obj),
        )
    }
}

/// Correction tables read from a directory
///
/// The directory contains the pileup profile `pileup.yaml` and one
/// subdirectory per scale factor scheme. Each scheme holds tables
/// named after the object kind, e.g. `muon_trigger.yaml`,
/// `muon_id_medium.yaml`, or `muon_iso_medium_tight.yaml`.
///
/// Missing tables lead to neutral correction factors. A warning is
/// emitted the first time each missing table is requested.
#[derive(Debug, Default)]
pub struct CorrectionTables {
    dir: PathBuf,
    pileup: Option<PileupTable>,
    triggers: HashMap<String, TriggerTable>,
    scale_factors: HashMap<String, ScaleFactorTable>,
    missing: RefCell<HashSet<String>>,
}

impl CorrectionTables {
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self, CorrectionError> {
        let dir = dir.as_ref();
        debug!("Reading correction tables from {dir:?}");
        let mut tables = Self {
            dir: dir.to_owned(),
            ..Default::default()
        };
        let pileup_path = dir.join(PILEUP_TABLE);
        if pileup_path.is_file() {
            let pileup: PileupTable = read_table(&pileup_path)?;
            debug!("Pileup profile with {} bins", pileup.len());
            tables.pileup = Some(pileup);
        }
        for scheme_dir in read_dir(dir)? {
            if !scheme_dir.is_dir() {
                continue;
            }
            let Some(scheme) = scheme_dir.file_name().and_then(|s| s.to_str())
            else {
                continue;
            };
            for path in read_dir(&scheme_dir)? {
                if path.extension().and_then(|e| e.to_str()) != Some(TABLE_EXTENSION)
                {
                    continue;
                }
                let Some(name) = file_stem(&path) else {
                    continue;
                };
                let key = format!("{scheme}/{name}");
                debug!("Reading correction table {key}");
                if name.ends_with("_trigger") {
                    let table: TriggerTable = read_table(&path)?;
                    table.check().map_err(|reason| shape_error(&path, reason))?;
                    tables.triggers.insert(key, table);
                } else {
                    let table: ScaleFactorTable = read_table(&path)?;
                    table.check().map_err(|reason| shape_error(&path, reason))?;
                    tables.scale_factors.insert(key, table);
                }
            }
        }
        Ok(tables)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn warn_missing(&self, name: &str) {
        if self.missing.borrow_mut().insert(name.to_owned()) {
            warn!(
                "No correction table `{name}` in {:?}, using scale factor 1",
                self.dir
            );
        }
    }

    // product of scale factors from the table `<scheme>/<kind>_<suffix>`
    fn product_of_scales(
        &self,
        objects: &[PhysicsObject<'_>],
        scheme: &str,
        suffix: &str,
    ) -> f64 {
        objects
            .iter()
            .map(|obj| {
                let name = format!("{scheme}/{}_{suffix}", obj.kind());
                match self.scale_factors.get(&name) {
                    Some(table) => table.scale(obj),
                    None => {
                        self.warn_missing(&name);
                        1.
                    }
                }
            })
            .product()
    }
}

impl ScaleFactors for CorrectionTables {
    fn pileup_weight(&self, true_pileup: f64) -> f64 {
        match &self.pileup {
            Some(table) => table.weight(true_pileup),
            None => {
                self.warn_missing("pileup");
                1.
            }
        }
    }

    fn trigger_scale(
        &self,
        objects: &[PhysicsObject<'_>],
        scheme: &str,
    ) -> f64 {
        let mut efficiencies = Vec::with_capacity(objects.len());
        for obj in objects {
            let name = format!("{scheme}/{}_trigger", obj.kind());
            let Some(table) = self.triggers.get(&name) else {
                self.warn_missing(&name);
                return 1.;
            };
            efficiencies.push(table.efficiencies(obj));
        }
        combined_scale(efficiencies)
    }

    fn id_scale(
        &self,
        objects: &[PhysicsObject<'_>],
        id: IdLevel,
        scheme: &str,
    ) -> f64 {
        self.product_of_scales(objects, scheme, &format!("id_{id}"))
    }

    fn iso_scale(
        &self,
        objects: &[PhysicsObject<'_>],
        id: IdLevel,
        iso: IsoLevel,
        scheme: &str,
    ) -> f64 {
        self.product_of_scales(objects, scheme, &format!("iso_{id}_{iso}"))
    }
}

fn shape_error(path: &Path, reason: String) -> CorrectionError {
    CorrectionError::Shape {
        path: path.to_owned(),
        reason,
    }
}

fn file_stem(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|s| s.to_str())
}

// directory entries in a reproducible order
fn read_dir(dir: &Path) -> Result<Vec<PathBuf>, CorrectionError> {
    let io_err = |err: io::Error| CorrectionError::Io(dir.to_owned(), err);
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        paths.push(entry.map_err(io_err)?.path());
    }
    paths.sort();
    Ok(paths)
}

fn read_table<T: DeserializeOwned>(path: &Path) -> Result<T, CorrectionError> {
    let file =
        File::open(path).map_err(|err| CorrectionError::Io(path.to_owned(), err))?;
    serde_yaml::from_reader(BufReader::new(file))
        .map_err(|err| CorrectionError::Parse(path.to_owned(), err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{electron, log_init, muon};

    const MUON_TRIGGER: &str = "
abs_eta: [0, 1.2, 2.4]
pt: [20, 30, 60]
data: [[0.90, 0.92], [0.80, 0.85]]
mc:   [[0.95, 0.96], [0.90, 0.94]]
";

    const MUON_ID: &str = "
abs_eta: [0, 1.2, 2.4]
pt: [20, 60]
values: [[0.99], [0.97]]
";

    fn setup() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let pileup: Vec<_> = (0..100).map(|i| format!("{}", i as f64 / 4.)).collect();
        fs::write(
            dir.path().join(PILEUP_TABLE),
            format!("weights: [{}]", pileup.join(", ")),
        )
        .unwrap();
        let scheme = dir.path().join("default");
        fs::create_dir(&scheme).unwrap();
        fs::write(scheme.join("muon_trigger.yaml"), MUON_TRIGGER).unwrap();
        fs::write(scheme.join("muon_id_medium.yaml"), MUON_ID).unwrap();
        fs::write(scheme.join("notes.txt"), "not a table").unwrap();
        dir
    }

    #[test]
    fn pileup() {
        log_init();
        let dir = setup();
        let tables = CorrectionTables::load(dir.path()).unwrap();
        assert_eq!(tables.pileup_weight(10.4), 2.5);
        assert_eq!(tables.pileup_weight(99.), 24.75);
        assert_eq!(tables.pileup_weight(200.), 0.);
        assert_eq!(tables.pileup_weight(-3.), 0.);

        let flat = PileupTable::new(vec![1.; 100]);
        assert_eq!(flat.weight(99.4), 1.);
        assert_eq!(flat.weight(200.), 0.);
    }

    #[test]
    fn scale_factors() {
        log_init();
        let dir = setup();
        let tables = CorrectionTables::load(dir.path()).unwrap();
        let central = muon(25., 0.5, 0., 1);
        let forward = muon(500., -2.0, 1., -1);
        let objects = [PhysicsObject::from(&central), (&forward).into()];

        let id = tables.id_scale(&objects, IdLevel::Medium, "default");
        assert_eq!(id, 0.99 * 0.97);

        // pT beyond the last edge uses the last bin
        let trigger = tables.trigger_scale(&objects[1..], "default");
        assert!((trigger - 0.85 / 0.94).abs() < 1e-12);
        let trigger = tables.trigger_scale(&objects, "default");
        let expected = (1. - 0.10 * 0.15) / (1. - 0.05 * 0.06);
        assert!((trigger - expected).abs() < 1e-12);
    }

    #[test]
    fn missing() {
        log_init();
        let dir = setup();
        let tables = CorrectionTables::load(dir.path()).unwrap();
        let mu = muon(25., 0.5, 0., 1);
        let e = electron(25., 0.5, 0., 1);
        let objects = [PhysicsObject::from(&mu), (&e).into()];
        let iso = tables.iso_scale(&objects, IdLevel::Medium, IsoLevel::Tight, "default");
        assert_eq!(iso, 1.);
        assert_eq!(tables.trigger_scale(&objects, "default"), 1.);
        assert_eq!(tables.id_scale(&objects, IdLevel::Medium, "other"), 1.);
        assert_eq!(tables.missing.borrow().len(), 5);

        let empty = tempfile::tempdir().unwrap();
        let tables = CorrectionTables::load(empty.path()).unwrap();
        assert_eq!(tables.pileup_weight(20.), 1.);
    }

    #[test]
    fn malformed() {
        let dir = setup();
        let table = dir.path().join("default").join("muon_iso_medium_tight.yaml");
        fs::write(&table, "abs_eta: [0, 2.4]\npt: [20, 60]\nvalues: [[1.0, 1.1]]")
            .unwrap();
        let err = CorrectionTables::load(dir.path()).unwrap_err();
        assert!(matches!(err, CorrectionError::Shape { .. }));

        fs::write(&table, "abs_eta: [0, 2.4]\npt: [60, 20]\nvalues: [[1.0]]").unwrap();
        let err = CorrectionTables::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("not increasing"));

        fs::write(&table, "abs_eta: oops").unwrap();
        let err = CorrectionTables::load(dir.path()).unwrap_err();
        assert!(matches!(err, CorrectionError::Parse(..)));
    }
}
