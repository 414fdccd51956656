use std::collections::BTreeMap;
use std::io::Write;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::category::Category;

/// Suffix of histograms for the control region
pub const CONTROL_SUFFIX: &str = "_ctrl";
/// Namespace of the inclusive category histograms
pub const INCLUSIVE_NAMESPACE: &str = "cat00";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HistogramError {
    #[error("Histogram `{0}` is not booked")]
    NotBooked(String),
    #[error("Histogram `{0}` is already booked")]
    Duplicate(String),
    #[error("Invalid binning for histogram `{name}`: {reason}")]
    Binning { name: String, reason: String },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum BinningError {
    #[error("{nbins} bins in [{lo}, {hi})")]
    Range { nbins: usize, lo: f64, hi: f64 },
    #[error("{content} bin contents but {sumw2} sums of squared weights")]
    Mismatch { content: usize, sumw2: usize },
}

/// Weighted histogram with uniform bins
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Hist1DData")]
pub struct Hist1D {
    lo: f64,
    hi: f64,
    bin_content: Vec<f64>,
    sumw2: Vec<f64>,
    underflow: f64,
    overflow: f64,
    entries: u64,
}

// serialised histogram before consistency checks
#[derive(Deserialize)]
struct Hist1DData {
    lo: f64,
    hi: f64,
    bin_content: Vec<f64>,
    sumw2: Vec<f64>,
    underflow: f64,
    overflow: f64,
    entries: u64,
}

impl TryFrom<Hist1DData> for Hist1D {
    type Error = BinningError;

    fn try_from(data: Hist1DData) -> Result<Self, Self::Error> {
        let nbins = data.bin_content.len();
        Self::new(nbins, data.lo, data.hi)?;
        if data.sumw2.len() != nbins {
            return Err(BinningError::Mismatch {
                content: nbins,
                sumw2: data.sumw2.len(),
            });
        }
        Ok(Self {
            lo: data.lo,
            hi: data.hi,
            bin_content: data.bin_content,
            sumw2: data.sumw2,
            underflow: data.underflow,
            overflow: data.overflow,
            entries: data.entries,
        })
    }
}

impl Hist1D {
    /// Histogram with `nbins` bins covering [`lo`, `hi`)
    ///
    /// There has to be at least one bin and `lo` has to be below `hi`.
    pub fn new(nbins: usize, lo: f64, hi: f64) -> Result<Self, BinningError> {
        if nbins == 0 || !(lo < hi) {
            return Err(BinningError::Range { nbins, lo, hi });
        }
        Ok(Self {
            lo,
            hi,
            bin_content: vec![0.; nbins],
            sumw2: vec![0.; nbins],
            underflow: 0.,
            overflow: 0.,
            entries: 0,
        })
    }

    /// Add `weight` to the bin containing `value`
    ///
    /// Values below the range, including NaN, go to the underflow
    /// and values at or above the upper edge to the overflow.
    pub fn fill(&mut self, value: f64, weight: f64) {
        self.entries += 1;
        if !(value >= self.lo) {
            self.underflow += weight;
            return;
        }
        if value >= self.hi {
            self.overflow += weight;
            return;
        }
        let width = (self.hi - self.lo) / self.nbins() as f64;
        let bin = ((value - self.lo) / width) as usize;
        let bin = bin.min(self.nbins() - 1);
        self.bin_content[bin] += weight;
        self.sumw2[bin] += weight * weight;
    }

    pub fn nbins(&self) -> usize {
        self.bin_content.len()
    }

    /// Lower and upper edge of the histogram range
    pub fn range(&self) -> (f64, f64) {
        (self.lo, self.hi)
    }

    pub fn bin_content(&self) -> &[f64] {
        &self.bin_content
    }

    /// Sums of squared weights per bin
    pub fn sumw2(&self) -> &[f64] {
        &self.sumw2
    }

    pub fn underflow(&self) -> f64 {
        self.underflow
    }

    pub fn overflow(&self) -> f64 {
        self.overflow
    }

    /// Number of fills, including under- and overflow
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Sum of weights inside the histogram range
    pub fn integral(&self) -> f64 {
        self.bin_content.iter().sum()
    }
}

/// Where a fill goes in addition to the plain histogram
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Route {
    /// Category of the event, if any
    pub category: Option<Category>,
    /// Whether the event lies in the control region
    pub control: bool,
}

/// A set of named histograms
///
/// Each booked histogram exists in several namespaces: the plain
/// name, one copy per event category (`catNN/<name>`) and the
/// inclusive category copy (`cat00/<name>`). Each of these has a
/// control region twin with the suffix `_ctrl`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Histograms {
    hists: BTreeMap<String, Hist1D>,
}

fn category_namespace(category: Category) -> Option<String> {
    category.number().map(|n| format!("cat{n:02}"))
}

impl Histograms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Book a histogram in all namespaces
    pub fn book(
        &mut self,
        name: &str,
        nbins: usize,
        lo: f64,
        hi: f64,
    ) -> Result<(), HistogramError> {
        let hist = Hist1D::new(nbins, lo, hi).map_err(|err| {
            HistogramError::Binning {
                name: name.to_owned(),
                reason: err.to_string(),
            }
        })?;
        if self.hists.contains_key(name) {
            return Err(HistogramError::Duplicate(name.to_owned()));
        }
        let namespaces = std::iter::once(INCLUSIVE_NAMESPACE.to_owned())
            .chain(Category::accepted().filter_map(category_namespace));
        let mut names = vec![name.to_owned()];
        names.extend(namespaces.map(|ns| format!("{ns}/{name}")));
        for name in names {
            self.hists.insert(format!("{name}{CONTROL_SUFFIX}"), hist.clone());
            self.hists.insert(name, hist.clone());
        }
        Ok(())
    }

    /// Fill a booked histogram and its copies selected by `route`
    pub fn fill(
        &mut self,
        name: &str,
        value: f64,
        weight: f64,
        route: Route,
    ) -> Result<(), HistogramError> {
        if !self.hists.contains_key(name) {
            return Err(HistogramError::NotBooked(name.to_owned()));
        }
        let mut targets = vec![name.to_owned()];
        if let Some(ns) = route.category.and_then(category_namespace) {
            targets.push(format!("{INCLUSIVE_NAMESPACE}/{name}"));
            targets.push(format!("{ns}/{name}"));
        }
        if route.control {
            let ctrl: Vec<_> = targets
                .iter()
                .map(|target| format!("{target}{CONTROL_SUFFIX}"))
                .collect();
            targets.extend(ctrl);
        }
        for target in targets {
            match self.hists.get_mut(&target) {
                Some(hist) => hist.fill(value, weight),
                None => return Err(HistogramError::NotBooked(target)),
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Hist1D> {
        self.hists.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Hist1D)> {
        self.hists.iter().map(|(name, hist)| (name.as_str(), hist))
    }

    pub fn len(&self) -> usize {
        self.hists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hists.is_empty()
    }

    /// Write all histograms as YAML
    pub fn write_yaml<W: Write>(&self, out: W) -> Result<(), serde_yaml::Error> {
        serde_yaml::to_writer(out, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binning() {
        let mut hist = Hist1D::new(4, 0., 2.).unwrap();
        hist.fill(-1., 1.);
        hist.fill(0., 2.);
        hist.fill(0.6, 0.5);
        hist.fill(0.7, -0.5);
        hist.fill(1.999, 3.);
        hist.fill(2., 4.);
        hist.fill(f64::NAN, 1.);
        assert_eq!(hist.bin_content(), [2., 0., 0., 3.]);
        assert_eq!(hist.sumw2(), [4., 0.5, 0., 9.]);
        assert_eq!(hist.underflow(), 2.);
        assert_eq!(hist.overflow(), 4.);
        assert_eq!(hist.entries(), 7);
        assert_eq!(hist.integral(), 5.);
    }

    #[test]
    fn invalid_binning() {
        assert_eq!(
            Hist1D::new(0, 0., 1.),
            Err(BinningError::Range {
                nbins: 0,
                lo: 0.,
                hi: 1.
            })
        );
        assert!(Hist1D::new(3, 1., 1.).is_err());
        assert!(Hist1D::new(3, 0., f64::NAN).is_err());

        let empty = "{lo: 0.0, hi: 1.0, bin_content: [], sumw2: [], \
            underflow: 0.0, overflow: 0.0, entries: 0}";
        assert!(serde_yaml::from_str::<Hist1D>(empty).is_err());
        let mismatch = "{lo: 0.0, hi: 1.0, bin_content: [1.0, 2.0], sumw2: [1.0], \
            underflow: 0.0, overflow: 0.0, entries: 2}";
        assert!(serde_yaml::from_str::<Hist1D>(mismatch).is_err());
        let valid = "{lo: 0.0, hi: 1.0, bin_content: [1.0, 2.0], sumw2: [1.0, 4.0], \
            underflow: 0.0, overflow: 0.0, entries: 2}";
        let mut hist: Hist1D = serde_yaml::from_str(valid).unwrap();
        hist.fill(0.75, 1.);
        assert_eq!(hist.bin_content(), [1., 3.]);
    }

    #[test]
    fn namespaces() {
        let mut hists = Histograms::new();
        hists.book("pair_mass", 10, 60., 160.).unwrap();
        // plain, inclusive and five categories, each with control twin
        assert_eq!(hists.len(), 14);
        assert!(hists.get("cat05/pair_mass_ctrl").is_some());
        assert!(hists.get("cat06/pair_mass").is_none());
        assert_eq!(
            hists.book("pair_mass", 10, 60., 160.),
            Err(HistogramError::Duplicate("pair_mass".to_owned()))
        );
        assert!(matches!(
            hists.book("met", 0, 0., 100.),
            Err(HistogramError::Binning { .. })
        ));
    }

    #[test]
    fn routing() {
        let mut hists = Histograms::new();
        hists.book("pair_mass", 10, 60., 160.).unwrap();
        let signal = Route {
            category: Some(Category::GgfTight),
            control: false,
        };
        hists.fill("pair_mass", 125., 0.5, signal).unwrap();
        let control = Route {
            category: Some(Category::LowPt),
            control: true,
        };
        hists.fill("pair_mass", 91., 2., control).unwrap();
        hists.fill("pair_mass", 91., 1., Route::default()).unwrap();

        let integral = |name: &str| hists.get(name).unwrap().integral();
        assert_eq!(integral("pair_mass"), 3.5);
        assert_eq!(integral("cat00/pair_mass"), 2.5);
        assert_eq!(integral("cat02/pair_mass"), 0.5);
        assert_eq!(integral("cat05/pair_mass"), 2.);
        assert_eq!(integral("pair_mass_ctrl"), 2.);
        assert_eq!(integral("cat00/pair_mass_ctrl"), 2.);
        assert_eq!(integral("cat05/pair_mass_ctrl"), 2.);
        assert_eq!(integral("cat02/pair_mass_ctrl"), 0.);
        assert_eq!(integral("cat01/pair_mass"), 0.);

        let rejected = Route {
            category: Some(Category::Rejected),
            control: false,
        };
        hists.fill("pair_mass", 125., 1., rejected).unwrap();
        let inclusive = hists.get("cat00/pair_mass").unwrap();
        assert_eq!(inclusive.integral(), 2.5);
        assert_eq!(hists.get("pair_mass").unwrap().integral(), 4.5);
    }

    #[test]
    fn not_booked() {
        let mut hists = Histograms::new();
        let err = hists.fill("pair_mass", 125., 1., Route::default());
        assert_eq!(err, Err(HistogramError::NotBooked("pair_mass".to_owned())));
    }

    #[test]
    fn yaml_output() {
        let mut hists = Histograms::new();
        hists.book("n_jets", 5, 0., 5.).unwrap();
        hists.fill("n_jets", 2., 1.5, Route::default()).unwrap();
        let mut out = Vec::new();
        hists.write_yaml(&mut out).unwrap();
        let read: Histograms = serde_yaml::from_slice(&out).unwrap();
        assert_eq!(read, hists);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("cat03/n_jets_ctrl"));
    }
}
