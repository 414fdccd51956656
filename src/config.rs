use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::debug;
use regex::Regex;
use serde::Deserialize;
use strum::{Display, EnumString};
use thiserror::Error;

use crate::object::{BTagAlgorithm, IdLevel, IsoLevel, IsoType, WorkingPoint};

/// Errors in the cut configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to open configuration file {0:?}: {1}")]
    Io(PathBuf, std::io::Error),
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Unknown {kind}: `{value}`")]
    UnknownChoice { kind: &'static str, value: String },
    #[error("Invalid trigger pattern `{0}`: {1}")]
    TriggerPattern(String, regex::Error),
    #[error("Invalid setting for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Flavour of the lepton pair
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash,
    Deserialize, Display, EnumString,
)]
#[serde(try_from = "String")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Channel {
    /// Muon pairs, electrons are vetoed
    #[default]
    #[strum(to_string = "mumu", serialize = "dimuon")]
    MuMu,
    /// Electron pairs, muons are vetoed
    #[strum(to_string = "ee", serialize = "dielectron")]
    EE,
}

macro_rules! impl_try_from_string {
    ( $( $t:ty => $kind:literal ),* $(,)? ) => {
        $(
            impl TryFrom<String> for $t {
                type Error = ConfigError;

                fn try_from(s: String) -> Result<Self, Self::Error> {
                    match s.parse() {
                        Ok(choice) => Ok(choice),
                        Err(_) => Err(ConfigError::UnknownChoice {
                            kind: $kind,
                            value: s,
                        }),
                    }
                }
            }
        )*
    };
}

impl_try_from_string!(
    Channel => "channel",
    IdLevel => "identification level",
    IsoType => "isolation type",
    IsoLevel => "isolation level",
    BTagAlgorithm => "b-tagging algorithm",
    WorkingPoint => "b-tagging working point",
);

/// Selection thresholds and choices
///
/// All momenta and masses are in GeV, impact parameters in cm.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CutConfig {
    pub channel: Channel,
    /// Regular expressions for accepted trigger paths
    ///
    /// An event passes the trigger requirement if any fired path
    /// matches any of the patterns. An empty list accepts all events.
    pub triggers: Vec<String>,
    /// File with certified luminosity blocks for recorded data
    pub lumi_mask: Option<PathBuf>,

    pub muon_min_pt: f64,
    pub muon_max_eta: f64,
    pub muon_id: IdLevel,
    pub muon_iso_type: IsoType,
    pub muon_iso_level: IsoLevel,
    pub muon_max_dxy: f64,
    pub muon_max_dz: f64,

    pub electron_min_pt: f64,
    pub electron_max_eta: f64,
    pub electron_id: IdLevel,
    pub electron_iso_level: IsoLevel,
    pub electron_max_dxy: f64,
    pub electron_max_dz: f64,

    pub jet_min_pt: f64,
    pub jet_max_eta: f64,
    pub jet_id: IdLevel,
    /// Minimum separation between jets and selected leptons
    pub jet_lepton_min_dr: f64,
    pub btag_algorithm: BTagAlgorithm,
    pub btag_working_point: WorkingPoint,
    pub bjet_max_eta: f64,

    /// Minimum number of selected leptons of the channel flavour
    pub min_leptons: usize,
    pub pair_opposite_charge: bool,
    /// Maximum difference in longitudinal vertex distance
    pub pair_max_dz_diff: f64,
    pub pair_min_mass: f64,
    pub pair_min_pt: f64,
    /// Minimum number of b-tagged jets
    pub min_bjets: usize,

    pub category_lead_jet_min_pt: f64,
    pub category_sublead_jet_min_pt: f64,
    pub category_max_met: Option<f64>,
    pub vbf_tight_min_mjj: f64,
    pub vbf_tight_min_deta: f64,
    pub ggf_tight_min_mjj: f64,
    pub ggf_tight_min_pair_pt: f64,
    pub high_pt_min_pair_pt: f64,

    /// Lower and upper edge of the signal region in the pair mass
    ///
    /// Events outside this window are additionally recorded in the
    /// control region.
    pub signal_window: [f64; 2],

    /// Name of the scale factor set
    pub scale_factor_scheme: String,
}

impl Default for CutConfig {
    fn default() -> Self {
        Self {
            channel: Channel::MuMu,
            triggers: Vec::new(),
            lumi_mask: None,

            muon_min_pt: 20.,
            muon_max_eta: 2.4,
            muon_id: IdLevel::Medium,
            muon_iso_type: IsoType::PfRelative,
            muon_iso_level: IsoLevel::Tight,
            muon_max_dxy: 0.2,
            muon_max_dz: 0.5,

            electron_min_pt: 20.,
            electron_max_eta: 2.5,
            electron_id: IdLevel::Medium,
            electron_iso_level: IsoLevel::Tight,
            electron_max_dxy: 0.05,
            electron_max_dz: 0.1,

            jet_min_pt: 30.,
            jet_max_eta: 4.7,
            jet_id: IdLevel::Loose,
            jet_lepton_min_dr: 0.4,
            btag_algorithm: BTagAlgorithm::DeepCsv,
            btag_working_point: WorkingPoint::Medium,
            bjet_max_eta: 2.4,

            min_leptons: 2,
            pair_opposite_charge: true,
            pair_max_dz_diff: 0.14,
            pair_min_mass: 60.,
            pair_min_pt: 0.,
            min_bjets: 0,

            category_lead_jet_min_pt: 40.,
            category_sublead_jet_min_pt: 30.,
            category_max_met: Some(40.),
            vbf_tight_min_mjj: 650.,
            vbf_tight_min_deta: 3.5,
            ggf_tight_min_mjj: 250.,
            ggf_tight_min_pair_pt: 50.,
            high_pt_min_pair_pt: 10.,

            signal_window: [110., 160.],

            scale_factor_scheme: "default".to_owned(),
        }
    }
}

impl CutConfig {
    /// Read and validate a configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!("Reading cut configuration from {path:?}");
        let file = File::open(path)
            .map_err(|err| ConfigError::Io(path.to_owned(), err))?;
        let config: Self = serde_yaml::from_reader(BufReader::new(file))?;
        config.validate()
    }

    /// Read and validate a configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()
    }

    /// Check settings for consistency
    pub fn validate(self) -> Result<Self, ConfigError> {
        use ConfigError::Invalid;

        let non_negative = [
            ("muon_min_pt", self.muon_min_pt),
            ("muon_max_eta", self.muon_max_eta),
            ("muon_max_dxy", self.muon_max_dxy),
            ("muon_max_dz", self.muon_max_dz),
            ("electron_min_pt", self.electron_min_pt),
            ("electron_max_eta", self.electron_max_eta),
            ("electron_max_dxy", self.electron_max_dxy),
            ("electron_max_dz", self.electron_max_dz),
            ("jet_min_pt", self.jet_min_pt),
            ("jet_max_eta", self.jet_max_eta),
            ("jet_lepton_min_dr", self.jet_lepton_min_dr),
            ("bjet_max_eta", self.bjet_max_eta),
            ("pair_max_dz_diff", self.pair_max_dz_diff),
            ("pair_min_mass", self.pair_min_mass),
            ("pair_min_pt", self.pair_min_pt),
        ];
        for (key, value) in non_negative {
            if !(value >= 0.) {
                return Err(Invalid {
                    key,
                    reason: format!("{value} is not a non-negative number"),
                });
            }
        }
        if self.min_leptons < 2 {
            return Err(Invalid {
                key: "min_leptons",
                reason: format!(
                    "at least two leptons are needed to form a pair, got {}",
                    self.min_leptons
                ),
            });
        }
        let [lo, hi] = self.signal_window;
        if !(lo < hi) {
            return Err(Invalid {
                key: "signal_window",
                reason: format!("lower edge {lo} is not below upper edge {hi}"),
            });
        }
        if self.scale_factor_scheme.is_empty() {
            return Err(Invalid {
                key: "scale_factor_scheme",
                reason: "scheme name is empty".to_owned(),
            });
        }
        self.trigger_patterns()?;
        Ok(self)
    }

    /// Compiled trigger path patterns
    ///
    /// Each pattern has to match the full trigger path name.
    pub fn trigger_patterns(&self) -> Result<Vec<Regex>, ConfigError> {
        self.triggers
            .iter()
            .map(|pat| {
                Regex::new(&format!("^(?:{pat})$"))
                    .map_err(|err| ConfigError::TriggerPattern(pat.clone(), err))
            })
            .collect()
    }

    /// Whether `mass` lies outside the signal window
    pub fn is_control_region(&self, mass: f64) -> bool {
        let [lo, hi] = self.signal_window;
        mass < lo || mass > hi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = CutConfig::from_yaml("{}").unwrap();
        assert_eq!(config, CutConfig::default());
        assert!(config.is_control_region(90.));
        assert!(!config.is_control_region(125.));
    }

    #[test]
    fn choices() {
        let config = CutConfig::from_yaml(
            "
channel: ee
muon_iso_type: tracker
muon_iso_level: loose
btag_algorithm: deep_jet
triggers: ['HLT_Ele27_WPTight_Gsf_v\\d+']
",
        )
        .unwrap();
        assert_eq!(config.channel, Channel::EE);
        assert_eq!(config.muon_iso_type, IsoType::TrackerRelative);
        assert_eq!(config.muon_iso_level, IsoLevel::Loose);
        assert_eq!(config.btag_algorithm, BTagAlgorithm::DeepJet);
        let patterns = config.trigger_patterns().unwrap();
        assert!(patterns[0].is_match("HLT_Ele27_WPTight_Gsf_v7"));
        assert!(!patterns[0].is_match("HLT_Ele27_WPTight_Gsf_v7_extra"));
    }

    #[test]
    fn unknown_choice() {
        let err = CutConfig::from_yaml("muon_iso_type: calorimeter").unwrap_err();
        assert!(err.to_string().contains("Unknown isolation type: `calorimeter`"));
        let err = CutConfig::from_yaml("muon_id: ultra").unwrap_err();
        assert!(err.to_string().contains("identification level"));
        assert!(CutConfig::from_yaml("muon_ptmin: 3").is_err());
    }

    #[test]
    fn inconsistent() {
        let err = CutConfig::from_yaml("signal_window: [160, 110]").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "signal_window", .. }));
        let err = CutConfig::from_yaml("min_leptons: 1").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "min_leptons", .. }));
        let err = CutConfig::from_yaml("jet_min_pt: -3").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "jet_min_pt", .. }));
        let err = CutConfig::from_yaml("triggers: ['HLT_(']").unwrap_err();
        assert!(matches!(err, ConfigError::TriggerPattern(..)));
    }
}
