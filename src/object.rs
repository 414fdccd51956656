use noisy_float::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::four_vector::FourVector;

/// Common kinematic interface of reconstructed objects
pub trait Kinematics {
    /// The four-momentum
    fn p(&self) -> FourVector;

    /// Electric charge in units of the elementary charge
    fn charge(&self) -> i32 {
        0
    }

    fn pt(&self) -> N64 {
        self.p().pt()
    }

    fn eta(&self) -> N64 {
        self.p().eta()
    }

    fn phi(&self) -> N64 {
        self.p().phi()
    }

    /// Angular separation ΔR to another object
    fn delta_r(&self, other: &dyn Kinematics) -> N64 {
        self.p().delta_r(&other.p())
    }
}

/// Objects reconstructed from a track with an associated vertex
pub trait Lepton: Kinematics {
    /// Transverse impact parameter
    fn dxy(&self) -> N64;
    /// Longitudinal distance to the primary vertex
    fn dz(&self) -> N64;
}

/// Identification working point
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash,
    Deserialize, Display, EnumString,
)]
#[serde(try_from = "String")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum IdLevel {
    Veto,
    Loose,
    #[default]
    Medium,
    Tight,
}

/// Decisions of the identification working points
#[derive(Deserialize, Serialize, Copy, Clone, Debug, Default, Eq, PartialEq)]
#[serde(default)]
pub struct IdFlags {
    pub veto: bool,
    pub loose: bool,
    pub medium: bool,
    pub tight: bool,
}

impl IdFlags {
    /// Whether the given working point is passed
    ///
    /// Objects without a dedicated veto decision fall back to the
    /// loose working point.
    pub fn passes(&self, level: IdLevel) -> bool {
        match level {
            IdLevel::Veto => self.veto || self.loose,
            IdLevel::Loose => self.loose,
            IdLevel::Medium => self.medium,
            IdLevel::Tight => self.tight,
        }
    }
}

/// Isolation variable
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash,
    Deserialize, Display, EnumString,
)]
#[serde(try_from = "String")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum IsoType {
    /// Particle-flow isolation relative to the object transverse momentum
    #[default]
    #[strum(to_string = "pf_relative", serialize = "pf")]
    PfRelative,
    /// Tracker isolation relative to the object transverse momentum
    #[strum(to_string = "tracker_relative", serialize = "tracker")]
    TrackerRelative,
}

/// Isolation working point
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash,
    Deserialize, Display, EnumString,
)]
#[serde(try_from = "String")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum IsoLevel {
    Loose,
    #[default]
    Tight,
}

/// b-tagging algorithm
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash,
    Deserialize, Display, EnumString,
)]
#[serde(try_from = "String")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum BTagAlgorithm {
    #[strum(to_string = "csv", serialize = "csvv2")]
    Csv,
    #[default]
    #[strum(to_string = "deep_csv", serialize = "deepcsv")]
    DeepCsv,
    #[strum(to_string = "deep_jet", serialize = "deepjet", serialize = "deep_flavour")]
    DeepJet,
}

/// b-tagging working point
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash,
    Deserialize, Display, EnumString,
)]
#[serde(try_from = "String")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum WorkingPoint {
    Loose,
    #[default]
    Medium,
    Tight,
}

impl BTagAlgorithm {
    /// Minimum discriminant value for the given working point
    pub fn threshold(&self, wp: WorkingPoint) -> f64 {
        use BTagAlgorithm::*;
        use WorkingPoint::*;
        match (self, wp) {
            (Csv, Loose) => 0.5426,
            (Csv, Medium) => 0.8484,
            (Csv, Tight) => 0.9535,
            (DeepCsv, Loose) => 0.2217,
            (DeepCsv, Medium) => 0.6321,
            (DeepCsv, Tight) => 0.8953,
            (DeepJet, Loose) => 0.0614,
            (DeepJet, Medium) => 0.3093,
            (DeepJet, Tight) => 0.7221,
        }
    }
}

/// A reconstructed muon
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Muon {
    pub p: FourVector,
    pub charge: i32,
    #[serde(default)]
    pub dxy: N64,
    #[serde(default)]
    pub dz: N64,
    #[serde(default)]
    pub is_global: bool,
    #[serde(default)]
    pub is_tracker: bool,
    #[serde(default)]
    pub id: IdFlags,
    /// Δβ-corrected particle-flow isolation in a ΔR = 0.4 cone, relative to pT
    #[serde(default)]
    pub pf_rel_iso: N64,
    /// Tracker isolation in a ΔR = 0.3 cone, relative to pT
    #[serde(default)]
    pub tk_rel_iso: N64,
}

impl Muon {
    pub fn rel_iso(&self, iso: IsoType) -> N64 {
        match iso {
            IsoType::PfRelative => self.pf_rel_iso,
            IsoType::TrackerRelative => self.tk_rel_iso,
        }
    }
}

/// A reconstructed electron
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Electron {
    pub p: FourVector,
    pub charge: i32,
    #[serde(default)]
    pub dxy: N64,
    #[serde(default)]
    pub dz: N64,
    /// Pseudorapidity of the calorimeter supercluster
    #[serde(default)]
    pub eta_sc: N64,
    #[serde(default)]
    pub id: IdFlags,
    #[serde(default)]
    pub pf_rel_iso: N64,
}

// transition region between calorimeter barrel and endcap
const ECAL_GAP: (f64, f64) = (1.4442, 1.566);

impl Electron {
    /// Whether the supercluster lies in the barrel-endcap transition
    pub fn in_ecal_gap(&self) -> bool {
        let eta = self.eta_sc.abs();
        eta > ECAL_GAP.0 && eta < ECAL_GAP.1
    }
}

/// Discriminants of the b-tagging algorithms
#[derive(Deserialize, Serialize, Copy, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct BTagScores {
    pub csv: N64,
    pub deep_csv: N64,
    pub deep_jet: N64,
}

/// Jet identification decisions
#[derive(Deserialize, Serialize, Copy, Clone, Debug, Default, Eq, PartialEq)]
#[serde(default)]
pub struct JetId {
    pub loose: bool,
    pub tight: bool,
}

/// A reconstructed jet
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Jet {
    pub p: FourVector,
    #[serde(default)]
    pub id: JetId,
    #[serde(default)]
    pub btag: BTagScores,
}

impl Jet {
    pub fn btag_score(&self, algo: BTagAlgorithm) -> N64 {
        match algo {
            BTagAlgorithm::Csv => self.btag.csv,
            BTagAlgorithm::DeepCsv => self.btag.deep_csv,
            BTagAlgorithm::DeepJet => self.btag.deep_jet,
        }
    }

    pub fn is_btagged(&self, algo: BTagAlgorithm, wp: WorkingPoint) -> bool {
        self.btag_score(algo) > algo.threshold(wp)
    }
}

/// A reconstructed photon
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Photon {
    pub p: FourVector,
    #[serde(default)]
    pub id: IdFlags,
    #[serde(default)]
    pub pf_rel_iso: N64,
}

/// A reconstructed hadronically decaying tau lepton
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Tau {
    pub p: FourVector,
    pub charge: i32,
    #[serde(default)]
    pub dxy: N64,
    #[serde(default)]
    pub dz: N64,
    #[serde(default)]
    pub decay_mode: i32,
}

/// Missing transverse momentum
#[derive(Deserialize, Serialize, Copy, Clone, Debug, Default, PartialEq)]
pub struct Met {
    pub pt: N64,
    pub phi: N64,
}

impl Met {
    /// The massless transverse four-vector
    pub fn p(&self) -> FourVector {
        FourVector::from_pt_eta_phi_e(self.pt, n64(0.), self.phi, self.pt)
    }
}

impl Kinematics for Muon {
    fn p(&self) -> FourVector {
        self.p
    }

    fn charge(&self) -> i32 {
        self.charge
    }
}

impl Lepton for Muon {
    fn dxy(&self) -> N64 {
        self.dxy
    }

    fn dz(&self) -> N64 {
        self.dz
    }
}

impl Kinematics for Electron {
    fn p(&self) -> FourVector {
        self.p
    }

    fn charge(&self) -> i32 {
        self.charge
    }
}

impl Lepton for Electron {
    fn dxy(&self) -> N64 {
        self.dxy
    }

    fn dz(&self) -> N64 {
        self.dz
    }
}

impl Kinematics for Jet {
    fn p(&self) -> FourVector {
        self.p
    }
}

impl Kinematics for Photon {
    fn p(&self) -> FourVector {
        self.p
    }
}

impl Kinematics for Tau {
    fn p(&self) -> FourVector {
        self.p
    }

    fn charge(&self) -> i32 {
        self.charge
    }
}

impl Lepton for Tau {
    fn dxy(&self) -> N64 {
        self.dxy
    }

    fn dz(&self) -> N64 {
        self.dz
    }
}

/// Kinds of reconstructed objects
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ObjectKind {
    Muon,
    Electron,
    Jet,
    Photon,
    Tau,
}

/// Read-only view of a reconstructed object of any kind
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum PhysicsObject<'a> {
    Muon(&'a Muon),
    Electron(&'a Electron),
    Jet(&'a Jet),
    Photon(&'a Photon),
    Tau(&'a Tau),
}

impl<'a> PhysicsObject<'a> {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Muon(_) => ObjectKind::Muon,
            Self::Electron(_) => ObjectKind::Electron,
            Self::Jet(_) => ObjectKind::Jet,
            Self::Photon(_) => ObjectKind::Photon,
            Self::Tau(_) => ObjectKind::Tau,
        }
    }

    fn as_kinematics(&self) -> &'a dyn Kinematics {
        match *self {
            Self::Muon(o) => o,
            Self::Electron(o) => o,
            Self::Jet(o) => o,
            Self::Photon(o) => o,
            Self::Tau(o) => o,
        }
    }
}

impl Kinematics for PhysicsObject<'_> {
    fn p(&self) -> FourVector {
        self.as_kinematics().p()
    }

    fn charge(&self) -> i32 {
        self.as_kinematics().charge()
    }
}

macro_rules! impl_from_ref {
    ( $( $kind:ident ),* ) => {
        $(
            impl<'a> From<&'a $kind> for PhysicsObject<'a> {
                fn from(o: &'a $kind) -> Self {
                    Self::$kind(o)
                }
            }
        )*
    };
}

impl_from_ref!(Muon, Electron, Jet, Photon, Tau);
