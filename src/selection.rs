use log::trace;
use noisy_float::prelude::*;

use crate::config::{Channel, CutConfig};
use crate::cutflow::{CutFlow, CutFlowError};
use crate::event::Event;
use crate::object::{
    BTagAlgorithm, Electron, IdLevel, IsoLevel, IsoType, Jet, Kinematics,
    Muon, PhysicsObject, WorkingPoint,
};

/// Cutflow stages of the muon selection, in order of application
pub const MUON_STAGES: [&str; 6] = [
    "muon_type",
    "muon_id",
    "muon_pt",
    "muon_eta",
    "muon_ip",
    "muon_iso",
];

/// Cutflow stages of the electron selection, in order of application
pub const ELECTRON_STAGES: [&str; 5] = [
    "electron_id",
    "electron_pt",
    "electron_eta",
    "electron_ip",
    "electron_iso",
];

/// Maximum relative isolation of muons
pub fn muon_iso_threshold(iso: IsoType, level: IsoLevel) -> f64 {
    match (iso, level) {
        (IsoType::PfRelative, IsoLevel::Loose) => 0.25,
        (IsoType::PfRelative, IsoLevel::Tight) => 0.15,
        (IsoType::TrackerRelative, IsoLevel::Loose) => 0.10,
        (IsoType::TrackerRelative, IsoLevel::Tight) => 0.05,
    }
}

/// Maximum relative particle-flow isolation of electrons
pub fn electron_iso_threshold(level: IsoLevel) -> f64 {
    match level {
        IsoLevel::Loose => 0.15,
        IsoLevel::Tight => 0.10,
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
struct LeptonCuts {
    min_pt: f64,
    max_eta: f64,
    id: IdLevel,
    max_iso: f64,
    max_dxy: f64,
    max_dz: f64,
}

#[derive(Copy, Clone, Debug, PartialEq)]
struct JetCuts {
    min_pt: f64,
    max_eta: f64,
    id: IdLevel,
    lepton_min_dr: f64,
    btag_algorithm: BTagAlgorithm,
    btag_working_point: WorkingPoint,
    bjet_max_eta: f64,
}

/// Objects passing the selection in one event
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GoodObjects<'a> {
    pub muons: Vec<&'a Muon>,
    pub electrons: Vec<&'a Electron>,
    pub jets: Vec<&'a Jet>,
    /// Subset of `jets` with a b tag
    pub bjets: Vec<&'a Jet>,
}

impl<'a> GoodObjects<'a> {
    /// All selected leptons, muons first
    pub fn leptons(&self) -> impl Iterator<Item = PhysicsObject<'a>> + '_ {
        self.muons
            .iter()
            .map(|&mu| PhysicsObject::from(mu))
            .chain(self.electrons.iter().map(|&e| PhysicsObject::from(e)))
    }
}

/// Per-object selection of muons, electrons, and jets
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ObjectSelector {
    channel: Channel,
    iso_type: IsoType,
    muon: LeptonCuts,
    electron: LeptonCuts,
    jet: JetCuts,
}

impl ObjectSelector {
    pub fn new(config: &CutConfig) -> Self {
        Self {
            channel: config.channel,
            iso_type: config.muon_iso_type,
            muon: LeptonCuts {
                min_pt: config.muon_min_pt,
                max_eta: config.muon_max_eta,
                id: config.muon_id,
                max_iso: muon_iso_threshold(
                    config.muon_iso_type,
                    config.muon_iso_level,
                ),
                max_dxy: config.muon_max_dxy,
                max_dz: config.muon_max_dz,
            },
            electron: LeptonCuts {
                min_pt: config.electron_min_pt,
                max_eta: config.electron_max_eta,
                id: config.electron_id,
                max_iso: electron_iso_threshold(config.electron_iso_level),
                max_dxy: config.electron_max_dxy,
                max_dz: config.electron_max_dz,
            },
            jet: JetCuts {
                min_pt: config.jet_min_pt,
                max_eta: config.jet_max_eta,
                id: config.jet_id,
                lepton_min_dr: config.jet_lepton_min_dr,
                btag_algorithm: config.btag_algorithm,
                btag_working_point: config.btag_working_point,
                bjet_max_eta: config.bjet_max_eta,
            },
        }
    }

    /// Register the cutflow stages for the leptons of the analysed flavour
    pub fn register(&self, cutflow: &mut CutFlow) -> Result<(), CutFlowError> {
        match self.channel {
            Channel::MuMu => {
                let cuts = &self.muon;
                let labels = [
                    "Global and tracker muon".to_owned(),
                    format!("Muon {} identification", cuts.id),
                    format!("Muon pT > {} GeV", cuts.min_pt),
                    format!("Muon |η| < {}", cuts.max_eta),
                    format!(
                        "Muon |dxy| < {} cm, |dz| < {} cm",
                        cuts.max_dxy, cuts.max_dz
                    ),
                    format!("Muon {} isolation < {}", self.iso_type, cuts.max_iso),
                ];
                for (key, label) in MUON_STAGES.iter().zip(labels) {
                    cutflow.add(key, &label)?;
                }
            }
            Channel::EE => {
                let cuts = &self.electron;
                let labels = [
                    format!("Electron {} identification", cuts.id),
                    format!("Electron pT > {} GeV", cuts.min_pt),
                    format!("Electron |η| < {} outside ECAL gap", cuts.max_eta),
                    format!(
                        "Electron |dxy| < {} cm, |dz| < {} cm",
                        cuts.max_dxy, cuts.max_dz
                    ),
                    format!("Electron isolation < {}", cuts.max_iso),
                ];
                for (key, label) in ELECTRON_STAGES.iter().zip(labels) {
                    cutflow.add(key, &label)?;
                }
            }
        }
        Ok(())
    }

    /// Select the good objects in an event
    ///
    /// For the leptons of the analysed flavour, each cutflow stage is
    /// incremented once if at least one lepton passes all cuts up to
    /// and including that stage.
    pub fn select<'a>(
        &self,
        event: &'a Event,
        cutflow: &mut CutFlow,
    ) -> Result<GoodObjects<'a>, CutFlowError> {
        let (muons, muon_depth) =
            select_passing(event.muons(), MUON_STAGES.len(), |mu| {
                self.muon_depth(mu)
            });
        let (electrons, electron_depth) =
            select_passing(event.electrons(), ELECTRON_STAGES.len(), |e| {
                self.electron_depth(e)
            });
        match self.channel {
            Channel::MuMu => cutflow.increment_chain(&MUON_STAGES, muon_depth)?,
            Channel::EE => {
                cutflow.increment_chain(&ELECTRON_STAGES, electron_depth)?
            }
        }

        let mut good = GoodObjects {
            muons,
            electrons,
            ..Default::default()
        };
        let leptons: Vec<_> = good.leptons().collect();
        good.jets = event
            .jets()
            .iter()
            .filter(|jet| self.is_good_jet(jet, &leptons))
            .collect();
        good.bjets = good
            .jets
            .iter()
            .copied()
            .filter(|jet| self.is_bjet(jet))
            .collect();
        trace!(
            "Selected {} muons, {} electrons, {} jets, {} b jets",
            good.muons.len(),
            good.electrons.len(),
            good.jets.len(),
            good.bjets.len()
        );
        Ok(good)
    }

    /// Number of consecutive muon cuts passed
    fn muon_depth(&self, mu: &Muon) -> usize {
        let cuts = &self.muon;
        let chain: [&dyn Fn(&Muon) -> bool; 6] = [
            &|mu| mu.is_global && mu.is_tracker,
            &|mu| mu.id.passes(cuts.id),
            &|mu| mu.pt() > cuts.min_pt,
            &|mu| mu.eta().abs() < cuts.max_eta,
            &|mu| mu.dxy.abs() < cuts.max_dxy && mu.dz.abs() < cuts.max_dz,
            &|mu| mu.rel_iso(self.iso_type) < cuts.max_iso,
        ];
        let depth = chain.iter().take_while(|cut| cut(mu)).count();
        trace!("muon with pT {} passes {depth} cuts", mu.pt());
        depth
    }

    /// Number of consecutive electron cuts passed
    fn electron_depth(&self, e: &Electron) -> usize {
        let cuts = &self.electron;
        let chain: [&dyn Fn(&Electron) -> bool; 5] = [
            &|e| e.id.passes(cuts.id),
            &|e| e.pt() > cuts.min_pt,
            &|e| e.eta().abs() < cuts.max_eta && !e.in_ecal_gap(),
            &|e| e.dxy.abs() < cuts.max_dxy && e.dz.abs() < cuts.max_dz,
            &|e| e.pf_rel_iso < cuts.max_iso,
        ];
        let depth = chain.iter().take_while(|cut| cut(e)).count();
        trace!("electron with pT {} passes {depth} cuts", e.pt());
        depth
    }

    fn is_good_jet(&self, jet: &Jet, leptons: &[PhysicsObject<'_>]) -> bool {
        let cuts = &self.jet;
        let id = match cuts.id {
            IdLevel::Veto | IdLevel::Loose => jet.id.loose,
            IdLevel::Medium | IdLevel::Tight => jet.id.tight,
        };
        id && jet.pt() > cuts.min_pt
            && jet.eta().abs() < cuts.max_eta
            && leptons
                .iter()
                .all(|l| jet.delta_r(l) >= cuts.lepton_min_dr)
    }

    fn is_bjet(&self, jet: &Jet) -> bool {
        let cuts = &self.jet;
        jet.eta().abs() < cuts.bjet_max_eta
            && jet.is_btagged(cuts.btag_algorithm, cuts.btag_working_point)
    }
}

// Returns the objects passing all `ncuts` cuts and the largest
// number of consecutive cuts passed by any object
fn select_passing<'a, T, F>(
    objects: &'a [T],
    ncuts: usize,
    depth: F,
) -> (Vec<&'a T>, usize)
where
    F: Fn(&T) -> usize,
{
    let mut max_depth = 0;
    let mut passing = Vec::new();
    for obj in objects {
        let depth = depth(obj);
        max_depth = std::cmp::max(max_depth, depth);
        if depth == ncuts {
            passing.push(obj);
        }
    }
    (passing, max_depth)
}
