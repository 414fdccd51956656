use itertools::Itertools;
use log::trace;
use noisy_float::prelude::*;

use crate::config::CutConfig;
use crate::cutflow::{CutFlow, CutFlowError};
use crate::four_vector::FourVector;
use crate::object::Lepton;

/// Cutflow stages of the pair selection, in order of application
pub const PAIR_STAGES: [&str; 4] =
    ["pair_charge", "pair_dz", "pair_mass", "pair_pt"];

/// Two objects forming a candidate
///
/// The indices refer to the collection the pair was reconstructed
/// from. The leading object has at least the transverse momentum of
/// the subleading one.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CandidatePair {
    lead: usize,
    sublead: usize,
    p: FourVector,
}

impl CandidatePair {
    pub fn lead(&self) -> usize {
        self.lead
    }

    pub fn sublead(&self) -> usize {
        self.sublead
    }

    /// Sum of the four-momenta of both objects
    pub fn p(&self) -> FourVector {
        self.p
    }

    pub fn m(&self) -> N64 {
        self.p.m()
    }

    pub fn pt(&self) -> N64 {
        self.p.pt()
    }
}

/// Result of the pair reconstruction in one event
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reconstruction {
    /// Number of examined object combinations
    pub considered: usize,
    /// Pairs passing all cuts, in the order of enumeration
    pub pairs: Vec<CandidatePair>,
}

impl Reconstruction {
    /// The pair with the highest transverse momentum
    ///
    /// For equal transverse momenta, the pair enumerated first wins.
    pub fn leading(&self) -> Option<&CandidatePair> {
        self.pairs
            .iter()
            .reduce(|best, pair| if pair.pt() > best.pt() { pair } else { best })
    }
}

/// Reconstruction of same-flavour lepton pairs
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PairReconstructor {
    opposite_charge: bool,
    max_dz_diff: f64,
    min_mass: f64,
    min_pt: f64,
}

impl PairReconstructor {
    pub fn new(config: &CutConfig) -> Self {
        Self {
            opposite_charge: config.pair_opposite_charge,
            max_dz_diff: config.pair_max_dz_diff,
            min_mass: config.pair_min_mass,
            min_pt: config.pair_min_pt,
        }
    }

    pub fn register(&self, cutflow: &mut CutFlow) -> Result<(), CutFlowError> {
        let charge_label = if self.opposite_charge {
            "Opposite-charge pair"
        } else {
            "Lepton pair"
        };
        let labels = [
            charge_label.to_owned(),
            format!("Pair |Δdz| < {} cm", self.max_dz_diff),
            format!("Pair mass > {} GeV", self.min_mass),
            format!("Pair pT > {} GeV", self.min_pt),
        ];
        for (key, label) in PAIR_STAGES.iter().zip(labels) {
            cutflow.add(key, &label)?;
        }
        Ok(())
    }

    /// Find all pairs passing the pair selection
    ///
    /// Every combination of two leptons is examined. The cuts of each
    /// pair are checked in order and the first failing cut ends the
    /// examination of that pair. Each cutflow stage is incremented
    /// once if any pair reaches it.
    pub fn reconstruct<L: Lepton>(
        &self,
        leptons: &[&L],
        cutflow: &mut CutFlow,
    ) -> Result<Reconstruction, CutFlowError> {
        let mut res = Reconstruction::default();
        let mut max_depth = 0;
        for (i, j) in (0..leptons.len()).tuple_combinations() {
            res.considered += 1;
            let (l1, l2) = (leptons[i], leptons[j]);
            let p = l1.p() + l2.p();
            let chain: [&dyn Fn() -> bool; 4] = [
                &|| !self.opposite_charge || l1.charge() * l2.charge() < 0,
                &|| (l1.dz() - l2.dz()).abs() < self.max_dz_diff,
                &|| p.m() > self.min_mass,
                &|| p.pt() > self.min_pt,
            ];
            let depth = chain.iter().take_while(|cut| cut()).count();
            trace!("pair ({i}, {j}) with mass {} passes {depth} cuts", p.m());
            max_depth = std::cmp::max(max_depth, depth);
            if depth == chain.len() {
                let (lead, sublead) =
                    if l2.pt() > l1.pt() { (j, i) } else { (i, j) };
                res.pairs.push(CandidatePair { lead, sublead, p });
            }
        }
        cutflow.increment_chain(&PAIR_STAGES, max_depth)?;
        Ok(res)
    }
}
