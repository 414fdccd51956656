use itertools::Itertools;
use log::trace;
use noisy_float::prelude::*;
use strum::{Display, EnumIter, IntoEnumIterator};

use crate::config::CutConfig;
use crate::cutflow::{CutFlow, CutFlowError};
use crate::object::{Jet, Kinematics, Met};
use crate::pairs::CandidatePair;

/// Mutually exclusive event categories, in order of priority
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Display, EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum Category {
    /// Dijet events with a vector-boson-fusion topology
    VbfTight,
    /// Dijet events with a hard lepton pair
    GgfTight,
    /// Remaining dijet events
    VbfLoose,
    /// Events without dijet tag and a lepton pair with large transverse momentum
    HighPt,
    /// Events without dijet tag and a lepton pair with small transverse momentum
    LowPt,
    /// Events failing the base selection
    #[strum(serialize = "none")]
    Rejected,
}

/// Cutflow stage counting all categorised events
pub const CATEGORY_TOTAL: &str = "category_total";

impl Category {
    /// Category number, starting at 1
    ///
    /// Number 0 is reserved for the inclusive selection.
    pub fn number(&self) -> Option<usize> {
        use Category::*;
        match self {
            VbfTight => Some(1),
            GgfTight => Some(2),
            VbfLoose => Some(3),
            HighPt => Some(4),
            LowPt => Some(5),
            Rejected => None,
        }
    }

    /// Cutflow stage of this category
    pub fn key(&self) -> String {
        format!("category_{self}")
    }

    /// All categories assigned to selected events
    pub fn accepted() -> impl Iterator<Item = Category> {
        Category::iter().filter(|c| *c != Category::Rejected)
    }
}

/// Everything the category decision depends on
#[derive(Copy, Clone, Debug)]
pub struct CategoryInput<'a> {
    /// Number of selected leptons of the analysed flavour
    pub n_leptons: usize,
    /// Number of selected leptons of the other flavour
    pub n_other_leptons: usize,
    pub jets: &'a [&'a Jet],
    pub n_bjets: usize,
    /// The leading lepton pair
    pub pair: &'a CandidatePair,
    pub met: &'a Met,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CategoryCuts {
    min_leptons: usize,
    lead_jet_min_pt: f64,
    sublead_jet_min_pt: f64,
    max_met: Option<f64>,
    vbf_tight_min_mjj: f64,
    vbf_tight_min_deta: f64,
    ggf_tight_min_mjj: f64,
    ggf_tight_min_pair_pt: f64,
    high_pt_min_pair_pt: f64,
}

type Condition = fn(&CategoryInput<'_>, &CategoryCuts) -> bool;

/// A category is assigned if its condition holds
struct Rule {
    category: Category,
    condition: Condition,
}

/// The decision list; the first matching rule determines the category
const RULES: [Rule; 6] = [
    Rule { category: Category::Rejected, condition: fails_base_selection },
    Rule { category: Category::VbfTight, condition: is_vbf_tight },
    Rule { category: Category::GgfTight, condition: is_ggf_tight },
    Rule { category: Category::VbfLoose, condition: passes_dijet_preselection },
    Rule { category: Category::HighPt, condition: has_high_pt_pair },
    Rule { category: Category::LowPt, condition: always },
];

fn fails_base_selection(input: &CategoryInput<'_>, cuts: &CategoryCuts) -> bool {
    input.n_leptons < cuts.min_leptons || input.n_other_leptons > 0
}

fn passes_dijet_preselection(
    input: &CategoryInput<'_>,
    cuts: &CategoryCuts,
) -> bool {
    if input.n_bjets > 0 || input.jets.len() < 2 {
        return false;
    }
    if let Some(max_met) = cuts.max_met {
        if input.met.pt >= max_met {
            return false;
        }
    }
    let mut pts = input.jets.iter().map(|jet| jet.pt()).sorted().rev();
    match (pts.next(), pts.next()) {
        (Some(lead), Some(sublead)) => {
            lead > cuts.lead_jet_min_pt && sublead > cuts.sublead_jet_min_pt
        }
        _ => false,
    }
}

fn is_vbf_tight(input: &CategoryInput<'_>, cuts: &CategoryCuts) -> bool {
    passes_dijet_preselection(input, cuts)
        && any_jet_pair(input.jets, |mjj, deta| {
            mjj > cuts.vbf_tight_min_mjj && deta > cuts.vbf_tight_min_deta
        })
}

fn is_ggf_tight(input: &CategoryInput<'_>, cuts: &CategoryCuts) -> bool {
    passes_dijet_preselection(input, cuts)
        && input.pair.pt() > cuts.ggf_tight_min_pair_pt
        && any_jet_pair(input.jets, |mjj, _| mjj > cuts.ggf_tight_min_mjj)
}

fn has_high_pt_pair(input: &CategoryInput<'_>, cuts: &CategoryCuts) -> bool {
    input.pair.pt() > cuts.high_pt_min_pair_pt
}

fn always(_: &CategoryInput<'_>, _: &CategoryCuts) -> bool {
    true
}

// whether any jet pair satisfies `cond(mjj, |Δη|)`
fn any_jet_pair<F>(jets: &[&Jet], cond: F) -> bool
where
    F: Fn(f64, f64) -> bool,
{
    jets.iter().tuple_combinations().any(|(j1, j2)| {
        let mjj = (j1.p() + j2.p()).m().raw();
        let deta = (j1.eta() - j2.eta()).abs().raw();
        cond(mjj, deta)
    })
}

/// Assignment of events to exactly one category
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Classifier {
    cuts: CategoryCuts,
}

impl Classifier {
    pub fn new(config: &CutConfig) -> Self {
        let cuts = CategoryCuts {
            min_leptons: config.min_leptons,
            lead_jet_min_pt: config.category_lead_jet_min_pt,
            sublead_jet_min_pt: config.category_sublead_jet_min_pt,
            max_met: config.category_max_met,
            vbf_tight_min_mjj: config.vbf_tight_min_mjj,
            vbf_tight_min_deta: config.vbf_tight_min_deta,
            ggf_tight_min_mjj: config.ggf_tight_min_mjj,
            ggf_tight_min_pair_pt: config.ggf_tight_min_pair_pt,
            high_pt_min_pair_pt: config.high_pt_min_pair_pt,
        };
        Self { cuts }
    }

    pub fn register(&self, cutflow: &mut CutFlow) -> Result<(), CutFlowError> {
        cutflow.add(CATEGORY_TOTAL, "Categorised events")?;
        for category in Category::accepted() {
            cutflow.add(&category.key(), &format!("Category {category}"))?;
        }
        Ok(())
    }

    /// Determine the category without any bookkeeping
    pub fn category(&self, input: &CategoryInput<'_>) -> Category {
        RULES
            .iter()
            .find(|rule| (rule.condition)(input, &self.cuts))
            .map(|rule| rule.category)
            .unwrap_or(Category::Rejected)
    }

    /// Determine the category and update the cutflow
    pub fn classify(
        &self,
        input: &CategoryInput<'_>,
        cutflow: &mut CutFlow,
    ) -> Result<Category, CutFlowError> {
        let category = self.category(input);
        trace!("Event assigned to category {category}");
        if category != Category::Rejected {
            cutflow.increment(CATEGORY_TOTAL)?;
            cutflow.increment(&category.key())?;
        }
        Ok(category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pairs::PairReconstructor;
    use crate::test_util::{bjet, jet, log_init, muon};

    // back-to-back lepton pair with the given transverse momentum
    fn pair_with_pt(pt: f64) -> CandidatePair {
        let mu1 = muon(62.5 + pt / 2., 0., 0., 1);
        let mu2 = muon(62.5 - pt / 2., 0., std::f64::consts::PI, -1);
        let reco = PairReconstructor::new(&CutConfig::default());
        let mut cutflow = CutFlow::new();
        reco.register(&mut cutflow).unwrap();
        let res = reco.reconstruct(&[&mu1, &mu2], &mut cutflow).unwrap();
        res.pairs[0]
    }

    fn classify(
        jets: &[Jet],
        n_bjets: usize,
        pair_pt: f64,
        n_other_leptons: usize,
    ) -> Category {
        let classifier = Classifier::new(&CutConfig::default());
        let jets: Vec<_> = jets.iter().collect();
        let pair = pair_with_pt(pair_pt);
        let met = Met::default();
        let input = CategoryInput {
            n_leptons: 2,
            n_other_leptons,
            jets: &jets,
            n_bjets,
            pair: &pair,
            met: &met,
        };
        classifier.category(&input)
    }

    #[test]
    fn priorities() {
        log_init();
        let pi = std::f64::consts::PI;
        let vbf_jets = [jet(100., 2.5, 0.), jet(80., -2.5, pi)];
        assert_eq!(classify(&vbf_jets, 0, 60., 0), Category::VbfTight);
        // the dijet system of the gluon fusion tag is too light for VBF
        let ggf_jets = [jet(50., 2., 0.), jet(35., -2., pi)];
        assert_eq!(classify(&ggf_jets, 0, 60., 0), Category::GgfTight);
        assert_eq!(classify(&ggf_jets, 0, 40., 0), Category::VbfLoose);
        let close_jets = [jet(50., 0.2, 0.), jet(35., -0.2, 0.4)];
        assert_eq!(classify(&close_jets, 0, 60., 0), Category::VbfLoose);
    }

    #[test]
    fn untagged() {
        let pi = std::f64::consts::PI;
        let vbf_jets = [jet(100., 2.5, 0.), jet(80., -2.5, pi)];
        // b jets veto the dijet categories
        assert_eq!(classify(&vbf_jets, 1, 60., 0), Category::HighPt);
        let soft_sublead = [jet(50., 2.5, 0.), jet(30., -2.5, pi)];
        assert_eq!(classify(&soft_sublead, 0, 20., 0), Category::HighPt);
        assert_eq!(classify(&[jet(50., 0., 0.)], 0, 5., 0), Category::LowPt);
        assert_eq!(classify(&[], 0, 5., 1), Category::Rejected);
    }

    #[test]
    fn met_ceiling() {
        let classifier = Classifier::new(&CutConfig::default());
        let pi = std::f64::consts::PI;
        let jets = [jet(50., 2., 0.), jet(35., -2., pi)];
        let jets: Vec<_> = jets.iter().collect();
        let classify_with_met = |met: f64, pair_pt: f64| {
            let pair = pair_with_pt(pair_pt);
            let met = Met {
                pt: n64(met),
                phi: n64(0.),
            };
            let input = CategoryInput {
                n_leptons: 2,
                n_other_leptons: 0,
                jets: &jets,
                n_bjets: 0,
                pair: &pair,
                met: &met,
            };
            classifier.category(&input)
        };
        assert_eq!(classify_with_met(30., 60.), Category::GgfTight);
        assert_eq!(classify_with_met(80., 60.), Category::HighPt);
        assert_eq!(classify_with_met(80., 5.), Category::LowPt);
        // the ceiling is exclusive
        assert_eq!(classify_with_met(40., 60.), Category::HighPt);
    }

    #[test]
    fn bookkeeping() {
        let classifier = Classifier::new(&CutConfig::default());
        let mut cutflow = CutFlow::new();
        classifier.register(&mut cutflow).unwrap();
        assert_eq!(cutflow.len(), 6);

        let jets = [bjet(60., 0., 0.)];
        let jets: Vec<_> = jets.iter().collect();
        let pair = pair_with_pt(20.);
        let met = Met::default();
        let mut input = CategoryInput {
            n_leptons: 2,
            n_other_leptons: 0,
            jets: &jets,
            n_bjets: 1,
            pair: &pair,
            met: &met,
        };
        let cat = classifier.classify(&input, &mut cutflow).unwrap();
        assert_eq!(cat, Category::HighPt);
        input.n_leptons = 1;
        let cat = classifier.classify(&input, &mut cutflow).unwrap();
        assert_eq!(cat, Category::Rejected);
        assert_eq!(cutflow.count(CATEGORY_TOTAL), Ok(1.));
        assert_eq!(cutflow.count("category_high_pt"), Ok(1.));
        assert_eq!(cutflow.count("category_vbf_tight"), Ok(0.));
    }

    #[test]
    fn numbering() {
        let numbers: Vec<_> =
            Category::accepted().filter_map(|c| c.number()).collect();
        assert_eq!(numbers, [1, 2, 3, 4, 5]);
        assert_eq!(Category::Rejected.number(), None);
        assert_eq!(Category::Rejected.to_string(), "none");
        assert_eq!(Category::GgfTight.key(), "category_ggf_tight");
    }
}
