use derive_builder::Builder;
use itertools::Itertools;
use log::{debug, info, trace};
use noisy_float::prelude::*;
use regex::Regex;
use thiserror::Error;

use crate::category::{Category, CategoryInput, Classifier};
use crate::config::{Channel, ConfigError, CutConfig};
use crate::cutflow::{CutFlow, CutFlowError, CutFlowReport};
use crate::event::Event;
use crate::histogram::{HistogramError, Histograms, Route};
use crate::lumi_mask::LumiMask;
use crate::object::{Jet, Kinematics, Lepton, PhysicsObject};
use crate::pairs::{CandidatePair, PairReconstructor};
use crate::selection::{GoodObjects, ObjectSelector};
use crate::traits::Progress;
use crate::weight::{EventWeight, ScaleFactors, WeightComposer};

/// Static stage with the number of events before any preselection
pub const TOTAL: &str = "total";
pub const ALL: &str = "all";
pub const LUMI_MASK: &str = "lumi_mask";
pub const TRIGGER: &str = "trigger";
pub const GOOD_VERTEX: &str = "good_vertex";
pub const N_LEPTONS: &str = "n_leptons";
pub const N_BJETS: &str = "n_bjets";

/// Name, number of bins, lower and upper edge of the standard histograms
pub const STANDARD_HISTOGRAMS: [(&str, usize, f64, f64); 14] = [
    ("pair_mass", 100, 50., 200.),
    ("pair_pt", 50, 0., 200.),
    ("lead_lepton_pt", 50, 0., 250.),
    ("lead_lepton_eta", 50, -2.5, 2.5),
    ("sublead_lepton_pt", 50, 0., 250.),
    ("sublead_lepton_eta", 50, -2.5, 2.5),
    ("n_jets", 10, 0., 10.),
    ("n_bjets", 5, 0., 5.),
    ("met", 50, 0., 200.),
    ("lead_jet_pt", 50, 0., 500.),
    ("mjj", 50, 0., 2000.),
    ("deta_jj", 40, 0., 8.),
    ("n_vertices", 60, 0., 60.),
    ("event_weight", 100, -2., 2.),
];

#[derive(Debug, Error)]
pub enum AnalysisError<E> {
    #[error("Failed to read event: {0}")]
    Read(E),
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Cutflow error: {0}")]
    CutFlow(#[from] CutFlowError),
    #[error("Histogram error: {0}")]
    Histogram(#[from] HistogramError),
}

/// Event selection, categorisation and histogramming
///
/// A fresh cutflow and histogram set are created for each run, so
/// repeated runs over the same events give identical results.
#[derive(Builder)]
#[builder(pattern = "owned")]
pub struct Analysis<S> {
    config: CutConfig,
    /// Source of correction factors for simulated events
    scale_factors: S,
    /// Certified luminosity blocks, only applied to recorded data
    #[builder(default, setter(strip_option))]
    lumi_mask: Option<LumiMask>,
    /// Number of events before any preselection
    #[builder(default, setter(strip_option))]
    total_events: Option<f64>,
}

/// Outcome of an analysis run
#[derive(Clone, Debug)]
pub struct AnalysisResults {
    pub cutflow: CutFlow,
    pub histograms: Histograms,
}

impl AnalysisResults {
    pub fn report(&self) -> CutFlowReport {
        self.cutflow.report()
    }
}

impl<S: ScaleFactors> Analysis<S> {
    pub fn config(&self) -> &CutConfig {
        &self.config
    }

    /// Run over all events from `events`
    pub fn run<I, E, P>(
        &self,
        events: I,
        progress: &P,
    ) -> Result<AnalysisResults, AnalysisError<E>>
    where
        I: IntoIterator<Item = Result<Event, E>>,
        P: Progress + ?Sized,
    {
        let mut pipeline = Pipeline::new::<E>(self)?;
        let mut nevents = 0;
        for event in events {
            let event = event.map_err(AnalysisError::Read)?;
            pipeline.process::<E>(&event)?;
            nevents += 1;
            progress.inc(1);
        }
        progress.finish();
        info!("Processed {nevents} events");
        Ok(pipeline.into_results())
    }
}

struct Pipeline<'a, S> {
    config: &'a CutConfig,
    scale_factors: &'a S,
    lumi_mask: Option<&'a LumiMask>,
    triggers: Vec<Regex>,
    selector: ObjectSelector,
    pairs: PairReconstructor,
    classifier: Classifier,
    weights: WeightComposer,
    cutflow: CutFlow,
    histograms: Histograms,
}

impl<'a, S: ScaleFactors> Pipeline<'a, S> {
    fn new<E>(analysis: &'a Analysis<S>) -> Result<Self, AnalysisError<E>> {
        let config = &analysis.config;
        let mut pipeline = Self {
            config,
            scale_factors: &analysis.scale_factors,
            lumi_mask: analysis.lumi_mask.as_ref(),
            triggers: config.trigger_patterns()?,
            selector: ObjectSelector::new(config),
            pairs: PairReconstructor::new(config),
            classifier: Classifier::new(config),
            weights: WeightComposer::new(config),
            cutflow: CutFlow::new(),
            histograms: Histograms::new(),
        };
        pipeline.register(analysis.total_events)?;
        for (name, nbins, lo, hi) in STANDARD_HISTOGRAMS {
            pipeline.histograms.book(name, nbins, lo, hi)?;
        }
        Ok(pipeline)
    }

    fn register(&mut self, total: Option<f64>) -> Result<(), CutFlowError> {
        let cutflow = &mut self.cutflow;
        if let Some(total) = total {
            cutflow.add_static(TOTAL, "Total events", total)?;
        }
        cutflow.add(ALL, "Processed events")?;
        if self.lumi_mask.is_some() {
            cutflow.add(LUMI_MASK, "Certified luminosity block")?;
        }
        cutflow.add(TRIGGER, "Trigger")?;
        cutflow.add(GOOD_VERTEX, "Good primary vertex")?;
        self.selector.register(cutflow)?;
        let flavour = match self.config.channel {
            Channel::MuMu => "muons",
            Channel::EE => "electrons",
        };
        let label = format!("≥ {} {flavour}", self.config.min_leptons);
        cutflow.add(N_LEPTONS, &label)?;
        self.pairs.register(cutflow)?;
        let label = format!("≥ {} b jets", self.config.min_bjets);
        cutflow.add(N_BJETS, &label)?;
        self.classifier.register(cutflow)
    }

    fn passes_trigger(&self, event: &Event) -> bool {
        self.triggers.is_empty()
            || event
                .triggers()
                .iter()
                .any(|path| self.triggers.iter().any(|re| re.is_match(path)))
    }

    fn process<E>(&mut self, event: &Event) -> Result<(), AnalysisError<E>> {
        let id = event.id();
        self.cutflow.increment(ALL)?;
        if let Some(mask) = self.lumi_mask {
            if event.is_data() && !mask.contains(&id) {
                debug!("Event {id:?} is not in a certified luminosity block");
                return Ok(());
            }
            self.cutflow.increment(LUMI_MASK)?;
        }
        if !self.passes_trigger(event) {
            debug!("Event {id:?} fails the trigger selection");
            return Ok(());
        }
        self.cutflow.increment(TRIGGER)?;
        if event.n_good_vertices() == 0 {
            debug!("Event {id:?} has no good vertex");
            return Ok(());
        }
        self.cutflow.increment(GOOD_VERTEX)?;

        let good = self.selector.select(event, &mut self.cutflow)?;
        match self.config.channel {
            Channel::MuMu => {
                let n_other = good.electrons.len();
                self.process_leptons(event, &good, &good.muons, n_other)
            }
            Channel::EE => {
                let n_other = good.muons.len();
                self.process_leptons(event, &good, &good.electrons, n_other)
            }
        }
    }

    fn process_leptons<'e, L, E>(
        &mut self,
        event: &'e Event,
        good: &GoodObjects<'e>,
        leptons: &[&'e L],
        n_other_leptons: usize,
    ) -> Result<(), AnalysisError<E>>
    where
        L: Lepton,
        &'e L: Into<PhysicsObject<'e>>,
    {
        let id = event.id();
        if leptons.len() < self.config.min_leptons {
            debug!("Event {id:?} has only {} leptons", leptons.len());
            return Ok(());
        }
        self.cutflow.increment(N_LEPTONS)?;

        let reco = self.pairs.reconstruct(leptons, &mut self.cutflow)?;
        let Some(pair) = reco.leading() else {
            debug!("No lepton pair in event {id:?}");
            return Ok(());
        };
        if good.bjets.len() < self.config.min_bjets {
            debug!("Event {id:?} has only {} b jets", good.bjets.len());
            return Ok(());
        }
        self.cutflow.increment(N_BJETS)?;

        let objects: Vec<PhysicsObject<'e>> =
            leptons.iter().map(|&l| l.into()).collect();
        let weight = self.weights.compose(event, &objects, self.scale_factors);

        let input = CategoryInput {
            n_leptons: leptons.len(),
            n_other_leptons,
            jets: &good.jets,
            n_bjets: good.bjets.len(),
            pair,
            met: event.met(),
        };
        let category = self.classifier.classify(&input, &mut self.cutflow)?;
        if category == Category::Rejected {
            debug!("Event {id:?} is not assigned to any category");
            return Ok(());
        }
        let route = Route {
            category: Some(category),
            control: self.config.is_control_region(pair.m().raw()),
        };
        trace!("Filling histograms for event {id:?} with {route:?}");
        let (lead, sublead) = (leptons[pair.lead()], leptons[pair.sublead()]);
        self.fill_histograms(event, good, pair, [lead, sublead], weight, route)
    }

    fn fill_histograms<L: Lepton, E>(
        &mut self,
        event: &Event,
        good: &GoodObjects<'_>,
        pair: &CandidatePair,
        [lead, sublead]: [&L; 2],
        weight: EventWeight,
        route: Route,
    ) -> Result<(), AnalysisError<E>> {
        let w = weight.full();
        let mut values = vec![
            ("pair_mass", pair.m().raw()),
            ("pair_pt", pair.pt().raw()),
            ("lead_lepton_pt", lead.pt().raw()),
            ("lead_lepton_eta", lead.eta().raw()),
            ("sublead_lepton_pt", sublead.pt().raw()),
            ("sublead_lepton_eta", sublead.eta().raw()),
            ("n_jets", good.jets.len() as f64),
            ("n_bjets", good.bjets.len() as f64),
            ("met", event.met().pt.raw()),
            ("n_vertices", event.n_good_vertices() as f64),
        ];
        let jets: Vec<&Jet> = good
            .jets
            .iter()
            .copied()
            .sorted_by(|j1, j2| j2.pt().cmp(&j1.pt()))
            .collect();
        if let Some(jet) = jets.first() {
            values.push(("lead_jet_pt", jet.pt().raw()));
        }
        if let [j1, j2, ..] = jets[..] {
            values.push(("mjj", (j1.p() + j2.p()).m().raw()));
            values.push(("deta_jj", (j1.eta() - j2.eta()).abs().raw()));
        }
        for (name, value) in values {
            self.histograms.fill(name, value, w, route)?;
        }
        self.histograms.fill("event_weight", w, 1., route)?;
        Ok(())
    }

    fn into_results(self) -> AnalysisResults {
        AnalysisResults {
            cutflow: self.cutflow,
            histograms: self.histograms,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::f64::consts::PI;

    use noisy_float::prelude::*;

    use super::*;
    use crate::event::{EventBuilder, EventId};
    use crate::progress_bar::NO_PROGRESS;
    use crate::test_util::{bjet, electron, good_vertex, jet, log_init, muon};
    use crate::weight::NoCorrections;

    fn id(run: u32, event: u64) -> EventId {
        EventId {
            run,
            lumi: 1,
            event,
        }
    }

    // simulated gluon-fusion-like event with a dimuon mass ≈ 126 GeV
    fn ggf_event(event: u64) -> EventBuilder {
        let mut ev = EventBuilder::new(id(1, event));
        ev.gen_weight(0.5)
            .true_pileup(n64(30.))
            .add_trigger("HLT_IsoMu24_v3")
            .add_vertex(good_vertex())
            .add_muon(muon(100., 0., 0., 1))
            .add_muon(muon(40., 0., PI, -1))
            .add_jet(jet(50., 2., 0.))
            .add_jet(jet(35., -2., PI));
        ev
    }

    fn events() -> Vec<Event> {
        let mut events = vec![ggf_event(1).build()];

        // wrong trigger
        let mut ev = EventBuilder::new(id(1, 2));
        ev.gen_weight(0.5)
            .add_trigger("HLT_Ele27_WPTight_Gsf_v1")
            .add_vertex(good_vertex())
            .add_muon(muon(100., 0., 0., 1))
            .add_muon(muon(40., 0., PI, -1));
        events.push(ev.build());

        // additional electron
        let mut ev = ggf_event(3);
        ev.add_electron(electron(30., 1., 1., 1));
        events.push(ev.build());

        // recorded data outside the certified blocks
        let mut ev = EventBuilder::new(id(2, 4));
        ev.add_trigger("HLT_IsoMu24_v3")
            .add_vertex(good_vertex())
            .add_muon(muon(100., 0., 0., 1))
            .add_muon(muon(40., 0., PI, -1));
        events.push(ev.build());

        // recorded data in the control region
        let mut ev = EventBuilder::new(id(1, 5));
        ev.add_trigger("HLT_IsoMu24_v3")
            .add_vertex(good_vertex())
            .add_muon(muon(55., 0., 0., 1))
            .add_muon(muon(40., 0., PI, -1));
        events.push(ev.build());

        // single muon
        let mut ev = EventBuilder::new(id(1, 6));
        ev.gen_weight(1.)
            .add_trigger("HLT_IsoMu24_v3")
            .add_vertex(good_vertex())
            .add_muon(muon(100., 0., 0., 1));
        events.push(ev.build());
        events
    }

    fn analysis() -> Analysis<NoCorrections> {
        let config =
            CutConfig::from_yaml(r"{triggers: ['HLT_IsoMu24_v\d+']}").unwrap();
        let mask = LumiMask::from_yaml(r#"{"1": [[1, 10]]}"#).unwrap();
        AnalysisBuilder::default()
            .config(config)
            .scale_factors(NoCorrections)
            .lumi_mask(mask)
            .total_events(10.)
            .build()
            .unwrap()
    }

    fn run(analysis: &Analysis<NoCorrections>) -> AnalysisResults {
        let events = events().into_iter().map(Ok::<_, Infallible>);
        analysis.run(events, &NO_PROGRESS).unwrap()
    }

    #[test]
    fn cutflow() {
        log_init();
        let res = run(&analysis());
        let count = |key: &str| res.cutflow.count(key).unwrap();
        assert_eq!(count(TOTAL), 10.);
        assert_eq!(count(ALL), 6.);
        assert_eq!(count(LUMI_MASK), 5.);
        assert_eq!(count(TRIGGER), 4.);
        assert_eq!(count(GOOD_VERTEX), 4.);
        assert_eq!(count("muon_iso"), 4.);
        assert_eq!(count(N_LEPTONS), 3.);
        assert_eq!(count("pair_pt"), 3.);
        assert_eq!(count(N_BJETS), 3.);
        assert_eq!(count("category_total"), 2.);
        assert_eq!(count("category_ggf_tight"), 1.);
        assert_eq!(count("category_high_pt"), 1.);

        let stages = res.cutflow.stages();
        for pair in stages[1..].windows(2) {
            assert!(pair[1].count <= pair[0].count || pair[1].key.starts_with("category_"));
        }
    }

    #[test]
    fn histograms() {
        let res = run(&analysis());
        let hists = &res.histograms;
        let integral = |name: &str| hists.get(name).unwrap().integral();
        assert_eq!(integral("pair_mass"), 1.5);
        assert_eq!(integral("cat02/pair_mass"), 0.5);
        assert_eq!(integral("cat00/pair_mass"), 1.5);
        assert_eq!(integral("cat04/pair_mass_ctrl"), 1.);
        assert_eq!(integral("pair_mass_ctrl"), 1.);
        assert_eq!(integral("cat02/mjj"), 0.5);
        assert_eq!(hists.get("mjj").unwrap().entries(), 1);
        assert_eq!(hists.get("event_weight").unwrap().entries(), 2);
    }

    #[test]
    fn bjet_requirement() {
        let config = CutConfig::from_yaml(
            r"{triggers: ['HLT_IsoMu24_v\d+'], min_bjets: 1}",
        )
        .unwrap();
        let mask = LumiMask::from_yaml(r#"{"1": [[1, 10]]}"#).unwrap();
        let analysis = AnalysisBuilder::default()
            .config(config)
            .scale_factors(NoCorrections)
            .lumi_mask(mask)
            .build()
            .unwrap();
        let mut events = events();
        let mut tagged = ggf_event(7);
        tagged.add_jet(bjet(60., 0., 1.));
        events.push(tagged.build());
        let res = analysis
            .run(events.into_iter().map(Ok::<_, Infallible>), &NO_PROGRESS)
            .unwrap();

        let count = |key: &str| res.cutflow.count(key).unwrap();
        assert_eq!(count("pair_pt"), 4.);
        assert_eq!(count(N_BJETS), 1.);
        assert_eq!(count("category_total"), 1.);
        assert_eq!(count("category_high_pt"), 1.);

        let hists = &res.histograms;
        let integral = |name: &str| hists.get(name).unwrap().integral();
        assert_eq!(hists.get("pair_mass").unwrap().entries(), 1);
        assert_eq!(integral("pair_mass"), 0.5);
        assert_eq!(integral("cat04/pair_mass"), 0.5);
        assert_eq!(integral("cat02/pair_mass"), 0.);
        assert_eq!(hists.get("pair_mass_ctrl").unwrap().entries(), 0);
    }

    #[test]
    fn deterministic() {
        let analysis = analysis();
        let first = run(&analysis);
        let second = run(&analysis);
        assert_eq!(first.report(), second.report());
        assert_eq!(first.histograms, second.histograms);
    }

    #[test]
    fn read_error() {
        let analysis = analysis();
        let events = [Ok(ggf_event(1).build()), Err("broken")];
        let err = analysis.run(events, &NO_PROGRESS).unwrap_err();
        assert!(matches!(err, AnalysisError::Read("broken")));
    }
}
