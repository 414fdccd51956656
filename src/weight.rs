use log::trace;
use serde::Serialize;

use crate::config::{Channel, CutConfig};
use crate::event::Event;
use crate::object::{IdLevel, IsoLevel, PhysicsObject};

/// Source of correction factors for simulated events
///
/// Implementations have to tolerate missing backing data by
/// returning the neutral factor 1.
pub trait ScaleFactors {
    /// Weight for the given number of true pileup interactions
    fn pileup_weight(&self, true_pileup: f64) -> f64;

    /// Trigger scale factor for events where any of `objects` may
    /// have fired the trigger
    fn trigger_scale(&self, objects: &[PhysicsObject<'_>], scheme: &str)
        -> f64;

    /// Product of the identification scale factors of all `objects`
    fn id_scale(
        &self,
        objects: &[PhysicsObject<'_>],
        id: IdLevel,
        scheme: &str,
    ) -> f64;

    /// Product of the isolation scale factors of all `objects`
    fn iso_scale(
        &self,
        objects: &[PhysicsObject<'_>],
        id: IdLevel,
        iso: IsoLevel,
        scheme: &str,
    ) -> f64;
}

/// Scale factors that are all one
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct NoCorrections;

impl ScaleFactors for NoCorrections {
    fn pileup_weight(&self, _true_pileup: f64) -> f64 {
        1.
    }

    fn trigger_scale(&self, _: &[PhysicsObject<'_>], _: &str) -> f64 {
        1.
    }

    fn id_scale(&self, _: &[PhysicsObject<'_>], _: IdLevel, _: &str) -> f64 {
        1.
    }

    fn iso_scale(
        &self,
        _: &[PhysicsObject<'_>],
        _: IdLevel,
        _: IsoLevel,
        _: &str,
    ) -> f64 {
        1.
    }
}

/// Probability that at least one of several objects passes
pub fn combined_efficiency<I>(efficiencies: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    1. - efficiencies.into_iter().map(|e| 1. - e).product::<f64>()
}

/// Scale factor for "at least one object" efficiencies
///
/// Takes pairs of per-object efficiencies in recorded data and in
/// simulation and returns the ratio of the combined efficiencies.
/// If the combined efficiency in simulation is exactly one or zero
/// the scale factor is one.
pub fn combined_scale<I>(efficiencies: I) -> f64
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let (data, mc): (Vec<_>, Vec<_>) = efficiencies.into_iter().unzip();
    let mc = combined_efficiency(mc);
    if mc == 1. || mc == 0. {
        return 1.;
    }
    combined_efficiency(data) / mc
}

/// Event weight split into independent factors
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct EventWeight {
    generator: f64,
    pileup: f64,
    trigger: f64,
    id: f64,
    iso: f64,
    full: f64,
}

impl EventWeight {
    pub fn new(generator: f64, pileup: f64, trigger: f64, id: f64, iso: f64) -> Self {
        Self {
            generator,
            pileup,
            trigger,
            id,
            iso,
            full: generator * pileup * trigger * id * iso,
        }
    }

    /// Weight of recorded events
    pub fn unit() -> Self {
        Self::new(1., 1., 1., 1., 1.)
    }

    pub fn generator(&self) -> f64 {
        self.generator
    }

    pub fn pileup(&self) -> f64 {
        self.pileup
    }

    pub fn trigger(&self) -> f64 {
        self.trigger
    }

    pub fn id(&self) -> f64 {
        self.id
    }

    pub fn iso(&self) -> f64 {
        self.iso
    }

    /// Product of all factors
    pub fn full(&self) -> f64 {
        self.full
    }
}

impl Default for EventWeight {
    fn default() -> Self {
        Self::unit()
    }
}

/// Combination of generator weights and correction factors
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WeightComposer {
    id: IdLevel,
    iso: IsoLevel,
    scheme: String,
}

impl WeightComposer {
    pub fn new(config: &CutConfig) -> Self {
        let (id, iso) = match config.channel {
            Channel::MuMu => (config.muon_id, config.muon_iso_level),
            Channel::EE => (config.electron_id, config.electron_iso_level),
        };
        Self {
            id,
            iso,
            scheme: config.scale_factor_scheme.clone(),
        }
    }

    /// Compute the weight of an event with the given selected leptons
    pub fn compose<S>(
        &self,
        event: &Event,
        leptons: &[PhysicsObject<'_>],
        sf: &S,
    ) -> EventWeight
    where
        S: ScaleFactors + ?Sized,
    {
        let Some(generator) = event.gen_weight() else {
            return EventWeight::unit();
        };
        let pileup = match event.true_pileup() {
            Some(pu) => sf.pileup_weight(pu.raw()),
            None => 1.,
        };
        let scheme = &self.scheme;
        let weight = EventWeight::new(
            generator,
            pileup,
            sf.trigger_scale(leptons, scheme),
            sf.id_scale(leptons, self.id, scheme),
            sf.iso_scale(leptons, self.id, self.iso, scheme),
        );
        trace!("Event weight: {weight:?}");
        weight
    }
}
