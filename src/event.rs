use noisy_float::prelude::*;
use serde::{Deserialize, Serialize};

use crate::object::{Electron, Jet, Met, Muon, Photon, PhysicsObject, Tau};

/// Run, luminosity block, and event number
#[derive(
    Deserialize, Serialize, Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash,
)]
pub struct EventId {
    pub run: u32,
    pub lumi: u32,
    pub event: u64,
}

/// A reconstructed primary vertex
#[derive(Deserialize, Serialize, Copy, Clone, Debug, Default, PartialEq)]
pub struct Vertex {
    /// Longitudinal position in cm
    pub z: N64,
    /// Transverse distance to the beam line in cm
    #[serde(default)]
    pub rho: N64,
    /// Number of degrees of freedom of the vertex fit
    pub ndof: N64,
    #[serde(default)]
    pub is_fake: bool,
}

const VERTEX_MIN_NDOF: f64 = 4.;
const VERTEX_MAX_Z: f64 = 24.;
const VERTEX_MAX_RHO: f64 = 2.;

impl Vertex {
    pub fn is_good(&self) -> bool {
        !self.is_fake
            && self.ndof > VERTEX_MIN_NDOF
            && self.z.abs() < VERTEX_MAX_Z
            && self.rho < VERTEX_MAX_RHO
    }
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct EventBuilder {
    id: EventId,
    gen_weight: Option<f64>,
    true_pileup: Option<N64>,
    triggers: Vec<String>,
    vertices: Vec<Vertex>,
    muons: Vec<Muon>,
    electrons: Vec<Electron>,
    jets: Vec<Jet>,
    photons: Vec<Photon>,
    taus: Vec<Tau>,
    met: Met,
}

impl EventBuilder {
    pub fn new(id: EventId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// Mark as simulated event with the given generator weight
    pub fn gen_weight(&mut self, weight: f64) -> &mut Self {
        self.gen_weight = Some(weight);
        self
    }

    /// Mean number of simulated pileup interactions
    pub fn true_pileup(&mut self, pileup: N64) -> &mut Self {
        self.true_pileup = Some(pileup);
        self
    }

    pub fn add_trigger<S: Into<String>>(&mut self, path: S) -> &mut Self {
        self.triggers.push(path.into());
        self
    }

    pub fn add_vertex(&mut self, vx: Vertex) -> &mut Self {
        self.vertices.push(vx);
        self
    }

    pub fn add_muon(&mut self, mu: Muon) -> &mut Self {
        self.muons.push(mu);
        self
    }

    pub fn add_electron(&mut self, e: Electron) -> &mut Self {
        self.electrons.push(e);
        self
    }

    pub fn add_jet(&mut self, jet: Jet) -> &mut Self {
        self.jets.push(jet);
        self
    }

    pub fn add_photon(&mut self, photon: Photon) -> &mut Self {
        self.photons.push(photon);
        self
    }

    pub fn add_tau(&mut self, tau: Tau) -> &mut Self {
        self.taus.push(tau);
        self
    }

    pub fn met(&mut self, met: Met) -> &mut Self {
        self.met = met;
        self
    }

    pub fn build(self) -> Event {
        let EventBuilder {
            id,
            gen_weight,
            true_pileup,
            triggers,
            vertices,
            muons,
            electrons,
            jets,
            photons,
            taus,
            met,
        } = self;
        Event {
            id,
            gen_weight,
            true_pileup,
            triggers,
            vertices,
            muons,
            electrons,
            jets,
            photons,
            taus,
            met,
        }
    }
}

impl From<EventBuilder> for Event {
    fn from(b: EventBuilder) -> Self {
        b.build()
    }
}

/// A recorded or simulated collision event
///
/// Events without a generator weight are treated as recorded data.
#[derive(Deserialize, Serialize, PartialEq, Debug, Clone, Default)]
pub struct Event {
    #[serde(flatten)]
    id: EventId,
    #[serde(default)]
    gen_weight: Option<f64>,
    #[serde(default)]
    true_pileup: Option<N64>,
    #[serde(default)]
    triggers: Vec<String>,
    #[serde(default)]
    vertices: Vec<Vertex>,
    #[serde(default)]
    muons: Vec<Muon>,
    #[serde(default)]
    electrons: Vec<Electron>,
    #[serde(default)]
    jets: Vec<Jet>,
    #[serde(default)]
    photons: Vec<Photon>,
    #[serde(default)]
    taus: Vec<Tau>,
    #[serde(default)]
    met: Met,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn is_data(&self) -> bool {
        self.gen_weight.is_none()
    }

    pub fn gen_weight(&self) -> Option<f64> {
        self.gen_weight
    }

    pub fn true_pileup(&self) -> Option<N64> {
        self.true_pileup
    }

    /// Names of the fired trigger paths
    pub fn triggers(&self) -> &[String] {
        self.triggers.as_slice()
    }

    pub fn vertices(&self) -> &[Vertex] {
        self.vertices.as_slice()
    }

    pub fn n_good_vertices(&self) -> usize {
        self.vertices.iter().filter(|vx| vx.is_good()).count()
    }

    pub fn muons(&self) -> &[Muon] {
        self.muons.as_slice()
    }

    pub fn electrons(&self) -> &[Electron] {
        self.electrons.as_slice()
    }

    pub fn jets(&self) -> &[Jet] {
        self.jets.as_slice()
    }

    pub fn photons(&self) -> &[Photon] {
        self.photons.as_slice()
    }

    pub fn taus(&self) -> &[Tau] {
        self.taus.as_slice()
    }

    pub fn met(&self) -> &Met {
        &self.met
    }

    /// All reconstructed objects, grouped by kind
    pub fn objects(&self) -> impl Iterator<Item = PhysicsObject<'_>> {
        self.muons
            .iter()
            .map(PhysicsObject::from)
            .chain(self.electrons.iter().map(PhysicsObject::from))
            .chain(self.jets.iter().map(PhysicsObject::from))
            .chain(self.photons.iter().map(PhysicsObject::from))
            .chain(self.taus.iter().map(PhysicsObject::from))
    }
}
