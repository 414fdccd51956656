// shared fixtures for unit tests
use noisy_float::prelude::*;

use crate::event::Vertex;
use crate::four_vector::FourVector;
use crate::object::{BTagScores, Electron, IdFlags, Jet, JetId, Muon};

pub(crate) fn log_init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

const ALL_IDS: IdFlags = IdFlags {
    veto: true,
    loose: true,
    medium: true,
    tight: true,
};

pub(crate) fn muon(pt: f64, eta: f64, phi: f64, charge: i32) -> Muon {
    Muon {
        p: FourVector::from_pt_eta_phi_m(n64(pt), n64(eta), n64(phi), n64(0.1057)),
        charge,
        dxy: n64(0.001),
        dz: n64(0.01),
        is_global: true,
        is_tracker: true,
        id: ALL_IDS,
        pf_rel_iso: n64(0.05),
        tk_rel_iso: n64(0.01),
    }
}

pub(crate) fn electron(pt: f64, eta: f64, phi: f64, charge: i32) -> Electron {
    Electron {
        p: FourVector::from_pt_eta_phi_m(n64(pt), n64(eta), n64(phi), n64(0.000511)),
        charge,
        dxy: n64(0.001),
        dz: n64(0.01),
        eta_sc: n64(eta),
        id: ALL_IDS,
        pf_rel_iso: n64(0.05),
    }
}

pub(crate) fn jet(pt: f64, eta: f64, phi: f64) -> Jet {
    Jet {
        p: FourVector::from_pt_eta_phi_m(n64(pt), n64(eta), n64(phi), n64(0.)),
        id: JetId {
            loose: true,
            tight: true,
        },
        btag: BTagScores::default(),
    }
}

pub(crate) fn bjet(pt: f64, eta: f64, phi: f64) -> Jet {
    let mut jet = jet(pt, eta, phi);
    jet.btag = BTagScores {
        csv: n64(0.99),
        deep_csv: n64(0.99),
        deep_jet: n64(0.99),
    };
    jet
}

pub(crate) fn good_vertex() -> Vertex {
    Vertex {
        z: n64(0.5),
        rho: n64(0.1),
        ndof: n64(50.),
        is_fake: false,
    }
}
