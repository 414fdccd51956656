use std::f64::consts::PI;

use noisy_float::prelude::*;
use serde::{Deserialize, Serialize};

/// Pseudorapidity assigned to momenta along the beam axis
const BEAM_AXIS_ETA: f64 = 1e5;

/// A basic four-vector
///
/// The zero component is the energy component. The remainder are
/// the cartesian momentum components. On input and output, the
/// vector is represented by its transverse momentum, pseudorapidity,
/// azimuthal angle, and energy.
#[derive(
    Deserialize,
    Serialize,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Debug,
    Clone,
    Copy,
    Default,
)]
#[serde(from = "PtEtaPhiE", into = "PtEtaPhiE")]
pub struct FourVector {
    pt: N64,
    p: [N64; 4],
}

/// Collider coordinates of a four-vector
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct PtEtaPhiE {
    pub pt: N64,
    pub eta: N64,
    pub phi: N64,
    pub e: N64,
}

impl FourVector {
    /// Construct a new null vector
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct from transverse momentum, pseudorapidity, azimuthal angle, and energy
    pub fn from_pt_eta_phi_e(pt: N64, eta: N64, phi: N64, e: N64) -> Self {
        let p = [e, pt * phi.cos(), pt * phi.sin(), pt * eta.sinh()];
        Self { pt, p }
    }

    /// Construct from transverse momentum, pseudorapidity, azimuthal angle, and mass
    pub fn from_pt_eta_phi_m(pt: N64, eta: N64, phi: N64, m: N64) -> Self {
        let pz = pt * eta.sinh();
        let e = (pt * pt + pz * pz + m * m).sqrt();
        Self::from_pt_eta_phi_e(pt, eta, phi, e)
    }

    pub fn e(&self) -> N64 {
        self.p[0]
    }

    pub fn px(&self) -> N64 {
        self.p[1]
    }

    pub fn py(&self) -> N64 {
        self.p[2]
    }

    pub fn pz(&self) -> N64 {
        self.p[3]
    }

    /// The spatial norm \sqrt{\sum v_i^2} with i = 1,2,3
    pub fn spatial_norm(&self) -> N64 {
        self.spatial_norm_sq().sqrt()
    }

    /// The square \sum v_i^2 with i = 1,2,3 of the spatial norm
    pub fn spatial_norm_sq(&self) -> N64 {
        self.p.iter().skip(1).map(|e| *e * *e).sum()
    }

    /// The scalar transverse momentum
    pub fn pt(&self) -> N64 {
        self.pt
    }

    /// The pseudorapidity
    ///
    /// Vectors along the beam axis get a large pseudorapidity with
    /// the sign of their longitudinal momentum.
    pub fn eta(&self) -> N64 {
        if self.pt > 0. {
            (self.pz() / self.pt).asinh()
        } else if self.pz() > 0. {
            n64(BEAM_AXIS_ETA)
        } else if self.pz() < 0. {
            n64(-BEAM_AXIS_ETA)
        } else {
            n64(0.)
        }
    }

    /// The azimuthal angle in [-π, π]
    pub fn phi(&self) -> N64 {
        self.py().atan2(self.px())
    }

    const fn len() -> usize {
        4
    }

    fn update_pt(&mut self) {
        self.pt = (self.p[1] * self.p[1] + self.p[2] * self.p[2]).sqrt();
    }

    /// The invariant mass \sqrt{v_0^2 - \sum v_i^2} with i = 1,2,3
    ///
    /// For space-like vectors, e.g. from rounding errors, the result
    /// is the negative square root of -m^2.
    pub fn m(&self) -> N64 {
        let m_sq = self.m_sq();
        if m_sq >= 0. {
            m_sq.sqrt()
        } else {
            -(-m_sq).sqrt()
        }
    }

    /// The invariant mass square v_0^2 - \sum v_i^2 with i = 1,2,3
    pub fn m_sq(&self) -> N64 {
        self.p[0] * self.p[0] - self.spatial_norm_sq()
    }

    /// Separation ΔR = \sqrt{Δη^2 + Δφ^2} in the η-φ plane
    pub fn delta_r(&self, other: &FourVector) -> N64 {
        let deta = self.eta() - other.eta();
        let dphi = delta_phi(self.phi(), other.phi());
        (deta * deta + dphi * dphi).sqrt()
    }
}

/// Azimuthal angle difference wrapped into [-π, π)
pub fn delta_phi(phi1: N64, phi2: N64) -> N64 {
    let dphi: f64 = (phi1 - phi2).raw();
    n64((dphi + PI).rem_euclid(2. * PI) - PI)
}

impl From<[N64; 4]> for FourVector {
    fn from(p: [N64; 4]) -> FourVector {
        let mut res = FourVector {
            p,
            pt: Default::default(),
        };
        res.update_pt();
        res
    }
}

impl From<PtEtaPhiE> for FourVector {
    fn from(c: PtEtaPhiE) -> Self {
        Self::from_pt_eta_phi_e(c.pt, c.eta, c.phi, c.e)
    }
}

impl From<FourVector> for PtEtaPhiE {
    fn from(p: FourVector) -> Self {
        Self {
            pt: p.pt(),
            eta: p.eta(),
            phi: p.phi(),
            e: p.e(),
        }
    }
}

impl std::ops::Index<usize> for FourVector {
    type Output = N64;

    fn index(&self, i: usize) -> &Self::Output {
        &self.p[i]
    }
}

impl std::ops::AddAssign for FourVector {
    fn add_assign(&mut self, rhs: FourVector) {
        for i in 0..Self::len() {
            self.p[i] += rhs[i]
        }
        self.update_pt();
    }
}

impl std::ops::SubAssign for FourVector {
    fn sub_assign(&mut self, rhs: FourVector) {
        for i in 0..Self::len() {
            self.p[i] -= rhs[i]
        }
        self.update_pt();
    }
}

impl std::ops::Add for FourVector {
    type Output = Self;

    fn add(mut self, rhs: FourVector) -> Self::Output {
        self += rhs;
        self
    }
}

impl std::ops::Sub for FourVector {
    type Output = Self;

    fn sub(mut self, rhs: FourVector) -> Self::Output {
        self -= rhs;
        self
    }
}

impl std::iter::Sum for FourVector {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(FourVector::new(), |acc, p| acc + p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: N64, b: f64) {
        assert!((a.raw() - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn collider_coordinates() {
        let p = FourVector::from_pt_eta_phi_m(n64(30.), n64(1.2), n64(-2.), n64(0.));
        assert_close(p.pt(), 30.);
        assert_close(p.eta(), 1.2);
        assert_close(p.phi(), -2.);
        assert!(p.m().abs() < 1e-4);
    }

    #[test]
    fn pair_mass() {
        // back-to-back massless pair in the transverse plane
        let p1 = FourVector::from_pt_eta_phi_m(n64(62.5), n64(0.), n64(0.), n64(0.));
        let p2 = FourVector::from_pt_eta_phi_m(n64(62.5), n64(0.), n64(PI), n64(0.));
        let sum = p1 + p2;
        assert_close(sum.m(), 125.);
        assert!(sum.pt() < 1e-9);
    }

    #[test]
    fn phi_wrap() {
        assert_close(delta_phi(n64(3.), n64(-3.)), 6. - 2. * PI);
        assert_close(delta_phi(n64(-3.), n64(3.)), 2. * PI - 6.);
        assert_close(delta_phi(n64(0.5), n64(0.25)), 0.25);
        let p1 = FourVector::from_pt_eta_phi_m(n64(10.), n64(0.), n64(3.1), n64(0.));
        let p2 = FourVector::from_pt_eta_phi_m(n64(10.), n64(0.), n64(-3.1), n64(0.));
        assert_close(p1.delta_r(&p2), 2. * PI - 6.2);
    }

    #[test]
    fn beam_axis() {
        let p: FourVector = [n64(5.), n64(0.), n64(0.), n64(-5.)].into();
        assert_eq!(p.eta(), n64(-BEAM_AXIS_ETA));
        assert_eq!(FourVector::new().eta(), n64(0.));
    }
}
