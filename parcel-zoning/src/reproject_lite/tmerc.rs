//! Mercator transverse ellipsoïdal (série de Krüger à l'ordre 4)
//!
//! Couvre UTM (WGS84 et NAD83) et les grilles TM de l'Alberta. Précision
//! sub-millimétrique jusqu'à ~4000 km du méridien central.

use super::ellipsoid::Ellipsoid;
use super::Geographic;
use crate::error::CrsError;

/// Paramètres d'une projection Mercator transverse
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TmParams {
    pub ellipsoid: Ellipsoid,
    /// Méridien central en degrés
    pub lon0: f64,
    /// Facteur d'échelle sur le méridien central
    pub k0: f64,
    /// False easting
    pub x0: f64,
    /// False northing
    pub y0: f64,
}

impl TmParams {
    /// Zone UTM (1 à 60)
    pub fn utm(ellipsoid: Ellipsoid, zone: u32, south: bool) -> Self {
        Self {
            ellipsoid,
            lon0: zone as f64 * 6.0 - 183.0,
            k0: 0.9996,
            x0: 500000.0,
            y0: if south { 10000000.0 } else { 0.0 },
        }
    }
}

/// Projection Mercator transverse avec coefficients précalculés
#[derive(Debug, Clone)]
pub struct TransverseMercator {
    params: TmParams,
    e: f64,
    /// Rayon rectifiant multiplié par k0
    ka: f64,
    alpha: [f64; 4],
    beta: [f64; 4],
    delta: [f64; 4],
}

impl TransverseMercator {
    pub fn new(params: TmParams) -> Self {
        let n = params.ellipsoid.n();
        let n2 = n * n;
        let n3 = n2 * n;
        let n4 = n3 * n;

        let a = params.ellipsoid.a / (1.0 + n) * (1.0 + n2 / 4.0 + n4 / 64.0);

        let alpha = [
            n / 2.0 - 2.0 * n2 / 3.0 + 5.0 * n3 / 16.0 + 41.0 * n4 / 180.0,
            13.0 * n2 / 48.0 - 3.0 * n3 / 5.0 + 557.0 * n4 / 1440.0,
            61.0 * n3 / 240.0 - 103.0 * n4 / 140.0,
            49561.0 * n4 / 161280.0,
        ];
        let beta = [
            n / 2.0 - 2.0 * n2 / 3.0 + 37.0 * n3 / 96.0 - n4 / 360.0,
            n2 / 48.0 + n3 / 15.0 - 437.0 * n4 / 1440.0,
            17.0 * n3 / 480.0 - 37.0 * n4 / 840.0,
            4397.0 * n4 / 161280.0,
        ];
        let delta = [
            2.0 * n - 2.0 * n2 / 3.0 - 2.0 * n3 + 116.0 * n4 / 45.0,
            7.0 * n2 / 3.0 - 8.0 * n3 / 5.0 - 227.0 * n4 / 45.0,
            56.0 * n3 / 15.0 - 136.0 * n4 / 35.0,
            4279.0 * n4 / 630.0,
        ];

        Self {
            params,
            e: params.ellipsoid.e(),
            ka: params.k0 * a,
            alpha,
            beta,
            delta,
        }
    }

    /// Géographique → projeté
    pub fn forward(&self, geo: Geographic) -> Result<(f64, f64), CrsError> {
        let dlon = normalize_angle(geo.lon - self.params.lon0.to_radians());
        if dlon.abs() >= std::f64::consts::FRAC_PI_2 {
            return Err(CrsError::Undefined(format!(
                "longitude {:.6}° is 90° or more from central meridian {}°",
                geo.lon.to_degrees(),
                self.params.lon0
            )));
        }

        let sin_lat = geo.lat.sin();
        let t = (sin_lat.atanh() - self.e * (self.e * sin_lat).atanh()).sinh();
        let xi_p = t.atan2(dlon.cos());
        let eta_p = (dlon.sin() / (1.0 + t * t).sqrt()).atanh();

        let mut xi = xi_p;
        let mut eta = eta_p;
        for (j, a) in self.alpha.iter().enumerate() {
            let k = 2.0 * (j + 1) as f64;
            xi += a * (k * xi_p).sin() * (k * eta_p).cosh();
            eta += a * (k * xi_p).cos() * (k * eta_p).sinh();
        }

        Ok((
            self.params.x0 + self.ka * eta,
            self.params.y0 + self.ka * xi,
        ))
    }

    /// Projeté → géographique
    pub fn inverse(&self, x: f64, y: f64) -> Result<Geographic, CrsError> {
        let xi = (y - self.params.y0) / self.ka;
        let eta = (x - self.params.x0) / self.ka;

        let mut xi_p = xi;
        let mut eta_p = eta;
        for (j, b) in self.beta.iter().enumerate() {
            let k = 2.0 * (j + 1) as f64;
            xi_p -= b * (k * xi).sin() * (k * eta).cosh();
            eta_p -= b * (k * xi).cos() * (k * eta).sinh();
        }

        let chi = (xi_p.sin() / eta_p.cosh()).asin();
        let mut lat = chi;
        for (j, d) in self.delta.iter().enumerate() {
            lat += d * (2.0 * (j + 1) as f64 * chi).sin();
        }
        let lon = self.params.lon0.to_radians() + eta_p.sinh().atan2(xi_p.cos());

        Ok(Geographic::new(lon, lat))
    }
}

/// Ramène un angle dans ]-π, π]
fn normalize_angle(a: f64) -> f64 {
    let tau = std::f64::consts::TAU;
    let r = a.rem_euclid(tau);
    if r > std::f64::consts::PI {
        r - tau
    } else {
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reproject_lite::ellipsoid::{GRS80, WGS84};

    #[test]
    fn test_calgary_utm12n() {
        let tm = TransverseMercator::new(TmParams::utm(WGS84, 12, false));
        let (x, y) = tm
            .forward(Geographic::from_degrees(-114.0719, 51.0447))
            .unwrap();

        assert!((x - 284674.74).abs() < 0.05, "x={}", x);
        assert!((y - 5659286.41).abs() < 0.05, "y={}", y);
    }

    #[test]
    fn test_roundtrip_south() {
        let tm = TransverseMercator::new(TmParams::utm(WGS84, 56, true));
        let geo = Geographic::from_degrees(151.2093, -33.8688);
        let (x, y) = tm.forward(geo).unwrap();
        assert!(y > 6_000_000.0 && y < 10_000_000.0, "y={}", y);

        let back = tm.inverse(x, y).unwrap();
        let (lon, lat) = back.to_degrees();
        assert!((lon - 151.2093).abs() < 1e-9, "lon={}", lon);
        assert!((lat + 33.8688).abs() < 1e-9, "lat={}", lat);
    }

    #[test]
    fn test_central_meridian_origin() {
        let tm = TransverseMercator::new(TmParams::utm(GRS80, 12, false));
        let (x, y) = tm.forward(Geographic::from_degrees(-111.0, 0.0)).unwrap();
        assert!((x - 500000.0).abs() < 1e-6);
        assert!(y.abs() < 1e-6);
    }

    #[test]
    fn test_far_from_meridian_is_undefined() {
        let tm = TransverseMercator::new(TmParams::utm(WGS84, 12, false));
        let result = tm.forward(Geographic::from_degrees(80.0, 10.0));
        assert!(matches!(result, Err(CrsError::Undefined(_))));
    }
}
