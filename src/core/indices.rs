//! Index Engine: elementwise spectral index formulas over resolved bands.
//! Every formula is a total function over its domain; division degeneracies
//! produce NaN at the affected pixel, never an error.
use std::collections::HashMap;

use ndarray::{Array2, Zip};

use crate::error::{Error, Result};
use crate::types::{BandRole, SpectralIndex};

/// Resolved band arrays for one product, all at the common pixel grid.
#[derive(Debug, Default)]
pub struct BandSet {
    bands: HashMap<BandRole, Array2<f64>>,
}

impl BandSet {
    pub fn new() -> Self {
        BandSet {
            bands: HashMap::new(),
        }
    }

    pub fn insert(&mut self, role: BandRole, data: Array2<f64>) {
        self.bands.insert(role, data);
    }

    pub fn contains(&self, role: BandRole) -> bool {
        self.bands.contains_key(&role)
    }

    pub fn get(&self, role: BandRole) -> Result<&Array2<f64>> {
        self.bands
            .get(&role)
            .ok_or_else(|| Error::Processing(format!("band `{}` not resolved", role)))
    }
}

impl SpectralIndex {
    /// Band roles this formula consumes.
    pub fn required_roles(self) -> &'static [BandRole] {
        use BandRole::*;
        match self {
            SpectralIndex::Ndvi => &[Nir, Red],
            SpectralIndex::Ndwi => &[Green, Nir],
            SpectralIndex::Ndmi => &[Nir, Swir1],
            SpectralIndex::Evi => &[Nir, Red, Blue],
            SpectralIndex::Savi => &[Nir, Red],
            SpectralIndex::Rvi => &[Nir, Red],
            SpectralIndex::TcBrightness
            | SpectralIndex::TcGreenness
            | SpectralIndex::TcWetness => &[Blue, Green, Red, Nir, Swir1, Swir2],
        }
    }

    /// Compute the per-pixel index array from resolved bands.
    pub fn compute(self, bands: &BandSet) -> Result<Array2<f64>> {
        for role in self.required_roles() {
            let band = bands.get(*role)?;
            let reference = bands.get(self.required_roles()[0])?;
            if band.dim() != reference.dim() {
                return Err(Error::Processing(format!(
                    "band `{}` dimension {:?} does not match {:?}",
                    role,
                    band.dim(),
                    reference.dim()
                )));
            }
        }

        match self {
            SpectralIndex::Ndvi => {
                Ok(normalized_difference(bands.get(BandRole::Nir)?, bands.get(BandRole::Red)?))
            }
            SpectralIndex::Ndwi => {
                Ok(normalized_difference(bands.get(BandRole::Green)?, bands.get(BandRole::Nir)?))
            }
            SpectralIndex::Ndmi => {
                Ok(normalized_difference(bands.get(BandRole::Nir)?, bands.get(BandRole::Swir1)?))
            }
            SpectralIndex::Evi => Ok(evi(
                bands.get(BandRole::Nir)?,
                bands.get(BandRole::Red)?,
                bands.get(BandRole::Blue)?,
            )),
            SpectralIndex::Savi => {
                Ok(savi(bands.get(BandRole::Nir)?, bands.get(BandRole::Red)?))
            }
            SpectralIndex::Rvi => Ok(ratio(bands.get(BandRole::Nir)?, bands.get(BandRole::Red)?)),
            SpectralIndex::TcBrightness => tasseled_cap(bands, TC_BRIGHTNESS),
            SpectralIndex::TcGreenness => tasseled_cap(bands, TC_GREENNESS),
            SpectralIndex::TcWetness => tasseled_cap(bands, TC_WETNESS),
        }
    }
}

/// (a - b) / (a + b), NaN where the denominator is zero.
fn normalized_difference(a: &Array2<f64>, b: &Array2<f64>) -> Array2<f64> {
    let mut out = Array2::zeros(a.dim());
    Zip::from(&mut out).and(a).and(b).for_each(|res, &av, &bv| {
        let denom = av + bv;
        *res = if denom == 0.0 { f64::NAN } else { (av - bv) / denom };
    });
    out
}

/// a / b, NaN where b is zero.
fn ratio(a: &Array2<f64>, b: &Array2<f64>) -> Array2<f64> {
    let mut out = Array2::zeros(a.dim());
    Zip::from(&mut out).and(a).and(b).for_each(|res, &av, &bv| {
        *res = if bv == 0.0 { f64::NAN } else { av / bv };
    });
    out
}

/// Enhanced Vegetation Index with the standard MODIS coefficients.
fn evi(nir: &Array2<f64>, red: &Array2<f64>, blue: &Array2<f64>) -> Array2<f64> {
    const G: f64 = 2.5;
    const C1: f64 = 6.0;
    const C2: f64 = 7.5;
    const L: f64 = 1.0;
    let mut out = Array2::zeros(nir.dim());
    Zip::from(&mut out)
        .and(nir)
        .and(red)
        .and(blue)
        .for_each(|res, &n, &r, &b| {
            let denom = n + C1 * r - C2 * b + L;
            *res = if denom == 0.0 { f64::NAN } else { G * (n - r) / denom };
        });
    out
}

/// Soil-Adjusted Vegetation Index, L = 0.5.
fn savi(nir: &Array2<f64>, red: &Array2<f64>) -> Array2<f64> {
    const L: f64 = 0.5;
    let mut out = Array2::zeros(nir.dim());
    Zip::from(&mut out).and(nir).and(red).for_each(|res, &n, &r| {
        let denom = n + r + L;
        *res = if denom == 0.0 { f64::NAN } else { (1.0 + L) * (n - r) / denom };
    });
    out
}

// Tasseled-cap coefficients (blue, green, red, nir, swir1, swir2),
// Landsat-8 OLI reflectance set, commonly reused for Sentinel-2.
const TC_BRIGHTNESS: [f64; 6] = [0.3029, 0.2786, 0.4733, 0.5599, 0.5080, 0.1872];
const TC_GREENNESS: [f64; 6] = [-0.2941, -0.2430, -0.5424, 0.7276, 0.0713, -0.1608];
const TC_WETNESS: [f64; 6] = [0.1511, 0.1973, 0.3283, 0.3407, -0.7117, -0.4559];

fn tasseled_cap(bands: &BandSet, coeffs: [f64; 6]) -> Result<Array2<f64>> {
    use BandRole::*;
    let roles = [Blue, Green, Red, Nir, Swir1, Swir2];
    let first = bands.get(roles[0])?;
    let mut out = Array2::zeros(first.dim());
    for (role, coeff) in roles.iter().zip(coeffs.iter()) {
        let band = bands.get(*role)?;
        Zip::from(&mut out).and(band).for_each(|res, &v| {
            *res += coeff * v;
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn set(pairs: Vec<(BandRole, Array2<f64>)>) -> BandSet {
        let mut bands = BandSet::new();
        for (role, data) in pairs {
            bands.insert(role, data);
        }
        bands
    }

    #[test]
    fn ndvi_basic_values() {
        let bands = set(vec![
            (BandRole::Nir, array![[0.6, 0.4]]),
            (BandRole::Red, array![[0.2, 0.4]]),
        ]);
        let out = SpectralIndex::Ndvi.compute(&bands).unwrap();
        assert!((out[[0, 0]] - 0.5).abs() < 1e-12);
        assert!((out[[0, 1]] - 0.0).abs() < 1e-12);
    }

    #[test]
    fn zero_denominator_yields_nan_not_panic() {
        let bands = set(vec![
            (BandRole::Nir, array![[0.0, 0.3]]),
            (BandRole::Red, array![[0.0, -0.3]]),
        ]);
        let out = SpectralIndex::Ndvi.compute(&bands).unwrap();
        assert!(out[[0, 0]].is_nan());
        assert!(out[[0, 1]].is_nan());

        let out = SpectralIndex::Rvi.compute(&set(vec![
            (BandRole::Nir, array![[1.0]]),
            (BandRole::Red, array![[0.0]]),
        ]))
        .unwrap();
        assert!(out[[0, 0]].is_nan());
    }

    #[test]
    fn nan_input_propagates() {
        let bands = set(vec![
            (BandRole::Nir, array![[f64::NAN]]),
            (BandRole::Red, array![[0.2]]),
        ]);
        let out = SpectralIndex::Ndvi.compute(&bands).unwrap();
        assert!(out[[0, 0]].is_nan());
    }

    #[test]
    fn missing_band_is_an_error() {
        let bands = set(vec![(BandRole::Nir, array![[0.5]])]);
        assert!(SpectralIndex::Ndvi.compute(&bands).is_err());
    }

    #[test]
    fn dimension_mismatch_is_an_error() {
        let bands = set(vec![
            (BandRole::Nir, array![[0.5, 0.5]]),
            (BandRole::Red, array![[0.5]]),
        ]);
        assert!(SpectralIndex::Ndvi.compute(&bands).is_err());
    }

    #[test]
    fn tasseled_cap_is_a_linear_combination() {
        let one = array![[1.0]];
        let bands = set(vec![
            (BandRole::Blue, one.clone()),
            (BandRole::Green, one.clone()),
            (BandRole::Red, one.clone()),
            (BandRole::Nir, one.clone()),
            (BandRole::Swir1, one.clone()),
            (BandRole::Swir2, one.clone()),
        ]);
        let out = SpectralIndex::TcBrightness.compute(&bands).unwrap();
        let expected: f64 = TC_BRIGHTNESS.iter().sum();
        assert!((out[[0, 0]] - expected).abs() < 1e-12);
    }

    #[test]
    fn evi_matches_reference_formula() {
        let bands = set(vec![
            (BandRole::Nir, array![[0.5]]),
            (BandRole::Red, array![[0.2]]),
            (BandRole::Blue, array![[0.1]]),
        ]);
        let out = SpectralIndex::Evi.compute(&bands).unwrap();
        let expected = 2.5 * (0.5 - 0.2) / (0.5 + 6.0 * 0.2 - 7.5 * 0.1 + 1.0);
        assert!((out[[0, 0]] - expected).abs() < 1e-12);
    }
}
