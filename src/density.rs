//! Volume-weighted average density of the unit cell.

use std::collections::BTreeMap;

use log::info;
use serde::{Deserialize, Serialize};

use crate::config::MaterialsConfig;
use crate::error::{PhononicError, PhononicResult};
use crate::types::VOLUME_REL_TOL;

/// Where the density of a region comes from: `(material, property)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DensitySource {
    pub material: String,
    pub property: String,
}

impl DensitySource {
    pub fn new(material: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            material: material.into(),
            property: property.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensityVolumeInfo {
    pub average_density: f64,
    pub total_volume: f64,
    pub volumes: BTreeMap<String, f64>,
    pub densities: BTreeMap<String, f64>,
}

impl DensityVolumeInfo {
    /// Look up region densities and average them by volume.
    ///
    /// `region_volumes` holds the measured volume of each region and
    /// `cell_volume` the independently computed volume of the whole cell;
    /// the regions must tile the cell to within [`VOLUME_REL_TOL`].
    pub fn compute(
        region_to_material: &BTreeMap<String, DensitySource>,
        region_volumes: &BTreeMap<String, f64>,
        materials: &MaterialsConfig,
        cell_volume: f64,
    ) -> PhononicResult<Self> {
        if !(cell_volume > 0.0) {
            return Err(PhononicError::Config(format!(
                "cell volume must be positive, got {cell_volume}"
            )));
        }

        let mut weighted_density = 0.0;
        let mut total_volume = 0.0;
        let mut volumes = BTreeMap::new();
        let mut densities = BTreeMap::new();

        for (region, source) in region_to_material {
            let vol = *region_volumes.get(region).ok_or_else(|| {
                PhononicError::Config(format!("no volume given for region `{region}`"))
            })?;
            let density = materials
                .get(&source.material, &source.property)
                .ok_or_else(|| PhononicError::MissingMaterial {
                    region: region.clone(),
                    material: source.material.clone(),
                    property: source.property.clone(),
                })?;

            info!("[density] region {region}: volume {vol}, density {density}");

            volumes.insert(region.clone(), vol);
            densities.insert(region.clone(), density);
            weighted_density += vol * density;
            total_volume += vol;
        }

        if !((total_volume - cell_volume).abs() / cell_volume < VOLUME_REL_TOL) {
            return Err(PhononicError::VolumeMismatch {
                computed: total_volume,
                expected: cell_volume,
            });
        }
        info!("[density] total volume: {cell_volume}");

        Ok(Self {
            average_density: weighted_density / cell_volume,
            total_volume,
            volumes,
            densities,
        })
    }
}
