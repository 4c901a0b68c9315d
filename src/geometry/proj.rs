use anyhow::{Context, Result, anyhow};
use geo::{Coord, MapCoords};
use proj4rs::{proj::Proj as Proj4, transform::transform};

use super::{Zone, ZoneSet};

/// The one projected CRS all areal computation runs in: UTM zone 30N in
/// meters (the ETRS89 / UTM 30N grid the source datasets are published in).
/// Area values are only comparable within this projection.
const METRIC_CRS: &str = "+proj=utm +zone=30 +datum=WGS84 +units=m +no_defs +type=crs";

const GEOGRAPHIC_CRS: &str = "+proj=longlat +datum=WGS84 +no_defs +type=crs";

impl ZoneSet {
    /// Build a set from zones whose shapes are WGS84 lon/lat degrees,
    /// projecting them into the fixed metric CRS first.
    pub fn from_lonlat(zones: impl IntoIterator<Item = Zone>) -> Result<Self> {
        let from = Proj4::from_proj_string(GEOGRAPHIC_CRS)
            .with_context(|| anyhow!("failed to build source PROJ.4: {GEOGRAPHIC_CRS}"))?;
        let to = Proj4::from_proj_string(METRIC_CRS)
            .with_context(|| anyhow!("failed to build target PROJ.4: {METRIC_CRS}"))?;

        // Map coords → radians in, meters out.
        let projected = zones.into_iter()
            .map(|zone| Zone {
                shape: zone.shape.map_coords(|coord: Coord<f64>| {
                    let mut point = (coord.x.to_radians(), coord.y.to_radians(), 0.0);
                    transform(&from, &to, &mut point)
                        .expect("CRS transform failed");
                    Coord { x: point.0, y: point.1 }
                }),
                ..zone
            })
            .collect::<Vec<_>>();

        Ok(Self::from_zones(projected))
    }
}

#[cfg(test)]
mod tests {
    use geo::{Coord, LineString, MultiPolygon, Polygon};

    use super::super::{Zone, ZoneSet};

    #[test]
    fn lonlat_zones_come_out_in_meters() {
        // Roughly 0.01° x 0.01° near Valencia (~39.47N, 0.38W).
        let shape = MultiPolygon(vec![Polygon::new(
            LineString(vec![
                Coord { x: -0.38, y: 39.47 },
                Coord { x: -0.37, y: 39.47 },
                Coord { x: -0.37, y: 39.48 },
                Coord { x: -0.38, y: 39.48 },
                Coord { x: -0.38, y: 39.47 },
            ]),
            vec![],
        )]);
        let set = ZoneSet::from_lonlat([Zone::new("z", shape)]).unwrap();

        // ~860m x ~1110m at this latitude; anything in the right order of
        // magnitude proves degrees were converted to meters.
        let area = set.area_of("z").unwrap();
        assert!(area > 5e5 && area < 2e6, "unexpected area {area}");
    }
}
