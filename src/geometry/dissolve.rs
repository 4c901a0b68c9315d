use std::collections::BTreeMap;

use geo::{BooleanOps, MultiPolygon};

use super::{Zone, ZoneSet};

impl ZoneSet {
    /// Merge zones into coarser zones keyed by the id prefix before
    /// `separator`. Neighborhoods with ids `"<district>.<neighborhood>"`
    /// dissolve into one zone per district.
    ///
    /// Cost depends on polygon complexity of each group; output order is
    /// lexicographic by prefix.
    pub fn dissolve_by_prefix(&self, separator: char) -> ZoneSet {
        let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (at, zone) in self.iter().enumerate() {
            let prefix = zone.id.split(separator).next().unwrap_or(zone.id.as_str());
            groups.entry(prefix).or_default().push(at);
        }

        ZoneSet::from_zones(groups.into_iter().map(|(prefix, members)| {
            let shape = members.iter()
                .map(|&at| self.shape(at).clone())
                .reduce(|a, b| a.union(&b))
                .unwrap_or_else(|| MultiPolygon(vec![]));
            Zone::new(prefix, shape)
        }))
    }
}

#[cfg(test)]
mod tests {
    use geo::{Coord, LineString, MultiPolygon, Polygon};

    use super::super::ZoneSet;

    fn square(x0: f64, y0: f64, side: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![Polygon::new(
            LineString(vec![
                Coord { x: x0, y: y0 },
                Coord { x: x0 + side, y: y0 },
                Coord { x: x0 + side, y: y0 + side },
                Coord { x: x0, y: y0 + side },
                Coord { x: x0, y: y0 },
            ]),
            vec![],
        )])
    }

    #[test]
    fn dissolve_merges_by_district_prefix() {
        let set = ZoneSet::from_shapes([
            ("1.1", square(0.0, 0.0, 1.0)),
            ("1.2", square(1.0, 0.0, 1.0)),
            ("2.1", square(5.0, 0.0, 1.0)),
        ]);
        let districts = set.dissolve_by_prefix('.');
        assert_eq!(districts.len(), 2);
        assert!((districts.area_of("1").unwrap() - 2.0).abs() < 1e-9);
        assert!((districts.area_of("2").unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn dissolve_without_separator_keeps_ids() {
        let set = ZoneSet::from_shapes([("a", square(0.0, 0.0, 1.0))]);
        let out = set.dissolve_by_prefix('.');
        assert_eq!(out.len(), 1);
        assert!(out.get("a").is_some());
    }
}
