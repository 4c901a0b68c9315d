mod dissolve;
mod proj;

use std::collections::HashMap;
use std::sync::Arc;

use geo::{Area, BoundingRect, Centroid, Coord, MultiPolygon, Point, Rect};
use rstar::{AABB, RTree, RTreeObject};

#[derive(Debug, Clone)]
pub(crate) struct BoundingBox {
    pub(crate) idx: usize, // Index of corresponding zone in the set
    bbox: Rect<f64>,
}

impl RTreeObject for BoundingBox {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.bbox.min().into(), self.bbox.max().into())
    }
}

/// A zone of a planar partition: a string id, an optional display name,
/// and a simple polygon (or multipolygon) in the shared metric CRS.
#[derive(Debug, Clone)]
pub struct Zone {
    pub id: String,
    pub name: Option<Arc<str>>, // Common name, e.g. the neighborhood name
    pub shape: MultiPolygon<f64>,
}

impl Zone {
    pub fn new(id: impl Into<String>, shape: MultiPolygon<f64>) -> Self {
        Self { id: id.into(), name: None, shape }
    }

    pub fn named(id: impl Into<String>, name: impl Into<Arc<str>>, shape: MultiPolygon<f64>) -> Self {
        Self { id: id.into(), name: Some(name.into()), shape }
    }
}

/// One labeled polygon collection (postal codes, survey quadrants, census
/// sections, neighborhoods), keyed by zone id, with per-zone area and
/// centroid cached at construction.
///
/// Zones within a set are assumed non-overlapping; this is not verified.
/// Duplicate ids replace the earlier entry, so callers must guarantee
/// uniqueness upstream if both copies matter.
#[derive(Debug, Clone)]
pub struct ZoneSet {
    zones: Vec<Zone>,
    index: HashMap<String, usize>, // Map between zone ids and contiguous indices
    areas: Vec<f64>,
    centroids: Vec<Option<Point<f64>>>, // None for degenerate/empty shapes
    rtree: RTree<BoundingBox>,
}

impl ZoneSet {
    /// Construct a set from zones, last entry winning on duplicate ids.
    pub fn from_zones(zones: impl IntoIterator<Item = Zone>) -> Self {
        let mut ordered: Vec<Zone> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for zone in zones {
            match index.get(&zone.id) {
                Some(&at) => ordered[at] = zone,
                None => {
                    index.insert(zone.id.clone(), ordered.len());
                    ordered.push(zone);
                }
            }
        }
        Self::assemble(ordered, index)
    }

    /// Construct a set from bare (id, shape) pairs.
    pub fn from_shapes<I, S>(shapes: I) -> Self
    where
        I: IntoIterator<Item = (S, MultiPolygon<f64>)>,
        S: Into<String>,
    {
        Self::from_zones(shapes.into_iter().map(|(id, shape)| Zone::new(id, shape)))
    }

    /// Construct a set of axis-aligned rectangular zones (survey quadrants
    /// are published as coordinate bounds rather than polygon outlines).
    pub fn from_rects<I, S>(rects: I) -> Self
    where
        I: IntoIterator<Item = (S, Rect<f64>)>,
        S: Into<String>,
    {
        Self::from_zones(rects.into_iter().map(|(id, rect)| {
            Zone::new(id, MultiPolygon(vec![rect.to_polygon()]))
        }))
    }

    fn assemble(zones: Vec<Zone>, index: HashMap<String, usize>) -> Self {
        let areas = zones.iter().map(|zone| zone.shape.unsigned_area()).collect();
        let centroids = zones.iter().map(|zone| zone.shape.centroid()).collect();
        // Shapes without a bounding rect (empty multipolygons) stay out of the
        // tree; they cannot intersect anything.
        let rtree = RTree::bulk_load(
            zones.iter().enumerate()
                .filter_map(|(idx, zone)| {
                    zone.shape.bounding_rect().map(|bbox| BoundingBox { idx, bbox })
                })
                .collect(),
        );
        Self { zones, index, areas, centroids, rtree }
    }

    /// Number of zones in the set.
    #[inline] pub fn len(&self) -> usize { self.zones.len() }

    /// Check if the set has no zones.
    #[inline] pub fn is_empty(&self) -> bool { self.zones.is_empty() }

    /// Position of a zone id within the set.
    #[inline] pub fn position(&self, id: &str) -> Option<usize> { self.index.get(id).copied() }

    /// Look up a zone by id.
    #[inline]
    pub fn get(&self, id: &str) -> Option<&Zone> {
        self.position(id).map(|at| &self.zones[at])
    }

    /// Zone at a given position.
    #[inline] pub fn zone(&self, at: usize) -> &Zone { &self.zones[at] }

    /// Zone id at a given position.
    #[inline] pub fn id(&self, at: usize) -> &str { &self.zones[at].id }

    /// Shape at a given position.
    #[inline] pub fn shape(&self, at: usize) -> &MultiPolygon<f64> { &self.zones[at].shape }

    /// Cached unsigned area at a given position.
    #[inline] pub fn area(&self, at: usize) -> f64 { self.areas[at] }

    /// Cached area by zone id.
    #[inline]
    pub fn area_of(&self, id: &str) -> Option<f64> {
        self.position(id).map(|at| self.areas[at])
    }

    /// Cached centroid at a given position (None for degenerate shapes).
    #[inline] pub fn centroid(&self, at: usize) -> Option<Point<f64>> { self.centroids[at] }

    /// Display name by zone id, when one was loaded.
    pub fn name_of(&self, id: &str) -> Option<&str> {
        self.get(id).and_then(|zone| zone.name.as_deref())
    }

    /// Iterate zones in set order.
    #[inline] pub fn iter(&self) -> impl Iterator<Item = &Zone> { self.zones.iter() }

    /// Iterate zone ids in set order.
    #[inline] pub fn ids(&self) -> impl Iterator<Item = &str> { self.zones.iter().map(|zone| zone.id.as_str()) }

    /// Query the R-tree for zones whose bounding boxes intersect the envelope.
    #[inline]
    pub(crate) fn query(&self, envelope: &AABB<[f64; 2]>) -> impl Iterator<Item = usize> {
        self.rtree.locate_in_envelope_intersecting(envelope).map(|bb| bb.idx)
    }

    /// Compute the bounding rectangle of the whole set.
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.zones.iter()
            .filter_map(|zone| zone.shape.bounding_rect())
            .reduce(|a, b| Rect::new(
                Coord {
                    x: a.min().x.min(b.min().x),
                    y: a.min().y.min(b.min().y),
                },
                Coord {
                    x: a.max().x.max(b.max().x),
                    y: a.max().y.max(b.max().y),
                },
            ))
    }
}
