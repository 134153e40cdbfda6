//! R-tree over polygon envelopes for candidate lookups.

use geo::{BoundingRect, Rect};
use rstar::{RTree, RTreeObject, AABB};
use tracing::debug;

/// R-tree entry pointing back at a geometry by position in its collection.
#[derive(Debug, Clone)]
pub struct IndexedEnvelope {
    pub index: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Envelope index over a slice of polygonal geometries.
///
/// Lookups return candidate positions only; callers apply the exact predicate.
pub struct EnvelopeIndex {
    tree: RTree<IndexedEnvelope>,
}

impl EnvelopeIndex {
    pub fn build<'a, G, I>(geometries: I) -> Self
    where
        G: BoundingRect<f64, Output = Option<Rect<f64>>> + 'a,
        I: IntoIterator<Item = &'a G>,
    {
        let entries: Vec<IndexedEnvelope> = geometries
            .into_iter()
            .enumerate()
            .filter_map(|(index, geometry)| {
                let rect = geometry.bounding_rect()?;
                Some(IndexedEnvelope {
                    index,
                    envelope: envelope_of(rect),
                })
            })
            .collect();

        let tree = RTree::bulk_load(entries);
        debug!("Envelope index built with {} entries", tree.size());
        Self { tree }
    }

    /// Positions whose envelope contains the point, in collection order.
    pub fn candidates_at(&self, x: f64, y: f64) -> Vec<usize> {
        self.collect_sorted(&AABB::from_point([x, y]))
    }

    /// Positions whose envelope intersects `rect`, in collection order.
    pub fn candidates_in(&self, rect: Rect<f64>) -> Vec<usize> {
        self.collect_sorted(&envelope_of(rect))
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    fn collect_sorted(&self, query: &AABB<[f64; 2]>) -> Vec<usize> {
        let mut hits: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(query)
            .map(|entry| entry.index)
            .collect();
        hits.sort_unstable();
        hits
    }
}

fn envelope_of(rect: Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}
