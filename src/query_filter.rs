//! Per-query traversal policy.
//!
//! A filter is built once per agent behavior and shared read-only across many
//! queries; the path engine never mutates it. Named presets are precomputed
//! singletons so hot callers can grab a shared instance instead of building
//! their own.

use once_cell::sync::Lazy;

use crate::tile::NavPoly;
use crate::{PolyFlags, AREA_COUNT, DEFAULT_AREA, UNWALKABLE_COST};

/// Traversal cost policy applied to every polygon a query touches.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryFilter {
    /// Cost multiplier per area type.
    area_cost: [f32; AREA_COUNT],
    /// Fixed cost added once when a path enters the area type.
    area_fixed_entry_cost: [f32; AREA_COUNT],
    /// Polygons carrying any of these flags are skipped outright.
    exclude_flags: PolyFlags,
    /// Scale on the straight-line heuristic; values below 1 search wider but
    /// stay optimal, values above 1 trade optimality for speed.
    heuristic_scale: f32,
    /// Upper bound on search nodes a single query may allocate.
    max_search_nodes: u32,
}

impl Default for QueryFilter {
    fn default() -> Self {
        QueryFilter {
            area_cost: [1.0; AREA_COUNT],
            area_fixed_entry_cost: [0.0; AREA_COUNT],
            exclude_flags: PolyFlags::empty(),
            heuristic_scale: 0.999,
            max_search_nodes: 2048,
        }
    }
}

impl QueryFilter {
    pub fn area_cost(&self, area: u8) -> f32 {
        self.area_cost[area as usize]
    }

    pub fn set_area_cost(&mut self, area: u8, cost: f32) {
        self.area_cost[area as usize] = cost;
    }

    pub fn fixed_area_entering_cost(&self, area: u8) -> f32 {
        self.area_fixed_entry_cost[area as usize]
    }

    pub fn set_fixed_area_entering_cost(&mut self, area: u8, cost: f32) {
        self.area_fixed_entry_cost[area as usize] = cost;
    }

    pub fn set_all_area_costs(&mut self, cost: f32) {
        self.area_cost = [cost; AREA_COUNT];
    }

    pub fn exclude_flags(&self) -> PolyFlags {
        self.exclude_flags
    }

    pub fn set_exclude_flags(&mut self, flags: PolyFlags) {
        self.exclude_flags = flags;
    }

    pub fn heuristic_scale(&self) -> f32 {
        self.heuristic_scale
    }

    pub fn set_heuristic_scale(&mut self, scale: f32) {
        debug_assert!(scale > 0.0);
        self.heuristic_scale = scale;
    }

    pub fn max_search_nodes(&self) -> u32 {
        self.max_search_nodes
    }

    pub fn set_max_search_nodes(&mut self, max: u32) {
        self.max_search_nodes = max;
    }

    /// Whether a polygon may be traversed at all under this filter.
    #[inline]
    pub fn passes(&self, poly: &NavPoly) -> bool {
        !poly.flags.intersects(self.exclude_flags)
            && self.area_cost[poly.area as usize] < UNWALKABLE_COST
    }

    /// Cost of moving `distance` units across `from_area`, entering
    /// `to_area` at the far end.
    #[inline]
    pub fn traversal_cost(&self, from_area: u8, to_area: u8, distance: f32) -> f32 {
        let mut cost = distance * self.area_cost[from_area as usize];
        if from_area != to_area {
            cost += self.area_fixed_entry_cost[to_area as usize];
        }
        cost
    }
}

/// Precomputed shared filter presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedFilter {
    /// Skip polygons marking traversal links; surface only.
    ExcludeLinks,
    /// Treat every non-default area as unwalkable.
    ExcludeCostedAreas,
    /// Both of the above.
    ExcludeLinksAndCostedAreas,
}

static EXCLUDE_LINKS: Lazy<QueryFilter> = Lazy::new(|| {
    let mut f = QueryFilter::default();
    f.set_exclude_flags(PolyFlags::NAV_LINK);
    f
});

static EXCLUDE_COSTED_AREAS: Lazy<QueryFilter> = Lazy::new(|| {
    let mut f = QueryFilter::default();
    f.set_all_area_costs(UNWALKABLE_COST);
    f.set_area_cost(DEFAULT_AREA, 1.0);
    f
});

static EXCLUDE_LINKS_AND_COSTED_AREAS: Lazy<QueryFilter> = Lazy::new(|| {
    let mut f = QueryFilter::default();
    f.set_exclude_flags(PolyFlags::NAV_LINK);
    f.set_all_area_costs(UNWALKABLE_COST);
    f.set_area_cost(DEFAULT_AREA, 1.0);
    f
});

impl NamedFilter {
    pub fn get(self) -> &'static QueryFilter {
        match self {
            NamedFilter::ExcludeLinks => &EXCLUDE_LINKS,
            NamedFilter::ExcludeCostedAreas => &EXCLUDE_COSTED_AREAS,
            NamedFilter::ExcludeLinksAndCostedAreas => &EXCLUDE_LINKS_AND_COSTED_AREAS,
        }
    }
}
