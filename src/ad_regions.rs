//! Interactive sub-region registry
//!
//! The hosted page reports the rectangles of its interactive regions (ad
//! iframes) through the message bridge; the input interceptor consults them
//! on every button-release. The set is fully replaced on each update, never
//! merged. Reads come from the low-level hook context while writes come from
//! the bridge path on the UI thread, so the registry always sits behind a
//! `Mutex` (held briefly on both paths).

use serde::Deserialize;

/// A rectangular, content-reported region that opens its target address
/// natively on click instead of being handled inside the hosted content.
/// Coordinates are desktop (screen) pixels.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AdRegion {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub src: String,
    #[serde(default, alias = "clickUrl", alias = "click_url")]
    pub click_url: String,
    #[serde(default)]
    pub left: i32,
    #[serde(default)]
    pub top: i32,
    #[serde(default)]
    pub width: i32,
    #[serde(default)]
    pub height: i32,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

impl AdRegion {
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left
            && x < self.left + self.width
            && y >= self.top
            && y < self.top + self.height
    }

    fn area(&self) -> i64 {
        self.width.max(0) as i64 * self.height.max(0) as i64
    }
}

/// Set of currently known interactive regions.
#[derive(Debug, Default)]
pub struct AdRegionRegistry {
    regions: Vec<AdRegion>,
}

impl AdRegionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole set with the latest report from the hosted content.
    pub fn replace_all(&mut self, regions: Vec<AdRegion>) {
        self.regions = regions;
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Find the visible region under a desktop point. Overlapping regions are
    /// resolved deterministically: the smallest area wins, so a nested ad
    /// inside a larger reported frame takes precedence over its container.
    pub fn hit_test(&self, x: i32, y: i32) -> Option<&AdRegion> {
        self.regions
            .iter()
            .filter(|r| r.visible && r.contains(x, y))
            .min_by_key(|r| r.area())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(id: &str, left: i32, top: i32, width: i32, height: i32) -> AdRegion {
        AdRegion {
            id: id.to_string(),
            src: String::new(),
            click_url: format!("http://ad/{id}"),
            left,
            top,
            width,
            height,
            visible: true,
        }
    }

    #[test]
    fn test_hit_and_miss() {
        let mut registry = AdRegionRegistry::new();
        registry.replace_all(vec![region("a", 0, 0, 100, 100)]);

        assert_eq!(registry.hit_test(50, 50).map(|r| r.id.as_str()), Some("a"));
        assert!(registry.hit_test(150, 150).is_none());
        // Edges: left/top inclusive, right/bottom exclusive.
        assert!(registry.hit_test(0, 0).is_some());
        assert!(registry.hit_test(100, 100).is_none());
    }

    #[test]
    fn test_invisible_regions_ignored() {
        let mut registry = AdRegionRegistry::new();
        let mut hidden = region("hidden", 0, 0, 100, 100);
        hidden.visible = false;
        registry.replace_all(vec![hidden]);

        assert!(registry.hit_test(50, 50).is_none());
    }

    #[test]
    fn test_overlap_smallest_area_wins() {
        let mut registry = AdRegionRegistry::new();
        registry.replace_all(vec![
            region("outer", 0, 0, 200, 200),
            region("inner", 40, 40, 60, 60),
        ]);

        assert_eq!(
            registry.hit_test(50, 50).map(|r| r.id.as_str()),
            Some("inner")
        );
        assert_eq!(
            registry.hit_test(150, 150).map(|r| r.id.as_str()),
            Some("outer")
        );
    }

    #[test]
    fn test_replace_is_full_not_merge() {
        let mut registry = AdRegionRegistry::new();
        registry.replace_all(vec![region("a", 0, 0, 10, 10)]);
        registry.replace_all(vec![region("b", 20, 20, 10, 10)]);

        assert_eq!(registry.len(), 1);
        assert!(registry.hit_test(5, 5).is_none());
        assert_eq!(registry.hit_test(25, 25).map(|r| r.id.as_str()), Some("b"));
    }

    #[test]
    fn test_region_deserializes_with_defaults() {
        let r: AdRegion =
            serde_json::from_str(r#"{"id":"x","clickUrl":"http://ad","left":1,"top":2,"width":3,"height":4}"#)
                .unwrap();
        assert_eq!(r.click_url, "http://ad");
        assert!(r.visible);
        assert!(r.src.is_empty());
    }
}
