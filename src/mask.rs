//! Element exclusion rules applied while rasterizing a tile

use crate::surface::{CssPosition, ElementInfo};

/// Which elements are kept out of captures, and how masked fixed elements
/// are tagged so the tag can be removed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskPolicy {
    /// Elements whose id starts with this prefix belong to the feedback UI
    pub overlay_id_prefix: String,
    /// Root element of the feedback UI, hidden for the duration of a capture
    pub overlay_id: String,
    /// Elements carrying this attribute are never captured
    pub ignore_attribute: String,
    /// Attribute set on fixed/sticky elements skipped during a full-page capture
    pub fixed_marker: String,
}

impl Default for MaskPolicy {
    fn default() -> Self {
        Self {
            overlay_id_prefix: "wpvfh-".to_string(),
            overlay_id: "wpvfh-container".to_string(),
            ignore_attribute: "data-blazing-ignore".to_string(),
            fixed_marker: "data-blazing-was-fixed".to_string(),
        }
    }
}

/// Outcome of the exclusion predicate for one element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    Keep,
    Skip,
    /// Skip, and tag the element with the policy's fixed marker
    /// (value: the element's computed position).
    SkipFixed(CssPosition),
}

impl Exclusion {
    pub fn is_skipped(&self) -> bool {
        !matches!(self, Exclusion::Keep)
    }
}

/// The exclusion predicate handed to [`CaptureSurface::capture`](crate::CaptureSurface::capture).
#[derive(Debug, Clone, Copy)]
pub struct CaptureFilter<'a> {
    policy: &'a MaskPolicy,
    mask_fixed: bool,
}

impl<'a> CaptureFilter<'a> {
    /// Filter for single captures: feedback UI and ignored elements only.
    pub fn viewport(policy: &'a MaskPolicy) -> Self {
        Self { policy, mask_fixed: false }
    }

    /// Filter for stitched tiles: additionally masks fixed and sticky elements.
    pub fn full_page(policy: &'a MaskPolicy) -> Self {
        Self { policy, mask_fixed: true }
    }

    /// Attribute name a surface must set when it sees [`Exclusion::SkipFixed`].
    pub fn marker_attribute(&self) -> &'a str {
        &self.policy.fixed_marker
    }

    pub fn decide(&self, element: &ElementInfo) -> Exclusion {
        if element
            .id
            .as_deref()
            .is_some_and(|id| id.starts_with(&self.policy.overlay_id_prefix))
        {
            return Exclusion::Skip;
        }
        if element.has_attribute(&self.policy.ignore_attribute) {
            return Exclusion::Skip;
        }
        if self.mask_fixed && element.position.is_viewport_anchored() {
            return Exclusion::SkipFixed(element.position);
        }
        Exclusion::Keep
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(id: Option<&str>, position: CssPosition) -> ElementInfo {
        ElementInfo {
            id: id.map(str::to_string),
            attributes: Default::default(),
            position,
        }
    }

    #[test]
    fn feedback_ui_is_always_skipped() {
        let policy = MaskPolicy::default();
        let el = element(Some("wpvfh-pin-3"), CssPosition::Absolute);
        assert_eq!(CaptureFilter::viewport(&policy).decide(&el), Exclusion::Skip);
        assert_eq!(CaptureFilter::full_page(&policy).decide(&el), Exclusion::Skip);
    }

    #[test]
    fn ignore_attribute_skips() {
        let policy = MaskPolicy::default();
        let mut el = element(Some("banner"), CssPosition::Static);
        el.attributes.insert("data-blazing-ignore".into(), String::new());
        assert!(CaptureFilter::viewport(&policy).decide(&el).is_skipped());
    }

    #[test]
    fn fixed_and_sticky_are_masked_only_for_full_page() {
        let policy = MaskPolicy::default();
        let header = element(Some("site-header"), CssPosition::Fixed);
        let nav = element(None, CssPosition::Sticky);
        let full = CaptureFilter::full_page(&policy);
        assert_eq!(full.decide(&header), Exclusion::SkipFixed(CssPosition::Fixed));
        assert_eq!(full.decide(&nav), Exclusion::SkipFixed(CssPosition::Sticky));
        assert_eq!(full.marker_attribute(), "data-blazing-was-fixed");

        let single = CaptureFilter::viewport(&policy);
        assert_eq!(single.decide(&header), Exclusion::Keep);
        assert_eq!(single.decide(&element(None, CssPosition::Relative)), Exclusion::Keep);
    }
}
