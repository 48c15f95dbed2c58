//! Match region resolution
//!
//! Regions are requested either by coordinates or by CSS selector. Selector
//! regions are located by the renderer in the same pass that produces the
//! screenshot; the renderer answers with one list of rectangles per selector
//! in request order.
//!
//! Two fixed groups exist. Ignore, layout, strict, content and accessibility
//! regions are used as reported. Floating regions of a selector capture are
//! translated by the location of the captured element.

use rendergrid_common::{
    AccessibilityRegion, AccessibilityRegionSpec, AccessibilityRegionType, CheckSettings, Error,
    FloatingMatchSettings, FloatingRegionSpec, Location, MatchLevel, Region, RegionTarget, Result,
    SizeMode,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Kinds of match region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRegionKind {
    Ignore,
    Layout,
    Strict,
    Content,
    Accessibility,
    Floating,
}

impl MatchRegionKind {
    /// Regions used exactly as reported, in selector order
    pub const NO_OFFSET: [MatchRegionKind; 5] = [
        MatchRegionKind::Ignore,
        MatchRegionKind::Layout,
        MatchRegionKind::Strict,
        MatchRegionKind::Content,
        MatchRegionKind::Accessibility,
    ];

    /// Regions translated by the image location, in selector order
    pub const OFFSET: [MatchRegionKind; 1] = [MatchRegionKind::Floating];

    pub fn applies_offset(&self) -> bool {
        matches!(self, MatchRegionKind::Floating)
    }
}

/// Match regions requested for one checkpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchRegionSpecs {
    pub ignore: Vec<RegionTarget>,
    pub layout: Vec<RegionTarget>,
    pub strict: Vec<RegionTarget>,
    pub content: Vec<RegionTarget>,
    pub accessibility: Vec<AccessibilityRegionSpec>,
    pub floating: Vec<FloatingRegionSpec>,
}

impl MatchRegionSpecs {
    pub fn targets(&self, kind: MatchRegionKind) -> Vec<&RegionTarget> {
        match kind {
            MatchRegionKind::Ignore => self.ignore.iter().collect(),
            MatchRegionKind::Layout => self.layout.iter().collect(),
            MatchRegionKind::Strict => self.strict.iter().collect(),
            MatchRegionKind::Content => self.content.iter().collect(),
            MatchRegionKind::Accessibility => self.accessibility.iter().map(|a| &a.target).collect(),
            MatchRegionKind::Floating => self.floating.iter().map(|f| &f.target).collect(),
        }
    }

    /// Selectors the renderer must locate, no-offset group first
    pub fn selectors(&self) -> Vec<String> {
        MatchRegionKind::NO_OFFSET
            .iter()
            .chain(MatchRegionKind::OFFSET.iter())
            .flat_map(|kind| self.targets(*kind))
            .filter_map(|t| t.as_selector().map(str::to_string))
            .collect()
    }

    /// Reject accessibility regions with unknown types
    pub fn validate_accessibility(&self) -> Result<()> {
        let invalid: Vec<String> = self
            .accessibility
            .iter()
            .filter(|a| a.accessibility_type.parse::<AccessibilityRegionType>().is_err())
            .map(|a| {
                format!(
                    "accessibility type '{}' is not one of [{}]",
                    a.accessibility_type,
                    AccessibilityRegionType::ALL.map(|t| t.as_str()).join(", ")
                )
            })
            .collect();

        if invalid.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidAccessibility(invalid.join("\n")))
        }
    }
}

/// Match regions in screenshot coordinates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedRegions {
    pub ignore: Vec<Region>,
    pub layout: Vec<Region>,
    pub strict: Vec<Region>,
    pub content: Vec<Region>,
    pub accessibility: Vec<AccessibilityRegion>,
    pub floating: Vec<FloatingMatchSettings>,
}

/// Options forwarded unchanged into the check settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOptions {
    pub use_dom: Option<bool>,
    pub enable_patterns: Option<bool>,
    pub ignore_displacements: Option<bool>,
}

impl ResolvedRegions {
    pub fn into_check_settings(
        self,
        render_id: impl Into<String>,
        match_level: MatchLevel,
        options: &CheckOptions,
    ) -> CheckSettings {
        CheckSettings {
            ignore: self.ignore,
            floating: self.floating,
            layout: self.layout,
            strict: self.strict,
            content: self.content,
            accessibility: self.accessibility,
            use_dom: options.use_dom,
            enable_patterns: options.enable_patterns,
            ignore_displacements: options.ignore_displacements,
            render_id: render_id.into(),
            match_level,
        }
    }
}

/// Region that floating regions are translated by
///
/// Only selector captures have one: the target selector's first match.
pub fn image_location_region(
    size_mode: SizeMode,
    selector_regions: &[Vec<Region>],
) -> Option<Region> {
    match size_mode {
        SizeMode::Selector => selector_regions.first().and_then(|r| r.first()).copied(),
        _ => None,
    }
}

/// Where the screenshot sits within the page, as reported to the comparison
///
/// Region captures report the requested rectangle but do not offset regions by it.
pub fn image_location(
    size_mode: SizeMode,
    selector_regions: &[Vec<Region>],
    region: Option<Region>,
) -> Option<Location> {
    match size_mode {
        SizeMode::Selector => {
            image_location_region(size_mode, selector_regions).map(|r| r.location())
        }
        SizeMode::Region => region.map(|r| r.location()),
        _ => None,
    }
}

/// Walks the renderer's per-selector answers in request order
struct SelectorCursor<'a> {
    selector_regions: &'a [Vec<Region>],
    next: usize,
}

impl<'a> SelectorCursor<'a> {
    fn resolve(&mut self, target: &RegionTarget) -> Vec<Region> {
        match target {
            RegionTarget::Rect(region) => vec![*region],
            RegionTarget::Selector { selector } => {
                let found = self.selector_regions.get(self.next).cloned();
                self.next += 1;
                found.unwrap_or_else(|| {
                    warn!("Renderer reported no regions for selector {}", selector);
                    Vec::new()
                })
            }
        }
    }
}

/// Resolve every requested region against the renderer's selector answers
pub fn calculate_match_regions(
    specs: &MatchRegionSpecs,
    size_mode: SizeMode,
    selector_regions: &[Vec<Region>],
    offset_region: Option<Region>,
) -> Result<ResolvedRegions> {
    let mut cursor = SelectorCursor {
        selector_regions,
        // The capture's own selector comes first
        next: usize::from(size_mode == SizeMode::Selector),
    };
    let offset = offset_region
        .map(|r| r.location())
        .unwrap_or_else(|| Location::new(0, 0));

    let mut resolved = ResolvedRegions::default();

    for kind in MatchRegionKind::NO_OFFSET {
        match kind {
            MatchRegionKind::Accessibility => {
                for spec in &specs.accessibility {
                    let accessibility_type = spec
                        .accessibility_type
                        .parse::<AccessibilityRegionType>()
                        .map_err(Error::InvalidAccessibility)?;
                    resolved.accessibility.extend(cursor.resolve(&spec.target).into_iter().map(
                        |region| AccessibilityRegion {
                            region,
                            accessibility_type,
                        },
                    ));
                }
            }
            _ => {
                let regions: Vec<Region> = specs
                    .targets(kind)
                    .into_iter()
                    .flat_map(|t| cursor.resolve(t))
                    .collect();
                match kind {
                    MatchRegionKind::Ignore => resolved.ignore = regions,
                    MatchRegionKind::Layout => resolved.layout = regions,
                    MatchRegionKind::Strict => resolved.strict = regions,
                    _ => resolved.content = regions,
                }
            }
        }
    }

    for kind in MatchRegionKind::OFFSET {
        debug_assert!(kind.applies_offset());
        for spec in &specs.floating {
            resolved.floating.extend(cursor.resolve(&spec.target).into_iter().map(|region| {
                FloatingMatchSettings {
                    region: region.offset(offset),
                    max_up_offset: spec.max_up_offset,
                    max_down_offset: spec.max_down_offset,
                    max_left_offset: spec.max_left_offset,
                    max_right_offset: spec.max_right_offset,
                }
            }));
        }
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floating(target: RegionTarget) -> FloatingRegionSpec {
        FloatingRegionSpec {
            target,
            max_up_offset: 3,
            max_down_offset: 4,
            max_left_offset: 5,
            max_right_offset: 6,
        }
    }

    #[test]
    fn test_selectors_follow_group_order() {
        let specs = MatchRegionSpecs {
            floating: vec![floating(RegionTarget::selector(".float"))],
            ignore: vec![
                RegionTarget::selector(".ad"),
                RegionTarget::Rect(Region::new(0, 0, 1, 1)),
            ],
            accessibility: vec![AccessibilityRegionSpec {
                target: RegionTarget::selector(".title"),
                accessibility_type: "LargeText".into(),
            }],
            content: vec![RegionTarget::selector(".body")],
            ..Default::default()
        };
        assert_eq!(specs.selectors(), vec![".ad", ".body", ".title", ".float"]);
    }

    #[test]
    fn test_no_offset_pass_through_and_floating_offset() {
        let specs = MatchRegionSpecs {
            ignore: vec![RegionTarget::Rect(Region::new(0, 0, 50, 50))],
            strict: vec![RegionTarget::selector(".price")],
            floating: vec![floating(RegionTarget::Rect(Region::new(0, 0, 50, 50)))],
            ..Default::default()
        };
        let selector_regions = vec![
            vec![Region::new(10, 20, 300, 200)],
            vec![Region::new(5, 6, 7, 8)],
        ];
        let image = image_location_region(SizeMode::Selector, &selector_regions);

        let resolved =
            calculate_match_regions(&specs, SizeMode::Selector, &selector_regions, image).unwrap();

        assert_eq!(resolved.ignore, vec![Region::new(0, 0, 50, 50)]);
        assert_eq!(resolved.strict, vec![Region::new(5, 6, 7, 8)]);
        assert_eq!(resolved.floating.len(), 1);
        assert_eq!(resolved.floating[0].region, Region::new(10, 20, 50, 50));
        assert_eq!(resolved.floating[0].max_right_offset, 6);
    }

    #[test]
    fn test_region_capture_reports_location_without_offsetting() {
        let specs = MatchRegionSpecs {
            floating: vec![floating(RegionTarget::Rect(Region::new(0, 0, 50, 50)))],
            ..Default::default()
        };
        let rect = Some(Region::new(10, 20, 300, 200));

        assert_eq!(image_location_region(SizeMode::Region, &[]), None);
        assert_eq!(
            image_location(SizeMode::Region, &[], rect),
            Some(Location::new(10, 20))
        );

        let resolved = calculate_match_regions(&specs, SizeMode::Region, &[], None).unwrap();
        assert_eq!(resolved.floating[0].region, Region::new(0, 0, 50, 50));
    }

    #[test]
    fn test_selector_capture_skips_own_selector() {
        let specs = MatchRegionSpecs {
            layout: vec![RegionTarget::selector(".menu")],
            floating: vec![floating(RegionTarget::selector(".badge"))],
            ..Default::default()
        };
        let selector_regions = vec![
            vec![Region::new(100, 200, 400, 300)],
            vec![Region::new(1, 1, 10, 10), Region::new(2, 2, 20, 20)],
            vec![Region::new(0, 0, 5, 5)],
        ];
        let image = image_location_region(SizeMode::Selector, &selector_regions);
        assert_eq!(image, Some(Region::new(100, 200, 400, 300)));
        assert_eq!(
            image_location(SizeMode::Selector, &selector_regions, None),
            Some(Location::new(100, 200))
        );

        let resolved =
            calculate_match_regions(&specs, SizeMode::Selector, &selector_regions, image).unwrap();
        assert_eq!(resolved.layout.len(), 2);
        assert_eq!(resolved.floating[0].region, Region::new(100, 200, 5, 5));
    }

    #[test]
    fn test_without_image_location_no_offset_applied() {
        let specs = MatchRegionSpecs {
            floating: vec![floating(RegionTarget::Rect(Region::new(7, 8, 9, 10)))],
            ..Default::default()
        };
        let image = image_location_region(SizeMode::FullPage, &[]);
        assert_eq!(image, None);
        assert_eq!(
            image_location(SizeMode::FullPage, &[], Some(Region::new(1, 1, 1, 1))),
            None
        );

        let resolved = calculate_match_regions(&specs, SizeMode::FullPage, &[], image).unwrap();
        assert_eq!(resolved.floating[0].region, Region::new(7, 8, 9, 10));
    }

    #[test]
    fn test_accessibility_validation() {
        let specs = MatchRegionSpecs {
            accessibility: vec![
                AccessibilityRegionSpec {
                    target: RegionTarget::Rect(Region::new(0, 0, 1, 1)),
                    accessibility_type: "RegularText".into(),
                },
                AccessibilityRegionSpec {
                    target: RegionTarget::Rect(Region::new(0, 0, 1, 1)),
                    accessibility_type: "Shiny".into(),
                },
            ],
            ..Default::default()
        };
        let err = specs.validate_accessibility().unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("Shiny"));
    }

    #[test]
    fn test_check_settings_assembly() {
        let resolved = ResolvedRegions {
            ignore: vec![Region::new(1, 2, 3, 4)],
            ..Default::default()
        };
        let options = CheckOptions {
            use_dom: Some(true),
            ..Default::default()
        };
        let settings = resolved.into_check_settings("render-9", MatchLevel::Layout, &options);
        assert_eq!(settings.render_id, "render-9");
        assert_eq!(settings.match_level, MatchLevel::Layout);
        assert_eq!(settings.use_dom, Some(true));
        assert_eq!(settings.ignore.len(), 1);
    }
}
