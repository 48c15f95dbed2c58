//! Render request construction
//!
//! Pure functions from a resolved snapshot and one browser configuration to
//! the request submitted to the renderer.

use rendergrid_common::{
    BrowserConfig, EmulationInfo, Error, Region, RenderEndpoints, RenderInfo, RenderRequest,
    Resource, Result, SizeMode, Target,
};
use std::collections::BTreeMap;

use crate::regions::MatchRegionSpecs;

/// Pick the renderer's size mode for a checkpoint
///
/// | target | fully | selector | region | size mode |
/// |--------|-------|----------|--------|-----------|
/// | window | true  |          |        | full-page |
/// | window | false |          |        | viewport  |
/// | region |       | set      |        | selector  |
/// | region |       | unset    | set    | region    |
pub fn size_mode(
    target: Target,
    fully: bool,
    selector: Option<&str>,
    region: Option<&Region>,
) -> SizeMode {
    match target {
        Target::Window if fully => SizeMode::FullPage,
        Target::Window => SizeMode::Viewport,
        Target::Region if selector.is_some() => SizeMode::Selector,
        Target::Region if region.is_some() => SizeMode::Region,
        Target::Region => SizeMode::FullPage,
    }
}

/// Chrome emulation for a browser entry
///
/// A named device wins over explicit metrics; plain desktop sizes need no
/// emulation at all.
pub fn emulation_info(browser: &BrowserConfig) -> Option<EmulationInfo> {
    if let Some(device_name) = &browser.device_name {
        return Some(EmulationInfo::Device {
            device_name: device_name.clone(),
            screen_orientation: browser.screen_orientation,
        });
    }

    if browser.device_scale_factor.is_none() && browser.mobile.is_none() {
        return None;
    }

    Some(EmulationInfo::Explicit {
        device_scale_factor: browser.device_scale_factor,
        mobile: browser.mobile,
        screen_orientation: browser.screen_orientation,
        width: browser.width,
        height: browser.height,
    })
}

/// Selectors whose bounding boxes the renderer must report back
///
/// The capture selector comes first for selector captures, followed by every
/// match-region selector.
pub fn selectors_to_find_regions_for(
    size_mode: SizeMode,
    selector: Option<&str>,
    regions: &MatchRegionSpecs,
) -> Vec<String> {
    let mut selectors = Vec::new();
    if size_mode == SizeMode::Selector {
        if let Some(selector) = selector {
            selectors.push(selector.to_string());
        }
    }
    selectors.extend(regions.selectors());
    selectors
}

/// Checkpoint-level parameters shared by every browser's request
#[derive(Debug, Clone)]
pub struct RenderRequestBuilder {
    pub url: String,
    pub endpoints: RenderEndpoints,
    pub size_mode: SizeMode,
    pub selector: Option<String>,
    pub region: Option<Region>,
    pub script_hooks: Option<serde_json::Value>,
    pub selectors_to_find_regions_for: Vec<String>,
    pub send_dom: bool,
    pub options: Option<serde_json::Value>,
}

impl RenderRequestBuilder {
    /// Build the request for one browser
    pub fn build(
        &self,
        dom: &Resource,
        resources: &BTreeMap<String, Resource>,
        browser: &BrowserConfig,
    ) -> Result<RenderRequest> {
        if dom.hash().is_none() {
            return Err(Error::RenderRequest(format!(
                "DOM for {} has no content",
                self.url
            )));
        }

        Ok(RenderRequest {
            webhook: self.endpoints.results_url.clone(),
            stitching_service: self.endpoints.stitching_service_url.clone(),
            url: self.url.clone(),
            dom: dom.descriptor(),
            resources: resources
                .iter()
                .map(|(url, r)| (url.clone(), r.descriptor()))
                .collect(),
            render_info: RenderInfo {
                width: browser.width,
                height: browser.height,
                size_mode: self.size_mode,
                selector: self.selector.clone(),
                region: self.region,
                emulation_info: emulation_info(browser),
                ios_device_info: browser.ios_device_info.clone(),
            },
            browser_name: browser.name.clone(),
            platform: browser.platform.clone(),
            script_hooks: self.script_hooks.clone(),
            selectors_to_find_regions_for: self.selectors_to_find_regions_for.clone(),
            send_dom: self.send_dom,
            options: self.options.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rendergrid_common::{RegionTarget, ScreenOrientation};

    #[test]
    fn test_size_mode_table() {
        let rect = Region::new(0, 0, 10, 10);
        assert_eq!(size_mode(Target::Window, true, None, None), SizeMode::FullPage);
        assert_eq!(size_mode(Target::Window, false, None, None), SizeMode::Viewport);
        assert_eq!(
            size_mode(Target::Region, true, Some("#main"), Some(&rect)),
            SizeMode::Selector
        );
        assert_eq!(size_mode(Target::Region, false, None, Some(&rect)), SizeMode::Region);
        // A window target ignores stray selector/region parameters
        assert_eq!(
            size_mode(Target::Window, false, Some("#main"), None),
            SizeMode::Viewport
        );
    }

    #[test]
    fn test_device_name_wins_over_size() {
        let mut browser = BrowserConfig::emulated_device("iPhone X", Some(ScreenOrientation::Landscape));
        browser.width = Some(800);
        browser.height = Some(600);
        browser.device_scale_factor = Some(2.0);

        assert_eq!(
            emulation_info(&browser),
            Some(EmulationInfo::Device {
                device_name: "iPhone X".into(),
                screen_orientation: Some(ScreenOrientation::Landscape),
            })
        );
    }

    #[test]
    fn test_explicit_and_absent_emulation() {
        let desktop = BrowserConfig::desktop("firefox", 1024, 768);
        assert_eq!(emulation_info(&desktop), None);

        let mut mobile = BrowserConfig::desktop("chrome", 375, 812);
        mobile.mobile = Some(true);
        mobile.device_scale_factor = Some(3.0);
        match emulation_info(&mobile) {
            Some(EmulationInfo::Explicit {
                width,
                height,
                device_scale_factor,
                ..
            }) => {
                assert_eq!((width, height), (Some(375), Some(812)));
                assert_eq!(device_scale_factor, Some(3.0));
            }
            other => panic!("Expected explicit emulation, got {:?}", other),
        }
    }

    #[test]
    fn test_selectors_to_find() {
        let regions = MatchRegionSpecs {
            ignore: vec![RegionTarget::selector(".ad")],
            ..Default::default()
        };
        assert_eq!(
            selectors_to_find_regions_for(SizeMode::Selector, Some("#card"), &regions),
            vec!["#card", ".ad"]
        );
        assert_eq!(
            selectors_to_find_regions_for(SizeMode::FullPage, Some("#card"), &regions),
            vec![".ad"]
        );
    }

    #[test]
    fn test_build_request() {
        let dom = Resource::from_dom("https://shop.test/", &serde_json::json!({"cdt": []})).unwrap();
        let img = Resource::new("https://shop.test/a.png", "image/png", &b"png"[..]);
        let resources: BTreeMap<_, _> = [(img.url().to_string(), img.clone())].into_iter().collect();

        let builder = RenderRequestBuilder {
            url: "https://shop.test/".into(),
            endpoints: RenderEndpoints {
                results_url: Some("https://grid.test/results".into()),
                stitching_service_url: None,
            },
            size_mode: SizeMode::Viewport,
            selector: None,
            region: None,
            script_hooks: None,
            selectors_to_find_regions_for: vec![],
            send_dom: true,
            options: None,
        };

        let request = builder
            .build(&dom, &resources, &BrowserConfig::desktop("safari", 1280, 800))
            .unwrap();
        assert_eq!(request.browser_name, "safari");
        assert_eq!(request.render_info.size_mode, SizeMode::Viewport);
        assert_eq!(request.dom.hash.as_deref(), dom.hash());
        assert_eq!(
            request.resources[img.url()].hash.as_deref(),
            img.hash()
        );
        assert_eq!(request.webhook.as_deref(), Some("https://grid.test/results"));

        let remote_dom = Resource::remote("https://shop.test/");
        assert!(builder
            .build(&remote_dom, &resources, &BrowserConfig::desktop("safari", 1, 1))
            .is_err());
    }
}
