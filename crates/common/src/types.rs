//! Core types for RenderGrid

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::resource::ResourceDescriptor;

// ============================================================================
// Geometry
// ============================================================================

/// A point in page coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub x: i64,
    pub y: i64,
}

impl Location {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RectangleSize {
    pub width: u32,
    pub height: u32,
}

impl RectangleSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// An axis-aligned rectangle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub left: i64,
    pub top: i64,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(left: i64, top: i64, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn location(&self) -> Location {
        Location::new(self.left, self.top)
    }

    pub fn size(&self) -> RectangleSize {
        RectangleSize::new(self.width, self.height)
    }

    /// Translate by a location, clamping at the coordinate range
    pub fn offset(&self, by: Location) -> Region {
        Region {
            left: self.left.saturating_add(by.x),
            top: self.top.saturating_add(by.y),
            ..*self
        }
    }
}

// ============================================================================
// Match regions
// ============================================================================

/// Where a match region comes from: a CSS selector resolved by the renderer,
/// or explicit coordinates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegionTarget {
    Selector { selector: String },
    Rect(Region),
}

impl RegionTarget {
    pub fn selector(selector: impl Into<String>) -> Self {
        RegionTarget::Selector {
            selector: selector.into(),
        }
    }

    pub fn as_selector(&self) -> Option<&str> {
        match self {
            RegionTarget::Selector { selector } => Some(selector),
            RegionTarget::Rect(_) => None,
        }
    }
}

/// Accessibility region classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessibilityRegionType {
    IgnoreContrast,
    RegularText,
    LargeText,
    BoldText,
    GraphicalObject,
}

impl AccessibilityRegionType {
    pub const ALL: [AccessibilityRegionType; 5] = [
        AccessibilityRegionType::IgnoreContrast,
        AccessibilityRegionType::RegularText,
        AccessibilityRegionType::LargeText,
        AccessibilityRegionType::BoldText,
        AccessibilityRegionType::GraphicalObject,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessibilityRegionType::IgnoreContrast => "IgnoreContrast",
            AccessibilityRegionType::RegularText => "RegularText",
            AccessibilityRegionType::LargeText => "LargeText",
            AccessibilityRegionType::BoldText => "BoldText",
            AccessibilityRegionType::GraphicalObject => "GraphicalObject",
        }
    }
}

impl FromStr for AccessibilityRegionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown accessibility type '{}'", s))
    }
}

impl fmt::Display for AccessibilityRegionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accessibility region as requested by the caller (type is validated later)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessibilityRegionSpec {
    #[serde(flatten)]
    pub target: RegionTarget,
    pub accessibility_type: String,
}

/// Floating region as requested by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloatingRegionSpec {
    #[serde(flatten)]
    pub target: RegionTarget,
    #[serde(default)]
    pub max_up_offset: u32,
    #[serde(default)]
    pub max_down_offset: u32,
    #[serde(default)]
    pub max_left_offset: u32,
    #[serde(default)]
    pub max_right_offset: u32,
}

/// Resolved accessibility region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessibilityRegion {
    #[serde(flatten)]
    pub region: Region,
    pub accessibility_type: AccessibilityRegionType,
}

/// Resolved floating region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloatingMatchSettings {
    #[serde(flatten)]
    pub region: Region,
    pub max_up_offset: u32,
    pub max_down_offset: u32,
    pub max_left_offset: u32,
    pub max_right_offset: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchLevel {
    None,
    Layout,
    Content,
    #[default]
    Strict,
    Exact,
}

/// Settings sent along with a comparison call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckSettings {
    pub ignore: Vec<Region>,
    pub floating: Vec<FloatingMatchSettings>,
    pub layout: Vec<Region>,
    pub strict: Vec<Region>,
    pub content: Vec<Region>,
    pub accessibility: Vec<AccessibilityRegion>,
    pub use_dom: Option<bool>,
    pub enable_patterns: Option<bool>,
    pub ignore_displacements: Option<bool>,
    pub render_id: String,
    pub match_level: MatchLevel,
}

// ============================================================================
// Browser matrix
// ============================================================================

/// What a checkpoint captures
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    #[default]
    Window,
    Region,
}

/// How the renderer sizes the screenshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SizeMode {
    FullPage,
    Viewport,
    Selector,
    Region,
}

impl fmt::Display for SizeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeMode::FullPage => write!(f, "full-page"),
            SizeMode::Viewport => write!(f, "viewport"),
            SizeMode::Selector => write!(f, "selector"),
            SizeMode::Region => write!(f, "region"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScreenOrientation {
    Portrait,
    Landscape,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IosDeviceInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_orientation: Option<ScreenOrientation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// One entry of the browser/device matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserConfig {
    #[serde(default = "default_browser_name")]
    pub name: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub screen_orientation: Option<ScreenOrientation>,
    #[serde(default)]
    pub device_scale_factor: Option<f64>,
    #[serde(default)]
    pub mobile: Option<bool>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub ios_device_info: Option<IosDeviceInfo>,
}

fn default_browser_name() -> String {
    "chrome".to_string()
}

impl BrowserConfig {
    pub fn desktop(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width: Some(width),
            height: Some(height),
            device_name: None,
            screen_orientation: None,
            device_scale_factor: None,
            mobile: None,
            platform: None,
            ios_device_info: None,
        }
    }

    pub fn emulated_device(device_name: impl Into<String>, orientation: Option<ScreenOrientation>) -> Self {
        Self {
            name: default_browser_name(),
            width: None,
            height: None,
            device_name: Some(device_name.into()),
            screen_orientation: orientation,
            device_scale_factor: None,
            mobile: None,
            platform: None,
            ios_device_info: None,
        }
    }

    /// Requested viewport, if explicitly sized
    pub fn viewport(&self) -> Option<RectangleSize> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some(RectangleSize::new(w, h)),
            _ => None,
        }
    }
}

/// Chrome emulation descriptor; the variants are mutually exclusive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmulationInfo {
    #[serde(rename_all = "camelCase")]
    Device {
        device_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        screen_orientation: Option<ScreenOrientation>,
    },
    #[serde(rename_all = "camelCase")]
    Explicit {
        #[serde(skip_serializing_if = "Option::is_none")]
        device_scale_factor: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        mobile: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        screen_orientation: Option<ScreenOrientation>,
        #[serde(skip_serializing_if = "Option::is_none")]
        width: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        height: Option<u32>,
    },
}

// ============================================================================
// Render requests and results
// ============================================================================

/// Service endpoints handed out by the rendering service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderEndpoints {
    pub results_url: Option<String>,
    pub stitching_service_url: Option<String>,
}

/// Renderer parameters for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderInfo {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub size_mode: SizeMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<Region>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emulation_info: Option<EmulationInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ios_device_info: Option<IosDeviceInfo>,
}

/// One render job submitted to the rendering service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub webhook: Option<String>,
    pub stitching_service: Option<String>,
    pub url: String,
    pub dom: ResourceDescriptor,
    pub resources: BTreeMap<String, ResourceDescriptor>,
    pub render_info: RenderInfo,
    pub browser_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_hooks: Option<serde_json::Value>,
    pub selectors_to_find_regions_for: Vec<String>,
    pub send_dom: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderStatus {
    Rendering,
    Rendered,
    Error,
}

/// Final state of a render as reported by the status waiter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderStatusResult {
    pub status: RenderStatus,
    pub image_location: Option<String>,
    pub dom_location: Option<String>,
    pub user_agent: Option<String>,
    pub device_size: Option<RectangleSize>,
    /// One list of rectangles per requested selector, in request order
    #[serde(default)]
    pub selector_regions: Vec<Vec<Region>>,
    pub error: Option<String>,
}

// ============================================================================
// Comparison
// ============================================================================

/// Arguments of a comparison call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckWindowArgs {
    pub screenshot_url: Option<String>,
    pub tag: Option<String>,
    pub dom_url: Option<String>,
    pub check_settings: CheckSettings,
    pub image_location: Option<Location>,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub as_expected: bool,
    #[serde(default)]
    pub window_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySettings {
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// A captured DOM snapshot of one page (or frame)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomSnapshot {
    pub url: String,
    #[serde(default)]
    pub cdt: serde_json::Value,
    #[serde(default)]
    pub resource_urls: Vec<String>,
    /// Inline resource contents keyed by URL
    #[serde(default)]
    pub resource_contents: BTreeMap<String, InlineResource>,
    #[serde(default)]
    pub frames: Vec<DomSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineResource {
    pub content_type: String,
    pub value: String,
}
