//! Core type definitions for TrackerBlock
//!
//! These types are shared by the compiler, the matching engine and the
//! request interceptor.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::surrogate::SurrogateEntry;

// =============================================================================
// Resource Types
// =============================================================================

/// Kind of resource a page is loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Script,
    Image,
    Stylesheet,
    Font,
    #[serde(alias = "xhr", alias = "fetch")]
    XmlHttpRequest,
    #[serde(alias = "sub_frame")]
    Subdocument,
    #[serde(rename = "main_frame", alias = "document")]
    MainFrame,
    Media,
    Object,
    #[serde(alias = "beacon")]
    Ping,
    WebSocket,
    Other,
}

impl ResourceType {
    pub const ALL: [ResourceType; 12] = [
        Self::Script,
        Self::Image,
        Self::Stylesheet,
        Self::Font,
        Self::XmlHttpRequest,
        Self::Subdocument,
        Self::MainFrame,
        Self::Media,
        Self::Object,
        Self::Ping,
        Self::WebSocket,
        Self::Other,
    ];

    /// Parse from a dataset or browser request type string.
    ///
    /// Unknown names yield `None` rather than `Other` so that a typo in a
    /// dataset cannot silently widen a rule.
    pub fn parse(s: &str) -> Option<Self> {
        let ty = match s.trim().to_ascii_lowercase().as_str() {
            "script" => Self::Script,
            "image" | "img" => Self::Image,
            "stylesheet" | "css" => Self::Stylesheet,
            "font" => Self::Font,
            "xmlhttprequest" | "xhr" | "fetch" => Self::XmlHttpRequest,
            "subdocument" | "sub_frame" | "iframe" => Self::Subdocument,
            "main_frame" | "document" => Self::MainFrame,
            "media" => Self::Media,
            "object" => Self::Object,
            "ping" | "beacon" => Self::Ping,
            "websocket" => Self::WebSocket,
            "other" => Self::Other,
            _ => return None,
        };
        Some(ty)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Script => "script",
            Self::Image => "image",
            Self::Stylesheet => "stylesheet",
            Self::Font => "font",
            Self::XmlHttpRequest => "xmlhttprequest",
            Self::Subdocument => "subdocument",
            Self::MainFrame => "main_frame",
            Self::Media => "media",
            Self::Object => "object",
            Self::Ping => "ping",
            Self::WebSocket => "websocket",
            Self::Other => "other",
        }
    }

    #[inline]
    fn bit(self) -> ResourceTypes {
        match self {
            Self::Script => ResourceTypes::SCRIPT,
            Self::Image => ResourceTypes::IMAGE,
            Self::Stylesheet => ResourceTypes::STYLESHEET,
            Self::Font => ResourceTypes::FONT,
            Self::XmlHttpRequest => ResourceTypes::XMLHTTPREQUEST,
            Self::Subdocument => ResourceTypes::SUBDOCUMENT,
            Self::MainFrame => ResourceTypes::MAIN_FRAME,
            Self::Media => ResourceTypes::MEDIA,
            Self::Object => ResourceTypes::OBJECT,
            Self::Ping => ResourceTypes::PING,
            Self::WebSocket => ResourceTypes::WEBSOCKET,
            Self::Other => ResourceTypes::OTHER,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags::bitflags! {
    /// Set of resource types a rule is restricted to.
    ///
    /// The empty set means "all types". Membership is flat: no type
    /// subsumes another.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResourceTypes: u16 {
        const SCRIPT = 1 << 0;
        const IMAGE = 1 << 1;
        const STYLESHEET = 1 << 2;
        const FONT = 1 << 3;
        const XMLHTTPREQUEST = 1 << 4;
        const SUBDOCUMENT = 1 << 5;  // iframe/frame
        const MAIN_FRAME = 1 << 6;   // main document
        const MEDIA = 1 << 7;
        const OBJECT = 1 << 8;
        const PING = 1 << 9;
        const WEBSOCKET = 1 << 10;
        const OTHER = 1 << 11;
    }
}

impl ResourceTypes {
    /// Add a single type to the set.
    pub fn insert_type(&mut self, ty: ResourceType) {
        self.insert(ty.bit());
    }

    /// Whether a rule restricted to this set applies to `ty`.
    #[inline]
    pub fn allows(self, ty: ResourceType) -> bool {
        self.is_empty() || self.contains(ty.bit())
    }

    /// Iterate the concrete types in the set.
    pub fn types(self) -> impl Iterator<Item = ResourceType> {
        ResourceType::ALL
            .into_iter()
            .filter(move |ty| self.contains(ty.bit()))
    }
}

impl FromIterator<ResourceType> for ResourceTypes {
    fn from_iter<I: IntoIterator<Item = ResourceType>>(iter: I) -> Self {
        let mut set = ResourceTypes::empty();
        for ty in iter {
            set.insert_type(ty);
        }
        set
    }
}

// =============================================================================
// Tracker Actions
// =============================================================================

/// What to do with a request once one of a tracker's rules applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackerAction {
    #[default]
    Block,
    Ignore,
}

// =============================================================================
// Request Context
// =============================================================================

/// A single resource load to be evaluated.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    /// Full request URL
    pub url: &'a str,
    /// Kind of resource being loaded
    pub resource_type: ResourceType,
    /// Domain of the page that caused the load; empty for top-level
    /// navigations with no referring page
    pub initiator_domain: &'a str,
}

impl<'a> RequestContext<'a> {
    pub fn new(url: &'a str, resource_type: ResourceType, initiator_domain: &'a str) -> Self {
        Self {
            url,
            resource_type,
            initiator_domain,
        }
    }
}

// =============================================================================
// Decision
// =============================================================================

/// Outcome of evaluating one request.
///
/// Decisions are produced per call and never cached by URL: the same URL
/// can be decided differently for a different initiator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Let the load proceed
    Allow,
    /// Cancel the load
    Block { tracker_domain: String },
    /// Cancel the load and run the surrogate in its place
    Replace {
        tracker_domain: String,
        surrogate: Arc<SurrogateEntry>,
    },
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Tracker domain responsible for a Block or Replace.
    pub fn tracker_domain(&self) -> Option<&str> {
        match self {
            Decision::Allow => None,
            Decision::Block { tracker_domain } | Decision::Replace { tracker_domain, .. } => {
                Some(tracker_domain)
            }
        }
    }
}
