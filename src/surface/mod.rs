// PromptChain — Target surface abstraction (the chat page being driven)

pub mod chat;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// Opaque reference to an input element found on the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputHandle {
    /// The selector that located this input.
    pub selector: String,
}

impl InputHandle {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
        }
    }
}

/// An open page the engine may attach to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub id: String,
    pub url: String,
}

// ---------------------------------------------------------------------------
// Surface traits
// ---------------------------------------------------------------------------

/// The page capabilities the step runner needs.
///
/// Selectors are whatever identification scheme the implementation
/// understands; the runner only passes through the configured lists.
#[async_trait]
pub trait TargetSurface: Send + Sync {
    /// Locate a text input by one identification strategy.
    async fn find_input(&self, selector: &str) -> Option<InputHandle>;

    async fn is_disabled(&self, input: &InputHandle) -> bool;

    async fn clear(&self, input: &InputHandle) -> anyhow::Result<()>;

    /// Primary insertion path.
    async fn insert_text(&self, input: &InputHandle, text: &str) -> anyhow::Result<()>;

    /// Clipboard fallback used when `insert_text` fails. Not verified by callers.
    async fn paste(&self, input: &InputHandle, text: &str) -> anyhow::Result<()>;

    /// Simulated Enter keystroke.
    async fn submit(&self, input: &InputHandle) -> anyhow::Result<()>;

    /// Whether any element matches `selector` (used for busy indicators).
    async fn exists(&self, selector: &str) -> bool;
}

/// Source of candidate pages.
#[async_trait]
pub trait PageProvider: Send + Sync {
    async fn pages(&self) -> anyhow::Result<Vec<PageInfo>>;
    async fn attach(&self, page: &PageInfo) -> anyhow::Result<Arc<dyn TargetSurface>>;
}

// ---------------------------------------------------------------------------
// Locators
// ---------------------------------------------------------------------------

/// Ordered selector strategies plus busy indicators for one kind of page.
#[derive(Debug, Clone)]
pub struct SurfaceLocator {
    pub input_selectors: Vec<String>,
    pub busy_selectors: Vec<String>,
}

impl SurfaceLocator {
    pub fn new(input_selectors: Vec<String>, busy_selectors: Vec<String>) -> Self {
        Self {
            input_selectors,
            busy_selectors,
        }
    }

    /// First input matched by the selector list, in order.
    pub async fn locate(&self, surface: &dyn TargetSurface) -> Option<InputHandle> {
        for selector in &self.input_selectors {
            if let Some(handle) = surface.find_input(selector).await {
                tracing::trace!(selector = %selector, "Input located");
                return Some(handle);
            }
        }
        None
    }

    /// Whether the page shows any "still generating" indicator.
    pub async fn is_busy(&self, surface: &dyn TargetSurface) -> bool {
        for selector in &self.busy_selectors {
            if surface.exists(selector).await {
                return true;
            }
        }
        false
    }
}

/// Glob over page URLs where `*` matches any run of characters.
#[derive(Debug, Clone)]
pub struct UrlPattern {
    re: Regex,
}

impl UrlPattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let escaped: Vec<String> = pattern.split('*').map(regex::escape).collect();
        let re = Regex::new(&format!("^{}$", escaped.join(".*")))?;
        Ok(Self { re })
    }

    pub fn matches(&self, url: &str) -> bool {
        self.re.is_match(url)
    }
}

/// First page whose URL matches any pattern.
pub fn find_target<'a>(pages: &'a [PageInfo], patterns: &[UrlPattern]) -> Option<&'a PageInfo> {
    pages
        .iter()
        .find(|p| patterns.iter().any(|pat| pat.matches(&p.url)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
