#![allow(dead_code)]

use async_trait::async_trait;
use resilio_engine::backend::PageDriver;
use resilio_engine::fallback::{
    FallbackAdapter, ReasoningError, ReasoningRequest, ReasoningService,
};
use resilio_engine::resolution::{Prober, ResolutionEngine};
use resilio_engine::store::{SelectorStore, StoreOptions};
use resilio_engine::{AxNode, DriverError, ElementHandle, ImageFormat, SelectChoice};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub fn fast_prober() -> Prober {
    Prober::new(Duration::from_millis(50), Duration::from_millis(5))
}

pub fn memory_store() -> SelectorStore {
    SelectorStore::in_memory(StoreOptions::default())
}

pub fn engine(store: SelectorStore, fallback: FallbackAdapter) -> ResolutionEngine {
    ResolutionEngine::new(store, fast_prober(), fallback)
}

#[derive(Debug, Clone)]
pub struct MockElement {
    pub selector: String,
    pub tag: String,
    pub visible: bool,
    pub appears_after: Duration,
}

/// Scripted page: selectors match exactly, elements can appear late, and
/// clicks can be made to fail.
#[derive(Debug)]
pub struct MockPage {
    elements: Vec<MockElement>,
    created: Instant,
    click_failures: HashMap<String, usize>,
    pub crashed: bool,
    pub ax_tree: Option<AxNode>,
    pub queries: Vec<String>,
    pub clicks: Vec<String>,
    pub fills: Vec<(String, String)>,
    pub selections: Vec<(String, SelectChoice)>,
}

impl MockPage {
    pub fn new() -> Self {
        Self {
            elements: Vec::new(),
            created: Instant::now(),
            click_failures: HashMap::new(),
            crashed: false,
            ax_tree: None,
            queries: Vec::new(),
            clicks: Vec::new(),
            fills: Vec::new(),
            selections: Vec::new(),
        }
    }

    pub fn with(mut self, selector: &str, tag: &str) -> Self {
        self.elements.push(MockElement {
            selector: selector.to_string(),
            tag: tag.to_string(),
            visible: true,
            appears_after: Duration::ZERO,
        });
        self
    }

    pub fn with_hidden(mut self, selector: &str, tag: &str) -> Self {
        self.elements.push(MockElement {
            selector: selector.to_string(),
            tag: tag.to_string(),
            visible: false,
            appears_after: Duration::ZERO,
        });
        self
    }

    pub fn with_late(mut self, selector: &str, tag: &str, after: Duration) -> Self {
        self.elements.push(MockElement {
            selector: selector.to_string(),
            tag: tag.to_string(),
            visible: true,
            appears_after: after,
        });
        self
    }

    /// Make the next `times` clicks on `selector` fail.
    pub fn failing_clicks(mut self, selector: &str, times: usize) -> Self {
        self.click_failures.insert(selector.to_string(), times);
        self
    }

    pub fn queried(&self, selector: &str) -> usize {
        self.queries.iter().filter(|q| q.as_str() == selector).count()
    }
}

#[async_trait]
impl PageDriver for MockPage {
    async fn query(&mut self, selector: &str) -> Result<Option<ElementHandle>, DriverError> {
        self.queries.push(selector.to_string());
        if self.crashed {
            return Err(DriverError::PageCrashed("renderer gone".into()));
        }
        if selector.starts_with("!!") {
            return Err(DriverError::InvalidSelector {
                selector: selector.to_string(),
                reason: "unexpected token".into(),
            });
        }
        let elapsed = self.created.elapsed();
        Ok(self
            .elements
            .iter()
            .find(|e| e.selector == selector && elapsed >= e.appears_after)
            .map(|e| ElementHandle::new(&e.selector, &e.tag, e.visible)))
    }

    async fn click(&mut self, element: &ElementHandle) -> Result<(), DriverError> {
        if let Some(remaining) = self.click_failures.get_mut(&element.selector) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DriverError::NotInteractable("covered by overlay".into()));
            }
        }
        self.clicks.push(element.selector.clone());
        Ok(())
    }

    async fn fill(&mut self, element: &ElementHandle, value: &str) -> Result<(), DriverError> {
        self.fills
            .push((element.selector.clone(), value.to_string()));
        Ok(())
    }

    async fn select_option(
        &mut self,
        element: &ElementHandle,
        choice: &SelectChoice,
    ) -> Result<(), DriverError> {
        self.selections
            .push((element.selector.clone(), choice.clone()));
        Ok(())
    }

    async fn screenshot(&mut self, format: ImageFormat) -> Result<Vec<u8>, DriverError> {
        if self.crashed {
            return Err(DriverError::PageCrashed("renderer gone".into()));
        }
        Ok(match format {
            ImageFormat::Jpeg { .. } => vec![0xFF, 0xD8, 0xFF, 0xD9],
            ImageFormat::Png => vec![0x89, b'P', b'N', b'G'],
        })
    }

    async fn structure_snapshot(&mut self) -> Result<String, DriverError> {
        if self.crashed {
            return Err(DriverError::PageCrashed("renderer gone".into()));
        }
        Ok(self
            .elements
            .iter()
            .enumerate()
            .map(|(i, e)| format!("[{i}] <{}> {}", e.tag, e.selector))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    async fn accessibility_tree(&mut self) -> Result<Option<AxNode>, DriverError> {
        Ok(self.ax_tree.clone())
    }

    async fn current_url(&mut self) -> Result<String, DriverError> {
        Ok("https://portal.example/controlador.php".to_string())
    }
}

/// Reasoning service with a canned reply that counts its calls.
#[derive(Clone)]
pub struct MockReasoner {
    reply: Result<String, String>,
    pub calls: Arc<AtomicUsize>,
    pub last_request: Arc<Mutex<Option<ReasoningRequest>>>,
}

impl MockReasoner {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            ..Self::replying("")
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn adapter(&self) -> FallbackAdapter {
        FallbackAdapter::new(Arc::new(self.clone()))
    }
}

#[async_trait]
impl ReasoningService for MockReasoner {
    async fn suggest(&self, request: &ReasoningRequest) -> Result<String, ReasoningError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        self.reply.clone().map_err(ReasoningError::Api)
    }
}
