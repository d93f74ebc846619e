use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

pub const HEART_PRESSED: &str = "♥";
pub const HEART_UNPRESSED: &str = "♡";
pub const HEART_LABEL: &str = "Save to favourites";
pub const HEART_UNSAVEABLE_TIP: &str = "Cannot save this place";

/// Visual state of a heart toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartState {
    pub pressed: bool,
}

impl HeartState {
    pub fn new(pressed: bool) -> Self {
        Self { pressed }
    }

    pub fn glyph(&self) -> &'static str {
        if self.pressed {
            HEART_PRESSED
        } else {
            HEART_UNPRESSED
        }
    }

    /// Value for the accessible pressed attribute
    pub fn aria_pressed(&self) -> &'static str {
        if self.pressed { "true" } else { "false" }
    }
}

/// A rendered heart button, wherever it lives (popup, list row, ...)
pub trait HeartControl: Send + Sync {
    fn render(&self, state: HeartState);

    /// The place behind this control cannot be favourited
    fn disable(&self, tip: &str);

    fn set_label(&self, _label: &str) {}
}

/// Every mounted heart per place key. Controls are added as the UI
/// mounts them and live as long as the registry does.
#[derive(Default)]
pub struct HeartRegistry {
    hearts: Mutex<HashMap<String, Vec<Arc<dyn HeartControl>>>>,
}

impl HeartRegistry {
    /// Adds a control under `key`, registering the same control twice is a no-op
    pub fn register(&self, key: &str, control: Arc<dyn HeartControl>) {
        let mut hearts = self.hearts.lock();
        let controls = hearts.entry(key.to_string()).or_default();

        if !controls
            .iter()
            .any(|c| std::ptr::addr_eq(Arc::as_ptr(c), Arc::as_ptr(&control)))
        {
            controls.push(control);
        }
    }

    fn controls(&self, key: &str) -> Vec<Arc<dyn HeartControl>> {
        self.hearts.lock().get(key).cloned().unwrap_or_default()
    }

    /// Renders every control of `key`
    pub fn set_all(&self, key: &str, favourite: bool) {
        let state = HeartState::new(favourite);
        for control in self.controls(key) {
            control.render(state);
        }
    }

    /// Renders every registered control from a membership test
    pub fn refresh(&self, is_favourite: impl Fn(&str) -> bool) {
        let all: Vec<(String, Vec<Arc<dyn HeartControl>>)> = self
            .hearts
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for (key, controls) in all {
            let state = HeartState::new(is_favourite(&key));
            for control in controls {
                control.render(state);
            }
        }
    }

    pub fn reset_all(&self) {
        self.refresh(|_| false);
    }

    pub fn count(&self, key: &str) -> usize {
        self.hearts.lock().get(key).map(Vec::len).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeartView {
    pub glyph: &'static str,
    pub aria_pressed: &'static str,
    pub label: Option<String>,
    pub disabled: bool,
    pub tip: Option<String>,
}

/// In-process heart control that keeps its rendered view, used by
/// the console front end and by tests
#[derive(Debug)]
pub struct HeartButton {
    name: String,
    view: Mutex<HeartView>,
}

impl HeartButton {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            view: Mutex::new(HeartView {
                glyph: HEART_UNPRESSED,
                aria_pressed: "false",
                ..Default::default()
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn view(&self) -> HeartView {
        self.view.lock().clone()
    }

    pub fn is_pressed(&self) -> bool {
        self.view.lock().aria_pressed == "true"
    }
}

impl HeartControl for HeartButton {
    fn render(&self, state: HeartState) {
        let mut view = self.view.lock();
        view.glyph = state.glyph();
        view.aria_pressed = state.aria_pressed();
    }

    fn disable(&self, tip: &str) {
        let mut view = self.view.lock();
        view.disabled = true;
        view.tip = Some(tip.to_string());
        view.glyph = HEART_UNPRESSED;
        view.aria_pressed = "false";
    }

    fn set_label(&self, label: &str) {
        self.view.lock().label = Some(label.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent() {
        let registry = HeartRegistry::default();
        let button = HeartButton::new("popup");

        registry.register("k", button.clone());
        registry.register("k", button.clone());
        assert_eq!(registry.count("k"), 1);

        registry.register("k", HeartButton::new("list"));
        assert_eq!(registry.count("k"), 2);
    }

    #[test]
    fn test_set_all_updates_every_control() {
        let registry = HeartRegistry::default();
        let popup = HeartButton::new("popup");
        let row = HeartButton::new("row");
        let other = HeartButton::new("other");

        registry.register("k", popup.clone());
        registry.register("k", row.clone());
        registry.register("j", other.clone());

        registry.set_all("k", true);

        assert_eq!(popup.view().glyph, HEART_PRESSED);
        assert_eq!(row.view().aria_pressed, "true");
        assert!(!other.is_pressed());
    }

    #[test]
    fn test_refresh_and_reset() {
        let registry = HeartRegistry::default();
        let a = HeartButton::new("a");
        let b = HeartButton::new("b");
        registry.register("a", a.clone());
        registry.register("b", b.clone());

        registry.refresh(|key| key == "a");
        assert!(a.is_pressed());
        assert!(!b.is_pressed());

        registry.reset_all();
        assert!(!a.is_pressed());
        assert_eq!(a.view().glyph, HEART_UNPRESSED);
    }

    #[test]
    fn test_disable() {
        let button = HeartButton::new("x");
        button.disable(HEART_UNSAVEABLE_TIP);

        let view = button.view();
        assert!(view.disabled);
        assert_eq!(view.tip.as_deref(), Some(HEART_UNSAVEABLE_TIP));
    }
}
