// Layout/theme registry boundary and widget-type validation. Layouts are
// code-defined elsewhere; the engine only needs their slot metadata. Widget
// configuration is checked against the type registry at write time only; the
// resolver never interprets configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{AppError, AppResult};
use crate::models::Widget;

/// Slot metadata from a layout definition. `allow_merge: None` defers to the
/// name-based default (header/footer/sidebar merge, everything else is
/// replacement-only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotDef {
    pub name: String,
    pub allow_merge: Option<bool>,
}

impl SlotDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            allow_merge: None,
        }
    }

    pub fn merging(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            allow_merge: Some(true),
        }
    }

    pub fn replacing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            allow_merge: Some(false),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutDef {
    pub key: String,
    pub slots: Vec<SlotDef>,
}

impl LayoutDef {
    pub fn new(key: impl Into<String>, slots: Vec<SlotDef>) -> Self {
        Self {
            key: key.into(),
            slots,
        }
    }

    pub fn slot(&self, name: &str) -> Option<&SlotDef> {
        self.slots.iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeDef {
    pub key: String,
}

/// Default merge policy when the layout does not say otherwise.
pub fn default_allow_merge(slot_name: &str) -> bool {
    matches!(slot_name, "header" | "footer" | "sidebar")
}

/// Registry of layouts and themes. Lookups returning None are routine; the
/// resolver falls back to the defaults instead of failing.
pub trait LayoutRegistry: Send + Sync {
    fn get_layout(&self, key: &str) -> Option<LayoutDef>;
    fn get_theme(&self, key: &str) -> Option<ThemeDef>;
    fn default_layout(&self) -> LayoutDef;
    fn default_theme(&self) -> ThemeDef;
}

/// In-memory registry for embedding and tests.
pub struct InMemoryRegistry {
    layouts: HashMap<String, LayoutDef>,
    themes: HashMap<String, ThemeDef>,
    default_layout: String,
    default_theme: String,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        let default_layout = LayoutDef::new(
            "default",
            vec![
                SlotDef::new("header"),
                SlotDef::new("main"),
                SlotDef::new("sidebar"),
                SlotDef::new("footer"),
            ],
        );
        let mut layouts = HashMap::new();
        layouts.insert("default".to_string(), default_layout);
        let mut themes = HashMap::new();
        themes.insert(
            "default".to_string(),
            ThemeDef {
                key: "default".to_string(),
            },
        );
        Self {
            layouts,
            themes,
            default_layout: "default".to_string(),
            default_theme: "default".to_string(),
        }
    }

    pub fn register_layout(&mut self, layout: LayoutDef) {
        self.layouts.insert(layout.key.clone(), layout);
    }

    pub fn register_theme(&mut self, key: impl Into<String>) {
        let key = key.into();
        self.themes.insert(key.clone(), ThemeDef { key });
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutRegistry for InMemoryRegistry {
    fn get_layout(&self, key: &str) -> Option<LayoutDef> {
        self.layouts.get(key).cloned()
    }

    fn get_theme(&self, key: &str) -> Option<ThemeDef> {
        self.themes.get(key).cloned()
    }

    fn default_layout(&self) -> LayoutDef {
        self.layouts
            .get(&self.default_layout)
            .cloned()
            .unwrap_or_else(|| LayoutDef::new(self.default_layout.clone(), Vec::new()))
    }

    fn default_theme(&self) -> ThemeDef {
        self.themes
            .get(&self.default_theme)
            .cloned()
            .unwrap_or_else(|| ThemeDef {
                key: self.default_theme.clone(),
            })
    }
}

/// Per-type widget configuration schemas, consulted when a version is saved.
pub struct WidgetTypeRegistry {
    types: HashMap<String, WidgetTypeDef>,
    allow_unknown_types: bool,
}

#[derive(Debug, Clone)]
pub struct WidgetTypeDef {
    pub key: String,
    /// Top-level fields the configuration object must contain.
    pub required_fields: Vec<String>,
}

impl WidgetTypeRegistry {
    pub fn new() -> Self {
        Self {
            types: HashMap::new(),
            allow_unknown_types: false,
        }
    }

    /// Accepts any widget type; unknown types skip schema validation.
    pub fn permissive() -> Self {
        Self {
            types: HashMap::new(),
            allow_unknown_types: true,
        }
    }

    pub fn register(&mut self, key: impl Into<String>, required_fields: Vec<String>) {
        let key = key.into();
        self.types.insert(
            key.clone(),
            WidgetTypeDef {
                key,
                required_fields,
            },
        );
    }

    pub fn validate(&self, widget: &Widget) -> AppResult<()> {
        let Some(def) = self.types.get(&widget.widget_type) else {
            if self.allow_unknown_types {
                return Ok(());
            }
            return Err(AppError::Validation(format!(
                "Unknown widget type '{}' on widget {}",
                widget.widget_type, widget.id
            )));
        };
        let Some(config) = widget.configuration.as_object() else {
            return Err(AppError::Validation(format!(
                "Configuration of widget {} must be an object",
                widget.id
            )));
        };
        for field in &def.required_fields {
            if !config.contains_key(field) {
                return Err(AppError::Validation(format!(
                    "Widget {} ({}) is missing required field '{}'",
                    widget.id, def.key, field
                )));
            }
        }
        Ok(())
    }
}

impl Default for WidgetTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn slot_defaults_by_name() {
        assert!(default_allow_merge("header"));
        assert!(default_allow_merge("footer"));
        assert!(default_allow_merge("sidebar"));
        assert!(!default_allow_merge("main"));
        assert!(!default_allow_merge("hero"));
    }

    #[test]
    fn unknown_widget_type_rejected() {
        let registry = WidgetTypeRegistry::new();
        let widget = Widget::new("text", "main", 0);
        assert!(registry.validate(&widget).is_err());
        assert!(WidgetTypeRegistry::permissive().validate(&widget).is_ok());
    }

    #[test]
    fn required_fields_enforced() {
        let mut registry = WidgetTypeRegistry::new();
        registry.register("text", vec!["content".to_string()]);

        let missing = Widget::new("text", "main", 0);
        assert!(registry.validate(&missing).is_err());

        let ok = Widget::new("text", "main", 0)
            .with_configuration(json!({"content": "hello"}));
        assert!(registry.validate(&ok).is_ok());
    }
}
