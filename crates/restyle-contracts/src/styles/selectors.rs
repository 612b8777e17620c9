use super::registry::{normalize_tag, LabelKind, LabelSpec, StyleCatalog};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSelection {
    pub spec: LabelSpec,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LabelSelector {
    pub catalog: StyleCatalog,
    default_style: String,
    default_room_type: String,
}

impl LabelSelector {
    pub fn new(catalog: Option<StyleCatalog>) -> Self {
        let catalog = catalog.unwrap_or_default();
        let default_style = Self::catalog_default(&catalog, LabelKind::Style);
        let default_room_type = Self::catalog_default(&catalog, LabelKind::RoomType);
        Self {
            catalog,
            default_style,
            default_room_type,
        }
    }

    pub fn with_defaults(mut self, style: Option<&str>, room_type: Option<&str>) -> Self {
        if let Some(spec) = style.and_then(|tag| self.catalog.get(LabelKind::Style, tag)) {
            self.default_style = spec.slug.clone();
        }
        if let Some(spec) = room_type.and_then(|tag| self.catalog.get(LabelKind::RoomType, tag)) {
            self.default_room_type = spec.slug.clone();
        }
        self
    }

    pub fn default_slug(&self, kind: LabelKind) -> &str {
        match kind {
            LabelKind::Style => self.default_style.as_str(),
            LabelKind::RoomType => self.default_room_type.as_str(),
        }
    }

    pub fn select(&self, requested: Option<&str>, kind: LabelKind) -> LabelSelection {
        let requested = requested
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        if let Some(requested_value) = requested.as_deref() {
            if let Some(spec) = self.catalog.get(kind, requested_value) {
                return LabelSelection {
                    spec: spec.clone(),
                    requested: requested.clone(),
                    fallback_reason: None,
                };
            }
        }

        let default_slug = self.default_slug(kind);
        let fallback_reason = match requested.as_deref() {
            Some(requested_value) => format!(
                "Unknown {} '{requested_value}'; using '{default_slug}'.",
                kind.as_str()
            ),
            None => format!("No {} specified; using default.", kind.as_str()),
        };
        let spec = self
            .catalog
            .get(kind, default_slug)
            .cloned()
            .unwrap_or_else(|| LabelSpec::new(kind, default_slug, None));
        LabelSelection {
            spec,
            requested,
            fallback_reason: Some(fallback_reason),
        }
    }

    fn catalog_default(catalog: &StyleCatalog, kind: LabelKind) -> String {
        if catalog.contains(kind, kind.builtin_default()) {
            return kind.builtin_default().to_string();
        }
        catalog
            .first(kind)
            .map(|spec| spec.slug.clone())
            .unwrap_or_else(|| normalize_tag(kind.builtin_default()))
    }
}
