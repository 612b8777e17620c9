use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelKind {
    Style,
    RoomType,
}

impl LabelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Style => "style",
            Self::RoomType => "room type",
        }
    }

    pub fn builtin_default(&self) -> &'static str {
        match self {
            Self::Style => "modern_luxury",
            Self::RoomType => "living_room",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSpec {
    pub slug: String,
    pub kind: LabelKind,
    pub label: String,
    pub cues: Option<String>,
}

impl LabelSpec {
    pub fn new(kind: LabelKind, slug: &str, cues: Option<&str>) -> Self {
        let slug = normalize_tag(slug);
        Self {
            label: humanize_tag(&slug),
            slug,
            kind,
            cues: cues.map(str::to_string),
        }
    }
}

// The first entry of each kind is the default.
#[derive(Debug, Clone)]
pub struct StyleCatalog {
    styles: IndexMap<String, LabelSpec>,
    room_types: IndexMap<String, LabelSpec>,
}

impl Default for StyleCatalog {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl StyleCatalog {
    pub fn new(
        styles: Option<IndexMap<String, LabelSpec>>,
        room_types: Option<IndexMap<String, LabelSpec>>,
    ) -> Self {
        Self {
            styles: styles.unwrap_or_else(default_styles),
            room_types: room_types.unwrap_or_else(default_room_types),
        }
    }

    fn entries(&self, kind: LabelKind) -> &IndexMap<String, LabelSpec> {
        match kind {
            LabelKind::Style => &self.styles,
            LabelKind::RoomType => &self.room_types,
        }
    }

    pub fn get(&self, kind: LabelKind, tag: &str) -> Option<&LabelSpec> {
        self.entries(kind).get(&normalize_tag(tag))
    }

    pub fn contains(&self, kind: LabelKind, tag: &str) -> bool {
        self.get(kind, tag).is_some()
    }

    pub fn list(&self, kind: LabelKind) -> impl Iterator<Item = &LabelSpec> {
        self.entries(kind).values()
    }

    pub fn first(&self, kind: LabelKind) -> Option<&LabelSpec> {
        self.entries(kind).values().next()
    }
}

pub fn normalize_tag(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.trim().chars() {
        if ch.is_whitespace() || ch == '-' || ch == '_' {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            continue;
        }
        out.extend(ch.to_lowercase());
    }
    out.trim_end_matches('_').to_string()
}

pub fn humanize_tag(slug: &str) -> String {
    slug.split(['_', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn default_styles() -> IndexMap<String, LabelSpec> {
    let mut map = IndexMap::new();
    let mut insert = |slug: &str, cues: &str| {
        let spec = LabelSpec::new(LabelKind::Style, slug, Some(cues));
        map.insert(spec.slug.clone(), spec);
    };

    insert(
        "modern_luxury",
        "marble surfaces, brass accents, velvet upholstery, layered lighting",
    );
    insert(
        "scandinavian_minimalist",
        "light oak, white walls, soft textiles, uncluttered surfaces",
    );
    insert(
        "industrial",
        "exposed brick, black steel, reclaimed wood, Edison bulbs",
    );
    insert(
        "bohemian",
        "layered rugs, rattan, macrame, plants, warm earthy colors",
    );
    insert(
        "mid_century_modern",
        "walnut furniture, tapered legs, mustard and teal accents",
    );
    insert(
        "coastal",
        "whitewashed wood, linen, sandy neutrals, soft blues",
    );
    insert(
        "farmhouse",
        "shiplap, distressed wood, apron sinks, neutral palette",
    );
    insert(
        "japandi",
        "low furniture, natural wood, muted tones, paper lighting",
    );
    insert(
        "traditional",
        "rich wood, classic moldings, tufted seating, symmetrical layout",
    );
    insert(
        "art_deco",
        "geometric patterns, gold trim, lacquered finishes, jewel tones",
    );
    insert(
        "rustic",
        "rough-hewn timber, stone, wool throws, warm lighting",
    );
    insert(
        "contemporary",
        "clean lines, neutral palette, statement lighting, sleek finishes",
    );

    map
}

fn default_room_types() -> IndexMap<String, LabelSpec> {
    let mut map = IndexMap::new();
    for slug in [
        "living_room",
        "bedroom",
        "kitchen",
        "bathroom",
        "dining_room",
        "home_office",
        "kids_room",
        "guest_room",
        "entryway",
        "outdoor_patio",
    ] {
        let spec = LabelSpec::new(LabelKind::RoomType, slug, None);
        map.insert(spec.slug.clone(), spec);
    }
    map
}
