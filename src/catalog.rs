use std::collections::HashSet;

use tracing::debug;

use crate::error::CatalogError;
use crate::rng::Rng;
use crate::types::Item;

const BUILTIN_ITEMS: [(u32, &str, &str); 71] = [
    (1, "Laptop", "Hardware"),
    (2, "Monitor", "Hardware"),
    (3, "Keyboard", "Hardware"),
    (4, "Mouse", "Hardware"),
    (5, "Webcam", "Hardware"),
    (6, "Headset", "Hardware"),
    (7, "Processor", "Hardware"),
    (8, "RAM", "Hardware"),
    (9, "SSD", "Hardware"),
    (10, "Power Bank", "Hardware"),
    (11, "Windows", "Brand"),
    (12, "MacOS", "Brand"),
    (13, "Android", "Brand"),
    (14, "Linux", "Brand"),
    (15, "Google", "Brand"),
    (16, "YouTube", "Brand"),
    (17, "Google Drive", "Brand"),
    (18, "OneDrive", "Brand"),
    (19, "Microsoft", "Brand"),
    (20, "Apple", "Brand"),
    (21, "Facebook", "Brand"),
    (22, "Amazon", "Brand"),
    (23, "Samsung", "Brand"),
    (24, "Intel", "Brand"),
    (25, "NVIDIA", "Brand"),
    (26, "AMD", "Brand"),
    (27, "Netflix", "Brand"),
    (28, "Spotify", "Brand"),
    (29, "Zoom", "Brand"),
    (30, "WhatsApp", "Brand"),
    (31, "Tokopedia", "Brand"),
    (32, "Gojek", "Brand"),
    (33, "Traveloka", "Brand"),
    (34, "DANA", "Brand"),
    (35, "Jenius", "Brand"),
    (36, "Docker", "Dev Tools"),
    (37, "Laravel", "Dev Tools"),
    (38, "Nuxt.js", "Dev Tools"),
    (39, ".NET Core", "Dev Tools"),
    (40, "PostgreSQL", "Dev Tools"),
    (41, "VS Code", "Dev Tools"),
    (42, "Git", "Dev Tools"),
    (43, "Postman", "Dev Tools"),
    (44, "DBeaver", "Dev Tools"),
    (45, "Tailwind CSS", "Dev Tools"),
    (46, "Flutter", "Dev Tools"),
    (47, "Node.js", "Dev Tools"),
    (48, "Figma", "Dev Tools"),
    (49, "GitHub", "Dev Tools"),
    (50, "Nginx", "Dev Tools"),
    (51, "Redis", "Dev Tools"),
    (52, "SQL Server", "Dev Tools"),
    (53, "JSON", "Dev Tools"),
    (54, "TypeScript", "Dev Tools"),
    (55, "Entity Framework", "Dev Tools"),
    (56, "NPM", "Dev Tools"),
    (57, "Composer", "Dev Tools"),
    (58, "Firebase", "Dev Tools"),
    (59, "Terminal", "Dev Tools"),
    (60, "API REST", "Dev Tools"),
    (61, "PostgREST", "Dev Tools"),
    (62, "DrawDB", "Dev Tools"),
    (63, "ChatGPT", "Dev Tools"),
    (64, "Cursor AI", "Dev Tools"),
    (65, "Azure", "Dev Tools"),
    (66, "Vercel", "Dev Tools"),
    (67, "Markdown", "Dev Tools"),
    (68, "PHP Artisan", "Dev Tools"),
    (69, "Unit Testing", "Dev Tools"),
    (70, "Kubernetes", "Dev Tools"),
    (71, "CIFOR-ICRAF", "CIFOR"),
];

#[derive(Clone, Debug)]
pub struct Catalog {
    items: Vec<Item>,
}

impl Catalog {
    pub fn new(items: Vec<Item>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::with_capacity(items.len());
        for item in &items {
            if item.name.trim().is_empty() {
                return Err(CatalogError::EmptyName(item.id));
            }
            if !seen.insert(item.id) {
                return Err(CatalogError::DuplicateId(item.id));
            }
        }
        Ok(Self { items })
    }

    pub fn builtin() -> Self {
        let items = BUILTIN_ITEMS
            .iter()
            .map(|&(id, name, category)| Item {
                id,
                name: name.to_string(),
                image: format!("/images/{id}.png"),
                category: category.to_string(),
                taboo_words: Vec::new(),
            })
            .collect();
        Self { items }
    }

    pub fn from_json(text: &str) -> Result<Self, CatalogError> {
        let items: Vec<Item> =
            serde_json::from_str(text).map_err(|error| CatalogError::Parse(error.to_string()))?;
        debug!(count = items.len(), "parsed catalog");
        Self::new(items)
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn categories(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for item in &self.items {
            if !out.contains(&item.category.as_str()) {
                out.push(&item.category);
            }
        }
        out
    }

    pub fn filter_category(&self, category: &str) -> Self {
        Self {
            items: self
                .items
                .iter()
                .filter(|item| item.category == category)
                .cloned()
                .collect(),
        }
    }
}

/// Returns a shuffled copy, leaving `items` untouched.
pub fn shuffled<T: Clone>(items: &[T], rng: &mut Rng) -> Vec<T> {
    let mut out = items.to_vec();
    rng.shuffle(&mut out);
    out
}
