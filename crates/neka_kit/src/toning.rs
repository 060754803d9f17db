//! Toning resolution: toning id -> ordered colour variants.
//!
//! Each filter of a toning becomes one [`ColorVariant`], labelled by the colour of its
//! last gradient stop (`#ff0000` -> `FF0000`). Labels are folder names, so they must be
//! unique within a toning. A repeated label gets a numeric suffix (`FF0000_2`,
//! `FF0000_3`, ...) instead of being dropped, so every filter keeps its own folder.

use std::collections::{HashMap, HashSet};

use crate::document::{Filter, GradientStop, Toning};

/// Code of the synthetic variant used when no toning applies. Files for it are written
/// to the render-layer folder itself rather than a subfolder.
pub const DEFAULT_COLOR_CODE: &str = "default";

#[derive(Debug, Clone, PartialEq)]
pub struct ColorVariant {
    pub code: String,
    pub stops: Vec<GradientStop>,
}

impl ColorVariant {
    /// The uncoloured variant: no gradient, written to the folder root.
    pub fn uncolored() -> Self {
        Self {
            code: DEFAULT_COLOR_CODE.to_string(),
            stops: Vec::new(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.code == DEFAULT_COLOR_CODE
    }
}

/// Folder label for a filter: the last stop's colour without `#`, upper-cased, reduced to
/// `[0-9A-Z_-]`. Filters without stops are `"default"`.
pub fn color_code(filter: &Filter) -> String {
    let Some(last) = filter.gradients.last() else {
        return DEFAULT_COLOR_CODE.to_string();
    };

    let code: String = last
        .color
        .trim()
        .trim_start_matches('#')
        .to_ascii_uppercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();

    if code.is_empty() {
        "color".to_string()
    } else {
        code
    }
}

fn unique_code(code: String, taken: &mut HashSet<String>) -> String {
    if taken.insert(code.clone()) {
        return code;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{code}_{n}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// All tonings of a kit, resolved to colour variants.
#[derive(Debug, Clone, Default)]
pub struct ToningTable {
    variants: HashMap<String, Vec<ColorVariant>>,
}

impl ToningTable {
    pub fn build(tonings: &[Toning]) -> Self {
        let mut variants = HashMap::with_capacity(tonings.len());
        for toning in tonings {
            if variants.contains_key(&toning.id) {
                tracing::warn!("Duplicate toning id {}, keeping the first", toning.id);
                continue;
            }

            let mut taken = HashSet::new();
            let colors: Vec<ColorVariant> = toning
                .filters
                .iter()
                .map(|filter| ColorVariant {
                    code: unique_code(color_code(filter), &mut taken),
                    stops: filter.gradients.clone(),
                })
                .collect();
            variants.insert(toning.id.clone(), colors);
        }

        tracing::info!("Loaded {} tonings", variants.len());
        Self { variants }
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Variants of a toning, or `None` if the id is unknown or the toning has no filters.
    pub fn get(&self, id: &str) -> Option<&[ColorVariant]> {
        self.variants
            .get(id)
            .map(Vec::as_slice)
            .filter(|v| !v.is_empty())
    }

    /// Variants of the first candidate id that resolves, else the single uncoloured
    /// variant.
    pub fn resolve<'a>(
        &self,
        candidates: impl IntoIterator<Item = Option<&'a str>>,
    ) -> Vec<ColorVariant> {
        candidates
            .into_iter()
            .flatten()
            .find_map(|id| self.get(id))
            .map(<[ColorVariant]>::to_vec)
            .unwrap_or_else(|| vec![ColorVariant::uncolored()])
    }
}
