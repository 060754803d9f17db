//! Render-layer planning.
//!
//! Every part yields one main render layer plus one per addon layer. All render layers of
//! a kit are ranked once by `(base sort key, part index, sub-order)`; the rank gives the
//! folder's `X`, the part's source position gives its `Y`.
//!
//! Item numbering is positional: item `k` of a part is always file `k + 1`, in every
//! render layer and colour folder of that part, whether or not the item has an asset
//! there. Gaps are expected.

use crate::document::{Crop, Item, KitDocument, Part};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderLayerKind {
    Main,
    Addon { id: String, toning: Option<String> },
}

/// One output folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderLayer {
    /// Position of the part in [`KitDocument::parts`].
    pub part: usize,
    /// Source index of the part (`Y - 1`).
    pub part_index: usize,
    /// `layerHeights` position of the part, else its `zIndex`.
    pub base_sort_key: i64,
    /// `0` for the main layer, `1..=N` for addon layers in definition order.
    pub sub_order: usize,
    /// 1-based global rank.
    pub x: usize,
    pub kind: RenderLayerKind,
}

impl RenderLayer {
    pub fn y(&self) -> usize {
        self.part_index + 1
    }

    pub fn folder_name(&self) -> String {
        folder_name(self.x, self.y())
    }

    /// Toning ids to try, in order, for this layer's colour variants.
    ///
    /// The main layer uses the part's `toning`, then `mainLayerToning`, then the first
    /// toning set on any of its item layers. An addon layer only uses its own toning.
    pub fn toning_candidates<'a>(&'a self, part: &'a Part) -> Vec<Option<&'a str>> {
        match &self.kind {
            RenderLayerKind::Main => {
                let layer_toning = part
                    .items
                    .iter()
                    .flat_map(|item| item.layers.iter())
                    .find_map(|layer| layer.toning.as_deref());
                vec![
                    part.toning.as_deref(),
                    part.main_layer_toning.as_deref(),
                    layer_toning,
                ]
            }
            RenderLayerKind::Addon { toning, .. } => vec![toning.as_deref()],
        }
    }
}

pub fn folder_name(x: usize, y: usize) -> String {
    format!("{x}-{y}")
}

/// Derive and rank the render layers of a kit.
pub fn plan_render_layers(doc: &KitDocument) -> Vec<RenderLayer> {
    let mut layers = Vec::new();
    for (position, part) in doc.parts.iter().enumerate() {
        let base_sort_key = part
            .layer_height
            .as_deref()
            .and_then(|id| doc.layer_height_index(id))
            .map(|i| i as i64)
            .unwrap_or(part.z_index);

        layers.push(RenderLayer {
            part: position,
            part_index: part.index,
            base_sort_key,
            sub_order: 0,
            x: 0,
            kind: RenderLayerKind::Main,
        });
        for (i, addon) in part.addon_layers.iter().enumerate() {
            layers.push(RenderLayer {
                part: position,
                part_index: part.index,
                base_sort_key,
                sub_order: i + 1,
                x: 0,
                kind: RenderLayerKind::Addon {
                    id: addon.id.clone(),
                    toning: addon.toning.clone(),
                },
            });
        }
    }

    layers.sort_by_key(|l| (l.base_sort_key, l.part_index, l.sub_order));
    for (rank, layer) in layers.iter_mut().enumerate() {
        layer.x = rank + 1;
    }
    layers
}

/// A drawable asset of an item within one render layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Asset<'a> {
    pub blob: &'a str,
    pub crop: Option<Crop>,
}

/// The assets one item contributes to one render layer, and the file number they go to.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSlot<'a> {
    pub number: u32,
    pub item: &'a Item,
    pub assets: Vec<Asset<'a>>,
}

/// Assets of `item` belonging to the render layer `kind`.
pub fn assets_for<'a>(item: &'a Item, kind: &RenderLayerKind) -> Vec<Asset<'a>> {
    match kind {
        RenderLayerKind::Main => item
            .layers
            .iter()
            .filter_map(|layer| {
                layer.blob.as_deref().map(|blob| Asset {
                    blob,
                    crop: layer.crop,
                })
            })
            .collect(),
        RenderLayerKind::Addon { id, .. } => item
            .layers
            .iter()
            .flat_map(|layer| layer.addon_textures.iter())
            .filter(|tex| tex.layer.as_deref() == Some(id.as_str()))
            .map(|tex| Asset {
                blob: &tex.blob,
                crop: tex.crop,
            })
            .collect(),
    }
}

/// Number every item of a part for one render layer.
pub fn plan_slots<'a>(items: &'a [Item], kind: &RenderLayerKind) -> Vec<ItemSlot<'a>> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| ItemSlot {
            number: (i + 1) as u32,
            item,
            assets: assets_for(item, kind),
        })
        .collect()
}
