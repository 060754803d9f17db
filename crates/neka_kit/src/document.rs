//! Typed kit document.
//!
//! The decompressed payload is loosely typed JSON: ids show up as strings or numbers,
//! items are sometimes a bare layer instead of a list, and toning tables occasionally
//! contain stray strings. [`KitDocument::from_value`] runs once at the boundary and either
//! coerces each node into the model below or skips it, recording a [`FormatIssue`]. Nothing
//! downstream inspects raw JSON.
//!
//! Skipping never shifts positions that matter for the output layout. A part keeps its
//! original index (the `Y` coordinate), and an item keeps its slot even when all of its
//! layers were rejected.

use neka_vocab::base62;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Canvas size used when no layer in the kit carries `crop.ow/oh`.
pub const DEFAULT_CANVAS: CanvasSize = CanvasSize {
    width: 1436,
    height: 1902,
};

/// Largest canvas side accepted from a document.
pub const MAX_CANVAS_SIDE: u32 = 16_384;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl CanvasSize {
    /// `None` unless both sides are in `1..=MAX_CANVAS_SIDE`.
    pub fn checked(width: u32, height: u32) -> Option<Self> {
        let valid = |side: u32| (1..=MAX_CANVAS_SIDE).contains(&side);
        (valid(width) && valid(height)).then_some(Self { width, height })
    }
}

/// A schema violation found during normalization. The offending node was skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatIssue {
    /// Location in the document, e.g. `data.parts[2].items[0][1]`.
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KitDocument {
    pub id: Option<String>,
    pub name: Option<String>,
    pub parts: Vec<Part>,
    pub tonings: Vec<Toning>,
    /// Ids of the `layerHeights` table, by position. `None` for entries without an id.
    pub layer_heights: Vec<Option<String>>,
    pub issues: Vec<FormatIssue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    /// Position in the source `parts` array.
    pub index: usize,
    pub id: Option<String>,
    pub name: String,
    pub z_index: i64,
    pub layer_height: Option<String>,
    pub cover: Option<String>,
    pub toning: Option<String>,
    pub main_layer_toning: Option<String>,
    pub addon_layers: Vec<AddonLayer>,
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddonLayer {
    pub id: String,
    pub toning: Option<String>,
}

/// One selectable option of a part: the layers drawn together for it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Item {
    pub layers: Vec<Layer>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Layer {
    pub blob: Option<String>,
    pub thumbnail: Option<String>,
    pub crop: Option<Crop>,
    pub toning: Option<String>,
    pub addon_textures: Vec<AddonTexture>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddonTexture {
    pub blob: String,
    /// Id of the [`AddonLayer`] this texture is drawn on.
    pub layer: Option<String>,
    pub crop: Option<Crop>,
}

/// Placement of a cropped image inside the original canvas.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Crop {
    pub x: i64,
    pub y: i64,
    pub w: u32,
    pub h: u32,
    pub ow: Option<u32>,
    pub oh: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Toning {
    pub id: String,
    pub name: Option<String>,
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    pub gradients: Vec<GradientStop>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradientStop {
    pub offset: Offset,
    pub color: String,
}

/// A gradient stop offset, either numeric or in its packed textual form.
#[derive(Debug, Clone, PartialEq)]
pub enum Offset {
    Number(f64),
    Text(String),
}

impl Offset {
    /// Resolve to a float. `"0.xyz"` is a base-62 fraction, other strings are parsed as
    /// decimals, and anything unparseable is `0.0`.
    pub fn value(&self) -> f64 {
        match self {
            Offset::Number(n) => *n,
            Offset::Text(s) if s.starts_with("0.") => base62::decode_fraction(s),
            Offset::Text(s) => s.trim().parse().unwrap_or(0.0),
        }
    }
}

impl Item {
    pub fn first_layer(&self) -> Option<&Layer> {
        self.layers.first()
    }

    /// Thumbnail blob: the first layer's `thumbnail`, else its `blob`.
    pub fn thumbnail_blob(&self) -> Option<&str> {
        let layer = self.first_layer()?;
        layer.thumbnail.as_deref().or(layer.blob.as_deref())
    }

    /// Total number of drawable assets across main layers and addon textures.
    pub fn drawable_count(&self) -> usize {
        self.layers
            .iter()
            .map(|l| usize::from(l.blob.is_some()) + l.addon_textures.len())
            .sum()
    }
}

impl KitDocument {
    /// Normalize a decompressed kit.
    ///
    /// The kit fields are read from the root's `data` object, or from the root itself when
    /// it already holds `parts`. Anything else is an [`Error::InvalidDocument`].
    pub fn from_value(root: &Value) -> Result<Self> {
        let Some(root_obj) = root.as_object() else {
            return Err(Error::InvalidDocument("root is not an object".to_string()));
        };

        let (data, prefix) = match root_obj.get("data") {
            Some(Value::Object(data)) => (data, "data."),
            _ if root_obj.contains_key("parts") => (root_obj, ""),
            _ => {
                return Err(Error::InvalidDocument(
                    "no 'data' object with parts".to_string(),
                ))
            }
        };

        let mut n = Normalizer::default();
        let parts = n.parts(data.get("parts"), &format!("{prefix}parts"));
        let tonings = n.tonings(data.get("tonings"), &format!("{prefix}tonings"));
        let layer_heights = match data.get("layerHeights") {
            Some(Value::Array(entries)) => entries
                .iter()
                .map(|e| match e {
                    Value::Object(obj) => id_of(obj.get("id")),
                    other => id_of(Some(other)),
                })
                .collect(),
            _ => Vec::new(),
        };

        Ok(Self {
            id: id_of(root_obj.get("id")),
            name: root_obj.get("name").and_then(Value::as_str).map(str::to_string),
            parts,
            tonings,
            layer_heights,
            issues: n.issues,
        })
    }

    /// Position of a `layerHeight` id in the kit's `layerHeights` table.
    pub fn layer_height_index(&self, id: &str) -> Option<usize> {
        self.layer_heights
            .iter()
            .position(|lh| lh.as_deref() == Some(id))
    }

    /// Canvas size from the first layer exposing both `crop.ow` and `crop.oh`.
    pub fn canvas_size(&self, fallback: CanvasSize) -> CanvasSize {
        self.parts
            .iter()
            .flat_map(|p| p.items.iter())
            .flat_map(|i| i.layers.iter())
            .filter_map(|l| l.crop)
            .find_map(|c| CanvasSize::checked(c.ow?, c.oh?))
            .unwrap_or(fallback)
    }
}

#[derive(Default)]
struct Normalizer {
    issues: Vec<FormatIssue>,
}

impl Normalizer {
    fn issue(&mut self, path: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("Skipping {}: {}", path, message);
        self.issues.push(FormatIssue {
            path: path.to_string(),
            message,
        });
    }

    fn array<'a>(&mut self, value: Option<&'a Value>, path: &str) -> &'a [Value] {
        match value {
            Some(Value::Array(items)) => items,
            None | Some(Value::Null) => &[],
            Some(_) => {
                self.issue(path, "expected an array");
                &[]
            }
        }
    }

    /// A crop whose original size is out of range keeps its offset but loses `ow/oh`.
    fn crop(&mut self, value: Option<&Value>, path: &str) -> Option<Crop> {
        let mut crop = crop_of(value?)?;
        if crop.ow.into_iter().chain(crop.oh).any(|side| side > MAX_CANVAS_SIDE) {
            self.issue(
                &format!("{path}.crop"),
                format!("canvas size exceeds {MAX_CANVAS_SIDE} pixels, ignored"),
            );
            crop.ow = None;
            crop.oh = None;
        }
        Some(crop)
    }

    fn parts(&mut self, value: Option<&Value>, path: &str) -> Vec<Part> {
        let entries = self.array(value, path);
        let mut parts = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let path = format!("{path}[{index}]");
            match entry {
                Value::Object(obj) => parts.push(self.part(index, obj, &path)),
                _ => self.issue(&path, "part is not an object"),
            }
        }
        parts
    }

    fn part(&mut self, index: usize, obj: &Map<String, Value>, path: &str) -> Part {
        let z_index = match obj.get("zIndex") {
            None | Some(Value::Null) => 0,
            Some(v) => int_of(v).unwrap_or_else(|| {
                self.issue(&format!("{path}.zIndex"), "not a number, using 0");
                0
            }),
        };

        let addon_path = format!("{path}.addonLayers");
        let addon_layers = self
            .array(obj.get("addonLayers"), &addon_path)
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| {
                let id = entry.as_object().and_then(|o| id_of(o.get("id")));
                match id {
                    Some(id) => Some(AddonLayer {
                        id,
                        toning: entry.get("toning").and_then(|t| id_of(Some(t))),
                    }),
                    None => {
                        self.issue(&format!("{addon_path}[{i}]"), "addon layer without id");
                        None
                    }
                }
            })
            .collect();

        let items_path = format!("{path}.items");
        let items = self
            .array(obj.get("items"), &items_path)
            .iter()
            .enumerate()
            .map(|(i, entry)| self.item(entry, &format!("{items_path}[{i}]")))
            .collect();

        Part {
            index,
            id: id_of(obj.get("id")),
            name: obj
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("unnamed")
                .to_string(),
            z_index,
            layer_height: id_of(obj.get("layerHeight")),
            cover: id_of(obj.get("cover")),
            toning: id_of(obj.get("toning")),
            main_layer_toning: id_of(obj.get("mainLayerToning")),
            addon_layers,
            items,
        }
    }

    fn item(&mut self, value: &Value, path: &str) -> Item {
        let entries: &[Value] = match value {
            Value::Array(entries) => entries,
            Value::Null => {
                self.issue(path, "item is null");
                &[]
            }
            single => std::slice::from_ref(single),
        };

        let mut layers = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            let layer_path = format!("{path}[{i}]");
            match entry {
                Value::Object(obj) => layers.push(self.layer(obj, &layer_path)),
                _ => self.issue(&layer_path, "layer is not an object"),
            }
        }
        Item { layers }
    }

    fn layer(&mut self, obj: &Map<String, Value>, path: &str) -> Layer {
        let textures_path = format!("{path}.addonTextures");
        let addon_textures = self
            .array(obj.get("addonTextures"), &textures_path)
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| {
                let tex = entry.as_object();
                match tex.and_then(|t| id_of(t.get("blob"))) {
                    Some(blob) => Some(AddonTexture {
                        blob,
                        layer: tex.and_then(|t| id_of(t.get("layer"))),
                        crop: self.crop(
                            tex.and_then(|t| t.get("crop")),
                            &format!("{textures_path}[{i}]"),
                        ),
                    }),
                    None => {
                        self.issue(&format!("{textures_path}[{i}]"), "addon texture without blob");
                        None
                    }
                }
            })
            .collect();

        Layer {
            blob: id_of(obj.get("blob")),
            thumbnail: id_of(obj.get("thumbnail")),
            crop: self.crop(obj.get("crop"), path),
            toning: id_of(obj.get("toning")),
            addon_textures,
        }
    }

    fn tonings(&mut self, value: Option<&Value>, path: &str) -> Vec<Toning> {
        let entries = self.array(value, path);
        let mut tonings = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            let path = format!("{path}[{i}]");
            let Some(obj) = entry.as_object() else {
                self.issue(&path, "toning is not an object");
                continue;
            };
            let Some(id) = id_of(obj.get("id")) else {
                self.issue(&path, "toning without id");
                continue;
            };

            let filters_path = format!("{path}.filters");
            let filters = self
                .array(obj.get("filters"), &filters_path)
                .iter()
                .enumerate()
                .filter_map(|(fi, f)| match f.as_object() {
                    Some(f) => Some(Filter {
                        gradients: f
                            .get("gradients")
                            .and_then(Value::as_array)
                            .map(|stops| stops.iter().filter_map(stop_of).collect())
                            .unwrap_or_default(),
                    }),
                    None => {
                        self.issue(&format!("{filters_path}[{fi}]"), "filter is not an object");
                        None
                    }
                })
                .collect();

            tonings.push(Toning {
                id,
                name: obj.get("name").and_then(Value::as_str).map(str::to_string),
                filters,
            });
        }
        tonings
    }
}

/// Ids arrive as strings or numbers; empty strings count as absent.
fn id_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn int_of(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn dim_of(value: Option<&Value>) -> Option<u32> {
    value
        .and_then(int_of)
        .and_then(|v| u32::try_from(v).ok())
}

fn crop_of(value: &Value) -> Option<Crop> {
    let obj = value.as_object()?;
    Some(Crop {
        x: obj.get("x").and_then(int_of).unwrap_or(0),
        y: obj.get("y").and_then(int_of).unwrap_or(0),
        w: dim_of(obj.get("w")).unwrap_or(0),
        h: dim_of(obj.get("h")).unwrap_or(0),
        ow: dim_of(obj.get("ow")),
        oh: dim_of(obj.get("oh")),
    })
}

fn stop_of(value: &Value) -> Option<GradientStop> {
    let obj = value.as_object()?;
    let color = obj.get("color")?.as_str()?.to_string();
    let offset = match obj.get("offset") {
        Some(Value::Number(n)) => Offset::Number(n.as_f64().unwrap_or(0.0)),
        Some(Value::String(s)) => Offset::Text(s.clone()),
        _ => Offset::Number(0.0),
    };
    Some(GradientStop { offset, color })
}
