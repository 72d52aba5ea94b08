//! JSON description of an in-memory layered document.
//!
//! ```json
//! {
//!   "name": "hero.psd",
//!   "width": 100, "height": 100,
//!   "ruler_origin": [0, 0],
//!   "layers": [
//!     { "name": "Head", "fill": { "rect": [10, 20, 30, 60], "color": "#ff0000" } },
//!     { "name": "Arm [bone]", "layers": [ ... ] }
//!   ]
//! }
//! ```
//!
//! Layers are listed top first, as in a layers panel. An entry with a `layers` array is a group.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::backend::{BlendMode, ColorMode, LayerKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentDef {
    pub name: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub ruler_origin: [f64; 2],
    #[serde(default)]
    pub mode: ColorMode,
    #[serde(default)]
    pub layers: Vec<LayerDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerDef {
    pub name: String,
    #[serde(default = "yes")]
    pub visible: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub background: bool,
    #[serde(default)]
    pub clipping: bool,
    #[serde(default)]
    pub selected: bool,
    /// Layer style effects are present.
    #[serde(default)]
    pub effects: bool,
    /// Defaults to `normal` for layers and `pass_through` for groups.
    #[serde(default)]
    pub blend: Option<BlendMode>,
    #[serde(default)]
    pub kind: KindDef,
    #[serde(default)]
    pub fill: Option<FillDef>,
    #[serde(default)]
    pub image: Option<ImageDef>,
    /// Present for groups, even when empty.
    #[serde(default)]
    pub layers: Option<Vec<LayerDef>>,
}

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KindDef {
    #[default]
    Pixel,
    Adjustment,
    Text,
    Shape,
    SmartObject,
    Other,
}

impl From<KindDef> for LayerKind {
    fn from(k: KindDef) -> Self {
        match k {
            KindDef::Pixel => Self::Pixel,
            KindDef::Adjustment => Self::Adjustment,
            KindDef::Text => Self::Text,
            KindDef::Shape => Self::Shape,
            KindDef::SmartObject => Self::SmartObject,
            KindDef::Other => Self::Other,
        }
    }
}

/// Solid rectangle `[left, top, right, bottom]` in canvas pixels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FillDef {
    pub rect: [f64; 4],
    pub color: ColorDef,
}

/// PNG placed with its top-left corner at `offset`. Relative paths resolve against the
/// document folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageDef {
    pub source: PathBuf,
    #[serde(default)]
    pub offset: [i64; 2],
}

/// Straight (non-premultiplied) RGBA8 colour, written as `"#RRGGBB"`, `"#RRGGBBAA"` or an
/// `[r, g, b]` / `[r, g, b, a]` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColorDef(pub [u8; 4]);

impl ColorDef {
    /// Premultiplied RGBA8.
    pub fn premultiplied(self) -> [u8; 4] {
        let [r, g, b, a] = self.0;
        let scale = |c: u8| ((u16::from(c) * u16::from(a) + 127) / 255) as u8;
        [scale(r), scale(g), scale(b), a]
    }
}

impl<'de> Deserialize<'de> for ColorDef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Hex(String),
            Arr(Vec<u8>),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Hex(s) => parse_hex(&s).map_err(serde::de::Error::custom),
            Repr::Arr(v) => match v.as_slice() {
                [r, g, b] => Ok(Self([*r, *g, *b, 255])),
                [r, g, b, a] => Ok(Self([*r, *g, *b, *a])),
                _ => Err(serde::de::Error::custom(
                    "rgba array must have len 3 ([r,g,b]) or 4 ([r,g,b,a])",
                )),
            },
        }
    }
}

fn parse_hex(s: &str) -> Result<ColorDef, String> {
    let s = s.trim();
    let s = s.strip_prefix('#').unwrap_or(s);

    fn hex_byte(pair: &str) -> Result<u8, String> {
        u8::from_str_radix(pair, 16).map_err(|_| format!("invalid hex byte \"{pair}\""))
    }

    if !s.is_ascii() {
        return Err("hex color must be ASCII".to_owned());
    }
    match s.len() {
        6 => Ok(ColorDef([
            hex_byte(&s[0..2])?,
            hex_byte(&s[2..4])?,
            hex_byte(&s[4..6])?,
            255,
        ])),
        8 => Ok(ColorDef([
            hex_byte(&s[0..2])?,
            hex_byte(&s[2..4])?,
            hex_byte(&s[4..6])?,
            hex_byte(&s[6..8])?,
        ])),
        _ => Err("hex color must be #RRGGBB or #RRGGBBAA (case-insensitive)".to_owned()),
    }
}
