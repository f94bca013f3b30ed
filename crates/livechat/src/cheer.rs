use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::message::{CheerToken, MessageSegment};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheermoteTier {
    pub prefix: String,
    pub min_bits: u32,
    pub color: String,
    pub static_url: String,
    pub animated_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelixCheermoteResponse {
    pub data: Vec<HelixCheermote>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelixCheermote {
    pub prefix: String,
    pub tiers: Vec<HelixCheermoteTier>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelixCheermoteTier {
    pub min_bits: u32,
    #[serde(default)]
    pub color: String,
    pub images: HelixCheermoteImages,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelixCheermoteImages {
    pub dark: HelixCheermoteThemes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelixCheermoteThemes {
    #[serde(rename = "static")]
    pub still: HashMap<String, String>,
    pub animated: HashMap<String, String>,
}

/// Cheermote tiers keyed by lowercased prefix, each list ascending by
/// `min_bits`.
#[derive(Debug, Clone, Default)]
pub struct CheermoteTable {
    tiers: HashMap<String, Vec<CheermoteTier>>,
}

impl CheermoteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tier: CheermoteTier) {
        let list = self
            .tiers
            .entry(tier.prefix.to_lowercase())
            .or_insert_with(Vec::new);
        list.push(tier);
        list.sort_by_key(|tier| tier.min_bits);
    }

    pub fn tiers(&self, prefix: &str) -> Option<&[CheermoteTier]> {
        self.tiers.get(&prefix.to_lowercase()).map(Vec::as_slice)
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.tiers.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub fn from_helix(response: &HelixCheermoteResponse) -> Self {
        let mut table = Self::new();
        for cheermote in &response.data {
            for tier in &cheermote.tiers {
                table.insert(CheermoteTier {
                    prefix: cheermote.prefix.clone(),
                    min_bits: tier.min_bits,
                    color: tier.color.clone(),
                    static_url: largest_scale(&tier.images.dark.still),
                    animated_url: largest_scale(&tier.images.dark.animated),
                });
            }
        }
        table
    }
}

fn largest_scale(images: &HashMap<String, String>) -> String {
    images
        .iter()
        .filter_map(|(scale, url)| scale.parse::<f32>().ok().map(|value| (value, url)))
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, url)| url.clone())
        .unwrap_or_default()
}

/// Tier with the greatest `min_bits` not above `bits`; when every tier is
/// above `bits`, the lowest tier.
pub fn select_tier(tiers: &[CheermoteTier], bits: u32) -> Option<&CheermoteTier> {
    tiers
        .iter()
        .filter(|tier| tier.min_bits <= bits)
        .max_by_key(|tier| tier.min_bits)
        .or_else(|| tiers.iter().min_by_key(|tier| tier.min_bits))
}

#[derive(Debug, Clone)]
pub struct CheerResolver {
    table: CheermoteTable,
    pattern: Option<Regex>,
}

impl Default for CheerResolver {
    fn default() -> Self {
        Self::new(CheermoteTable::new())
    }
}

impl CheerResolver {
    pub fn new(table: CheermoteTable) -> Self {
        let pattern = build_pattern(&table);
        Self { table, pattern }
    }

    pub fn table(&self) -> &CheermoteTable {
        &self.table
    }

    /// Splits `message` into text and cheer tokens. Tokens with an unknown
    /// prefix or a bit count that does not fit in `u32` stay as text.
    pub fn resolve(&self, message: &str) -> Vec<MessageSegment> {
        let Some(pattern) = &self.pattern else {
            return text_segments(message);
        };

        let mut segments = Vec::new();
        let mut cursor = 0;
        for caps in pattern.captures_iter(message) {
            let (Some(whole), Some(prefix), Some(digits)) = (caps.get(0), caps.get(1), caps.get(2))
            else {
                continue;
            };
            let Ok(bits) = digits.as_str().parse::<u32>() else {
                debug!(target: "livechat::cheer", token = whole.as_str(), "cheer amount out of range");
                continue;
            };
            let Some(tier) = self
                .table
                .tiers(prefix.as_str())
                .and_then(|tiers| select_tier(tiers, bits))
            else {
                continue;
            };
            if whole.start() > cursor {
                segments.push(MessageSegment::text(&message[cursor..whole.start()]));
            }
            segments.push(MessageSegment::Cheer(CheerToken {
                bits,
                text: whole.as_str().to_string(),
                tier: tier.clone(),
            }));
            cursor = whole.end();
        }
        if cursor < message.len() {
            segments.push(MessageSegment::text(&message[cursor..]));
        }
        segments
    }

    /// Runs [`resolve`](Self::resolve) over the text segments of an already
    /// tokenized message, leaving emotes untouched.
    pub fn expand(&self, segments: Vec<MessageSegment>) -> Vec<MessageSegment> {
        if self.pattern.is_none() {
            return segments;
        }
        segments
            .into_iter()
            .flat_map(|segment| match segment {
                MessageSegment::Text(text) => self.resolve(&text),
                other => vec![other],
            })
            .collect()
    }
}

fn text_segments(message: &str) -> Vec<MessageSegment> {
    if message.is_empty() {
        Vec::new()
    } else {
        vec![MessageSegment::text(message)]
    }
}

fn build_pattern(table: &CheermoteTable) -> Option<Regex> {
    if table.is_empty() {
        return None;
    }
    let mut prefixes: Vec<&str> = table.prefixes().collect();
    // longest first so `cheerwhal` is not shadowed by `cheer`
    prefixes.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    let alternation = prefixes
        .iter()
        .map(|prefix| regex::escape(prefix))
        .collect::<Vec<_>>()
        .join("|");
    match Regex::new(&format!(r"(?i)\b({alternation})(\d+)\b")) {
        Ok(pattern) => Some(pattern),
        Err(err) => {
            warn!(target: "livechat::cheer", %err, "failed to compile cheermote pattern");
            None
        }
    }
}
