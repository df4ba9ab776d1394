//! Wardrobe domain records: garments, outfits, and the body-slot taxonomy

use crate::color::{is_valid_hex, NEUTRAL_FALLBACK_HEX};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Garment category assigned by the caller after a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Top,
    Bottom,
    OnePiece,
    Shoe,
    Headwear,
    Accessory,
    Bag,
    Other,
}

impl Category {
    /// All categories, in display order
    #[must_use]
    pub const fn all() -> [Self; 8] {
        [
            Self::Top,
            Self::Bottom,
            Self::OnePiece,
            Self::Shoe,
            Self::Headwear,
            Self::Accessory,
            Self::Bag,
            Self::Other,
        ]
    }

    /// The body slot this category routes into (total mapping, one slot each)
    #[must_use]
    pub const fn body_slot(self) -> BodySlot {
        match self {
            Self::Headwear => BodySlot::Headwear,
            Self::Top | Self::OnePiece => BodySlot::Top,
            Self::Bottom => BodySlot::Bottom,
            Self::Shoe => BodySlot::Shoes,
            Self::Accessory | Self::Bag | Self::Other => BodySlot::Accessory,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Top => "top",
            Self::Bottom => "bottom",
            Self::OnePiece => "one-piece",
            Self::Shoe => "shoe",
            Self::Headwear => "headwear",
            Self::Accessory => "accessory",
            Self::Bag => "bag",
            Self::Other => "other",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for Category {
    type Err = crate::error::ClosetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "top" => Ok(Self::Top),
            "bottom" => Ok(Self::Bottom),
            "one-piece" | "onepiece" | "dress" => Ok(Self::OnePiece),
            "shoe" | "shoes" => Ok(Self::Shoe),
            "headwear" | "hat" => Ok(Self::Headwear),
            "accessory" => Ok(Self::Accessory),
            "bag" => Ok(Self::Bag),
            "other" => Ok(Self::Other),
            other => Err(crate::error::ClosetError::invalid_config(format!(
                "Unknown category '{other}'"
            ))),
        }
    }
}

/// Outfit composition slots, in top-to-bottom wear order
///
/// A closed taxonomy: every [`Category`] maps into exactly one slot, so a
/// garment can occupy only one position in an outfit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BodySlot {
    Headwear,
    Top,
    Bottom,
    Shoes,
    Accessory,
}

impl BodySlot {
    /// All slots, in wear order
    #[must_use]
    pub const fn all() -> [Self; 5] {
        [
            Self::Headwear,
            Self::Top,
            Self::Bottom,
            Self::Shoes,
            Self::Accessory,
        ]
    }

    /// The fixed set of categories routed into this slot
    #[must_use]
    pub const fn categories(self) -> &'static [Category] {
        match self {
            Self::Headwear => &[Category::Headwear],
            Self::Top => &[Category::Top, Category::OnePiece],
            Self::Bottom => &[Category::Bottom],
            Self::Shoes => &[Category::Shoe],
            Self::Accessory => &[Category::Accessory, Category::Bag, Category::Other],
        }
    }
}

impl std::fmt::Display for BodySlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Headwear => "headwear",
            Self::Top => "top",
            Self::Bottom => "bottom",
            Self::Shoes => "shoes",
            Self::Accessory => "accessory",
        };
        write!(f, "{name}")
    }
}

/// One scanned clothing item: composited cutout, swatch color, category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GarmentRecord {
    /// Unique record id
    pub id: Uuid,
    /// Encoded (PNG) composited image with background removed
    pub image_bytes: Vec<u8>,
    /// Caller-assigned category
    pub category: Category,
    /// Representative swatch color, always a valid `#RRGGBB` string
    pub color: String,
    /// Creation time, drives descending read order
    pub created_at: DateTime<Utc>,
}

impl GarmentRecord {
    /// Create a record with a fresh id and the current timestamp
    ///
    /// An invalid `color` is replaced by the neutral sentinel so the
    /// always-valid-hex invariant holds no matter what the caller passes.
    #[must_use]
    pub fn new(image_bytes: Vec<u8>, category: Category, color: impl Into<String>) -> Self {
        let color = color.into();
        let color = if is_valid_hex(&color) {
            color
        } else {
            NEUTRAL_FALLBACK_HEX.to_string()
        };

        Self {
            id: Uuid::new_v4(),
            image_bytes,
            category,
            color,
            created_at: Utc::now(),
        }
    }

    /// Replace image and color in place, keeping id and creation time
    ///
    /// Used when background re-processing finishes after the record was
    /// first stored.
    pub fn reprocess(&mut self, image_bytes: Vec<u8>, color: impl Into<String>) {
        self.image_bytes = image_bytes;
        let color = color.into();
        self.color = if is_valid_hex(&color) {
            color
        } else {
            NEUTRAL_FALLBACK_HEX.to_string()
        };
    }
}

/// A chosen combination of garments across body slots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutfitRecord {
    /// Unique record id
    pub id: Uuid,
    /// Referenced garments in wear order, at most one per body slot
    ///
    /// Entries may dangle after a garment is deleted; readers skip missing
    /// ids instead of erroring.
    pub garment_ids: Vec<Uuid>,
    /// Optional display name
    pub name: Option<String>,
    /// Optional free-form description
    pub description: Option<String>,
    /// Optional rendered composite thumbnail (encoded image)
    pub thumbnail: Option<Vec<u8>>,
    /// Creation time, drives descending read order
    pub created_at: DateTime<Utc>,
}

impl OutfitRecord {
    /// Start building an outfit slot by slot
    #[must_use]
    pub fn builder() -> OutfitBuilder {
        OutfitBuilder::default()
    }
}

/// Builder assembling an [`OutfitRecord`] one body slot at a time
///
/// Slots are a map, so assigning the same slot twice replaces the earlier
/// garment; duplicate slots in one outfit are impossible by construction.
#[derive(Debug, Default)]
pub struct OutfitBuilder {
    slots: BTreeMap<BodySlot, Uuid>,
    name: Option<String>,
    description: Option<String>,
    thumbnail: Option<Vec<u8>>,
}

impl OutfitBuilder {
    /// Assign a garment id to an explicit slot
    #[must_use]
    pub fn slot(mut self, slot: BodySlot, garment_id: Uuid) -> Self {
        self.slots.insert(slot, garment_id);
        self
    }

    /// Assign a garment, routing it by its category's slot
    #[must_use]
    pub fn garment(self, garment: &GarmentRecord) -> Self {
        self.slot(garment.category.body_slot(), garment.id)
    }

    /// Set the display name
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the description
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach a rendered composite thumbnail
    #[must_use]
    pub fn thumbnail(mut self, thumbnail: Vec<u8>) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }

    /// Finish the record with a fresh id and the current timestamp
    ///
    /// # Errors
    /// Returns `ClosetError::InvalidConfig` when no slot was assigned.
    pub fn build(self) -> crate::Result<OutfitRecord> {
        if self.slots.is_empty() {
            return Err(crate::error::ClosetError::invalid_config(
                "An outfit needs at least one garment",
            ));
        }

        Ok(OutfitRecord {
            id: Uuid::new_v4(),
            garment_ids: self.slots.into_values().collect(),
            name: self.name,
            description: self.description,
            thumbnail: self.thumbnail,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_category_routes_to_exactly_one_slot() {
        for category in Category::all() {
            let slot = category.body_slot();
            assert!(slot.categories().contains(&category));

            let homes = BodySlot::all()
                .iter()
                .filter(|s| s.categories().contains(&category))
                .count();
            assert_eq!(homes, 1, "{category} appears in {homes} slots");
        }
    }

    #[test]
    fn test_category_display_from_str_round_trip() {
        for category in Category::all() {
            let parsed: Category = category.to_string().parse().unwrap();
            assert_eq!(parsed, category);
        }
        assert_eq!("dress".parse::<Category>().unwrap(), Category::OnePiece);
        assert!("cape".parse::<Category>().is_err());
    }

    #[test]
    fn test_garment_record_new() {
        let record = GarmentRecord::new(vec![1, 2, 3], Category::Top, "#336699");
        assert_eq!(record.color, "#336699");
        assert_eq!(record.category, Category::Top);
        assert_eq!(record.image_bytes, vec![1, 2, 3]);
        assert!(!record.id.is_nil());
    }

    #[test]
    fn test_garment_record_invalid_color_falls_back_to_sentinel() {
        let record = GarmentRecord::new(vec![], Category::Shoe, "teal");
        assert_eq!(record.color, NEUTRAL_FALLBACK_HEX);

        let record = GarmentRecord::new(vec![], Category::Shoe, "#12345");
        assert_eq!(record.color, NEUTRAL_FALLBACK_HEX);
    }

    #[test]
    fn test_garment_reprocess_keeps_identity() {
        let mut record = GarmentRecord::new(vec![1], Category::Bag, "#112233");
        let id = record.id;
        let created_at = record.created_at;

        record.reprocess(vec![9, 9], "#445566");
        assert_eq!(record.id, id);
        assert_eq!(record.created_at, created_at);
        assert_eq!(record.image_bytes, vec![9, 9]);
        assert_eq!(record.color, "#445566");
    }

    #[test]
    fn test_outfit_builder_dedupes_slots() {
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let shoes = Uuid::new_v4();

        let outfit = OutfitRecord::builder()
            .slot(BodySlot::Top, first)
            .slot(BodySlot::Top, second)
            .slot(BodySlot::Shoes, shoes)
            .build()
            .unwrap();

        // Second Top assignment replaces the first; order follows wear order
        assert_eq!(outfit.garment_ids, vec![second, shoes]);
    }

    #[test]
    fn test_outfit_builder_routes_by_category() {
        let dress = GarmentRecord::new(vec![], Category::OnePiece, "#AA3355");
        let outfit = OutfitRecord::builder()
            .garment(&dress)
            .name("garden party")
            .build()
            .unwrap();

        assert_eq!(outfit.garment_ids, vec![dress.id]);
        assert_eq!(outfit.name.as_deref(), Some("garden party"));
        assert!(outfit.thumbnail.is_none());
    }

    #[test]
    fn test_empty_outfit_rejected() {
        assert!(OutfitRecord::builder().build().is_err());
    }

    #[test]
    fn test_record_bincode_round_trip() {
        let record = GarmentRecord::new(vec![0, 255, 17], Category::Headwear, "#0099CC");
        let bytes = bincode::serialize(&record).unwrap();
        let decoded: GarmentRecord = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, record);
    }
}
