//! Parser for the standalone .pkt item-package format.
//!
//! Unrelated to the sectioned save layout: no cipher, no checksum, just a
//! short header followed by bit-packed item records until the counted
//! number of items has been read.

use std::io::{self, Read, Seek};

use serde::Serialize;

use crate::reader::LittleEndianReader;

pub const PKT_MAGIC: u16 = 0x1E4A;

/// Fixed per-item header byte that every known package uses.
const ITEM_MARKER: u8 = 0x01;
/// Modifier type tag carrying the u32 price instead of a one-byte value.
const PRICE_MODIFIER: u8 = 0x01;

/// One crafted item entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Item {
    pub recipe_id: u16,
    pub quality: u8,
    pub material_id: u8,
    pub flags: u8,
    pub price: u32,
    /// Non-price modifiers as (type, value) pairs, in file order.
    pub modifiers: Vec<(u8, u8)>,
}

impl Item {
    /// The packed id word stored in the first two item-header bytes:
    /// 12-bit recipe (bits 5..8 always clear), quality in bits 5..8,
    /// material in the top nibble.
    pub fn packed_ids(&self) -> u16 {
        self.recipe_id | (self.quality as u16) << 5 | (self.material_id as u16) << 12
    }

    pub fn emit_to_vec(&self, out: &mut Vec<u8>) {
        let modifier_count = self.modifiers.len() as u8 + 1; // price entry included
        out.extend_from_slice(&self.packed_ids().to_le_bytes());
        out.push(ITEM_MARKER);
        out.push(0);
        out.push(self.flags);
        out.push(modifier_count);
        out.push(modifier_count * 2 + 3);
        out.push(PRICE_MODIFIER);
        out.extend_from_slice(&self.price.to_le_bytes());
        for &(kind, value) in &self.modifiers {
            out.push(kind);
            out.push(value);
        }
    }
}

/// A parsed package, items in file order.
#[derive(Debug, Clone, Serialize)]
pub struct ItemPackage {
    pub items: Vec<Item>,
}

impl ItemPackage {
    /// Items ordered the way the listing tool prints them.
    pub fn sorted_items(&self) -> Vec<Item> {
        let mut items = self.items.clone();
        items.sort_by_key(|item| (item.recipe_id, item.quality, item.material_id));
        items
    }
}

pub fn parse_package<R: Read + Seek>(input: R) -> io::Result<ItemPackage> {
    let mut r = LittleEndianReader::new(input);

    r.read_u8()?; // lead byte, unused
    let _unknown1 = r.read_u16()?;
    let item_count = r.read_u16()?;
    let _unknown2 = r.read_u16()?;
    let magic = r.read_u16()?;
    if magic != PKT_MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("not a pkt package: magic {magic:#06x}"),
        ));
    }

    let mut items = Vec::with_capacity(item_count as usize);
    for _ in 0..item_count {
        items.push(parse_item(&mut r)?);
    }

    if !r.at_end()? {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("trailing bytes after {item_count} items"),
        ));
    }

    Ok(ItemPackage { items })
}

fn parse_item<R: Read + Seek>(r: &mut LittleEndianReader<R>) -> io::Result<Item> {
    let recipe_byte = r.read_u8()?;
    let material_byte = r.read_u8()?;
    let marker = r.read_u8()?;
    let _unknown2 = r.read_u8()?;
    let flags = r.read_u8()?;
    let modifier_count = r.read_u8()?;
    let item_length = r.read_u8()?;

    if marker != ITEM_MARKER {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("bad item marker {marker:#04x}"),
        ));
    }
    if item_length as usize != modifier_count as usize * 2 + 3 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("item length {item_length} does not match {modifier_count} modifiers"),
        ));
    }

    let mut item = Item {
        quality: (recipe_byte & 0xE0) >> 5,
        material_id: (material_byte & 0xF0) >> 4,
        recipe_id: ((material_byte & 0xF) as u16) << 8 | (recipe_byte & 0x1F) as u16,
        flags,
        price: 0,
        modifiers: Vec::new(),
    };

    for _ in 0..modifier_count {
        let kind = r.read_u8()?;
        if kind == PRICE_MODIFIER {
            item.price = r.read_u32()?;
        } else {
            let value = r.read_u8()?;
            item.modifiers.push((kind, value));
        }
    }

    Ok(item)
}
