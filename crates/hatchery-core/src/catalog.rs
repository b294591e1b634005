//! The fixed collectible sequence.
//!
//! Item ids are 1-based and dense: the item at index `i` has id `i + 1`.
//! The catalog length is the length of the unlock sequence.

use serde::{Deserialize, Serialize};

const DEFAULT_ANIMALS: &[&str] = &[
    "Chick",
    "Duckling",
    "Bunny",
    "Hedgehog",
    "Fox Cub",
    "Red Panda",
    "Otter",
    "Koala",
    "Penguin",
    "Sea Turtle",
    "Snow Leopard",
    "Axolotl",
    "Pangolin",
    "Narwhal",
    "Phoenix",
];

/// One entry in the collectible sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collectible {
    pub id: u32,
    pub name: String,
}

/// Ordered list of collectibles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    items: Vec<Collectible>,
}

impl Catalog {
    /// Build a catalog from names in unlock order.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| Collectible {
                id: i as u32 + 1,
                name: name.into(),
            })
            .collect();
        Self { items }
    }

    pub fn get(&self, id: u32) -> Option<&Collectible> {
        let index = id.checked_sub(1)? as usize;
        self.items.get(index)
    }

    pub fn len(&self) -> u32 {
        self.items.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Collectible> {
        self.items.iter()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::from_names(DEFAULT_ANIMALS.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_dense_and_one_based() {
        let catalog = Catalog::default();
        for (i, item) in catalog.iter().enumerate() {
            assert_eq!(item.id, i as u32 + 1);
        }
        assert_eq!(catalog.len() as usize, DEFAULT_ANIMALS.len());
    }

    #[test]
    fn get_out_of_range() {
        let catalog = Catalog::from_names(["A", "B"]);
        assert!(catalog.get(0).is_none());
        assert_eq!(catalog.get(2).map(|c| c.name.as_str()), Some("B"));
        assert!(catalog.get(3).is_none());
    }
}
