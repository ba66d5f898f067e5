use std::sync::Arc;

use image::RgbaImage;

/// A named material texture. Pixel data is shared, never copied, between
/// the catalog, history snapshots and in-flight applies.
#[derive(Clone, Debug)]
pub struct Material {
    pub name: String,
    pub image: Arc<RgbaImage>,
}

impl Material {
    pub fn new(name: impl Into<String>, image: RgbaImage) -> Self {
        Self {
            name: name.into(),
            image: Arc::new(image),
        }
    }
}

impl PartialEq for Material {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && (Arc::ptr_eq(&self.image, &other.image) || *self.image == *other.image)
    }
}

/// Materials the user can pick from, in display order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MaterialCatalog {
    materials: Vec<Material>,
}

impl MaterialCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a material, returning its index.
    pub fn push(&mut self, material: Material) -> usize {
        self.materials.push(material);
        self.materials.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&Material> {
        self.materials.get(index)
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.materials.iter().position(|m| m.name == name)
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Material> {
        self.materials.iter()
    }
}

impl FromIterator<Material> for MaterialCatalog {
    fn from_iter<I: IntoIterator<Item = Material>>(iter: I) -> Self {
        Self {
            materials: iter.into_iter().collect(),
        }
    }
}
