//! Reference catalog of valid products, sizes and colors
//!
//! Loaded once from JSON arrays and never mutated afterwards.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use tracing::{info, warn};

/// Valid values the reconciler matches OCR text against
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    /// Product codes, trimmed with source casing kept
    pub products: Vec<String>,
    /// Size names, trimmed and uppercased
    pub sizes: Vec<String>,
    /// Color names, trimmed and uppercased
    pub colors: Vec<String>,
}

impl Catalog {
    /// Build a catalog from in-memory lists (sizes and colors are normalized)
    pub fn new<P, S, C>(products: P, sizes: S, colors: C) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        S: IntoIterator,
        S::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            products: products
                .into_iter()
                .map(|p| p.into().trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            sizes: normalize_names(sizes),
            colors: normalize_names(colors),
        }
    }

    /// Load each table from its JSON file
    pub fn from_paths(products: &Path, sizes: &Path, colors: &Path) -> Result<Self> {
        let catalog = Self {
            products: load_products(products)?,
            sizes: load_names(sizes)?,
            colors: load_names(colors)?,
        };
        info!(
            "Catalog loaded: {} products, {} sizes, {} colors",
            catalog.products.len(),
            catalog.sizes.len(),
            catalog.colors.len()
        );
        Ok(catalog)
    }

    /// Load whichever tables are configured; missing or unreadable tables stay empty
    pub fn load_or_empty(
        products: Option<&Path>,
        sizes: Option<&Path>,
        colors: Option<&Path>,
    ) -> Self {
        let catalog = Self {
            products: load_table(products, load_products, "products"),
            sizes: load_table(sizes, load_names, "sizes"),
            colors: load_table(colors, load_names, "colors"),
        };
        info!(
            "Catalog loaded: {} products, {} sizes, {} colors",
            catalog.products.len(),
            catalog.sizes.len(),
            catalog.colors.len()
        );
        catalog
    }

    /// True when no table has entries
    pub fn is_empty(&self) -> bool {
        self.products.is_empty() && self.sizes.is_empty() && self.colors.is_empty()
    }
}

fn load_table(
    path: Option<&Path>,
    loader: fn(&Path) -> Result<Vec<String>>,
    what: &str,
) -> Vec<String> {
    let Some(path) = path else {
        return Vec::new();
    };
    match loader(path) {
        Ok(values) => values,
        Err(e) => {
            warn!("Failed to load {} from {:?}: {:#}", what, path, e);
            Vec::new()
        }
    }
}

fn normalize_names<I>(values: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    values
        .into_iter()
        .map(|v| v.into().trim().to_uppercase())
        .filter(|v| !v.is_empty())
        .collect()
}

fn read_array(path: &Path) -> Result<Vec<Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalog file {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse catalog file {:?}", path))
}

/// Trimmed text of a string or number value; blank strings are skipped
fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Product codes from objects keyed `Code`
pub fn load_products(path: &Path) -> Result<Vec<String>> {
    Ok(read_array(path)?
        .iter()
        .filter_map(|item| scalar_text(item.get("Code")))
        .collect())
}

/// Uppercased names from objects keyed `name`
pub fn load_names(path: &Path) -> Result<Vec<String>> {
    Ok(read_array(path)?
        .iter()
        .filter_map(|item| scalar_text(item.get("name")))
        .map(|name| name.to_uppercase())
        .collect())
}
