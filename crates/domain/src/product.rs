//! Catalog products as seen by the checkout core.

use common::{ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::Money;

/// Catalog status of a product. Only [`ProductStatus::Active`] products can be bought.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductStatus {
    #[default]
    Active,
    Inactive,
    Draft,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Active => "ACTIVE",
            ProductStatus::Inactive => "INACTIVE",
            ProductStatus::Draft => "DRAFT",
        }
    }
}

impl std::fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProductStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(ProductStatus::Active),
            "INACTIVE" => Ok(ProductStatus::Inactive),
            "DRAFT" => Ok(ProductStatus::Draft),
            other => Err(format!("unknown product status: {other}")),
        }
    }
}

/// A product owned by the external catalog.
///
/// The checkout core only ever writes `stock`, and only through the inventory ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub seller_id: UserId,
    pub name: String,
    pub sku: String,
    pub image: Option<String>,
    pub price: Money,
    pub stock: u32,
    pub status: ProductStatus,
}

impl Product {
    /// Creates an active product with the given price and stock.
    pub fn new(
        seller_id: UserId,
        name: impl Into<String>,
        sku: impl Into<String>,
        price: Money,
        stock: u32,
    ) -> Self {
        Self {
            id: ProductId::new(),
            seller_id,
            name: name.into(),
            sku: sku.into(),
            image: None,
            price,
            stock,
            status: ProductStatus::Active,
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_status(mut self, status: ProductStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == ProductStatus::Active
    }

    /// Returns true if the product is active and has at least `quantity` units.
    pub fn can_fulfil(&self, quantity: u32) -> bool {
        self.is_active() && self.stock >= quantity
    }
}
