use serde::{Deserialize, Serialize};

/// A reagent stock as served by `/api/reagents`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reagent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concentration: Option<String>,

    /// Remaining stock, in `unit`
    #[serde(default)]
    pub stock_volume: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl Reagent {
    pub fn new(name: impl Into<String>, stock_volume: f64) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: None,
            concentration: None,
            stock_volume,
            unit: None,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}
