use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationParams {
    #[serde(default)]
    pub offset: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_limit() -> u64 {
    20
}

impl PaginationParams {
    pub fn offset(&self) -> usize {
        self.offset as usize
    }

    pub fn limit(&self) -> usize {
        self.limit.min(100) as usize
    }
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 20,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Paginated<T: Serialize> {
    pub items: Vec<T>,
    pub offset: u64,
    pub limit: u64,
}

impl<T: Serialize> Paginated<T> {
    pub fn new(items: Vec<T>, params: &PaginationParams) -> Self {
        Self {
            items,
            offset: params.offset,
            limit: params.limit() as u64,
        }
    }
}
